//! narrow accessor traits the engine and services are built on
//!
//! each trait is one capability. a SQL-backed store implements them in the
//! request layer; [`InMemoryLedger`] is the reference implementation.

pub mod locks;
pub mod memory;

use chrono::NaiveDate;

use crate::errors::Result;
use crate::types::{Account, AccountId, Credit, CreditId, Installment, Transfer, TransferId, UserId};

pub use locks::{KeyGuard, KeyedLocks};
pub use memory::InMemoryLedger;

/// account rows
#[cfg_attr(test, mockall::automock)]
pub trait AccountLedger: Send + Sync {
    fn create(&self, account: &Account) -> Result<Account>;

    /// fails with `AccountNotFound`
    fn get(&self, id: AccountId) -> Result<Account>;

    fn list_by_user(&self, user_id: UserId) -> Result<Vec<Account>>;

    /// fails with `AccountNotFound` or `PersistenceFailed`
    fn update(&self, account: &Account) -> Result<()>;
}

/// credit rows and their payment schedules
#[cfg_attr(test, mockall::automock)]
pub trait CreditLedger: Send + Sync {
    fn list_by_user(&self, user_id: UserId) -> Result<Vec<Credit>>;

    fn create(&self, credit: &Credit) -> Result<Credit>;

    /// fails with `CreditNotFound`
    fn get(&self, id: CreditId) -> Result<Credit>;

    fn update(&self, credit: &Credit) -> Result<()>;

    /// remove a credit together with its schedule
    fn delete(&self, id: CreditId) -> Result<()>;

    /// installments ordered by number
    fn schedule_for(&self, credit_id: CreditId) -> Result<Vec<Installment>>;

    fn create_schedule(&self, installments: &[Installment]) -> Result<()>;

    fn update_installment(&self, installment: &Installment) -> Result<()>;

    /// pending installments due on or before `as_of`, ordered by due date then number
    fn due_installments(&self, as_of: NaiveDate) -> Result<Vec<Installment>>;
}

/// transfer records
#[cfg_attr(test, mockall::automock)]
pub trait TransferLedger: Send + Sync {
    fn create(&self, transfer: &Transfer) -> Result<Transfer>;

    /// fails with `TransferNotFound`
    fn get(&self, id: TransferId) -> Result<Transfer>;

    /// transfers touching the account on either side, oldest first
    fn list_by_account(&self, account_id: AccountId) -> Result<Vec<Transfer>>;

    fn update(&self, transfer: &Transfer) -> Result<()>;
}
