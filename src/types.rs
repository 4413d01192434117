use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};

/// authenticated caller identity, numeric as issued by the user store
pub type UserId = i64;

pub type AccountId = Uuid;
pub type CreditId = Uuid;
pub type InstallmentId = Uuid;
pub type TransferId = Uuid;

/// bank account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub number: String,
    pub balance: Money,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// fifteen-digit number in the `4080` settlement-account range, derived from the id
    pub fn number_for(id: &AccountId) -> String {
        let digits = id.as_u128() % 100_000_000_000;
        format!("4080{digits:011}")
    }
}

/// credit lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    /// disbursed and being repaid
    Active,
    /// every installment paid
    Closed,
    /// too many installments missed
    Defaulted,
}

/// credit (loan) row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credit {
    pub id: CreditId,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub amount: Money,
    pub term: u32,
    pub monthly_payment: Money,
    pub annual_rate: Rate,
    pub status: CreditStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credit {
    pub fn is_active(&self) -> bool {
        self.status == CreditStatus::Active
    }
}

/// installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Pending,
    Paid,
    Late,
}

/// one row of a credit's payment schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub credit_id: CreditId,
    pub number: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub principal_portion: Money,
    pub interest_portion: Money,
    pub status: InstallmentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

/// transfer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
}

/// money movement between two accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Money,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
