use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{BankError, Result};
use crate::types::{
    Account, AccountId, Credit, CreditId, Installment, InstallmentStatus, Transfer, TransferId,
    UserId,
};

use super::{AccountLedger, CreditLedger, TransferLedger};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    credits: HashMap<CreditId, Credit>,
    schedules: HashMap<CreditId, Vec<Installment>>,
    transfers: HashMap<TransferId, Transfer>,
}

/// in-process ledger implementing every accessor
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    tables: RwLock<Tables>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// open an account for `user_id` with an opening balance, for seeding
    pub fn open_account(
        &self,
        user_id: UserId,
        opening_balance: Money,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<Account> {
        if opening_balance.is_negative() {
            return Err(BankError::invalid_input(format!(
                "opening balance must not be negative, got {opening_balance}"
            )));
        }

        let id = Uuid::new_v4();
        AccountLedger::create(
            self,
            &Account {
                id,
                user_id,
                number: Account::number_for(&id),
                balance: opening_balance,
                currency: currency.to_string(),
                created_at: now,
                updated_at: now,
            },
        )
    }

    pub fn account_count(&self) -> usize {
        self.tables.read().accounts.len()
    }

    pub fn credit_count(&self) -> usize {
        self.tables.read().credits.len()
    }

    pub fn transfer_count(&self) -> usize {
        self.tables.read().transfers.len()
    }
}

impl AccountLedger for InMemoryLedger {
    fn create(&self, account: &Account) -> Result<Account> {
        let mut tables = self.tables.write();
        if tables.accounts.contains_key(&account.id) {
            return Err(BankError::persistence(format!("duplicate account id {}", account.id)));
        }
        tables.accounts.insert(account.id, account.clone());
        Ok(account.clone())
    }

    fn get(&self, id: AccountId) -> Result<Account> {
        self.tables
            .read()
            .accounts
            .get(&id)
            .cloned()
            .ok_or(BankError::AccountNotFound { id })
    }

    fn list_by_user(&self, user_id: UserId) -> Result<Vec<Account>> {
        let tables = self.tables.read();
        let mut accounts: Vec<Account> = tables
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| (a.created_at, a.number.clone()));
        Ok(accounts)
    }

    fn update(&self, account: &Account) -> Result<()> {
        let mut tables = self.tables.write();
        let row = tables
            .accounts
            .get_mut(&account.id)
            .ok_or(BankError::AccountNotFound { id: account.id })?;
        *row = account.clone();
        Ok(())
    }
}

impl CreditLedger for InMemoryLedger {
    fn list_by_user(&self, user_id: UserId) -> Result<Vec<Credit>> {
        let tables = self.tables.read();
        let mut credits: Vec<Credit> = tables
            .credits
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        credits.sort_by_key(|c| c.created_at);
        Ok(credits)
    }

    fn create(&self, credit: &Credit) -> Result<Credit> {
        let mut tables = self.tables.write();
        if tables.credits.contains_key(&credit.id) {
            return Err(BankError::persistence(format!("duplicate credit id {}", credit.id)));
        }
        tables.credits.insert(credit.id, credit.clone());
        Ok(credit.clone())
    }

    fn get(&self, id: CreditId) -> Result<Credit> {
        self.tables
            .read()
            .credits
            .get(&id)
            .cloned()
            .ok_or(BankError::CreditNotFound { id })
    }

    fn update(&self, credit: &Credit) -> Result<()> {
        let mut tables = self.tables.write();
        let row = tables
            .credits
            .get_mut(&credit.id)
            .ok_or(BankError::CreditNotFound { id: credit.id })?;
        *row = credit.clone();
        Ok(())
    }

    fn delete(&self, id: CreditId) -> Result<()> {
        let mut tables = self.tables.write();
        tables
            .credits
            .remove(&id)
            .ok_or(BankError::CreditNotFound { id })?;
        tables.schedules.remove(&id);
        Ok(())
    }

    fn schedule_for(&self, credit_id: CreditId) -> Result<Vec<Installment>> {
        let tables = self.tables.read();
        if !tables.credits.contains_key(&credit_id) {
            return Err(BankError::CreditNotFound { id: credit_id });
        }
        Ok(tables.schedules.get(&credit_id).cloned().unwrap_or_default())
    }

    fn create_schedule(&self, installments: &[Installment]) -> Result<()> {
        let mut tables = self.tables.write();
        for installment in installments {
            if !tables.credits.contains_key(&installment.credit_id) {
                return Err(BankError::CreditNotFound { id: installment.credit_id });
            }
        }
        for installment in installments {
            let rows = tables.schedules.entry(installment.credit_id).or_default();
            rows.push(installment.clone());
            rows.sort_by_key(|i| i.number);
        }
        Ok(())
    }

    fn update_installment(&self, installment: &Installment) -> Result<()> {
        let mut tables = self.tables.write();
        let row = tables
            .schedules
            .get_mut(&installment.credit_id)
            .and_then(|rows| rows.iter_mut().find(|i| i.id == installment.id))
            .ok_or(BankError::InstallmentNotFound { id: installment.id })?;
        *row = installment.clone();
        Ok(())
    }

    fn due_installments(&self, as_of: NaiveDate) -> Result<Vec<Installment>> {
        let tables = self.tables.read();
        let mut due: Vec<Installment> = tables
            .schedules
            .values()
            .flatten()
            .filter(|i| i.status == InstallmentStatus::Pending && i.due_date <= as_of)
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.due_date
                .cmp(&b.due_date)
                .then(a.credit_id.cmp(&b.credit_id))
                .then(a.number.cmp(&b.number))
        });
        Ok(due)
    }
}

impl TransferLedger for InMemoryLedger {
    fn create(&self, transfer: &Transfer) -> Result<Transfer> {
        let mut tables = self.tables.write();
        if tables.transfers.contains_key(&transfer.id) {
            return Err(BankError::persistence(format!("duplicate transfer id {}", transfer.id)));
        }
        tables.transfers.insert(transfer.id, transfer.clone());
        Ok(transfer.clone())
    }

    fn get(&self, id: TransferId) -> Result<Transfer> {
        self.tables
            .read()
            .transfers
            .get(&id)
            .cloned()
            .ok_or(BankError::TransferNotFound { id })
    }

    fn list_by_account(&self, account_id: AccountId) -> Result<Vec<Transfer>> {
        let tables = self.tables.read();
        let mut transfers: Vec<Transfer> = tables
            .transfers
            .values()
            .filter(|t| t.from_account_id == account_id || t.to_account_id == account_id)
            .cloned()
            .collect();
        transfers.sort_by_key(|t| t.created_at);
        Ok(transfers)
    }

    fn update(&self, transfer: &Transfer) -> Result<()> {
        let mut tables = self.tables.write();
        let row = tables
            .transfers
            .get_mut(&transfer.id)
            .ok_or(BankError::TransferNotFound { id: transfer.id })?;
        *row = transfer.clone();
        Ok(())
    }
}
