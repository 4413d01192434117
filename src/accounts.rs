use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::Context;
use crate::decimal::Money;
use crate::errors::{BankError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::{AccountLedger, KeyedLocks};
use crate::types::{Account, AccountId, UserId};

/// currency of accounts opened through the service
pub const DEFAULT_CURRENCY: &str = "RUB";

/// account opening, lookup and balance adjustment
pub struct AccountService {
    accounts: Arc<dyn AccountLedger>,
    locks: Arc<KeyedLocks<AccountId>>,
    events: Mutex<EventStore>,
}

impl AccountService {
    /// `locks` should be the engine's account locks so balance writes serialize
    pub fn new(accounts: Arc<dyn AccountLedger>, locks: Arc<KeyedLocks<AccountId>>) -> Self {
        Self {
            accounts,
            locks,
            events: Mutex::new(EventStore::new()),
        }
    }

    /// open an empty account for `user_id`
    pub fn open_account(&self, ctx: &Context, user_id: UserId) -> Result<Account> {
        ctx.ensure_active()?;
        let id = Uuid::new_v4();
        let now = ctx.now();
        let account = self.accounts.create(&Account {
            id,
            user_id,
            number: Account::number_for(&id),
            balance: Money::ZERO,
            currency: DEFAULT_CURRENCY.to_string(),
            created_at: now,
            updated_at: now,
        })?;

        info!(user_id, account_id = %account.id, number = %account.number, "account opened");
        Ok(account)
    }

    pub fn accounts_for_user(&self, user_id: UserId) -> Result<Vec<Account>> {
        self.accounts.list_by_user(user_id)
    }

    pub fn account(&self, id: AccountId) -> Result<Account> {
        self.accounts.get(id)
    }

    /// account lookup scoped to its owner; a foreign account reads as missing
    pub fn account_for_user(&self, user_id: UserId, id: AccountId) -> Result<Account> {
        let account = self.accounts.get(id)?;
        if account.user_id != user_id {
            return Err(BankError::AccountNotFound { id });
        }
        Ok(account)
    }

    /// add `delta` (negative to withdraw) without letting the balance go below zero
    pub fn update_balance(
        &self,
        ctx: &Context,
        account_id: AccountId,
        delta: Money,
    ) -> Result<Account> {
        if delta.round_cents() != delta {
            return Err(BankError::invalid_input(format!(
                "balance delta has sub-cent precision: {delta}"
            )));
        }

        let _guard = self.locks.lock(&account_id);

        let mut account = self.accounts.get(account_id)?;
        let new_balance = account.balance + delta;
        if new_balance.is_negative() {
            warn!(%account_id, balance = %account.balance, %delta, "withdrawal exceeds balance");
            return Err(BankError::InsufficientFunds {
                available: account.balance,
                requested: -delta,
            });
        }

        ctx.ensure_active()?;
        account.balance = new_balance;
        account.updated_at = ctx.now();
        self.accounts.update(&account)?;

        info!(%account_id, %delta, balance = %new_balance, "balance adjusted");
        self.events.lock().emit(Event::BalanceAdjusted {
            account_id,
            delta,
            new_balance,
            timestamp: ctx.now(),
        });

        Ok(account)
    }

    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().take_events()
    }
}
