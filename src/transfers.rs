use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::Context;
use crate::decimal::Money;
use crate::errors::{BankError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::{AccountLedger, KeyedLocks, TransferLedger};
use crate::types::{Account, AccountId, Transfer, TransferId, TransferStatus};

/// money movement between two accounts
///
/// both account locks are taken in ascending id order, so transfers in
/// opposite directions between the same pair cannot deadlock.
pub struct TransferService {
    accounts: Arc<dyn AccountLedger>,
    transfers: Arc<dyn TransferLedger>,
    locks: Arc<KeyedLocks<AccountId>>,
    events: Mutex<EventStore>,
}

impl TransferService {
    pub fn new(
        accounts: Arc<dyn AccountLedger>,
        transfers: Arc<dyn TransferLedger>,
        locks: Arc<KeyedLocks<AccountId>>,
    ) -> Self {
        Self {
            accounts,
            transfers,
            locks,
            events: Mutex::new(EventStore::new()),
        }
    }

    pub fn transfer(
        &self,
        ctx: &Context,
        from: AccountId,
        to: AccountId,
        amount: Money,
    ) -> Result<Transfer> {
        if !amount.is_positive() || amount.round_cents() != amount {
            return Err(BankError::invalid_input(format!(
                "transfer amount must be a positive cent amount, got {amount}"
            )));
        }
        if from == to {
            return Err(BankError::invalid_input("cannot transfer to the same account"));
        }

        let _guards = self.locks.lock_pair(&from, &to);

        let mut source = self.accounts.get(from)?;
        let mut target = self.accounts.get(to)?;
        if source.balance < amount {
            warn!(%from, %to, %amount, available = %source.balance, "transfer exceeds balance");
            return Err(BankError::InsufficientFunds {
                available: source.balance,
                requested: amount,
            });
        }

        ctx.ensure_active()?;
        let now = ctx.now();
        let mut record = self.transfers.create(&Transfer {
            id: Uuid::new_v4(),
            from_account_id: from,
            to_account_id: to,
            amount,
            status: TransferStatus::Pending,
            created_at: now,
            updated_at: now,
        })?;

        source.balance -= amount;
        source.updated_at = now;
        if let Err(err) = ctx.ensure_active().and_then(|_| self.accounts.update(&source)) {
            self.mark_failed(ctx, &mut record, &err);
            return Err(err);
        }

        target.balance += amount;
        target.updated_at = now;
        if let Err(err) = ctx.ensure_active().and_then(|_| self.accounts.update(&target)) {
            self.reverse_debit(&mut source, amount, &record);
            self.mark_failed(ctx, &mut record, &err);
            return Err(err);
        }

        record.status = TransferStatus::Completed;
        record.updated_at = now;
        if let Err(err) = self.transfers.update(&record) {
            // balances already moved; the record stays pending in the store
            error!(
                transfer_id = %record.id,
                error = %err,
                "completed transfer status not persisted"
            );
        }

        info!(transfer_id = %record.id, %from, %to, %amount, "transfer completed");
        self.events.lock().emit(Event::TransferCompleted {
            transfer_id: record.id,
            from_account_id: from,
            to_account_id: to,
            amount,
            timestamp: now,
        });

        Ok(record)
    }

    /// fails with `TransferNotFound`
    pub fn find(&self, id: TransferId) -> Result<Transfer> {
        self.transfers.get(id)
    }

    pub fn transfers_for_account(&self, account_id: AccountId) -> Result<Vec<Transfer>> {
        self.transfers.list_by_account(account_id)
    }

    fn reverse_debit(&self, source: &mut Account, amount: Money, record: &Transfer) {
        source.balance += amount;
        if let Err(err) = self.accounts.update(source) {
            error!(
                transfer_id = %record.id,
                account_id = %source.id,
                %amount,
                error = %err,
                "debit reversal failed, source account left short"
            );
        }
    }

    fn mark_failed(&self, ctx: &Context, record: &mut Transfer, cause: &BankError) {
        record.status = TransferStatus::Failed;
        record.updated_at = ctx.now();
        if let Err(err) = self.transfers.update(record) {
            error!(transfer_id = %record.id, error = %err, "failed transfer status not persisted");
        }

        warn!(transfer_id = %record.id, cause = %cause, "transfer failed");
        self.events.lock().emit(Event::TransferFailed {
            transfer_id: record.id,
            reason: cause.to_string(),
            timestamp: ctx.now(),
        });
    }

    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().take_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use chrono::Utc;

    fn setup() -> (Arc<InMemoryLedger>, TransferService, Account, Account) {
        let ledger = Arc::new(InMemoryLedger::new());
        let now = Utc::now();
        let alice = ledger.open_account(1, Money::from_major(1_000), "RUB", now).unwrap();
        let bob = ledger.open_account(2, Money::from_major(1_000), "RUB", now).unwrap();
        let service =
            TransferService::new(ledger.clone(), ledger.clone(), Arc::new(KeyedLocks::new()));
        (ledger, service, alice, bob)
    }

    fn balance(ledger: &InMemoryLedger, id: AccountId) -> Money {
        AccountLedger::get(ledger, id).unwrap().balance
    }

    #[test]
    fn test_transfer_moves_funds() {
        let (ledger, service, alice, bob) = setup();
        let ctx = Context::at(Utc::now());

        let transfer = service
            .transfer(&ctx, alice.id, bob.id, Money::from_major(250))
            .unwrap();

        assert_eq!(transfer.status, TransferStatus::Completed);
        assert_eq!(service.find(transfer.id).unwrap().status, TransferStatus::Completed);
        assert_eq!(service.transfers_for_account(bob.id).unwrap(), vec![transfer.clone()]);
        assert_eq!(balance(&ledger, alice.id), Money::from_major(750));
        assert_eq!(balance(&ledger, bob.id), Money::from_major(1_250));
        assert!(matches!(
            service.take_events().as_slice(),
            [Event::TransferCompleted { .. }]
        ));
    }

    #[test]
    fn test_insufficient_funds_leaves_no_record() {
        let (ledger, service, alice, bob) = setup();

        assert_eq!(
            service.transfer(&Context::at(Utc::now()), alice.id, bob.id, Money::from_major(1_001)),
            Err(BankError::InsufficientFunds {
                available: Money::from_major(1_000),
                requested: Money::from_major(1_001),
            })
        );
        assert_eq!(balance(&ledger, alice.id), Money::from_major(1_000));
        assert_eq!(ledger.transfer_count(), 0);
        assert!(service.take_events().is_empty());
    }

    #[test]
    fn test_invalid_transfers() {
        let (_, service, alice, bob) = setup();
        let ctx = Context::at(Utc::now());

        assert!(matches!(
            service.transfer(&ctx, alice.id, alice.id, Money::from_major(1)),
            Err(BankError::InvalidInput { .. })
        ));
        assert!(matches!(
            service.transfer(&ctx, alice.id, bob.id, Money::ZERO),
            Err(BankError::InvalidInput { .. })
        ));

        let missing = Uuid::new_v4();
        assert_eq!(
            service.transfer(&ctx, alice.id, missing, Money::from_major(1)),
            Err(BankError::AccountNotFound { id: missing })
        );
        assert_eq!(service.find(missing), Err(BankError::TransferNotFound { id: missing }));
    }

    struct RejectsCredits {
        inner: Arc<InMemoryLedger>,
        target: AccountId,
    }

    impl AccountLedger for RejectsCredits {
        fn create(&self, account: &Account) -> Result<Account> {
            AccountLedger::create(self.inner.as_ref(), account)
        }

        fn get(&self, id: AccountId) -> Result<Account> {
            AccountLedger::get(self.inner.as_ref(), id)
        }

        fn list_by_user(&self, user_id: crate::types::UserId) -> Result<Vec<Account>> {
            AccountLedger::list_by_user(self.inner.as_ref(), user_id)
        }

        fn update(&self, account: &Account) -> Result<()> {
            if account.id == self.target {
                return Err(BankError::persistence("target account frozen"));
            }
            AccountLedger::update(self.inner.as_ref(), account)
        }
    }

    #[test]
    fn test_failed_credit_leg_reverses_debit() {
        let (ledger, _, alice, bob) = setup();
        let accounts = Arc::new(RejectsCredits {
            inner: ledger.clone(),
            target: bob.id,
        });
        let service = TransferService::new(accounts, ledger.clone(), Arc::new(KeyedLocks::new()));

        let ctx = Context::at(Utc::now());
        let result = service.transfer(&ctx, alice.id, bob.id, Money::from_major(300));

        assert_eq!(result, Err(BankError::persistence("target account frozen")));
        assert_eq!(balance(&ledger, alice.id), Money::from_major(1_000));
        assert_eq!(balance(&ledger, bob.id), Money::from_major(1_000));

        let events = service.take_events();
        let failed_id = match events.as_slice() {
            [Event::TransferFailed { transfer_id, .. }] => *transfer_id,
            other => panic!("expected a single failure event, got {other:?}"),
        };
        assert_eq!(
            TransferLedger::get(ledger.as_ref(), failed_id).unwrap().status,
            TransferStatus::Failed
        );
    }

    struct CancelsAfterDebit {
        inner: Arc<InMemoryLedger>,
        token: tokio_util::sync::CancellationToken,
    }

    impl AccountLedger for CancelsAfterDebit {
        fn create(&self, account: &Account) -> Result<Account> {
            AccountLedger::create(self.inner.as_ref(), account)
        }

        fn get(&self, id: AccountId) -> Result<Account> {
            AccountLedger::get(self.inner.as_ref(), id)
        }

        fn list_by_user(&self, user_id: crate::types::UserId) -> Result<Vec<Account>> {
            AccountLedger::list_by_user(self.inner.as_ref(), user_id)
        }

        fn update(&self, account: &Account) -> Result<()> {
            AccountLedger::update(self.inner.as_ref(), account)?;
            self.token.cancel();
            Ok(())
        }
    }

    #[test]
    fn test_cancellation_mid_transfer_reverses_debit() {
        let (ledger, _, alice, bob) = setup();
        let token = tokio_util::sync::CancellationToken::new();
        let accounts = Arc::new(CancelsAfterDebit {
            inner: ledger.clone(),
            token: token.clone(),
        });
        let service = TransferService::new(accounts, ledger.clone(), Arc::new(KeyedLocks::new()));
        let ctx = Context::at(Utc::now()).with_cancellation(token);

        assert_eq!(
            service.transfer(&ctx, alice.id, bob.id, Money::from_major(400)),
            Err(BankError::Cancelled)
        );
        assert_eq!(balance(&ledger, alice.id), Money::from_major(1_000));
        assert_eq!(balance(&ledger, bob.id), Money::from_major(1_000));

        let records = TransferLedger::list_by_account(ledger.as_ref(), alice.id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TransferStatus::Failed);
    }

    #[test]
    fn test_opposite_transfers_do_not_deadlock() {
        let (ledger, service, alice, bob) = setup();

        std::thread::scope(|scope| {
            for (from, to) in [(alice.id, bob.id), (bob.id, alice.id)] {
                let service = &service;
                scope.spawn(move || {
                    for _ in 0..200 {
                        // either direction may momentarily run dry
                        let ctx = Context::at(Utc::now());
                        let _ = service.transfer(&ctx, from, to, Money::from_major(7));
                    }
                });
            }
        });

        assert_eq!(
            balance(&ledger, alice.id) + balance(&ledger, bob.id),
            Money::from_major(2_000)
        );
        assert!(!balance(&ledger, alice.id).is_negative());
        assert!(!balance(&ledger, bob.id).is_negative());
    }
}
