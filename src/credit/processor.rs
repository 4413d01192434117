use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::context::Context;
use crate::decimal::Money;
use crate::errors::{BankError, Result};
use crate::events::Event;
use crate::types::{Credit, CreditId, CreditStatus, Installment, InstallmentId, InstallmentStatus};

use super::origination::CreditEngine;

/// what happened to a single due installment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Paid,
    Late,
}

/// installment that could not be processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentFailure {
    pub installment_id: InstallmentId,
    pub credit_id: CreditId,
    pub message: String,
}

/// outcome of one payment run
///
/// `errors` holds one entry per errored installment plus one per failed
/// status refresh, so its length is `errored + status_failures`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub as_of: NaiveDate,
    pub paid: usize,
    pub late: usize,
    pub errored: usize,
    pub status_failures: usize,
    pub collected: Money,
    pub closed_credits: Vec<CreditId>,
    pub defaulted_credits: Vec<CreditId>,
    pub errors: Vec<InstallmentFailure>,
    /// the run stopped early; installments after the last processed one are untouched
    pub cancelled: bool,
}

impl ProcessingReport {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            paid: 0,
            late: 0,
            errored: 0,
            status_failures: 0,
            collected: Money::ZERO,
            closed_credits: Vec::new(),
            defaulted_credits: Vec::new(),
            errors: Vec::new(),
            cancelled: false,
        }
    }

    /// installments settled or errored, status refreshes not included
    pub fn processed(&self) -> usize {
        self.paid + self.late + self.errored
    }
}

impl CreditEngine {
    /// collect every pending installment due on or before `as_of`
    ///
    /// a failure on one installment is recorded and the run moves on. a failed
    /// listing aborts the run, as does cancellation before the first
    /// installment; cancellation later returns the partial report flagged
    /// `cancelled`.
    pub fn process_due_payments(
        &self,
        ctx: &Context,
        as_of: NaiveDate,
    ) -> Result<ProcessingReport> {
        ctx.ensure_active()?;
        let due = self.credits.due_installments(as_of)?;
        let mut report = ProcessingReport::new(as_of);

        for installment in due {
            if ctx.is_cancelled() {
                if report.processed() == 0 {
                    return Err(BankError::Cancelled);
                }
                warn!(%as_of, processed = report.processed(), "payment run cancelled");
                report.cancelled = true;
                break;
            }

            match self.settle(ctx, &installment) {
                Ok((credit, Settlement::Paid)) => {
                    report.paid += 1;
                    report.collected += installment.amount;
                    self.refresh_status(ctx, &credit, &installment, &mut report);
                }
                Ok((credit, Settlement::Late)) => {
                    report.late += 1;
                    self.refresh_status(ctx, &credit, &installment, &mut report);
                }
                Err(err) => {
                    error!(
                        installment_id = %installment.id,
                        credit_id = %installment.credit_id,
                        error = %err,
                        "installment processing failed"
                    );
                    report.errored += 1;
                    report.errors.push(InstallmentFailure {
                        installment_id: installment.id,
                        credit_id: installment.credit_id,
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(
            %as_of,
            paid = report.paid,
            late = report.late,
            errored = report.errored,
            status_failures = report.status_failures,
            collected = %report.collected,
            cancelled = report.cancelled,
            "payment run finished"
        );
        Ok(report)
    }

    /// debit the funding account for one installment, or mark it late
    fn settle(&self, ctx: &Context, installment: &Installment) -> Result<(Credit, Settlement)> {
        let credit = self.credits.get(installment.credit_id)?;

        let _guard = self.account_locks.lock(&credit.account_id);

        let mut account = self.accounts.get(credit.account_id)?;
        let now = ctx.now();
        let mut row = installment.clone();

        if account.balance < installment.amount {
            row.status = InstallmentStatus::Late;
            self.credits.update_installment(&row)?;

            warn!(
                installment_id = %row.id,
                credit_id = %credit.id,
                due = %row.amount,
                available = %account.balance,
                "installment late"
            );
            self.events.lock().emit(Event::InstallmentLate {
                credit_id: credit.id,
                installment_id: row.id,
                amount: row.amount,
                available: account.balance,
                due_date: row.due_date,
                timestamp: now,
            });
            return Ok((credit, Settlement::Late));
        }

        account.balance -= installment.amount;
        account.updated_at = now;
        self.accounts.update(&account)?;

        row.status = InstallmentStatus::Paid;
        row.paid_at = Some(now);
        if let Err(err) = self.credits.update_installment(&row) {
            // undo the debit, the installment is still pending
            account.balance += installment.amount;
            if let Err(refund) = self.accounts.update(&account) {
                error!(
                    installment_id = %row.id,
                    account_id = %account.id,
                    error = %refund,
                    "refund after failed installment update did not persist"
                );
            }
            return Err(err);
        }

        self.events.lock().emit(Event::InstallmentPaid {
            credit_id: credit.id,
            installment_id: row.id,
            amount: row.amount,
            due_date: row.due_date,
            timestamp: now,
        });
        Ok((credit, Settlement::Paid))
    }

    /// close a fully paid credit, default one with too many late installments
    fn refresh_status(
        &self,
        ctx: &Context,
        credit: &Credit,
        trigger: &Installment,
        report: &mut ProcessingReport,
    ) {
        if let Err(err) = self.try_refresh_status(ctx, credit, report) {
            error!(credit_id = %credit.id, error = %err, "credit status refresh failed");
            report.status_failures += 1;
            report.errors.push(InstallmentFailure {
                installment_id: trigger.id,
                credit_id: credit.id,
                message: err.to_string(),
            });
        }
    }

    fn try_refresh_status(
        &self,
        ctx: &Context,
        credit: &Credit,
        report: &mut ProcessingReport,
    ) -> Result<()> {
        let credit = self.credits.get(credit.id)?;
        let schedule = self.credits.schedule_for(credit.id)?;

        let all_paid = schedule.iter().all(|i| i.status == InstallmentStatus::Paid);
        let late = schedule
            .iter()
            .filter(|i| i.status == InstallmentStatus::Late)
            .count();
        let threshold = self.policy.default_after_late_installments as usize;

        let next = if all_paid && credit.status != CreditStatus::Closed {
            CreditStatus::Closed
        } else if credit.status == CreditStatus::Active && threshold > 0 && late >= threshold {
            CreditStatus::Defaulted
        } else {
            return Ok(());
        };

        let mut updated = credit.clone();
        updated.status = next;
        updated.updated_at = ctx.now();
        self.credits.update(&updated)?;

        match next {
            CreditStatus::Closed => report.closed_credits.push(credit.id),
            CreditStatus::Defaulted => report.defaulted_credits.push(credit.id),
            CreditStatus::Active => {}
        }

        info!(credit_id = %credit.id, from = ?credit.status, to = ?next, "credit status changed");
        self.events.lock().emit(Event::CreditStatusChanged {
            credit_id: credit.id,
            old_status: credit.status,
            new_status: next,
            timestamp: ctx.now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CreditPolicy;
    use crate::errors::BankError;
    use crate::ledger::{AccountLedger, CreditLedger, InMemoryLedger, MockCreditLedger};
    use crate::types::{Account, AccountId, UserId};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn origination_ctx() -> Context {
        Context::at(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap())
    }

    fn run_ctx(y: i32, m: u32, d: u32) -> Context {
        Context::at(Utc.with_ymd_and_hms(y, m, d, 3, 0, 0).unwrap())
    }

    fn engine_with(ledger: &Arc<InMemoryLedger>, policy: CreditPolicy) -> CreditEngine {
        CreditEngine::new(ledger.clone(), ledger.clone(), policy)
    }

    fn originate(
        engine: &CreditEngine,
        ledger: &InMemoryLedger,
        user_id: UserId,
    ) -> (Account, Credit) {
        let ctx = origination_ctx();
        let account = ledger.open_account(user_id, Money::ZERO, "RUB", ctx.now()).unwrap();
        let credit = engine
            .originate(&ctx, user_id, account.id, Money::from_major(10_000), 6)
            .unwrap();
        (account, credit)
    }

    fn set_balance(ledger: &InMemoryLedger, id: AccountId, balance: Money) {
        let mut account = AccountLedger::get(ledger, id).unwrap();
        account.balance = balance;
        AccountLedger::update(ledger, &account).unwrap();
    }

    fn balance(ledger: &InMemoryLedger, id: AccountId) -> Money {
        AccountLedger::get(ledger, id).unwrap().balance
    }

    #[test]
    fn test_nothing_due_before_first_date() {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = engine_with(&ledger, CreditPolicy::default());
        originate(&engine, &ledger, 1);

        let as_of = NaiveDate::from_ymd_opt(2024, 2, 14).unwrap();
        let report = engine.process_due_payments(&run_ctx(2024, 2, 14), as_of).unwrap();
        assert_eq!(report, ProcessingReport::new(as_of));
    }

    #[test]
    fn test_due_installment_is_collected() {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = engine_with(&ledger, CreditPolicy::default());
        let (account, credit) = originate(&engine, &ledger, 1);
        engine.take_events();

        let ctx = run_ctx(2024, 2, 15);
        let report = engine.process_due_payments(&ctx, ctx.today()).unwrap();

        assert_eq!(report.paid, 1);
        assert_eq!(report.collected, Money::from_decimal(dec!(1725.48)));
        assert_eq!(balance(&ledger, account.id), Money::from_decimal(dec!(8274.52)));

        let schedule = engine.schedule(credit.id).unwrap();
        assert_eq!(schedule[0].status, InstallmentStatus::Paid);
        assert_eq!(schedule[0].paid_at, Some(ctx.now()));
        assert_eq!(schedule[1].status, InstallmentStatus::Pending);

        assert!(matches!(engine.take_events().as_slice(), [Event::InstallmentPaid { .. }]));

        // a second run on the same day finds nothing left
        let again = engine.process_due_payments(&ctx, ctx.today()).unwrap();
        assert_eq!(again.processed(), 0);
    }

    #[test]
    fn test_insufficient_funds_marks_late_and_continues() {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = engine_with(&ledger, CreditPolicy::default());
        let (broke, broke_credit) = originate(&engine, &ledger, 1);
        let (funded, _) = originate(&engine, &ledger, 2);
        set_balance(&ledger, broke.id, Money::from_major(100));

        let ctx = run_ctx(2024, 2, 15);
        let report = engine.process_due_payments(&ctx, ctx.today()).unwrap();

        assert_eq!((report.paid, report.late, report.errored), (1, 1, 0));
        assert_eq!(balance(&ledger, broke.id), Money::from_major(100));
        assert_eq!(balance(&ledger, funded.id), Money::from_decimal(dec!(8274.52)));
        assert_eq!(
            engine.schedule(broke_credit.id).unwrap()[0].status,
            InstallmentStatus::Late
        );
        assert!(engine.take_events().iter().any(|e| matches!(
            e,
            Event::InstallmentLate { available, .. } if *available == Money::from_major(100)
        )));
    }

    #[test]
    fn test_fully_paid_credit_closes() {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = engine_with(&ledger, CreditPolicy::default());
        let (account, credit) = originate(&engine, &ledger, 1);
        set_balance(&ledger, account.id, Money::from_major(20_000));

        let ctx = run_ctx(2024, 8, 1);
        let report = engine.process_due_payments(&ctx, ctx.today()).unwrap();

        assert_eq!(report.paid, 6);
        assert_eq!(report.collected, credit.monthly_payment * rust_decimal::Decimal::from(6));
        assert_eq!(report.closed_credits, vec![credit.id]);
        assert_eq!(engine.credit(credit.id).unwrap().status, CreditStatus::Closed);
        assert_eq!(
            balance(&ledger, account.id),
            Money::from_major(20_000) - report.collected
        );
    }

    #[test]
    fn test_repeated_late_installments_default_the_credit() {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = engine_with(&ledger, CreditPolicy::default());
        let (account, credit) = originate(&engine, &ledger, 1);
        set_balance(&ledger, account.id, Money::ZERO);

        let ctx = run_ctx(2024, 8, 1);
        let report = engine.process_due_payments(&ctx, ctx.today()).unwrap();

        assert_eq!(report.late, 6);
        assert_eq!(report.defaulted_credits, vec![credit.id]);
        assert_eq!(engine.credit(credit.id).unwrap().status, CreditStatus::Defaulted);
    }

    #[test]
    fn test_default_threshold_zero_disables_defaulting() {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = engine_with(
            &ledger,
            CreditPolicy::default().with_default_after_late_installments(0),
        );
        let (account, credit) = originate(&engine, &ledger, 1);
        set_balance(&ledger, account.id, Money::ZERO);

        let ctx = run_ctx(2024, 8, 1);
        let report = engine.process_due_payments(&ctx, ctx.today()).unwrap();

        assert_eq!(report.late, 6);
        assert!(report.defaulted_credits.is_empty());
        assert_eq!(engine.credit(credit.id).unwrap().status, CreditStatus::Active);
    }

    struct BrokenAccount {
        inner: Arc<InMemoryLedger>,
        broken: AccountId,
    }

    impl AccountLedger for BrokenAccount {
        fn create(&self, account: &Account) -> Result<Account> {
            AccountLedger::create(self.inner.as_ref(), account)
        }

        fn list_by_user(&self, user_id: UserId) -> Result<Vec<Account>> {
            AccountLedger::list_by_user(self.inner.as_ref(), user_id)
        }

        fn get(&self, id: AccountId) -> Result<Account> {
            if id == self.broken {
                return Err(BankError::persistence("account row locked"));
            }
            AccountLedger::get(self.inner.as_ref(), id)
        }

        fn update(&self, account: &Account) -> Result<()> {
            AccountLedger::update(self.inner.as_ref(), account)
        }
    }

    #[test]
    fn test_one_failing_installment_does_not_stop_the_run() {
        let ledger = Arc::new(InMemoryLedger::new());
        let setup = engine_with(&ledger, CreditPolicy::default());
        let (broken, broken_credit) = originate(&setup, &ledger, 1);
        let (healthy, _) = originate(&setup, &ledger, 2);

        let accounts = Arc::new(BrokenAccount {
            inner: ledger.clone(),
            broken: broken.id,
        });
        let engine = CreditEngine::new(accounts, ledger.clone(), CreditPolicy::default());

        let ctx = run_ctx(2024, 2, 15);
        let report = engine.process_due_payments(&ctx, ctx.today()).unwrap();

        assert_eq!((report.paid, report.late, report.errored), (1, 0, 1));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].credit_id, broken_credit.id);
        assert!(report.errors[0].message.contains("account row locked"));
        assert_eq!(balance(&ledger, healthy.id), Money::from_decimal(dec!(8274.52)));
        assert_eq!(
            engine.schedule(broken_credit.id).unwrap()[0].status,
            InstallmentStatus::Pending
        );
    }

    #[test]
    fn test_listing_failure_aborts_the_run() {
        let ledger = Arc::new(InMemoryLedger::new());
        let mut credits = MockCreditLedger::new();
        credits
            .expect_due_installments()
            .times(1)
            .returning(|_| Err(BankError::persistence("connection refused")));

        let engine = CreditEngine::new(ledger, Arc::new(credits), CreditPolicy::default());
        let ctx = run_ctx(2024, 2, 15);

        assert_eq!(
            engine.process_due_payments(&ctx, ctx.today()),
            Err(BankError::persistence("connection refused"))
        );
    }

    #[test]
    fn test_cancelled_run() {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = engine_with(&ledger, CreditPolicy::default());
        let (account, _) = originate(&engine, &ledger, 1);

        let token = CancellationToken::new();
        token.cancel();
        let ctx = run_ctx(2024, 2, 15).with_cancellation(token);

        assert_eq!(
            engine.process_due_payments(&ctx, ctx.today()),
            Err(BankError::Cancelled)
        );
        assert_eq!(balance(&ledger, account.id), Money::from_major(10_000));
        assert_eq!(CreditLedger::due_installments(ledger.as_ref(), ctx.today()).unwrap().len(), 1);
    }

    struct CancelsOnDebit {
        inner: Arc<InMemoryLedger>,
        token: CancellationToken,
    }

    impl AccountLedger for CancelsOnDebit {
        fn create(&self, account: &Account) -> Result<Account> {
            AccountLedger::create(self.inner.as_ref(), account)
        }

        fn list_by_user(&self, user_id: UserId) -> Result<Vec<Account>> {
            AccountLedger::list_by_user(self.inner.as_ref(), user_id)
        }

        fn get(&self, id: AccountId) -> Result<Account> {
            AccountLedger::get(self.inner.as_ref(), id)
        }

        fn update(&self, account: &Account) -> Result<()> {
            AccountLedger::update(self.inner.as_ref(), account)?;
            self.token.cancel();
            Ok(())
        }
    }

    #[test]
    fn test_cancellation_mid_run_returns_partial_report() {
        let ledger = Arc::new(InMemoryLedger::new());
        let setup = engine_with(&ledger, CreditPolicy::default());
        let (first, _) = originate(&setup, &ledger, 1);
        let (second, _) = originate(&setup, &ledger, 2);

        let token = CancellationToken::new();
        let accounts = Arc::new(CancelsOnDebit {
            inner: ledger.clone(),
            token: token.clone(),
        });
        let engine = CreditEngine::new(accounts, ledger.clone(), CreditPolicy::default());
        let ctx = run_ctx(2024, 2, 15).with_cancellation(token);

        let report = engine.process_due_payments(&ctx, ctx.today()).unwrap();

        assert!(report.cancelled);
        assert_eq!((report.paid, report.late, report.errored), (1, 0, 0));
        assert_eq!(report.collected, Money::from_decimal(dec!(1725.48)));
        assert_eq!(
            balance(&ledger, first.id) + balance(&ledger, second.id),
            Money::from_major(20_000) - report.collected
        );
        assert_eq!(CreditLedger::due_installments(ledger.as_ref(), ctx.today()).unwrap().len(), 1);
    }

    /// credit originated on a real ledger, its first installment and the funded account
    fn funded_credit() -> (Arc<InMemoryLedger>, Account, Credit, Vec<Installment>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = engine_with(&ledger, CreditPolicy::default());
        let (account, credit) = originate(&engine, &ledger, 1);
        let schedule = engine.schedule(credit.id).unwrap();
        (ledger, account, credit, schedule)
    }

    #[test]
    fn test_failed_installment_update_refunds_debit() {
        let (ledger, account, credit, schedule) = funded_credit();
        let first = schedule[0].clone();

        let mut credits = MockCreditLedger::new();
        credits
            .expect_due_installments()
            .returning(move |_| Ok(vec![first.clone()]));
        let stored = credit.clone();
        credits.expect_get().returning(move |_| Ok(stored.clone()));
        credits
            .expect_update_installment()
            .times(1)
            .returning(|_| Err(BankError::persistence("deadlock detected")));
        credits.expect_schedule_for().times(0);
        credits.expect_update().times(0);

        let engine = CreditEngine::new(ledger.clone(), Arc::new(credits), CreditPolicy::default());
        let ctx = run_ctx(2024, 2, 15);
        let report = engine.process_due_payments(&ctx, ctx.today()).unwrap();

        assert_eq!((report.paid, report.errored), (0, 1));
        assert_eq!(report.collected, Money::ZERO);
        assert_eq!(report.errors[0].installment_id, schedule[0].id);
        assert!(report.errors[0].message.contains("deadlock detected"));
        assert_eq!(balance(&ledger, account.id), Money::from_major(10_000));
        assert!(engine.take_events().is_empty());
    }

    #[test]
    fn test_status_refresh_failure_is_counted() {
        let (ledger, _, credit, schedule) = funded_credit();
        let first = schedule[0].clone();
        let all_paid: Vec<Installment> = schedule
            .iter()
            .cloned()
            .map(|mut row| {
                row.status = InstallmentStatus::Paid;
                row
            })
            .collect();

        let mut credits = MockCreditLedger::new();
        credits
            .expect_due_installments()
            .returning(move |_| Ok(vec![first.clone()]));
        let stored = credit.clone();
        credits.expect_get().returning(move |_| Ok(stored.clone()));
        credits.expect_update_installment().returning(|_| Ok(()));
        credits
            .expect_schedule_for()
            .returning(move |_| Ok(all_paid.clone()));
        credits
            .expect_update()
            .times(1)
            .returning(|_| Err(BankError::persistence("replica read-only")));

        let engine = CreditEngine::new(ledger, Arc::new(credits), CreditPolicy::default());
        let ctx = run_ctx(2024, 2, 15);
        let report = engine.process_due_payments(&ctx, ctx.today()).unwrap();

        assert_eq!((report.paid, report.errored, report.status_failures), (1, 0, 1));
        assert_eq!(report.errors.len(), report.errored + report.status_failures);
        assert_eq!(report.processed(), 1);
        assert!(report.closed_credits.is_empty());
    }
}
