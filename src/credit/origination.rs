use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::CreditPolicy;
use crate::context::Context;
use crate::decimal::Money;
use crate::errors::{BankError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::{AccountLedger, CreditLedger, KeyedLocks};
use crate::types::{Account, AccountId, Credit, CreditId, CreditStatus, Installment, UserId};

use super::amortization::{monthly_payment, MAX_TERM_MONTHS};
use super::exposure::check_exposure;
use super::schedule::generate_schedule;

/// credit origination and servicing over injected ledgers
///
/// originations for one user are serialized by a per-user lock held across
/// the exposure check and the disbursement. balance writes take the
/// per-account lock, always after the user lock.
pub struct CreditEngine {
    pub(crate) accounts: Arc<dyn AccountLedger>,
    pub(crate) credits: Arc<dyn CreditLedger>,
    pub(crate) policy: CreditPolicy,
    user_locks: KeyedLocks<UserId>,
    pub(crate) account_locks: Arc<KeyedLocks<AccountId>>,
    pub(crate) events: Mutex<EventStore>,
}

impl CreditEngine {
    pub fn new(
        accounts: Arc<dyn AccountLedger>,
        credits: Arc<dyn CreditLedger>,
        policy: CreditPolicy,
    ) -> Self {
        Self {
            accounts,
            credits,
            policy,
            user_locks: KeyedLocks::new(),
            account_locks: Arc::new(KeyedLocks::new()),
            events: Mutex::new(EventStore::new()),
        }
    }

    /// share account locks with the account and transfer services
    pub fn with_account_locks(mut self, locks: Arc<KeyedLocks<AccountId>>) -> Self {
        self.account_locks = locks;
        self
    }

    pub fn account_locks(&self) -> Arc<KeyedLocks<AccountId>> {
        Arc::clone(&self.account_locks)
    }

    pub fn policy(&self) -> &CreditPolicy {
        &self.policy
    }

    /// approve, persist and disburse a new credit
    pub fn originate(
        &self,
        ctx: &Context,
        user_id: UserId,
        account_id: AccountId,
        principal: Money,
        term_months: u32,
    ) -> Result<Credit> {
        validate_request(principal, term_months)?;

        let _user_guard = self.user_locks.lock(&user_id);

        // ownership mismatch looks exactly like a missing account
        let account = self.accounts.get(account_id)?;
        if account.user_id != user_id {
            warn!(user_id, %account_id, "origination against another user's account");
            return Err(BankError::AccountNotFound { id: account_id });
        }

        let existing = self.credits.list_by_user(user_id)?;
        let active = check_exposure(&existing, principal, self.policy.exposure_cap)
            .inspect_err(|err| {
                warn!(user_id, requested = %principal, error = %err, "origination rejected");
            })?;

        let annual_rate = self.policy.annual_rate();
        let payment = monthly_payment(principal, term_months, annual_rate)?;

        let now = ctx.now();
        let credit = Credit {
            id: Uuid::new_v4(),
            user_id,
            account_id,
            amount: principal,
            term: term_months,
            monthly_payment: payment,
            annual_rate,
            status: CreditStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let schedule = generate_schedule(&credit)?;

        ctx.ensure_active()?;
        let credit = self.credits.create(&credit)?;

        if let Err(err) = ctx
            .ensure_active()
            .and_then(|_| self.credits.create_schedule(&schedule))
        {
            self.roll_back(ctx, &credit, &err)?;
            return Err(err);
        }

        self.events.lock().emit(Event::CreditOriginated {
            credit_id: credit.id,
            user_id,
            account_id,
            amount: principal,
            term: term_months,
            monthly_payment: payment,
            timestamp: now,
        });

        let account = match self.disburse(ctx, &credit) {
            Ok(account) => account,
            Err(err) => {
                self.roll_back(ctx, &credit, &err)?;
                return Err(match err {
                    BankError::Cancelled => BankError::Cancelled,
                    other => BankError::DisbursementFailed {
                        credit_id: credit.id,
                        message: other.to_string(),
                    },
                });
            }
        };

        info!(
            credit_id = %credit.id,
            user_id,
            %account_id,
            amount = %principal,
            term = term_months,
            monthly_payment = %payment,
            exposure_before = %active,
            "credit originated"
        );

        Ok(credit)
    }

    /// credit funds to the borrower's account under its lock
    fn disburse(&self, ctx: &Context, credit: &Credit) -> Result<Account> {
        let _guard = self.account_locks.lock(&credit.account_id);

        ctx.ensure_active()?;
        let mut account = self.accounts.get(credit.account_id)?;
        account.balance += credit.amount;
        account.updated_at = ctx.now();
        self.accounts.update(&account)?;

        self.events.lock().emit(Event::FundsDisbursed {
            credit_id: credit.id,
            account_id: account.id,
            amount: credit.amount,
            new_balance: account.balance,
            timestamp: ctx.now(),
        });

        Ok(account)
    }

    /// delete a credit persisted by a failed origination
    fn roll_back(&self, ctx: &Context, credit: &Credit, cause: &BankError) -> Result<()> {
        if let Err(rollback) = self.credits.delete(credit.id) {
            error!(
                credit_id = %credit.id,
                cause = %cause,
                error = %rollback,
                "origination rollback failed, credit left without disbursement"
            );
            return Err(BankError::CompensationFailed {
                credit_id: credit.id,
                message: format!("{cause}; rollback: {rollback}"),
            });
        }

        warn!(credit_id = %credit.id, cause = %cause, "origination rolled back");
        self.events.lock().emit(Event::OriginationReversed {
            credit_id: credit.id,
            reason: cause.to_string(),
            timestamp: ctx.now(),
        });
        Ok(())
    }

    pub fn credit(&self, id: CreditId) -> Result<Credit> {
        self.credits.get(id)
    }

    /// every credit of a user, oldest first
    pub fn credits_for_user(&self, user_id: UserId) -> Result<Vec<Credit>> {
        self.credits.list_by_user(user_id)
    }

    pub fn schedule(&self, credit_id: CreditId) -> Result<Vec<Installment>> {
        self.credits.schedule_for(credit_id)
    }

    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().take_events()
    }
}

fn validate_request(principal: Money, term_months: u32) -> Result<()> {
    if term_months == 0 || term_months > MAX_TERM_MONTHS {
        return Err(BankError::invalid_input(format!(
            "term must be between 1 and {MAX_TERM_MONTHS} months, got {term_months}"
        )));
    }
    if !principal.is_positive() {
        return Err(BankError::invalid_input(format!(
            "credit amount must be positive, got {principal}"
        )));
    }
    if principal.round_cents() != principal {
        return Err(BankError::invalid_input(format!(
            "credit amount has sub-cent precision: {principal}"
        )));
    }
    Ok(())
}
