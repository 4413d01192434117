use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{AccountId, CreditId, CreditStatus, InstallmentId, TransferId, UserId};

/// domain events emitted by the engine and services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // origination events
    CreditOriginated {
        credit_id: CreditId,
        user_id: UserId,
        account_id: AccountId,
        amount: Money,
        term: u32,
        monthly_payment: Money,
        timestamp: DateTime<Utc>,
    },
    FundsDisbursed {
        credit_id: CreditId,
        account_id: AccountId,
        amount: Money,
        new_balance: Money,
        timestamp: DateTime<Utc>,
    },
    OriginationReversed {
        credit_id: CreditId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // servicing events
    InstallmentPaid {
        credit_id: CreditId,
        installment_id: InstallmentId,
        amount: Money,
        due_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    InstallmentLate {
        credit_id: CreditId,
        installment_id: InstallmentId,
        amount: Money,
        available: Money,
        due_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    CreditStatusChanged {
        credit_id: CreditId,
        old_status: CreditStatus,
        new_status: CreditStatus,
        timestamp: DateTime<Utc>,
    },

    // account events
    BalanceAdjusted {
        account_id: AccountId,
        delta: Money,
        new_balance: Money,
        timestamp: DateTime<Utc>,
    },
    TransferCompleted {
        transfer_id: TransferId,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Money,
        timestamp: DateTime<Utc>,
    },
    TransferFailed {
        transfer_id: TransferId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
