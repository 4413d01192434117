use thiserror::Error;

use crate::decimal::Money;
use crate::types::{AccountId, CreditId, InstallmentId, TransferId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BankError {
    #[error("invalid input: {message}")]
    InvalidInput {
        message: String,
    },

    #[error("account not found: {id}")]
    AccountNotFound {
        id: AccountId,
    },

    #[error("credit not found: {id}")]
    CreditNotFound {
        id: CreditId,
    },

    #[error("installment not found: {id}")]
    InstallmentNotFound {
        id: InstallmentId,
    },

    #[error("transfer not found: {id}")]
    TransferNotFound {
        id: TransferId,
    },

    #[error("credit load limit exceeded: active {active}, requested {requested}, cap {cap}")]
    ExposureLimitExceeded {
        active: Money,
        requested: Money,
        cap: Money,
    },

    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Money,
        requested: Money,
    },

    #[error("persistence failed: {message}")]
    PersistenceFailed {
        message: String,
    },

    #[error("disbursement failed for credit {credit_id}, origination rolled back: {message}")]
    DisbursementFailed {
        credit_id: CreditId,
        message: String,
    },

    #[error("compensation failed for credit {credit_id}: {message}")]
    CompensationFailed {
        credit_id: CreditId,
        message: String,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl BankError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceFailed {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BankError>;
