pub mod accounts;
pub mod config;
pub mod context;
pub mod credit;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod serialization;
pub mod telemetry;
pub mod transfers;
pub mod types;

// re-export key types
pub use accounts::AccountService;
pub use config::{ConfigError, CreditPolicy, EngineConfig, TelemetryConfig};
pub use context::Context;
pub use credit::{
    generate_schedule, monthly_payment, CreditEngine, InstallmentFailure, ProcessingReport,
};
pub use decimal::{Money, Rate};
pub use errors::{BankError, Result};
pub use events::{Event, EventStore};
pub use ledger::{
    AccountLedger, CreditLedger, InMemoryLedger, KeyGuard, KeyedLocks, TransferLedger,
};
pub use serialization::CreditView;
pub use transfers::TransferService;
pub use types::{
    Account, AccountId, Credit, CreditId, CreditStatus, Installment, InstallmentId,
    InstallmentStatus, Transfer, TransferId, TransferStatus, UserId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use tokio_util::sync::CancellationToken;
pub use uuid::Uuid;
