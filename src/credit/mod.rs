//! credit lifecycle: pricing, approval, disbursement, scheduling and collection

pub mod amortization;
pub mod exposure;
pub mod origination;
pub mod processor;
pub mod schedule;

pub use amortization::{monthly_interest, monthly_payment, MAX_TERM_MONTHS};
pub use exposure::{active_exposure, check_exposure};
pub use origination::CreditEngine;
pub use processor::{InstallmentFailure, ProcessingReport};
pub use schedule::generate_schedule;
