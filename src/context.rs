use chrono::{DateTime, NaiveDate, Utc};
use hourglass_rs::SafeTimeProvider;
use tokio_util::sync::CancellationToken;

use crate::errors::{BankError, Result};

/// per-call context handed in by the request layer
///
/// carries the operation timestamp and a cancellation token instead of
/// reading either from process-wide state.
#[derive(Debug, Clone)]
pub struct Context {
    now: DateTime<Utc>,
    cancel: CancellationToken,
}

impl Context {
    /// capture the current time from the provider
    pub fn new(time_provider: &SafeTimeProvider) -> Self {
        Self::at(time_provider.now())
    }

    /// context pinned to an explicit instant
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            cancel: CancellationToken::new(),
        }
    }

    /// share an existing cancellation token, e.g. the request's
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// fail with `Cancelled` once the caller gave up
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BankError::Cancelled);
        }
        Ok(())
    }
}
