use crate::decimal::Money;
use crate::errors::{BankError, Result};
use crate::types::Credit;

/// sum of principal across a user's active credits
pub fn active_exposure(credits: &[Credit]) -> Money {
    credits
        .iter()
        .filter(|c| c.is_active())
        .map(|c| c.amount)
        .sum()
}

/// reject a new credit when active principal plus the request reaches the cap
///
/// the boundary is inclusive: landing exactly on the cap is rejected.
pub fn check_exposure(credits: &[Credit], requested: Money, cap: Money) -> Result<Money> {
    let active = active_exposure(credits);
    if active + requested >= cap {
        return Err(BankError::ExposureLimitExceeded {
            active,
            requested,
            cap,
        });
    }
    Ok(active)
}
