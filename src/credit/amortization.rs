use rust_decimal::Decimal;

use crate::decimal::{Money, Rate};
use crate::errors::{BankError, Result};

/// longest term accepted, fifty years
pub const MAX_TERM_MONTHS: u32 = 600;

/// fixed monthly installment for an annuity credit, rounded to cents
///
/// `P * r * (1 + r)^n / ((1 + r)^n - 1)` with `r` the monthly rate; a zero
/// rate degenerates to `P / n`.
pub fn monthly_payment(principal: Money, term_months: u32, annual_rate: Rate) -> Result<Money> {
    if term_months == 0 || term_months > MAX_TERM_MONTHS {
        return Err(BankError::invalid_input(format!(
            "term must be between 1 and {MAX_TERM_MONTHS} months, got {term_months}"
        )));
    }
    if !principal.is_positive() {
        return Err(BankError::invalid_input(format!(
            "principal must be positive, got {principal}"
        )));
    }
    if annual_rate.is_negative() {
        return Err(BankError::invalid_input(format!(
            "annual rate must not be negative, got {annual_rate}"
        )));
    }

    let r = annual_rate.monthly_rate();
    if r.is_zero() {
        return Ok((principal / Decimal::from(term_months)).round_cents());
    }

    let compound = compound_factor(r, term_months)?;
    let numerator = principal
        .as_decimal()
        .checked_mul(r)
        .and_then(|x| x.checked_mul(compound))
        .ok_or_else(|| out_of_range(principal, term_months, annual_rate))?;
    let denominator = compound - Decimal::ONE;

    Ok(Money::from_decimal(numerator / denominator).round_cents())
}

/// `(1 + r)^n`, `None` once it leaves the decimal range
fn checked_compound(r: Decimal, n: u32) -> Option<Decimal> {
    let base = Decimal::ONE.checked_add(r)?;
    (0..n).try_fold(Decimal::ONE, |acc, _| acc.checked_mul(base))
}

fn compound_factor(r: Decimal, n: u32) -> Result<Decimal> {
    checked_compound(r, n).ok_or_else(|| {
        BankError::invalid_input(format!("monthly rate {r} compounded over {n} months overflows"))
    })
}

fn out_of_range(principal: Money, term_months: u32, annual_rate: Rate) -> BankError {
    BankError::invalid_input(format!(
        "payment for {principal} over {term_months} months at {annual_rate} is out of range"
    ))
}

/// interest accrued on `balance` over one month, rounded to cents
pub fn monthly_interest(balance: Money, annual_rate: Rate) -> Money {
    (balance * annual_rate.monthly_rate()).round_cents()
}
