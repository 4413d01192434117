use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{BankError, Result};
use crate::types::{Credit, Installment, InstallmentStatus};

use super::amortization::monthly_interest;

/// repayment schedule for a freshly originated credit
///
/// one pending installment per month of the term, due on the origination
/// day-of-month (clamped to shorter months). every installment carries the
/// monthly payment; the last one absorbs whatever residue keeps the total at
/// exactly `monthly_payment * term`.
pub fn generate_schedule(credit: &Credit) -> Result<Vec<Installment>> {
    if credit.term == 0 {
        return Err(BankError::invalid_input("credit term must be positive"));
    }
    if !credit.monthly_payment.is_positive() {
        return Err(BankError::invalid_input(format!(
            "monthly payment must be positive, got {}",
            credit.monthly_payment
        )));
    }

    let origination = credit.created_at.date_naive();
    let payment = credit.monthly_payment;
    let total = payment * Decimal::from(credit.term);

    let mut installments = Vec::with_capacity(credit.term as usize);
    let mut scheduled = Money::ZERO;
    let mut balance = credit.amount;

    for number in 1..=credit.term {
        let is_last = number == credit.term;
        let amount = if is_last { total - scheduled } else { payment };

        let (principal_portion, interest_portion) = if is_last {
            let principal = balance.min(amount).max(Money::ZERO);
            (principal, amount - principal)
        } else {
            let interest = monthly_interest(balance, credit.annual_rate).min(amount);
            (amount - interest, interest)
        };

        installments.push(Installment {
            id: Uuid::new_v4(),
            credit_id: credit.id,
            number,
            due_date: due_date(origination, number)?,
            amount,
            principal_portion,
            interest_portion,
            status: InstallmentStatus::Pending,
            paid_at: None,
        });

        scheduled += amount;
        balance = (balance - principal_portion).max(Money::ZERO);
    }

    Ok(installments)
}

/// `months` after `origination`, same day-of-month or the month's last day
pub fn due_date(origination: NaiveDate, months: u32) -> Result<NaiveDate> {
    origination
        .checked_add_months(Months::new(months))
        .ok_or_else(|| {
            BankError::invalid_input(format!(
                "due date {months} months after {origination} is out of range"
            ))
        })
}
