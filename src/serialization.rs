//! serialization support for credits and their schedules
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::credit::CreditEngine;
use crate::decimal::{Money, Rate};
use crate::errors::Result;
use crate::types::{
    AccountId, Credit, CreditId, CreditStatus, Installment, InstallmentStatus, UserId,
};

/// serializable view of a credit with its repayment position
#[derive(Debug, Serialize, Deserialize)]
pub struct CreditView {
    pub id: CreditId,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub status: CreditStatus,
    pub originated_at: DateTime<Utc>,
    pub terms: TermsView,
    pub repayment: RepaymentView,
    pub schedule: Vec<Installment>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TermsView {
    pub amount: Money,
    pub term_months: u32,
    pub monthly_payment: Money,
    pub annual_rate: Rate,
    pub total_repayable: Money,
    pub total_interest: Money,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RepaymentView {
    pub paid_installments: u32,
    pub late_installments: u32,
    pub pending_installments: u32,
    pub amount_paid: Money,
    pub outstanding: Money,
    pub next_due_date: Option<NaiveDate>,
    pub next_due_amount: Option<Money>,
}

impl CreditView {
    pub fn from_credit(credit: &Credit, schedule: &[Installment]) -> Self {
        let count = |status: InstallmentStatus| {
            schedule.iter().filter(|i| i.status == status).count() as u32
        };

        let total_repayable = credit.monthly_payment * Decimal::from(credit.term);
        let amount_paid: Money = schedule
            .iter()
            .filter(|i| i.status == InstallmentStatus::Paid)
            .map(|i| i.amount)
            .sum();
        let next_due = schedule
            .iter()
            .filter(|i| i.status != InstallmentStatus::Paid)
            .min_by_key(|i| (i.due_date, i.number));

        CreditView {
            id: credit.id,
            user_id: credit.user_id,
            account_id: credit.account_id,
            status: credit.status,
            originated_at: credit.created_at,
            terms: TermsView {
                amount: credit.amount,
                term_months: credit.term,
                monthly_payment: credit.monthly_payment,
                annual_rate: credit.annual_rate,
                total_repayable,
                total_interest: total_repayable - credit.amount,
            },
            repayment: RepaymentView {
                paid_installments: count(InstallmentStatus::Paid),
                late_installments: count(InstallmentStatus::Late),
                pending_installments: count(InstallmentStatus::Pending),
                amount_paid,
                outstanding: (total_repayable - amount_paid).max(Money::ZERO),
                next_due_date: next_due.map(|i| i.due_date),
                next_due_amount: next_due.map(|i| i.amount),
            },
            schedule: schedule.to_vec(),
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl CreditEngine {
    /// credit and schedule as one serializable view
    pub fn credit_view(&self, id: CreditId) -> Result<CreditView> {
        let credit = self.credit(id)?;
        let schedule = self.schedule(id)?;
        Ok(CreditView::from_credit(&credit, &schedule))
    }
}
