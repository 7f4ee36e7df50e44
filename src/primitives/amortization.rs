use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::DealEngineError;
use crate::primitives::time_value;
use crate::types::{Money, Rate};
use crate::DealEngineResult;

/// Repayment shape for a debt instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleType {
    /// Equal monthly payments, principal/interest split shifting over time
    LevelPayment,
    /// Interest-only with a balloon principal repayment in the final period
    InterestOnly,
}

/// One period in an amortization schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub period: u32,
    pub payment: Money,
    pub interest: Money,
    pub principal: Money,
    pub remaining_balance: Money,
}

/// Build a monthly amortization schedule.
///
/// `annual_rate` is a decimal rate (0.08 = 8%), divided by 12 for the
/// periodic rate. The final period absorbs any residual balance so the
/// schedule always closes to exactly zero.
pub fn amortization_schedule(
    principal: Money,
    annual_rate: Rate,
    term_months: u32,
    schedule_type: ScheduleType,
) -> DealEngineResult<Vec<Payment>> {
    if term_months == 0 {
        return Err(DealEngineError::InvalidTerm {
            field: "term_months".into(),
            reason: "Term must be at least 1 month".into(),
        });
    }
    if annual_rate < Decimal::ZERO {
        return Err(DealEngineError::InvalidTerm {
            field: "annual_rate".into(),
            reason: "Rate must be non-negative".into(),
        });
    }
    if principal <= Decimal::ZERO {
        return Err(DealEngineError::InvalidTerm {
            field: "principal".into(),
            reason: "Principal must be positive".into(),
        });
    }

    let monthly_rate = annual_rate / dec!(12);
    let level_payment = match schedule_type {
        ScheduleType::LevelPayment => Some(time_value::pmt(monthly_rate, term_months, principal)?),
        ScheduleType::InterestOnly => None,
    };

    let mut periods = Vec::with_capacity(term_months as usize);
    let mut balance = principal;

    for period in 1..=term_months {
        let interest = balance * monthly_rate;
        let is_final = period == term_months;

        let principal_paid = if is_final {
            balance
        } else {
            match level_payment {
                Some(payment) => (payment - interest).min(balance),
                None => Decimal::ZERO,
            }
        };

        balance -= principal_paid;
        periods.push(Payment {
            period,
            payment: interest + principal_paid,
            interest,
            principal: principal_paid,
            remaining_balance: balance,
        });
    }

    Ok(periods)
}

/// Interest and principal due per year, aggregated from a monthly schedule.
/// A trailing partial year is aggregated as its own entry.
pub fn annual_debt_service(schedule: &[Payment]) -> Vec<(Money, Money)> {
    let mut out: Vec<(Money, Money)> = Vec::new();
    for chunk in schedule.chunks(12) {
        let interest: Money = chunk.iter().map(|p| p.interest).sum();
        let principal: Money = chunk.iter().map(|p| p.principal).sum();
        out.push((interest, principal));
    }
    out
}

/// Remaining balance after `months` periods (0 = original principal).
pub fn balance_after(schedule: &[Payment], months: u32) -> Money {
    if months == 0 {
        return schedule
            .first()
            .map(|p| p.remaining_balance + p.principal)
            .unwrap_or(Decimal::ZERO);
    }
    let idx = (months as usize).min(schedule.len());
    schedule[idx - 1].remaining_balance
}
