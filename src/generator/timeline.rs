use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::deal::{DealFinancials, EarnoutMetric, ScenarioAssumptions};
use crate::error::DealEngineError;
use crate::primitives::amortization::{
    amortization_schedule, annual_debt_service, balance_after, Payment,
};
use crate::types::{DealWarning, Money, Multiple};
use crate::DealEngineResult;

/// One projected holding-period year
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingYear {
    pub year: u32,
    pub revenue: Money,
    pub ebitda: Money,
}

/// Operating projection, independent of any funding structure. Built once
/// and shared across sweep steps that don't touch the growth path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingProjection {
    pub years: Vec<OperatingYear>,
}

/// Project revenue and EBITDA over the holding period. EBITDA margin is
/// held at the entry margin.
pub fn project_operating(
    deal: &DealFinancials,
    growth_rate: Decimal,
    horizon_years: u32,
) -> OperatingProjection {
    let margin = deal.entry_margin();
    let mut revenue = deal.ltm_revenue;
    let mut years = Vec::with_capacity(horizon_years as usize);
    for year in 1..=horizon_years {
        revenue *= Decimal::ONE + growth_rate;
        years.push(OperatingYear {
            year,
            revenue,
            ebitda: revenue * margin,
        });
    }
    OperatingProjection { years }
}

/// Funding-specific cash-flow timeline for one scenario: purchase outlay
/// at t0, debt/seller-note service and earnout payments over the holding
/// period, terminal value at exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTimeline {
    /// Equity invested at t0 (the cash portion of the price)
    pub equity_outlay: Money,
    /// Equity cash-flow series: [-outlay, 0, ..., exit equity]
    pub equity_flows: Vec<Money>,
    pub exit_equity: Money,
    /// Upfront price plus earnout consideration actually paid
    pub total_consideration: Money,
    /// Minimum annual debt-service-coverage ratio; None when unlevered
    pub min_dscr: Option<Multiple>,
    pub warnings: Vec<DealWarning>,
}

fn leg_schedule(
    leg: &str,
    principal: Money,
    terms: Option<&crate::deal::DebtTerms>,
) -> DealEngineResult<Option<Vec<Payment>>> {
    if principal <= Decimal::ZERO {
        return Ok(None);
    }
    let terms = terms.ok_or_else(|| DealEngineError::InvalidAssumption {
        field: leg.into(),
        reason: "Funding mix includes this leg but no terms were provided".into(),
    })?;
    let schedule =
        amortization_schedule(principal, terms.annual_rate, terms.term_months, terms.schedule)?;
    Ok(Some(schedule))
}

/// Build the timeline, constructing the operating projection internally.
pub fn build(
    deal: &DealFinancials,
    assumptions: &ScenarioAssumptions,
) -> DealEngineResult<ScenarioTimeline> {
    let op = project_operating(deal, assumptions.growth_rate, assumptions.exit_horizon_years);
    build_with_operating(assumptions, &op)
}

/// Build the timeline against a precomputed operating projection.
///
/// The projection must cover the assumption's exit horizon; callers reuse
/// it across sweep steps so only the funding legs are recomputed.
pub fn build_with_operating(
    assumptions: &ScenarioAssumptions,
    op: &OperatingProjection,
) -> DealEngineResult<ScenarioTimeline> {
    let horizon = assumptions.exit_horizon_years as usize;
    if op.years.len() < horizon || horizon == 0 {
        return Err(DealEngineError::InsufficientData(format!(
            "Operating projection covers {} years; {} required",
            op.years.len(),
            horizon
        )));
    }

    let price = assumptions.purchase_price;
    let equity_outlay = price * assumptions.mix.cash_pct;
    if equity_outlay <= Decimal::ZERO {
        return Err(DealEngineError::InvalidAssumption {
            field: "cash_pct".into(),
            reason: "Equity outlay must be positive".into(),
        });
    }

    let debt_principal = price * assumptions.mix.debt_pct;
    let seller_principal = price * assumptions.mix.seller_note_pct;
    let earnout_total = price * assumptions.mix.earnout_pct;

    let debt_schedule = leg_schedule("debt_terms", debt_principal, assumptions.debt_terms.as_ref())?;
    let seller_schedule = leg_schedule(
        "seller_note_terms",
        seller_principal,
        assumptions.seller_note_terms.as_ref(),
    )?;

    let debt_annual = debt_schedule.as_deref().map(annual_debt_service);
    let seller_annual = seller_schedule.as_deref().map(annual_debt_service);
    let annual_service = |annual: &Option<Vec<(Money, Money)>>, idx: usize| -> Money {
        annual
            .as_ref()
            .and_then(|a| a.get(idx))
            .map(|(i, p)| i + p)
            .unwrap_or(Decimal::ZERO)
    };

    let mut warnings = Vec::new();
    let mut cash_balance = Decimal::ZERO;
    let mut cumulative_earnout = Decimal::ZERO;
    let mut min_dscr: Option<Multiple> = None;

    for (idx, year) in op.years.iter().take(horizon).enumerate() {
        let service = annual_service(&debt_annual, idx) + annual_service(&seller_annual, idx);

        let earnout_payment = match (&assumptions.earnout_terms, earnout_total > Decimal::ZERO) {
            (Some(terms), true) => {
                let metric_value = match terms.metric {
                    EarnoutMetric::Ebitda => year.ebitda,
                    EarnoutMetric::Revenue => year.revenue,
                };
                if metric_value >= terms.threshold && cumulative_earnout < terms.cap {
                    terms.annual_payment.min(terms.cap - cumulative_earnout)
                } else {
                    Decimal::ZERO
                }
            }
            _ => Decimal::ZERO,
        };
        cumulative_earnout += earnout_payment;

        if service > Decimal::ZERO {
            // Cash available for debt service is projected EBITDA; tax and
            // capex are not modeled at this stage
            let dscr = year.ebitda / service;
            min_dscr = Some(match min_dscr {
                Some(current) => current.min(dscr),
                None => dscr,
            });
        }

        cash_balance += year.ebitda - service - earnout_payment;
        if cash_balance < Decimal::ZERO {
            warnings.push(DealWarning::NegativeCashBalance {
                year: year.year,
                balance: cash_balance,
            });
        }
    }

    let exit_ebitda = op.years[horizon - 1].ebitda;
    let exit_ev = assumptions.exit_multiple * exit_ebitda;
    let exit_months = assumptions.exit_horizon_years * 12;
    let debt_at_exit = debt_schedule
        .as_deref()
        .map(|s| balance_after(s, exit_months))
        .unwrap_or(Decimal::ZERO);
    let seller_at_exit = seller_schedule
        .as_deref()
        .map(|s| balance_after(s, exit_months))
        .unwrap_or(Decimal::ZERO);

    let exit_equity = exit_ev - debt_at_exit - seller_at_exit + cash_balance;

    let mut equity_flows = Vec::with_capacity(horizon + 1);
    equity_flows.push(-equity_outlay);
    for _ in 1..horizon {
        equity_flows.push(Decimal::ZERO);
    }
    equity_flows.push(exit_equity);

    let total_consideration = price - earnout_total + cumulative_earnout;

    Ok(ScenarioTimeline {
        equity_outlay,
        equity_flows,
        exit_equity,
        total_consideration,
        min_dscr,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::{sample_deal, DebtTerms, FundingMix};
    use crate::primitives::amortization::ScheduleType;
    use rust_decimal_macros::dec;

    fn cash_assumptions() -> ScenarioAssumptions {
        ScenarioAssumptions {
            purchase_price: dec!(12_500_000),
            mix: FundingMix::all_cash(),
            debt_terms: None,
            seller_note_terms: None,
            earnout_terms: None,
            discount_rate: dec!(0.12),
            growth_rate: dec!(0.05),
            exit_multiple: dec!(6.0),
            exit_horizon_years: 5,
        }
    }

    #[test]
    fn test_operating_projection_compounds() {
        let deal = sample_deal();
        let op = project_operating(&deal, dec!(0.05), 5);
        assert_eq!(op.years.len(), 5);
        assert_eq!(op.years[0].revenue, dec!(10_500_000));
        // Margin held at entry level (25%)
        assert_eq!(op.years[0].ebitda, dec!(2_625_000));
        assert!(op.years[4].revenue > op.years[3].revenue);
    }

    #[test]
    fn test_cash_scenario_timeline_shape() {
        let deal = sample_deal();
        let tl = build(&deal, &cash_assumptions()).unwrap();
        assert_eq!(tl.equity_flows.len(), 6);
        assert_eq!(tl.equity_flows[0], dec!(-12_500_000));
        for flow in &tl.equity_flows[1..5] {
            assert_eq!(*flow, Decimal::ZERO);
        }
        assert!(tl.exit_equity > Decimal::ZERO);
        // Unlevered: no DSCR
        assert!(tl.min_dscr.is_none());
        assert_eq!(tl.total_consideration, dec!(12_500_000));
    }

    #[test]
    fn test_debt_scenario_dscr_and_paydown() {
        let deal = sample_deal();
        let mut a = cash_assumptions();
        a.mix = FundingMix {
            cash_pct: dec!(0.40),
            debt_pct: dec!(0.60),
            seller_note_pct: Decimal::ZERO,
            earnout_pct: Decimal::ZERO,
        };
        a.debt_terms = Some(DebtTerms {
            annual_rate: dec!(0.08),
            term_months: 60,
            schedule: ScheduleType::LevelPayment,
        });
        let tl = build(&deal, &a).unwrap();

        // 7.5M at 8% over 5 years level-payment: annual service ~1.82M on
        // first-year EBITDA of 2.625M → DSCR comfortably above 1
        let dscr = tl.min_dscr.unwrap();
        assert!(dscr > Decimal::ONE, "min DSCR {dscr}");

        // Debt fully amortized by exit, so exit equity reflects no residual
        // balance and a smaller outlay than the cash case
        assert_eq!(tl.equity_outlay, dec!(5_000_000));
    }

    #[test]
    fn test_debt_leg_requires_terms() {
        let deal = sample_deal();
        let mut a = cash_assumptions();
        a.mix = FundingMix {
            cash_pct: dec!(0.40),
            debt_pct: dec!(0.60),
            seller_note_pct: Decimal::ZERO,
            earnout_pct: Decimal::ZERO,
        };
        assert!(matches!(
            build(&deal, &a),
            Err(DealEngineError::InvalidAssumption { .. })
        ));
    }

    #[test]
    fn test_earnout_pays_when_threshold_met() {
        let deal = sample_deal();
        let mut a = cash_assumptions();
        a.mix = FundingMix {
            cash_pct: dec!(0.70),
            debt_pct: Decimal::ZERO,
            seller_note_pct: Decimal::ZERO,
            earnout_pct: dec!(0.30),
        };
        let earnout_total = dec!(3_750_000); // 30% of 12.5M
        a.earnout_terms = Some(crate::deal::EarnoutTerms {
            metric: EarnoutMetric::Ebitda,
            threshold: dec!(2_500_000),
            annual_payment: dec!(750_000),
            cap: earnout_total,
        });
        let tl = build(&deal, &a).unwrap();
        // Growing EBITDA clears the entry-level threshold every year, so
        // the full cap pays out over 5 years
        assert_eq!(tl.total_consideration, dec!(12_500_000));
        assert_eq!(tl.equity_outlay, dec!(8_750_000));
    }

    #[test]
    fn test_earnout_skips_when_threshold_missed() {
        let deal = sample_deal();
        let mut a = cash_assumptions();
        a.growth_rate = dec!(-0.10); // shrinking business
        a.mix = FundingMix {
            cash_pct: dec!(0.70),
            debt_pct: Decimal::ZERO,
            seller_note_pct: Decimal::ZERO,
            earnout_pct: dec!(0.30),
        };
        a.earnout_terms = Some(crate::deal::EarnoutTerms {
            metric: EarnoutMetric::Ebitda,
            threshold: dec!(2_500_000),
            annual_payment: dec!(750_000),
            cap: dec!(3_750_000),
        });
        let tl = build(&deal, &a).unwrap();
        // EBITDA never reaches the threshold; nothing pays out
        assert_eq!(tl.total_consideration, dec!(8_750_000));
    }

    #[test]
    fn test_cached_projection_matches_internal_build() {
        let deal = sample_deal();
        let a = cash_assumptions();
        let op = project_operating(&deal, a.growth_rate, a.exit_horizon_years);
        let from_cache = build_with_operating(&a, &op).unwrap();
        let direct = build(&deal, &a).unwrap();
        assert_eq!(from_cache.equity_flows, direct.equity_flows);
        assert_eq!(from_cache.exit_equity, direct.exit_equity);
    }

    #[test]
    fn test_projection_too_short_rejected() {
        let deal = sample_deal();
        let a = cash_assumptions();
        let op = project_operating(&deal, a.growth_rate, 3);
        assert!(build_with_operating(&a, &op).is_err());
    }
}
