pub mod defaults;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::deal::{DealFinancials, PartialAssumptions, ScenarioAssumptions, ScenarioType};
use crate::error::DealEngineError;
use crate::types::DealWarning;
use crate::DealEngineResult;

pub use defaults::{DefaultsProvider, HeuristicTableProvider};

/// Debt/EBITDA above this draws a HighLeverage warning (non-fatal)
const LEVERAGE_CEILING: Decimal = dec!(6.0);

/// Merge provider defaults with user overrides into a fully-specified
/// assumption set, validating the result.
///
/// Warnings (e.g. high leverage) are returned alongside the assumptions;
/// only structurally impossible inputs fail.
pub fn resolve(
    deal: &DealFinancials,
    overrides: &PartialAssumptions,
    scenario_type: &ScenarioType,
    provider: &dyn DefaultsProvider,
) -> DealEngineResult<(ScenarioAssumptions, Vec<DealWarning>)> {
    let mut a = provider.defaults_for(deal, scenario_type);

    // Field-by-field override application
    if let Some(price) = overrides.purchase_price {
        a.purchase_price = price;
    }
    if let Some(mix) = overrides.mix {
        a.mix = mix;
    }
    if let Some(terms) = overrides.debt_terms {
        a.debt_terms = Some(terms);
    }
    if let Some(terms) = overrides.seller_note_terms {
        a.seller_note_terms = Some(terms);
    }
    if let Some(terms) = overrides.earnout_terms {
        a.earnout_terms = Some(terms);
    }
    if let Some(rate) = overrides.discount_rate {
        a.discount_rate = rate;
    }
    if let Some(growth) = overrides.growth_rate {
        a.growth_rate = growth;
    }
    if let Some(multiple) = overrides.exit_multiple {
        a.exit_multiple = multiple;
    }
    if let Some(years) = overrides.exit_horizon_years {
        a.exit_horizon_years = years;
    }

    // An overridden mix may bring in a leg the defaults didn't carry terms
    // for; fill those from the heuristic table
    let entry_multiple = if deal.ltm_ebitda.is_zero() {
        Decimal::ZERO
    } else {
        a.purchase_price / deal.ltm_ebitda
    };
    if a.mix.debt_pct > Decimal::ZERO && a.debt_terms.is_none() {
        let (_, rate) = HeuristicTableProvider::leverage_terms(entry_multiple);
        a.debt_terms = Some(HeuristicTableProvider::senior_debt_terms(rate));
    }
    if a.mix.seller_note_pct > Decimal::ZERO && a.seller_note_terms.is_none() {
        a.seller_note_terms = Some(HeuristicTableProvider::seller_note_terms());
    }
    if a.mix.earnout_pct > Decimal::ZERO && a.earnout_terms.is_none() {
        let total = a.purchase_price * a.mix.earnout_pct;
        a.earnout_terms = Some(crate::deal::EarnoutTerms {
            metric: crate::deal::EarnoutMetric::Ebitda,
            threshold: deal.ltm_ebitda,
            annual_payment: total / Decimal::from(a.exit_horizon_years.max(1)),
            cap: total,
        });
    }

    validate(&a)?;

    let mut warnings = Vec::new();
    let debt_amount = a.purchase_price * a.mix.debt_pct;
    let leverage = debt_amount / deal.ltm_ebitda;
    if leverage > LEVERAGE_CEILING {
        warnings.push(DealWarning::HighLeverage {
            leverage,
            ceiling: LEVERAGE_CEILING,
        });
    }

    Ok((a, warnings))
}

/// Structural validation: rejects impossible inputs before any cash-flow
/// construction starts.
fn validate(a: &ScenarioAssumptions) -> DealEngineResult<()> {
    if a.purchase_price <= Decimal::ZERO {
        return Err(DealEngineError::InvalidAssumption {
            field: "purchase_price".into(),
            reason: "Purchase price must be positive".into(),
        });
    }
    a.mix.validate()?;
    if a.mix.cash_pct <= Decimal::ZERO {
        return Err(DealEngineError::InvalidAssumption {
            field: "cash_pct".into(),
            reason: "An equity cash component is required; IRR is undefined with zero investment".into(),
        });
    }
    if a.exit_multiple <= Decimal::ZERO {
        return Err(DealEngineError::InvalidAssumption {
            field: "exit_multiple".into(),
            reason: "Exit multiple must be positive".into(),
        });
    }
    if a.exit_horizon_years == 0 {
        return Err(DealEngineError::InvalidAssumption {
            field: "exit_horizon_years".into(),
            reason: "Exit horizon must be at least 1 year".into(),
        });
    }
    if a.discount_rate <= dec!(-1) {
        return Err(DealEngineError::InvalidAssumption {
            field: "discount_rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }
    if a.growth_rate <= dec!(-1) {
        return Err(DealEngineError::InvalidAssumption {
            field: "growth_rate".into(),
            reason: "Growth rate must be greater than -100%".into(),
        });
    }
    if let Some(terms) = &a.debt_terms {
        if terms.annual_rate < Decimal::ZERO || terms.term_months == 0 {
            return Err(DealEngineError::InvalidAssumption {
                field: "debt_terms".into(),
                reason: "Debt terms require a non-negative rate and a positive term".into(),
            });
        }
    }
    if let Some(terms) = &a.seller_note_terms {
        if terms.annual_rate < Decimal::ZERO || terms.term_months == 0 {
            return Err(DealEngineError::InvalidAssumption {
                field: "seller_note_terms".into(),
                reason: "Seller note terms require a non-negative rate and a positive term".into(),
            });
        }
    }
    if let Some(terms) = &a.earnout_terms {
        if terms.annual_payment < Decimal::ZERO || terms.cap < Decimal::ZERO {
            return Err(DealEngineError::InvalidAssumption {
                field: "earnout_terms".into(),
                reason: "Earnout payment and cap must be non-negative".into(),
            });
        }
    }
    Ok(())
}
