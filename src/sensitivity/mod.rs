pub mod tornado;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::deal::{
    DealFinancials, Scenario, ScenarioAssumptions, ScenarioStatus, SensitivityRun, SweepPoint,
};
use crate::error::DealEngineError;
use crate::generator::timeline::{self, OperatingProjection};
use crate::primitives::time_value;
use crate::types::*;
use crate::DealEngineResult;

pub use tornado::{tornado, TornadoBar};

/// Interactive budget: a 20-step single-variable sweep must finish inside
/// this window; beyond it the caller gets partial results.
pub const INTERACTIVE_BUDGET: Duration = Duration::from_secs(2);

/// Assumption fields available for what-if perturbation.
///
/// Funding-mix percentages are deliberately absent: perturbing one leg
/// would unbalance the mix invariant. Declaration order is the tornado
/// tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssumptionField {
    PurchasePrice,
    GrowthRate,
    ExitMultiple,
    DiscountRate,
    DebtInterestRate,
    EarnoutCap,
}

impl AssumptionField {
    pub const ALL: [AssumptionField; 6] = [
        AssumptionField::PurchasePrice,
        AssumptionField::GrowthRate,
        AssumptionField::ExitMultiple,
        AssumptionField::DiscountRate,
        AssumptionField::DebtInterestRate,
        AssumptionField::EarnoutCap,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AssumptionField::PurchasePrice => "purchase_price",
            AssumptionField::GrowthRate => "growth_rate",
            AssumptionField::ExitMultiple => "exit_multiple",
            AssumptionField::DiscountRate => "discount_rate",
            AssumptionField::DebtInterestRate => "debt_interest_rate",
            AssumptionField::EarnoutCap => "earnout_cap",
        }
    }

    pub(crate) fn ordinal(&self) -> usize {
        Self::ALL
            .iter()
            .position(|f| f == self)
            .expect("every field appears in ALL")
    }

    /// Current value of this field, or None when the scenario's structure
    /// doesn't carry it (e.g. debt rate on an unlevered deal).
    pub fn current(&self, a: &ScenarioAssumptions) -> Option<Decimal> {
        match self {
            AssumptionField::PurchasePrice => Some(a.purchase_price),
            AssumptionField::GrowthRate => Some(a.growth_rate),
            AssumptionField::ExitMultiple => Some(a.exit_multiple),
            AssumptionField::DiscountRate => Some(a.discount_rate),
            AssumptionField::DebtInterestRate => a.debt_terms.map(|t| t.annual_rate),
            AssumptionField::EarnoutCap => a.earnout_terms.map(|t| t.cap),
        }
    }

    /// A copy of the assumptions with this field set to `value`; every
    /// other field is held fixed.
    pub fn apply(
        &self,
        a: &ScenarioAssumptions,
        value: Decimal,
    ) -> DealEngineResult<ScenarioAssumptions> {
        let mut out = a.clone();
        match self {
            AssumptionField::PurchasePrice => out.purchase_price = value,
            AssumptionField::GrowthRate => out.growth_rate = value,
            AssumptionField::ExitMultiple => out.exit_multiple = value,
            AssumptionField::DiscountRate => out.discount_rate = value,
            AssumptionField::DebtInterestRate => match out.debt_terms.as_mut() {
                Some(terms) => terms.annual_rate = value,
                None => {
                    return Err(DealEngineError::InvalidAssumption {
                        field: self.name().into(),
                        reason: "Scenario has no debt leg".into(),
                    })
                }
            },
            AssumptionField::EarnoutCap => match out.earnout_terms.as_mut() {
                Some(terms) => terms.cap = value,
                None => {
                    return Err(DealEngineError::InvalidAssumption {
                        field: self.name().into(),
                        reason: "Scenario has no earnout leg".into(),
                    })
                }
            },
        }
        Ok(out)
    }

    /// Whether varying this field invalidates the cached operating
    /// projection (as opposed to only the funding legs).
    fn touches_operating(&self) -> bool {
        matches!(self, AssumptionField::GrowthRate)
    }
}

/// Range for a single-variable sweep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SweepRange {
    pub min: Decimal,
    pub max: Decimal,
    pub steps: u32,
}

/// Cooperative cancellation flag, checked between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Evaluate one perturbed assumption set, reusing the cached operating
/// projection when it is still valid.
pub(crate) fn evaluate_point(
    deal: &DealFinancials,
    assumptions: &ScenarioAssumptions,
    cached_op: Option<&OperatingProjection>,
) -> DealEngineResult<(Decimal, Decimal)> {
    let tl = match cached_op {
        Some(op) => timeline::build_with_operating(assumptions, op)?,
        None => timeline::build(deal, assumptions)?,
    };
    let irr = time_value::irr(&tl.equity_flows, dec!(0.10))?;
    let moic = tl.exit_equity / tl.equity_outlay;
    Ok((irr, moic))
}

/// Recompute a computed scenario's outputs with one field swept across a
/// range, holding all other assumptions fixed.
///
/// The parent scenario is never mutated; every call yields a fresh
/// `SensitivityRun`. If the wall clock exceeds `budget` the completed
/// steps are returned with a `PartialResult` warning instead of blocking.
pub fn sweep(
    deal: &DealFinancials,
    scenario: &Scenario,
    field: AssumptionField,
    range: SweepRange,
    budget: Option<Duration>,
) -> DealEngineResult<ComputationOutput<SensitivityRun>> {
    let start = Instant::now();

    if !scenario.is_computed() {
        return Err(DealEngineError::InsufficientData(format!(
            "Sweep requires a computed scenario (status: {:?})",
            scenario.status
        )));
    }
    if range.steps < 2 {
        return Err(DealEngineError::InvalidAssumption {
            field: "steps".into(),
            reason: "A sweep needs at least 2 steps".into(),
        });
    }
    if range.min >= range.max {
        return Err(DealEngineError::InvalidAssumption {
            field: "range".into(),
            reason: "Sweep range requires min < max".into(),
        });
    }

    let base = &scenario.assumptions;
    if field.current(base).is_none() {
        return Err(DealEngineError::InvalidAssumption {
            field: field.name().into(),
            reason: "Field is not present in this scenario's structure".into(),
        });
    }

    // The operating projection only depends on growth and horizon, so it
    // can be shared across all steps of any other field
    let cached_op = if field.touches_operating() {
        None
    } else {
        Some(timeline::project_operating(
            deal,
            base.growth_rate,
            base.exit_horizon_years,
        ))
    };

    let step_count = range.steps as usize;
    let step_size = (range.max - range.min) / Decimal::from(range.steps - 1);
    let mut points: Vec<SweepPoint> = Vec::with_capacity(step_count);
    let mut warnings: Vec<DealWarning> = Vec::new();

    for i in 0..range.steps {
        let input = range.min + step_size * Decimal::from(i);
        let point = match field
            .apply(base, input)
            .and_then(|perturbed| evaluate_point(deal, &perturbed, cached_op.as_ref()))
        {
            Ok((irr, moic)) => SweepPoint {
                input,
                irr: Some(irr),
                moic: Some(moic),
            },
            Err(e) => {
                warnings.push(DealWarning::StepFailed {
                    input,
                    reason: e.to_string(),
                });
                SweepPoint {
                    input,
                    irr: None,
                    moic: None,
                }
            }
        };
        points.push(point);

        if let Some(limit) = budget {
            if start.elapsed() > limit && points.len() < step_count {
                warnings.push(DealWarning::PartialResult {
                    completed: points.len(),
                    requested: step_count,
                });
                break;
            }
        }
    }

    let any_success = points.iter().any(|p| p.irr.is_some());
    let status = if any_success {
        ScenarioStatus::Computed
    } else {
        ScenarioStatus::Failed {
            reason: "No sweep step produced a result".into(),
        }
    };

    let run = SensitivityRun {
        field: field.name().into(),
        min: range.min,
        max: range.max,
        steps: range.steps,
        points,
        status,
        warnings: warnings.clone(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Single-Variable Sensitivity Sweep",
        &serde_json::json!({
            "scenario_type": scenario.scenario_type.name(),
            "field": field.name(),
            "min": range.min.to_string(),
            "max": range.max.to_string(),
            "steps": range.steps,
        }),
        warnings,
        elapsed,
        run,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::{sample_deal, ScenarioType};
    use crate::generator::{compute_scenario, ScenarioRequest};
    use crate::resolver::HeuristicTableProvider;
    use rust_decimal_macros::dec;

    fn cash_scenario() -> (DealFinancials, Scenario) {
        let deal = sample_deal();
        let scenario = compute_scenario(
            &deal,
            &ScenarioRequest::new(ScenarioType::Cash),
            &HeuristicTableProvider,
        );
        (deal, scenario)
    }

    #[test]
    fn test_exit_multiple_sweep_is_monotone() {
        // Exit multiple from 0.8x to 1.5x of entry: the IRR curve must be
        // strictly increasing
        let (deal, scenario) = cash_scenario();
        let result = sweep(
            &deal,
            &scenario,
            AssumptionField::ExitMultiple,
            SweepRange {
                min: dec!(4.0),
                max: dec!(7.5),
                steps: 10,
            },
            Some(INTERACTIVE_BUDGET),
        )
        .unwrap();
        let run = &result.result;
        assert_eq!(run.points.len(), 10);
        for pair in run.points.windows(2) {
            let a = pair[0].irr.unwrap();
            let b = pair[1].irr.unwrap();
            assert!(b > a, "IRR curve should increase: {a} then {b}");
        }
    }

    #[test]
    fn test_sweep_never_mutates_parent() {
        let (deal, scenario) = cash_scenario();
        let before = scenario.clone();
        let _ = sweep(
            &deal,
            &scenario,
            AssumptionField::PurchasePrice,
            SweepRange {
                min: dec!(10_000_000),
                max: dec!(15_000_000),
                steps: 5,
            },
            None,
        )
        .unwrap();
        assert_eq!(scenario.outputs, before.outputs);
        assert_eq!(scenario.assumptions, before.assumptions);
        assert_eq!(scenario.status, before.status);
    }

    #[test]
    fn test_sweep_midpoint_matches_canonical_output() {
        // Sweeping the exit multiple through its current value reproduces
        // the scenario's own IRR at that step
        let (deal, scenario) = cash_scenario();
        let current = scenario.assumptions.exit_multiple;
        let result = sweep(
            &deal,
            &scenario,
            AssumptionField::ExitMultiple,
            SweepRange {
                min: current - dec!(1),
                max: current + dec!(1),
                steps: 3,
            },
            None,
        )
        .unwrap();
        let mid = &result.result.points[1];
        assert_eq!(mid.input, current);
        assert_eq!(mid.irr.unwrap(), scenario.outputs.as_ref().unwrap().irr);
    }

    #[test]
    fn test_sweep_requires_computed_scenario() {
        let (deal, mut scenario) = cash_scenario();
        scenario.status = ScenarioStatus::Pending;
        assert!(sweep(
            &deal,
            &scenario,
            AssumptionField::ExitMultiple,
            SweepRange {
                min: dec!(4),
                max: dec!(6),
                steps: 5
            },
            None,
        )
        .is_err());
    }

    #[test]
    fn test_sweep_missing_leg_rejected() {
        let (deal, scenario) = cash_scenario();
        // Cash scenario has no debt leg to perturb
        assert!(sweep(
            &deal,
            &scenario,
            AssumptionField::DebtInterestRate,
            SweepRange {
                min: dec!(0.05),
                max: dec!(0.10),
                steps: 5
            },
            None,
        )
        .is_err());
    }

    #[test]
    fn test_sweep_invalid_range_rejected() {
        let (deal, scenario) = cash_scenario();
        assert!(sweep(
            &deal,
            &scenario,
            AssumptionField::ExitMultiple,
            SweepRange {
                min: dec!(6),
                max: dec!(4),
                steps: 5
            },
            None,
        )
        .is_err());
        assert!(sweep(
            &deal,
            &scenario,
            AssumptionField::ExitMultiple,
            SweepRange {
                min: dec!(4),
                max: dec!(6),
                steps: 1
            },
            None,
        )
        .is_err());
    }

    #[test]
    fn test_zero_budget_returns_partial() {
        let (deal, scenario) = cash_scenario();
        let result = sweep(
            &deal,
            &scenario,
            AssumptionField::ExitMultiple,
            SweepRange {
                min: dec!(4.0),
                max: dec!(7.5),
                steps: 20,
            },
            Some(Duration::ZERO),
        )
        .unwrap();
        let run = &result.result;
        assert!(run.points.len() < 20);
        assert!(run
            .warnings
            .iter()
            .any(|w| matches!(w, DealWarning::PartialResult { .. })));
        // Whatever completed is still valid
        assert!(matches!(run.status, ScenarioStatus::Computed));
    }

    #[test]
    fn test_failed_steps_recorded_as_gaps() {
        let (deal, scenario) = cash_scenario();
        // A range straddling zero: non-positive prices cannot fund an
        // equity outlay and become gaps, the valid steps still evaluate
        let result = sweep(
            &deal,
            &scenario,
            AssumptionField::PurchasePrice,
            SweepRange {
                min: dec!(-5_000_000),
                max: dec!(15_000_000),
                steps: 5,
            },
            None,
        )
        .unwrap();
        let run = &result.result;
        assert!(run.points.iter().any(|p| p.irr.is_none()));
        assert!(run.points.iter().any(|p| p.irr.is_some()));
        assert!(run
            .warnings
            .iter()
            .any(|w| matches!(w, DealWarning::StepFailed { .. })));
    }
}
