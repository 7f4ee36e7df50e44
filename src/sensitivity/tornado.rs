use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::deal::{DealFinancials, Scenario};
use crate::error::DealEngineError;
use crate::types::*;
use crate::DealEngineResult;

use super::{evaluate_point, AssumptionField, CancelToken};

/// One bar of a tornado diagram: the IRR reached at the low and high
/// perturbation of a single field, everything else held at base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TornadoBar {
    pub field: AssumptionField,
    pub base_value: Decimal,
    pub low_irr: Option<Decimal>,
    pub high_irr: Option<Decimal>,
    /// Largest absolute IRR deviation from the base across both legs
    pub impact: Decimal,
}

struct FieldOutcome {
    bar: TornadoBar,
    warnings: Vec<DealWarning>,
}

/// Rank assumption fields by their one-at-a-time influence on IRR.
///
/// Each field is perturbed to `(1 - delta_pct)` and `(1 + delta_pct)` of
/// its base value; fields the scenario's structure doesn't carry are
/// skipped. Fields run in parallel, and the token is checked before each
/// field starts: on cancellation the whole run returns `Cancelled` and no
/// partial ranking escapes.
pub fn tornado(
    deal: &DealFinancials,
    scenario: &Scenario,
    delta_pct: Decimal,
    cancel: &CancelToken,
) -> DealEngineResult<ComputationOutput<Vec<TornadoBar>>> {
    let start = Instant::now();

    let outputs = scenario.computed_outputs()?;
    if delta_pct <= Decimal::ZERO || delta_pct >= Decimal::ONE {
        return Err(DealEngineError::InvalidAssumption {
            field: "delta_pct".into(),
            reason: "Perturbation must be in (0, 1)".into(),
        });
    }

    let base = &scenario.assumptions;
    let base_irr = outputs.irr;

    let outcomes: Vec<DealEngineResult<Option<FieldOutcome>>> = AssumptionField::ALL
        .par_iter()
        .map(|&field| {
            if cancel.is_cancelled() {
                return Err(DealEngineError::Cancelled("tornado".into()));
            }
            let Some(base_value) = field.current(base) else {
                return Ok(None);
            };
            let mut warnings = Vec::new();
            let mut leg = |value: Decimal| -> Option<Decimal> {
                match field
                    .apply(base, value)
                    .and_then(|perturbed| evaluate_point(deal, &perturbed, None))
                {
                    Ok((irr, _)) => Some(irr),
                    Err(e) => {
                        warnings.push(DealWarning::StepFailed {
                            input: value,
                            reason: e.to_string(),
                        });
                        None
                    }
                }
            };
            let low_irr = leg(base_value * (Decimal::ONE - delta_pct));
            let high_irr = leg(base_value * (Decimal::ONE + delta_pct));

            let impact = [low_irr, high_irr]
                .iter()
                .flatten()
                .map(|irr| (*irr - base_irr).abs())
                .max()
                .unwrap_or(Decimal::ZERO);

            Ok(Some(FieldOutcome {
                bar: TornadoBar {
                    field,
                    base_value,
                    low_irr,
                    high_irr,
                    impact,
                },
                warnings,
            }))
        })
        .collect();

    let mut bars = Vec::new();
    let mut warnings = Vec::new();
    for outcome in outcomes {
        if let Some(FieldOutcome { bar, warnings: w }) = outcome? {
            bars.push(bar);
            warnings.extend(w);
        }
    }

    // Impact descending; equal impacts keep field declaration order
    bars.sort_by(|a, b| {
        b.impact
            .cmp(&a.impact)
            .then(a.field.ordinal().cmp(&b.field.ordinal()))
    });

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Tornado Sensitivity Ranking",
        &serde_json::json!({
            "scenario_type": scenario.scenario_type.name(),
            "delta_pct": delta_pct.to_string(),
            "base_irr": base_irr.to_string(),
        }),
        warnings,
        elapsed,
        bars,
    ))
}
