pub mod timeline;

use rayon::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::deal::{
    DealFinancials, PartialAssumptions, Scenario, ScenarioOutputs, ScenarioSet, ScenarioStatus,
    ScenarioType,
};
use crate::error::DealEngineError;
use crate::primitives::time_value;
use crate::resolver::{self, DefaultsProvider};
use crate::scoring;
use crate::types::*;
use crate::DealEngineResult;

const IRR_GUESS: Decimal = dec!(0.10);

/// One requested scenario: a type plus its user overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioRequest {
    pub scenario_type: ScenarioType,
    pub overrides: PartialAssumptions,
}

impl ScenarioRequest {
    pub fn new(scenario_type: ScenarioType) -> Self {
        ScenarioRequest {
            scenario_type,
            overrides: PartialAssumptions::default(),
        }
    }

    /// The five standard scenario types with no overrides.
    pub fn standard() -> Vec<ScenarioRequest> {
        ScenarioType::standard()
            .into_iter()
            .map(ScenarioRequest::new)
            .collect()
    }
}

/// Generate the requested scenario set from one deal snapshot.
///
/// Scenario types are independent and computed in parallel; results come
/// back in request order, so identical inputs produce identical output.
/// A failing scenario is reported as `Failed` within the set and never
/// aborts its siblings.
pub fn generate(
    deal: &DealFinancials,
    requests: &[ScenarioRequest],
    provider: &dyn DefaultsProvider,
) -> DealEngineResult<ComputationOutput<ScenarioSet>> {
    let start = Instant::now();

    if requests.is_empty() {
        return Err(DealEngineError::InsufficientData(
            "At least one scenario type is required".into(),
        ));
    }

    let scenarios: Vec<Scenario> = requests
        .par_iter()
        .map(|req| compute_scenario(deal, req, provider))
        .collect();

    let mut warnings: Vec<DealWarning> = Vec::new();
    for s in &scenarios {
        if let ScenarioStatus::Failed { reason } = &s.status {
            warnings.push(DealWarning::ScenarioFailed {
                scenario: s.scenario_type.name().to_string(),
                reason: reason.clone(),
            });
        }
    }

    let set = ScenarioSet {
        deal: deal.clone(),
        scenarios,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Deal Offer Scenario Generation",
        &serde_json::json!({
            "company": deal.company,
            "as_of": deal.as_of,
            "ltm_ebitda": deal.ltm_ebitda.to_string(),
            "num_scenarios": requests.len(),
        }),
        warnings,
        elapsed,
        set,
    ))
}

/// Compute a single scenario end to end: resolve assumptions, build the
/// cash-flow timeline, solve returns. Errors become a terminal `Failed`
/// status rather than propagating.
pub fn compute_scenario(
    deal: &DealFinancials,
    request: &ScenarioRequest,
    provider: &dyn DefaultsProvider,
) -> Scenario {
    let (assumptions, mut warnings) = match resolver::resolve(
        deal,
        &request.overrides,
        &request.scenario_type,
        provider,
    ) {
        Ok(resolved) => resolved,
        Err(e) => {
            // Record the provider defaults so the failed scenario still
            // carries an inspectable assumption set
            return Scenario {
                assumptions: provider.defaults_for(deal, &request.scenario_type),
                scenario_type: request.scenario_type.clone(),
                status: ScenarioStatus::Failed {
                    reason: e.to_string(),
                },
                outputs: None,
                acceptance: None,
                warnings: Vec::new(),
            };
        }
    };

    let mut scenario = Scenario {
        scenario_type: request.scenario_type.clone(),
        assumptions,
        status: ScenarioStatus::Computing,
        outputs: None,
        acceptance: None,
        warnings: Vec::new(),
    };

    match compute_outputs(deal, &scenario.assumptions, &mut warnings) {
        Ok(outputs) => {
            scenario.outputs = Some(outputs);
            scenario.status = ScenarioStatus::Computed;
        }
        Err(e) => {
            scenario.status = ScenarioStatus::Failed {
                reason: e.to_string(),
            };
        }
    }
    scenario.warnings = warnings;
    scenario
}

fn compute_outputs(
    deal: &DealFinancials,
    assumptions: &crate::deal::ScenarioAssumptions,
    warnings: &mut Vec<DealWarning>,
) -> DealEngineResult<ScenarioOutputs> {
    let tl = timeline::build(deal, assumptions)?;
    warnings.extend(tl.warnings.iter().cloned());

    let irr = time_value::irr(&tl.equity_flows, IRR_GUESS)?;
    let npv_at_discount = time_value::npv(assumptions.discount_rate, &tl.equity_flows)?;

    if tl.equity_outlay.is_zero() {
        return Err(DealEngineError::DivisionByZero {
            context: "MOIC equity outlay".into(),
        });
    }
    let moic = tl.exit_equity / tl.equity_outlay;
    let risk_tier = scoring::risk_tier(deal, assumptions, tl.min_dscr);

    Ok(ScenarioOutputs {
        irr,
        moic,
        npv_at_discount,
        total_consideration: tl.total_consideration,
        min_dscr: tl.min_dscr,
        risk_tier,
    })
}
