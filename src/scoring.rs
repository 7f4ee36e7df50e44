use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::deal::{DealFinancials, MarketContext, RiskTier, Scenario, ScenarioAssumptions};
use crate::error::DealEngineError;
use crate::primitives::sampling::{DistributionSpec, SampleStream};
use crate::types::*;
use crate::DealEngineResult;

// Heuristic weights; see DESIGN.md for the choice rationale. Each factor
// is normalised to [0, 1] before weighting, and the weights sum to 1, so
// the final score needs no clamping.
const W_UPFRONT_CASH: Decimal = dec!(0.40);
const W_PRICE_VS_MARKET: Decimal = dec!(0.30);
const W_SIMPLICITY: Decimal = dec!(0.20);
const W_RISK: Decimal = dec!(0.10);

/// One factor's contribution to an acceptance score, exposed so the
/// result is explainable rather than a bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    pub factor: String,
    pub weight: Rate,
    /// Normalised factor value in [0, 1]
    pub raw: Decimal,
    /// weight x raw
    pub contribution: Decimal,
}

/// Estimated seller acceptance probability, with its ranked breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceScore {
    /// Probability in [0, 1]
    pub score: Decimal,
    /// Contributions sorted largest first
    pub contributions: Vec<FactorContribution>,
}

/// Summary of a sampled acceptance-score distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub samples: usize,
    pub seed: u64,
    pub mean: f64,
    pub std_dev: f64,
    pub p5: f64,
    pub p95: f64,
}

fn clamp01(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO).min(Decimal::ONE)
}

fn risk_factor(tier: RiskTier) -> Decimal {
    match tier {
        RiskTier::Low => Decimal::ONE,
        RiskTier::Medium => dec!(0.6),
        RiskTier::High => dec!(0.2),
    }
}

/// Classify a scenario's risk from leverage, coverage, and structural
/// complexity.
pub fn risk_tier(
    deal: &DealFinancials,
    assumptions: &ScenarioAssumptions,
    min_dscr: Option<Multiple>,
) -> RiskTier {
    let levered_share = assumptions.mix.debt_pct + assumptions.mix.seller_note_pct;
    let leverage = assumptions.purchase_price * levered_share / deal.ltm_ebitda;
    let components = assumptions.mix.component_count();

    if leverage > dec!(5.0) || min_dscr.is_some_and(|d| d < dec!(1.1)) {
        return RiskTier::High;
    }
    if leverage > dec!(3.0) || min_dscr.is_some_and(|d| d < dec!(1.5)) || components >= 3 {
        return RiskTier::Medium;
    }
    RiskTier::Low
}

fn score_factors(
    deal: &DealFinancials,
    scenario: &Scenario,
    comparable_multiple: Multiple,
) -> DealEngineResult<AcceptanceScore> {
    let outputs = scenario.computed_outputs()?;
    let a = &scenario.assumptions;

    if comparable_multiple <= Decimal::ZERO {
        return Err(DealEngineError::InvalidAssumption {
            field: "comparable_multiple".into(),
            reason: "Comparable multiple must be positive".into(),
        });
    }

    // Sellers favor upfront cash
    let upfront = a.mix.cash_pct;

    // Price relative to where comparable deals clear: at the comparable
    // multiple the factor is 0.5; a 50% premium saturates at 1
    let implied_multiple = a.purchase_price / deal.ltm_ebitda;
    let premium = (implied_multiple - comparable_multiple) / comparable_multiple;
    let price = clamp01(dec!(0.5) + premium);

    // More funding components, lower score
    let components = Decimal::from(a.mix.component_count() as u32);
    let simplicity = Decimal::ONE - (components - Decimal::ONE) / dec!(4);

    let risk = risk_factor(outputs.risk_tier);

    let mut contributions = vec![
        FactorContribution {
            factor: "upfront_cash".into(),
            weight: W_UPFRONT_CASH,
            raw: upfront,
            contribution: W_UPFRONT_CASH * upfront,
        },
        FactorContribution {
            factor: "price_vs_market".into(),
            weight: W_PRICE_VS_MARKET,
            raw: price,
            contribution: W_PRICE_VS_MARKET * price,
        },
        FactorContribution {
            factor: "simplicity".into(),
            weight: W_SIMPLICITY,
            raw: simplicity,
            contribution: W_SIMPLICITY * simplicity,
        },
        FactorContribution {
            factor: "risk_tier".into(),
            weight: W_RISK,
            raw: risk,
            contribution: W_RISK * risk,
        },
    ];
    contributions.sort_by(|a, b| b.contribution.cmp(&a.contribution));

    let score: Decimal = contributions.iter().map(|c| c.contribution).sum();
    Ok(AcceptanceScore {
        score: clamp01(score),
        contributions,
    })
}

/// Score one computed scenario against the market backdrop.
pub fn score(
    deal: &DealFinancials,
    scenario: &Scenario,
    market: &MarketContext,
) -> DealEngineResult<ComputationOutput<AcceptanceScore>> {
    let start = Instant::now();
    let result = score_factors(deal, scenario, market.comparable_multiple)?;
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Seller Acceptance Probability (weighted heuristic)",
        &serde_json::json!({
            "scenario_type": scenario.scenario_type.name(),
            "comparable_multiple": market.comparable_multiple.to_string(),
        }),
        Vec::new(),
        elapsed,
        result,
    ))
}

/// Score every computed scenario in a set, in place. Failed scenarios are
/// left unscored.
pub fn score_set(
    deal: &DealFinancials,
    scenarios: &mut [Scenario],
    market: &MarketContext,
) -> DealEngineResult<()> {
    for scenario in scenarios.iter_mut() {
        if scenario.is_computed() {
            let scored = score_factors(deal, scenario, market.comparable_multiple)?;
            scenario.acceptance = Some(scored);
        }
    }
    Ok(())
}

/// Sample the acceptance score under comparable-multiple uncertainty.
///
/// Draws the comparable multiple from a normal distribution around the
/// market context and reports the resulting score distribution. Seeded
/// and reproducible; the deterministic `score` path never touches this.
pub fn score_distribution(
    deal: &DealFinancials,
    scenario: &Scenario,
    market: &MarketContext,
    samples: usize,
    seed: u64,
) -> DealEngineResult<ComputationOutput<ScoreDistribution>> {
    let start = Instant::now();

    if samples < 2 {
        return Err(DealEngineError::InsufficientData(
            "Score distribution requires at least 2 samples".into(),
        ));
    }

    let mean_multiple = market.comparable_multiple.to_f64().ok_or_else(|| {
        DealEngineError::SerializationError("comparable_multiple exceeds f64 range".into())
    })?;
    let std_dev = market.multiple_std_dev.to_f64().unwrap_or(0.0);
    if std_dev <= 0.0 {
        return Err(DealEngineError::InvalidAssumption {
            field: "multiple_std_dev".into(),
            reason: "Sampled scoring requires a positive dispersion".into(),
        });
    }

    let stream = SampleStream::new(
        DistributionSpec::Normal {
            mean: mean_multiple,
            std_dev,
        },
        samples,
        seed,
    );

    let mut scores: Vec<f64> = Vec::with_capacity(samples);
    for drawn in stream {
        let multiple = drawn?.max(0.1);
        let multiple_dec = Decimal::from_f64(multiple).ok_or_else(|| {
            DealEngineError::SerializationError("sampled multiple is not representable".into())
        })?;
        let scored = score_factors(deal, scenario, multiple_dec)?;
        scores.push(scored.score.to_f64().unwrap_or(0.0));
    }

    scores.sort_by(|a, b| a.total_cmp(b));
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let percentile = |p: f64| -> f64 {
        let idx = ((p * (scores.len() - 1) as f64).round() as usize).min(scores.len() - 1);
        scores[idx]
    };

    let result = ScoreDistribution {
        samples,
        seed,
        mean,
        std_dev: variance.sqrt(),
        p5: percentile(0.05),
        p95: percentile(0.95),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Acceptance Score Distribution (Monte Carlo)",
        &serde_json::json!({
            "scenario_type": scenario.scenario_type.name(),
            "samples": samples,
            "seed": seed,
        }),
        Vec::new(),
        elapsed,
        result,
    ))
}
