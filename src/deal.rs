use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DealEngineError;
use crate::primitives::amortization::ScheduleType;
use crate::types::*;
use crate::DealEngineResult;

/// Tolerance for the funding-mix sum invariant
pub const MIX_TOLERANCE: Decimal = dec!(0.000001);

/// Immutable snapshot of the target company's financial profile.
/// Never mutated after creation; a new snapshot triggers a new analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealFinancials {
    pub company: String,
    pub currency: Currency,
    pub as_of: NaiveDate,
    /// Last-twelve-months revenue
    pub ltm_revenue: Money,
    /// Historical annual revenue, oldest first
    pub historical_revenue: Vec<Money>,
    /// Last-twelve-months EBITDA
    pub ltm_ebitda: Money,
    pub total_debt: Money,
    pub cash: Money,
    /// Estimated annual revenue growth (decimal)
    pub growth_estimate: Rate,
    /// Industry EV/EBITDA multiple range (low, high)
    pub multiple_range: (Multiple, Multiple),
}

impl DealFinancials {
    /// Validate and freeze a snapshot.
    pub fn new(
        company: impl Into<String>,
        currency: Currency,
        as_of: NaiveDate,
        ltm_revenue: Money,
        historical_revenue: Vec<Money>,
        ltm_ebitda: Money,
        total_debt: Money,
        cash: Money,
        growth_estimate: Rate,
        multiple_range: (Multiple, Multiple),
    ) -> DealEngineResult<Self> {
        if ltm_revenue <= Decimal::ZERO {
            return Err(DealEngineError::InvalidAssumption {
                field: "ltm_revenue".into(),
                reason: "LTM revenue must be positive".into(),
            });
        }
        if ltm_ebitda <= Decimal::ZERO {
            return Err(DealEngineError::InvalidAssumption {
                field: "ltm_ebitda".into(),
                reason: "LTM EBITDA must be positive; pre-profit targets are not priced off EBITDA multiples".into(),
            });
        }
        if growth_estimate <= dec!(-1) {
            return Err(DealEngineError::InvalidAssumption {
                field: "growth_estimate".into(),
                reason: "Growth must be greater than -100%".into(),
            });
        }
        if multiple_range.0 <= Decimal::ZERO || multiple_range.1 < multiple_range.0 {
            return Err(DealEngineError::InvalidAssumption {
                field: "multiple_range".into(),
                reason: "Multiple range must be positive with low <= high".into(),
            });
        }
        Ok(DealFinancials {
            company: company.into(),
            currency,
            as_of,
            ltm_revenue,
            historical_revenue,
            ltm_ebitda,
            total_debt,
            cash,
            growth_estimate,
            multiple_range,
        })
    }

    /// EBITDA margin implied by the LTM figures
    pub fn entry_margin(&self) -> Rate {
        self.ltm_ebitda / self.ltm_revenue
    }

    /// Midpoint of the industry multiple range
    pub fn mid_multiple(&self) -> Multiple {
        (self.multiple_range.0 + self.multiple_range.1) / dec!(2)
    }
}

/// Funding mix as fractions of the purchase price. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingMix {
    pub cash_pct: Rate,
    pub debt_pct: Rate,
    pub seller_note_pct: Rate,
    pub earnout_pct: Rate,
}

impl FundingMix {
    pub fn all_cash() -> Self {
        FundingMix {
            cash_pct: Decimal::ONE,
            debt_pct: Decimal::ZERO,
            seller_note_pct: Decimal::ZERO,
            earnout_pct: Decimal::ZERO,
        }
    }

    pub fn sum(&self) -> Rate {
        self.cash_pct + self.debt_pct + self.seller_note_pct + self.earnout_pct
    }

    /// Number of funding components actually in use
    pub fn component_count(&self) -> usize {
        [
            self.cash_pct,
            self.debt_pct,
            self.seller_note_pct,
            self.earnout_pct,
        ]
        .iter()
        .filter(|p| **p > Decimal::ZERO)
        .count()
    }

    /// Structural validation: each component in [0, 1], sum = 1 ± 1e-6.
    pub fn validate(&self) -> DealEngineResult<()> {
        for (name, pct) in [
            ("cash_pct", self.cash_pct),
            ("debt_pct", self.debt_pct),
            ("seller_note_pct", self.seller_note_pct),
            ("earnout_pct", self.earnout_pct),
        ] {
            if pct < Decimal::ZERO || pct > Decimal::ONE {
                return Err(DealEngineError::InvalidAssumption {
                    field: name.into(),
                    reason: format!("Mix component must be between 0 and 1, got {pct}"),
                });
            }
        }
        let sum = self.sum();
        if (sum - Decimal::ONE).abs() > MIX_TOLERANCE {
            return Err(DealEngineError::InvalidAssumption {
                field: "funding_mix".into(),
                reason: format!("Mix components must sum to 1.0, got {sum}"),
            });
        }
        Ok(())
    }
}

/// Terms for an amortizing instrument (senior debt or seller note)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DebtTerms {
    pub annual_rate: Rate,
    pub term_months: u32,
    pub schedule: ScheduleType,
}

/// Metric an earnout is conditioned on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EarnoutMetric {
    Ebitda,
    Revenue,
}

/// Deferred, performance-contingent consideration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarnoutTerms {
    pub metric: EarnoutMetric,
    /// Annual level the metric must reach for that year's payment to trigger
    pub threshold: Money,
    /// Payment due in each qualifying year
    pub annual_payment: Money,
    /// Cumulative cap on earnout payments
    pub cap: Money,
}

/// Fully-resolved parameter set for one scenario. Owned by its Scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioAssumptions {
    pub purchase_price: Money,
    pub mix: FundingMix,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_terms: Option<DebtTerms>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_note_terms: Option<DebtTerms>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earnout_terms: Option<EarnoutTerms>,
    pub discount_rate: Rate,
    /// Annual revenue growth assumption over the holding period
    pub growth_rate: Rate,
    /// Exit EV/EBITDA multiple
    pub exit_multiple: Multiple,
    pub exit_horizon_years: u32,
}

/// User-supplied overrides; unset fields fall back to provider defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialAssumptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mix: Option<FundingMix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_terms: Option<DebtTerms>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_note_terms: Option<DebtTerms>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earnout_terms: Option<EarnoutTerms>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_multiple: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_horizon_years: Option<u32>,
}

/// Named funding structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScenarioType {
    #[default]
    Cash,
    Debt,
    SellerFinance,
    Earnout,
    Hybrid,
    Custom(String),
}

impl ScenarioType {
    /// The five standard scenario types, in canonical order.
    pub fn standard() -> Vec<ScenarioType> {
        vec![
            ScenarioType::Cash,
            ScenarioType::Debt,
            ScenarioType::SellerFinance,
            ScenarioType::Earnout,
            ScenarioType::Hybrid,
        ]
    }

    pub fn name(&self) -> &str {
        match self {
            ScenarioType::Cash => "Cash",
            ScenarioType::Debt => "Debt",
            ScenarioType::SellerFinance => "Seller Finance",
            ScenarioType::Earnout => "Earnout",
            ScenarioType::Hybrid => "Hybrid",
            ScenarioType::Custom(name) => name,
        }
    }
}

impl fmt::Display for ScenarioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

/// Computed outputs, derived purely from the scenario's own assumptions
/// plus the deal snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutputs {
    pub irr: Rate,
    pub moic: Multiple,
    /// NPV of the equity cash flows at the scenario's discount rate
    pub npv_at_discount: Money,
    /// Upfront price plus earnout consideration actually paid
    pub total_consideration: Money,
    /// Minimum annual debt-service-coverage ratio; None when unlevered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_dscr: Option<Multiple>,
    pub risk_tier: RiskTier,
}

/// Computation lifecycle: Pending → Computing → Computed | Failed.
/// Terminal states are Computed and Failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum ScenarioStatus {
    Pending,
    Computing,
    Computed,
    Failed { reason: String },
}

impl ScenarioStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScenarioStatus::Computed | ScenarioStatus::Failed { .. }
        )
    }
}

/// One complete funding/structure proposal for acquiring the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_type: ScenarioType,
    pub assumptions: ScenarioAssumptions,
    pub status: ScenarioStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<ScenarioOutputs>,
    /// Filled by the acceptance scorer; None until scored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance: Option<crate::scoring::AcceptanceScore>,
    pub warnings: Vec<DealWarning>,
}

impl Scenario {
    pub fn is_computed(&self) -> bool {
        matches!(self.status, ScenarioStatus::Computed)
    }

    /// The canonical outputs, or an error if the scenario never computed.
    pub fn computed_outputs(&self) -> DealEngineResult<&ScenarioOutputs> {
        self.outputs
            .as_ref()
            .filter(|_| self.is_computed())
            .ok_or_else(|| {
                DealEngineError::InsufficientData(format!(
                    "Scenario '{}' has no computed outputs (status: {:?})",
                    self.scenario_type, self.status
                ))
            })
    }
}

/// Ordered result of one generate() call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub deal: DealFinancials,
    pub scenarios: Vec<Scenario>,
}

impl ScenarioSet {
    pub fn computed(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter().filter(|s| s.is_computed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios
            .iter()
            .filter(|s| matches!(s.status, ScenarioStatus::Failed { .. }))
    }

    /// Scored scenarios ranked by acceptance probability, best first.
    /// Unscored scenarios are excluded.
    pub fn ranked(&self) -> Vec<&Scenario> {
        let mut scored: Vec<(&Scenario, Decimal)> = self
            .scenarios
            .iter()
            .filter_map(|s| s.acceptance.as_ref().map(|a| (s, a.score)))
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.into_iter().map(|(s, _)| s).collect()
    }
}

/// One point on a sensitivity curve. Gaps (failed steps) carry None.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepPoint {
    pub input: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irr: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moic: Option<Multiple>,
}

/// Record of one what-if sweep. Append-only history per scenario; never
/// mutates the parent scenario's canonical outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityRun {
    /// Name of the varied assumption field
    pub field: String,
    pub min: Decimal,
    pub max: Decimal,
    pub steps: u32,
    pub points: Vec<SweepPoint>,
    pub status: ScenarioStatus,
    pub warnings: Vec<DealWarning>,
}

/// Market backdrop used by the acceptance scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketContext {
    /// Multiple at which comparable deals have been clearing
    pub comparable_multiple: Multiple,
    /// Dispersion of comparable multiples (standard deviation, in turns)
    pub multiple_std_dev: Decimal,
}

/// Shared fixture: the £10M revenue / £2.5M EBITDA target used across
/// module tests.
#[cfg(test)]
pub(crate) fn sample_deal() -> DealFinancials {
    DealFinancials::new(
        "Target Ltd",
        Currency::GBP,
        NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
        dec!(10_000_000),
        vec![dec!(8_500_000), dec!(9_200_000), dec!(10_000_000)],
        dec!(2_500_000),
        dec!(1_000_000),
        dec!(500_000),
        dec!(0.05),
        (dec!(4.0), dec!(6.0)),
    )
    .unwrap()
}
