use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Multiples (e.g., 5.0x EV/EBITDA)
pub type Multiple = Decimal;

/// Currency code
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    GBP,
    USD,
    EUR,
    CHF,
    JPY,
    CAD,
    AUD,
    Other(String),
}

impl Currency {
    /// Presentation symbol; falls back to the code itself.
    pub fn symbol(&self) -> &str {
        match self {
            Currency::GBP => "£",
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::CHF => "CHF ",
            Currency::JPY => "¥",
            Currency::CAD => "C$",
            Currency::AUD => "A$",
            Currency::Other(code) => code,
        }
    }
}

/// Non-fatal advisory attached to an otherwise successful result.
/// Warnings are returned alongside output, never raised as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DealWarning {
    /// Debt/EBITDA beyond the policy ceiling
    HighLeverage { leverage: Multiple, ceiling: Multiple },
    /// A sweep or batch stopped early; completed units are still valid
    PartialResult { completed: usize, requested: usize },
    /// Projected cash balance went negative in a holding-period year
    NegativeCashBalance { year: u32, balance: Money },
    /// One scenario in a fan-out failed; siblings are unaffected
    ScenarioFailed { scenario: String, reason: String },
    /// A sweep step could not be evaluated; recorded as a gap in the curve
    StepFailed { input: Decimal, reason: String },
}

impl fmt::Display for DealWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DealWarning::HighLeverage { leverage, ceiling } => {
                write!(f, "Leverage {leverage}x exceeds {ceiling}x policy ceiling")
            }
            DealWarning::PartialResult {
                completed,
                requested,
            } => write!(f, "Partial result: {completed} of {requested} units completed"),
            DealWarning::NegativeCashBalance { year, balance } => {
                write!(f, "Year {year}: negative cash balance of {balance}")
            }
            DealWarning::ScenarioFailed { scenario, reason } => {
                write!(f, "Scenario '{scenario}' failed: {reason}")
            }
            DealWarning::StepFailed { input, reason } => {
                write!(f, "Sweep step at {input} failed: {reason}")
            }
        }
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<DealWarning>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<DealWarning>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
