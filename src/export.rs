//! Versioned output boundary for export collaborators.
//!
//! A `ScenarioSetDocument` carries every assumption in full, not a
//! summary, so a consuming adapter can regenerate spreadsheet formulas
//! from the inputs rather than pasting frozen numbers. Rates stay as
//! decimals inside the document; only presentation adapters format them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::deal::{
    DealFinancials, RiskTier, Scenario, ScenarioAssumptions, ScenarioOutputs, ScenarioSet,
    ScenarioStatus, ScenarioType, SensitivityRun,
};
use crate::scoring::AcceptanceScore;
use crate::store::ScenarioStore;
use crate::types::{DealWarning, Multiple, Rate};
use crate::DealEngineResult;

/// Bumped on any backward-incompatible change to the document layout.
pub const SCHEMA_VERSION: &str = "1.0";

/// One scenario as exported: assumptions, outputs, score, and any
/// sensitivity runs recorded against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub scenario_type: ScenarioType,
    pub status: ScenarioStatus,
    pub assumptions: ScenarioAssumptions,
    pub outputs: Option<ScenarioOutputs>,
    pub acceptance_score: Option<AcceptanceScore>,
    pub warnings: Vec<DealWarning>,
    pub sensitivity_runs: Vec<SensitivityRun>,
}

impl ScenarioRecord {
    fn from_scenario(scenario: &Scenario, runs: Vec<SensitivityRun>) -> Self {
        ScenarioRecord {
            scenario_type: scenario.scenario_type.clone(),
            status: scenario.status.clone(),
            assumptions: scenario.assumptions.clone(),
            outputs: scenario.outputs.clone(),
            acceptance_score: scenario.acceptance.clone(),
            warnings: scenario.warnings.clone(),
            sensitivity_runs: runs,
        }
    }
}

/// The stable, versioned document handed to export collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSetDocument {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub deal: DealFinancials,
    pub scenarios: Vec<ScenarioRecord>,
}

impl ScenarioSetDocument {
    /// Snapshot a freshly generated set; no sensitivity runs yet.
    pub fn from_set(set: &ScenarioSet) -> Self {
        ScenarioSetDocument {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            deal: set.deal.clone(),
            scenarios: set
                .scenarios
                .iter()
                .map(|s| ScenarioRecord::from_scenario(s, Vec::new()))
                .collect(),
        }
    }

    /// Snapshot a store's contents, pairing each scenario with the runs
    /// attached to it.
    pub fn from_store(deal: &DealFinancials, store: &ScenarioStore) -> Self {
        ScenarioSetDocument {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            deal: deal.clone(),
            scenarios: store
                .scenarios()
                .map(|(id, s)| {
                    let runs = store
                        .runs_for(id)
                        .into_iter()
                        .map(|r| r.run.clone())
                        .collect();
                    ScenarioRecord::from_scenario(s, runs)
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> DealEngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Boundary contract for format-specific exporters. Spreadsheet adapters
/// that rebuild live formulas live outside this crate and implement this
/// against the document alone.
pub trait ExportAdapter {
    type Output;

    fn export(&self, document: &ScenarioSetDocument) -> DealEngineResult<Self::Output>;
}

/// One presentation row per scenario; numbers already formatted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatRow {
    pub scenario: String,
    pub status: String,
    pub total_consideration: Option<String>,
    pub irr: Option<String>,
    pub moic: Option<String>,
    pub min_dscr: Option<String>,
    pub risk_tier: Option<String>,
    pub acceptance_score: Option<String>,
}

/// Built-in presentation adapter: flattens the document into display
/// rows, converting decimal rates to percentages at this boundary only.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatPresentation;

impl FlatPresentation {
    fn format_rate(rate: Rate) -> String {
        format!("{}%", (rate * dec!(100)).round_dp(2))
    }

    fn format_multiple(multiple: Multiple) -> String {
        format!("{}x", multiple.round_dp(2))
    }

    fn format_money(symbol: &str, amount: Decimal) -> String {
        let rounded = amount.round_dp(0);
        let negative = rounded.is_sign_negative();
        let digits = rounded.abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        if negative {
            format!("-{symbol}{grouped}")
        } else {
            format!("{symbol}{grouped}")
        }
    }

    fn row(deal: &DealFinancials, record: &ScenarioRecord) -> FlatRow {
        let symbol = deal.currency.symbol();
        let status = match &record.status {
            ScenarioStatus::Pending => "pending".to_string(),
            ScenarioStatus::Computing => "computing".to_string(),
            ScenarioStatus::Computed => "computed".to_string(),
            ScenarioStatus::Failed { reason } => format!("failed: {reason}"),
        };
        let outputs = record.outputs.as_ref();
        FlatRow {
            scenario: record.scenario_type.name().to_string(),
            status,
            total_consideration: outputs
                .map(|o| Self::format_money(symbol, o.total_consideration)),
            irr: outputs.map(|o| Self::format_rate(o.irr)),
            moic: outputs.map(|o| Self::format_multiple(o.moic)),
            min_dscr: outputs.and_then(|o| o.min_dscr).map(Self::format_multiple),
            risk_tier: outputs.map(|o| {
                match o.risk_tier {
                    RiskTier::Low => "low",
                    RiskTier::Medium => "medium",
                    RiskTier::High => "high",
                }
                .to_string()
            }),
            acceptance_score: record
                .acceptance_score
                .as_ref()
                .map(|a| Self::format_rate(a.score)),
        }
    }
}

impl ExportAdapter for FlatPresentation {
    type Output = Vec<FlatRow>;

    fn export(&self, document: &ScenarioSetDocument) -> DealEngineResult<Self::Output> {
        Ok(document
            .scenarios
            .iter()
            .map(|record| Self::row(&document.deal, record))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::sample_deal;
    use crate::generator::{generate, ScenarioRequest};
    use crate::resolver::HeuristicTableProvider;
    use crate::sensitivity::{sweep, AssumptionField, SweepRange};
    use rust_decimal_macros::dec;

    fn sample_set() -> ScenarioSet {
        generate(
            &sample_deal(),
            &ScenarioRequest::standard(),
            &HeuristicTableProvider,
        )
        .unwrap()
        .result
    }

    #[test]
    fn test_document_carries_full_assumptions() {
        let set = sample_set();
        let doc = ScenarioSetDocument::from_set(&set);
        assert_eq!(doc.schema_version, SCHEMA_VERSION);
        assert_eq!(doc.scenarios.len(), 5);

        // A formula-rebuilding consumer needs the raw inputs, so the JSON
        // must contain the assumption fields, not just the results
        let json = doc.to_json().unwrap();
        assert!(json.contains("purchase_price"));
        assert!(json.contains("exit_multiple"));
        assert!(json.contains("growth_rate"));
        assert!(json.contains("schema_version"));
    }

    #[test]
    fn test_document_round_trips() {
        let set = sample_set();
        let doc = ScenarioSetDocument::from_set(&set);
        let json = doc.to_json().unwrap();
        let back: ScenarioSetDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back.schema_version, doc.schema_version);
        assert_eq!(back.scenarios.len(), doc.scenarios.len());
        for (a, b) in back.scenarios.iter().zip(doc.scenarios.iter()) {
            assert_eq!(a.assumptions, b.assumptions);
            assert_eq!(a.outputs, b.outputs);
        }
    }

    #[test]
    fn test_from_store_includes_runs() {
        let deal = sample_deal();
        let set = sample_set();
        let mut store = ScenarioStore::new();
        let scenario = set.scenarios[0].clone();
        let run = sweep(
            &deal,
            &scenario,
            AssumptionField::ExitMultiple,
            SweepRange {
                min: dec!(4.0),
                max: dec!(6.0),
                steps: 3,
            },
            None,
        )
        .unwrap()
        .result;
        let id = store.insert_scenario(scenario);
        store.attach_run(id, run).unwrap();
        store.insert_scenario(set.scenarios[1].clone());

        let doc = ScenarioSetDocument::from_store(&deal, &store);
        assert_eq!(doc.scenarios.len(), 2);
        assert_eq!(doc.scenarios[0].sensitivity_runs.len(), 1);
        assert!(doc.scenarios[1].sensitivity_runs.is_empty());
        assert_eq!(doc.scenarios[0].sensitivity_runs[0].field, "exit_multiple");
    }

    #[test]
    fn test_flat_rows_format_at_boundary() {
        let set = sample_set();
        let doc = ScenarioSetDocument::from_set(&set);
        let rows = FlatPresentation.export(&doc).unwrap();
        assert_eq!(rows.len(), 5);

        let cash = &rows[0];
        assert_eq!(cash.scenario, "Cash");
        assert_eq!(cash.status, "computed");
        let irr = cash.irr.as_ref().unwrap();
        assert!(irr.ends_with('%'), "rate should be presented as %: {irr}");
        let moic = cash.moic.as_ref().unwrap();
        assert!(moic.ends_with('x'));
        let price = cash.total_consideration.as_ref().unwrap();
        assert!(price.starts_with('£') && price.contains(','), "{price}");
        // Unlevered scenario has no DSCR column
        assert!(cash.min_dscr.is_none());
    }

    #[test]
    fn test_money_formatting() {
        assert_eq!(
            FlatPresentation::format_money("£", dec!(12_500_000)),
            "£12,500,000"
        );
        assert_eq!(FlatPresentation::format_money("£", dec!(999)), "£999");
        assert_eq!(
            FlatPresentation::format_money("$", dec!(-1_000)),
            "-$1,000"
        );
        assert_eq!(FlatPresentation::format_rate(dec!(0.0850)), "8.50%");
        assert_eq!(FlatPresentation::format_multiple(dec!(2.104)), "2.10x");
    }
}
