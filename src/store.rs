//! Flat arena for computed scenarios and their sensitivity runs.
//!
//! A `SensitivityRun` refers to its parent scenario by id, never by an
//! owning pointer, so the scenario/run graph stays acyclic. Canonical
//! scenario outputs are write-once: runs append alongside a scenario,
//! they never overwrite it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::deal::{Scenario, SensitivityRun};
use crate::error::DealEngineError;
use crate::DealEngineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScenarioId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(u64);

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// A sensitivity run attached to its parent scenario by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRun {
    pub id: RunId,
    pub parent: ScenarioId,
    pub run: SensitivityRun,
}

/// Arena keyed by monotonically increasing ids. Ids are never reused, so
/// a stale id after `archive` misses cleanly instead of aliasing.
#[derive(Debug, Default)]
pub struct ScenarioStore {
    next_id: u64,
    scenarios: BTreeMap<ScenarioId, Scenario>,
    runs: BTreeMap<RunId, StoredRun>,
}

impl ScenarioStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert_scenario(&mut self, scenario: Scenario) -> ScenarioId {
        let id = ScenarioId(self.next());
        self.scenarios.insert(id, scenario);
        id
    }

    pub fn scenario(&self, id: ScenarioId) -> Option<&Scenario> {
        self.scenarios.get(&id)
    }

    /// Scenarios in insertion order.
    pub fn scenarios(&self) -> impl Iterator<Item = (ScenarioId, &Scenario)> {
        self.scenarios.iter().map(|(id, s)| (*id, s))
    }

    /// Attach a sensitivity run to an existing scenario.
    pub fn attach_run(
        &mut self,
        parent: ScenarioId,
        run: SensitivityRun,
    ) -> DealEngineResult<RunId> {
        if !self.scenarios.contains_key(&parent) {
            return Err(DealEngineError::NotFound {
                entity: "scenario".into(),
                id: parent.0,
            });
        }
        let id = RunId(self.next());
        self.runs.insert(id, StoredRun { id, parent, run });
        Ok(id)
    }

    pub fn run(&self, id: RunId) -> Option<&StoredRun> {
        self.runs.get(&id)
    }

    /// Runs attached to one scenario, in attachment order.
    pub fn runs_for(&self, parent: ScenarioId) -> Vec<&StoredRun> {
        self.runs.values().filter(|r| r.parent == parent).collect()
    }

    /// Remove a scenario and every run attached to it. Returns the
    /// scenario, or None when the id is unknown.
    pub fn archive(&mut self, id: ScenarioId) -> Option<Scenario> {
        let scenario = self.scenarios.remove(&id)?;
        self.runs.retain(|_, r| r.parent != id);
        Some(scenario)
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::{sample_deal, ScenarioStatus, ScenarioType};
    use crate::generator::{compute_scenario, ScenarioRequest};
    use crate::resolver::HeuristicTableProvider;
    use crate::sensitivity::{sweep, AssumptionField, SweepRange};
    use rust_decimal_macros::dec;

    fn computed_scenario(scenario_type: ScenarioType) -> Scenario {
        compute_scenario(
            &sample_deal(),
            &ScenarioRequest::new(scenario_type),
            &HeuristicTableProvider,
        )
    }

    fn sample_run(scenario: &Scenario) -> SensitivityRun {
        sweep(
            &sample_deal(),
            scenario,
            AssumptionField::ExitMultiple,
            SweepRange {
                min: dec!(4.0),
                max: dec!(6.0),
                steps: 3,
            },
            None,
        )
        .unwrap()
        .result
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut store = ScenarioStore::new();
        let id = store.insert_scenario(computed_scenario(ScenarioType::Cash));
        assert_eq!(
            store.scenario(id).unwrap().scenario_type,
            ScenarioType::Cash
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_runs_append_in_order() {
        let mut store = ScenarioStore::new();
        let scenario = computed_scenario(ScenarioType::Cash);
        let run = sample_run(&scenario);
        let id = store.insert_scenario(scenario);

        let r1 = store.attach_run(id, run.clone()).unwrap();
        let r2 = store.attach_run(id, run).unwrap();
        assert_ne!(r1, r2);

        let runs = store.runs_for(id);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, r1);
        assert_eq!(runs[1].id, r2);
        assert!(runs.iter().all(|r| r.parent == id));

        // Attaching a run never touches the canonical outputs
        assert!(matches!(
            store.scenario(id).unwrap().status,
            ScenarioStatus::Computed
        ));
    }

    #[test]
    fn test_attach_to_unknown_scenario_rejected() {
        let mut store = ScenarioStore::new();
        let scenario = computed_scenario(ScenarioType::Cash);
        let run = sample_run(&scenario);
        let id = store.insert_scenario(scenario);
        store.archive(id);

        assert!(matches!(
            store.attach_run(id, run),
            Err(DealEngineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_archive_removes_scenario_and_runs() {
        let mut store = ScenarioStore::new();
        let s1 = computed_scenario(ScenarioType::Cash);
        let s2 = computed_scenario(ScenarioType::Debt);
        let run = sample_run(&s1);

        let id1 = store.insert_scenario(s1);
        let id2 = store.insert_scenario(s2);
        let rid = store.attach_run(id1, run.clone()).unwrap();
        store.attach_run(id2, run).unwrap();

        let archived = store.archive(id1).unwrap();
        assert_eq!(archived.scenario_type, ScenarioType::Cash);
        assert!(store.scenario(id1).is_none());
        assert!(store.run(rid).is_none());
        assert!(store.runs_for(id1).is_empty());
        // The sibling scenario and its run survive
        assert_eq!(store.runs_for(id2).len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut store = ScenarioStore::new();
        let id1 = store.insert_scenario(computed_scenario(ScenarioType::Cash));
        store.archive(id1);
        let id2 = store.insert_scenario(computed_scenario(ScenarioType::Cash));
        assert_ne!(id1, id2);
        assert!(store.scenario(id1).is_none());
    }
}
