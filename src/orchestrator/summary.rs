use crate::dag::{PhaseState, WorkflowInstance};
use crate::phase::Series;
use docket_common::PhaseStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of a case's workflow, grouped by outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub case_id: String,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub cancelled: Vec<String>,
    /// PENDING phases downstream of a failed or cancelled phase
    pub blocked: Vec<String>,
    /// PENDING phases that can still run
    pub pending: Vec<String>,
    /// ACTIVE or PAUSED phases
    pub active: Vec<String>,
    pub overall: f64,
    pub series: BTreeMap<Series, f64>,
    pub phases: Vec<PhaseState>,
}

impl WorkflowSummary {
    pub fn from_instance(instance: &WorkflowInstance) -> Self {
        let store = &instance.store;
        let blocked = store.blocked_phases();
        let pending = store
            .ids_with(|s| s == PhaseStatus::Pending)
            .into_iter()
            .filter(|id| !blocked.contains(id))
            .collect();
        let progress = instance.progress();

        Self {
            case_id: instance.case_id.clone(),
            completed: store.ids_with(|s| s == PhaseStatus::Completed),
            failed: store.ids_with(|s| s == PhaseStatus::Error),
            cancelled: store.ids_with(|s| s == PhaseStatus::Cancelled),
            blocked,
            pending,
            active: store.ids_with(|s| s.is_in_flight()),
            overall: progress.overall,
            series: progress.series,
            phases: store.states().to_vec(),
        }
    }

    /// True when every phase completed.
    pub fn is_complete(&self) -> bool {
        !self.phases.is_empty() && self.completed.len() == self.phases.len()
    }

    pub fn total(&self) -> usize {
        self.phases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{StatePatch, WorkflowGraph};
    use crate::notify::EventNotifier;
    use crate::pipeline::case::fixtures::contract_case;
    use std::sync::Arc;

    #[test]
    fn test_groups_phases_by_outcome() {
        let graph = Arc::new(WorkflowGraph::standard().unwrap());
        let mut instance = WorkflowInstance::new(contract_case(), graph, EventNotifier::default());
        let store = &mut instance.store;
        store.transition("A01", PhaseStatus::Active, StatePatch::default()).unwrap();
        store.transition("A01", PhaseStatus::Completed, StatePatch::default()).unwrap();
        store.transition("A02", PhaseStatus::Active, StatePatch::progress(50)).unwrap();

        let summary = WorkflowSummary::from_instance(&instance);
        assert_eq!(summary.completed, vec!["A01"]);
        assert_eq!(summary.active, vec!["A02"]);
        assert_eq!(summary.pending.len(), 5);
        assert!(summary.blocked.is_empty());
        assert_eq!(summary.overall, 20.0);
        assert_eq!(summary.series[&Series::A], 50.0);
        assert!(!summary.is_complete());
    }

    #[test]
    fn test_cancelled_phase_blocks_downstream() {
        let graph = Arc::new(WorkflowGraph::standard().unwrap());
        let mut instance = WorkflowInstance::new(contract_case(), graph, EventNotifier::default());
        let store = &mut instance.store;
        store.transition("A01", PhaseStatus::Active, StatePatch::default()).unwrap();
        store.transition("A01", PhaseStatus::Cancelled, StatePatch::default()).unwrap();

        let summary = WorkflowSummary::from_instance(&instance);
        assert_eq!(summary.cancelled, vec!["A01"]);
        assert_eq!(summary.blocked.len(), 6);
        assert!(summary.pending.is_empty());
        assert_eq!(summary.total(), 7);
    }
}
