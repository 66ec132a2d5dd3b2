//! Per-case phase execution state.
//!
//! `PhaseStateStore` owns one `PhaseState` per phase of a workflow instance
//! and enforces the phase state machine:
//!
//! ```text
//! PENDING ──▶ ACTIVE ──▶ COMPLETED
//!               │ ▲  └──▶ ERROR
//!               ▼ │
//!             PAUSED ──▶ CANCELLED ◀── ACTIVE
//! ```
//!
//! `transition` is the only way to change a phase's status. `update` patches
//! progress, message or task handle of an in-flight phase without changing
//! its status. Every successful mutation is published on the `EventNotifier`.

use crate::dag::builder::WorkflowGraph;
use crate::errors::OrchestratorError;
use crate::notify::EventNotifier;
use chrono::{DateTime, Utc};
use docket_common::{PhaseFailure, PhaseStatus, TaskId, WorkflowEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Mutable execution record of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseState {
    pub phase_id: String,
    pub status: PhaseStatus,
    /// 0-100; meaningful while active, and 100 once completed
    pub progress: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<PhaseFailure>,
    pub task_id: Option<TaskId>,
    pub result: Option<serde_json::Value>,
    /// Last status message reported for the phase
    #[serde(default)]
    pub message: Option<String>,
}

impl PhaseState {
    pub fn new(phase_id: &str) -> Self {
        Self {
            phase_id: phase_id.to_string(),
            status: PhaseStatus::Pending,
            progress: 0,
            started_at: None,
            ended_at: None,
            error: None,
            task_id: None,
            result: None,
            message: None,
        }
    }

    /// Progress counted towards aggregates: 100 when completed, the live value
    /// when active, 0 otherwise.
    pub fn effective_progress(&self) -> u8 {
        match self.status {
            PhaseStatus::Completed => 100,
            PhaseStatus::Active => self.progress,
            _ => 0,
        }
    }
}

/// Optional field updates applied together with a transition.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub progress: Option<u8>,
    pub task_id: Option<TaskId>,
    pub error: Option<PhaseFailure>,
    pub result: Option<serde_json::Value>,
    pub message: Option<String>,
}

impl StatePatch {
    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn task(task_id: impl Into<TaskId>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Default::default()
        }
    }

    pub fn failure(error: PhaseFailure) -> Self {
        Self {
            message: Some(error.message.clone()),
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn result(result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Whether `from -> to` is in the legal transition table.
pub fn is_legal_transition(from: PhaseStatus, to: PhaseStatus) -> bool {
    use PhaseStatus::*;
    matches!(
        (from, to),
        (Pending, Active)
            | (Active, Paused)
            | (Paused, Active)
            | (Active, Completed)
            | (Active, Error)
            | (Active, Cancelled)
            | (Paused, Cancelled)
    )
}

/// The per-case record of every phase's status.
#[derive(Debug)]
pub struct PhaseStateStore {
    case_id: String,
    graph: Arc<WorkflowGraph>,
    /// States in graph definition order
    states: Vec<PhaseState>,
    notifier: EventNotifier,
}

impl PhaseStateStore {
    /// Create a store with every phase of the graph PENDING.
    pub fn new(case_id: &str, graph: Arc<WorkflowGraph>, notifier: EventNotifier) -> Self {
        let states = graph.phases().iter().map(|p| PhaseState::new(&p.id)).collect();
        Self {
            case_id: case_id.to_string(),
            graph,
            states,
            notifier,
        }
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    pub fn graph(&self) -> &Arc<WorkflowGraph> {
        &self.graph
    }

    pub fn notifier(&self) -> &EventNotifier {
        &self.notifier
    }

    /// Get the state of a phase.
    pub fn get(&self, phase_id: &str) -> Option<&PhaseState> {
        self.graph.get_index(phase_id).and_then(|i| self.states.get(i))
    }

    /// Get the state of a phase, failing with `UnknownPhase`.
    pub fn require(&self, phase_id: &str) -> Result<&PhaseState, OrchestratorError> {
        self.get(phase_id)
            .ok_or_else(|| OrchestratorError::UnknownPhase(phase_id.to_string()))
    }

    pub fn status(&self, phase_id: &str) -> Option<PhaseStatus> {
        self.get(phase_id).map(|s| s.status)
    }

    /// All states in definition order.
    pub fn states(&self) -> &[PhaseState] {
        &self.states
    }

    /// Ids of completed phases.
    pub fn completed_set(&self) -> HashSet<String> {
        self.ids_with(|s| s == PhaseStatus::Completed).into_iter().collect()
    }

    /// Ids of phases whose status matches the predicate, in definition order.
    pub fn ids_with(&self, pred: impl Fn(PhaseStatus) -> bool) -> Vec<String> {
        self.states
            .iter()
            .filter(|s| pred(s.status))
            .map(|s| s.phase_id.clone())
            .collect()
    }

    /// Pending phases that can never run because an upstream phase ended in
    /// ERROR or CANCELLED.
    pub fn blocked_phases(&self) -> Vec<String> {
        let mut blocked: HashSet<&str> = HashSet::new();
        for state in &self.states {
            if matches!(state.status, PhaseStatus::Error | PhaseStatus::Cancelled) {
                blocked.extend(self.graph.transitive_dependents(&state.phase_id));
            }
        }
        self.states
            .iter()
            .filter(|s| s.status == PhaseStatus::Pending && blocked.contains(s.phase_id.as_str()))
            .map(|s| s.phase_id.clone())
            .collect()
    }

    /// True when no phase is pending-and-runnable or in flight.
    pub fn is_settled(&self) -> bool {
        let blocked = self.blocked_phases();
        self.states.iter().all(|s| {
            s.status.is_terminal()
                || (s.status == PhaseStatus::Pending && blocked.contains(&s.phase_id))
        })
    }

    /// Move a phase to `to`, applying `patch`.
    ///
    /// Illegal transitions return `InvalidTransition` and leave the state
    /// untouched. PENDING -> ACTIVE additionally requires every dependency to
    /// be COMPLETED.
    pub fn transition(
        &mut self,
        phase_id: &str,
        to: PhaseStatus,
        patch: StatePatch,
    ) -> Result<PhaseState, OrchestratorError> {
        let index = self
            .graph
            .get_index(phase_id)
            .ok_or_else(|| OrchestratorError::UnknownPhase(phase_id.to_string()))?;
        let from = self.states[index].status;

        if !is_legal_transition(from, to) {
            return Err(OrchestratorError::InvalidTransition {
                phase: phase_id.to_string(),
                from,
                to,
            });
        }

        if from == PhaseStatus::Pending {
            let waiting_on = self.graph.unsatisfied(phase_id, &self.completed_set());
            if !waiting_on.is_empty() {
                return Err(OrchestratorError::DependenciesNotSatisfied {
                    phase: phase_id.to_string(),
                    waiting_on,
                });
            }
        }

        let now = Utc::now();
        let state = &mut self.states[index];
        state.status = to;

        match to {
            PhaseStatus::Active if from == PhaseStatus::Pending => {
                state.started_at = Some(now);
                state.progress = patch.progress.unwrap_or(0).min(100);
            }
            PhaseStatus::Active | PhaseStatus::Paused => {
                if let Some(p) = patch.progress {
                    state.progress = state.progress.max(p.min(100));
                }
            }
            PhaseStatus::Completed => {
                state.progress = 100;
                state.ended_at = Some(now);
                state.result = patch.result.clone();
            }
            PhaseStatus::Error => {
                state.ended_at = Some(now);
                state.error = Some(
                    patch
                        .error
                        .clone()
                        .unwrap_or_else(|| PhaseFailure::worker("phase failed")),
                );
            }
            PhaseStatus::Cancelled => {
                state.ended_at = Some(now);
            }
            PhaseStatus::Pending => {}
        }

        if let Some(task_id) = patch.task_id {
            state.task_id = Some(task_id);
        }
        if patch.message.is_some() {
            state.message = patch.message;
        }

        let snapshot = state.clone();
        debug!(
            case_id = %self.case_id,
            phase = phase_id,
            %from,
            %to,
            "phase transition"
        );
        self.publish(&snapshot, format!("{} -> {}", from, to));
        Ok(snapshot)
    }

    /// Patch progress, message or task handle of an in-flight phase.
    ///
    /// Progress never decreases and may only change while ACTIVE. A PAUSED
    /// phase still accepts message and task handle updates, so a dispatch
    /// that lands during a pause keeps its handle for cancellation.
    pub fn update(&mut self, phase_id: &str, patch: StatePatch) -> Result<PhaseState, OrchestratorError> {
        let index = self
            .graph
            .get_index(phase_id)
            .ok_or_else(|| OrchestratorError::UnknownPhase(phase_id.to_string()))?;
        let state = &mut self.states[index];

        let allowed = match state.status {
            PhaseStatus::Active => true,
            PhaseStatus::Paused => patch.progress.is_none(),
            _ => false,
        };
        if !allowed {
            return Err(OrchestratorError::InvalidTransition {
                phase: phase_id.to_string(),
                from: state.status,
                to: state.status,
            });
        }

        let mut changed = false;
        if let Some(p) = patch.progress {
            let next = state.progress.max(p.min(100));
            changed |= next != state.progress;
            state.progress = next;
        }
        if let Some(task_id) = patch.task_id {
            changed |= state.task_id.as_deref() != Some(task_id.as_str());
            state.task_id = Some(task_id);
        }
        if let Some(message) = patch.message {
            changed |= state.message.as_deref() != Some(message.as_str());
            state.message = Some(message);
        }

        let snapshot = state.clone();
        if changed {
            let message = snapshot
                .message
                .clone()
                .unwrap_or_else(|| format!("{}%", snapshot.progress));
            self.publish(&snapshot, message);
        }
        Ok(snapshot)
    }

    /// Publish a section-level event under a phase.
    pub fn publish_section(&self, phase_id: &str, section_id: &str, message: impl Into<String>) {
        if let Some(state) = self.get(phase_id) {
            self.notifier.publish(
                WorkflowEvent::new(&self.case_id, phase_id, state.status, state.progress, message)
                    .with_section(section_id),
            );
        }
    }

    fn publish(&self, state: &PhaseState, message: String) {
        self.notifier.publish(WorkflowEvent::new(
            &self.case_id,
            &state.phase_id,
            state.status,
            state.progress,
            message,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_common::ErrorKind;

    fn store() -> PhaseStateStore {
        let graph = Arc::new(WorkflowGraph::standard().unwrap());
        PhaseStateStore::new("case-1", graph, EventNotifier::new(64))
    }

    const ALL: [PhaseStatus; 6] = [
        PhaseStatus::Pending,
        PhaseStatus::Active,
        PhaseStatus::Paused,
        PhaseStatus::Completed,
        PhaseStatus::Error,
        PhaseStatus::Cancelled,
    ];

    #[test]
    fn test_initial_state_is_pending() {
        let store = store();
        for state in store.states() {
            assert_eq!(state.status, PhaseStatus::Pending);
            assert!(state.started_at.is_none());
        }
        assert!(store.completed_set().is_empty());
    }

    #[test]
    fn test_legal_table() {
        let legal: Vec<(PhaseStatus, PhaseStatus)> = ALL
            .iter()
            .flat_map(|&a| ALL.iter().map(move |&b| (a, b)))
            .filter(|&(a, b)| is_legal_transition(a, b))
            .collect();
        assert_eq!(legal.len(), 7);
        for terminal in [PhaseStatus::Completed, PhaseStatus::Error, PhaseStatus::Cancelled] {
            assert!(ALL.iter().all(|&to| !is_legal_transition(terminal, to)));
        }
    }

    #[test]
    fn test_start_requires_dependencies() {
        let mut store = store();
        let err = store
            .transition("A02", PhaseStatus::Active, StatePatch::default())
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::DependenciesNotSatisfied { .. }));
        assert_eq!(store.status("A02"), Some(PhaseStatus::Pending));
    }

    #[test]
    fn test_full_lifecycle_sets_timestamps_and_progress() {
        let mut store = store();
        let active = store
            .transition("A01", PhaseStatus::Active, StatePatch::task("t-1"))
            .unwrap();
        assert!(active.started_at.is_some());
        assert_eq!(active.task_id.as_deref(), Some("t-1"));

        store.update("A01", StatePatch::progress(40)).unwrap();
        let done = store
            .transition(
                "A01",
                PhaseStatus::Completed,
                StatePatch::result(serde_json::json!({"ok": true})),
            )
            .unwrap();
        assert_eq!(done.progress, 100);
        assert!(done.ended_at.is_some());
        assert_eq!(done.result, Some(serde_json::json!({"ok": true})));
        assert!(store.completed_set().contains("A01"));
    }

    #[test]
    fn test_illegal_transition_leaves_state_unchanged() {
        let mut store = store();
        let before = store.get("A01").unwrap().clone();
        for to in [PhaseStatus::Completed, PhaseStatus::Error, PhaseStatus::Paused, PhaseStatus::Cancelled] {
            let err = store.transition("A01", to, StatePatch::progress(50)).unwrap_err();
            assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
        }
        assert_eq!(store.get("A01").unwrap(), &before);
    }

    #[test]
    fn test_completed_always_has_full_progress() {
        let mut store = store();
        store
            .transition("A01", PhaseStatus::Active, StatePatch::progress(10))
            .unwrap();
        let done = store
            .transition("A01", PhaseStatus::Completed, StatePatch::progress(30))
            .unwrap();
        assert_eq!(done.progress, 100);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut store = store();
        store
            .transition("A01", PhaseStatus::Active, StatePatch::default())
            .unwrap();
        store.update("A01", StatePatch::progress(60)).unwrap();
        let state = store.update("A01", StatePatch::progress(20)).unwrap();
        assert_eq!(state.progress, 60);
        let state = store.update("A01", StatePatch::progress(250)).unwrap();
        assert_eq!(state.progress, 100);
    }

    #[test]
    fn test_update_rejected_outside_flight() {
        let mut store = store();
        assert!(store.update("A01", StatePatch::progress(5)).is_err());

        store
            .transition("A01", PhaseStatus::Active, StatePatch::default())
            .unwrap();
        store
            .transition("A01", PhaseStatus::Paused, StatePatch::default())
            .unwrap();
        assert!(store.update("A01", StatePatch::progress(5)).is_err());
        assert!(
            store
                .update("A01", StatePatch::default().with_message("held by operator"))
                .is_ok()
        );
    }

    #[test]
    fn test_error_records_failure() {
        let mut store = store();
        store
            .transition("A01", PhaseStatus::Active, StatePatch::default())
            .unwrap();
        let failed = store
            .transition(
                "A01",
                PhaseStatus::Error,
                StatePatch::failure(PhaseFailure::new(ErrorKind::Worker, "bad input")),
            )
            .unwrap();
        assert_eq!(failed.error.unwrap().kind, ErrorKind::Worker);
        assert_eq!(store.blocked_phases().len(), 6);
        assert!(store.is_settled());
    }

    #[test]
    fn test_unknown_phase() {
        let mut store = store();
        assert!(matches!(
            store.transition("Z99", PhaseStatus::Active, StatePatch::default()),
            Err(OrchestratorError::UnknownPhase(_))
        ));
    }

    #[tokio::test]
    async fn test_transitions_publish_events() {
        let mut store = store();
        let mut rx = store.notifier().subscribe();
        store
            .transition("A01", PhaseStatus::Active, StatePatch::task("t"))
            .unwrap();
        store.update("A01", StatePatch::progress(25)).unwrap();
        // Unchanged progress publishes nothing
        store.update("A01", StatePatch::progress(25)).unwrap();
        store
            .transition("A01", PhaseStatus::Completed, StatePatch::default())
            .unwrap();

        let statuses: Vec<_> = (0..3).map(|_| rx.try_recv().unwrap()).collect();
        assert_eq!(statuses[0].status, PhaseStatus::Active);
        assert_eq!(statuses[1].progress, 25);
        assert_eq!(statuses[2].status, PhaseStatus::Completed);
        assert!(rx.try_recv().is_err());
    }
}
