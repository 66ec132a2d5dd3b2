//! Case-level workflow orchestration.
//!
//! The `Orchestrator` keeps one `WorkflowInstance` per open case and moves it
//! through the phase graph: `advance` dispatches every phase whose
//! dependencies are complete, `drive` keeps advancing until nothing more can
//! run. Phase failures never surface as `Err` from `drive`; they are recorded
//! in the phase state and reported in the `WorkflowSummary`.
//!
//! Phases that depend on an ERROR or CANCELLED phase are left PENDING and
//! reported as blocked. An operator can open a new case to start over.

mod summary;

pub use summary::WorkflowSummary;

use crate::dag::{PhaseState, SharedInstance, StatePatch, WorkflowGraph, WorkflowInstance};
use crate::errors::OrchestratorError;
use crate::executor::PhaseExecutor;
use crate::notify::EventNotifier;
use crate::pipeline::CaseFile;
use docket_common::{CaseId, PhaseId, PhaseStatus, TaskId};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A phase run spawned by `advance`.
pub struct PhaseRun {
    pub phase_id: PhaseId,
    pub handle: JoinHandle<Result<PhaseState, OrchestratorError>>,
}

/// How a spawned phase task starts.
enum Launch {
    /// Freshly activated: dispatch with this payload
    Dispatch(Value),
    /// Already dispatched: continue from this dispatch outcome
    Attach(Result<TaskId, OrchestratorError>),
}

pub struct Orchestrator {
    graph: Arc<WorkflowGraph>,
    executor: Arc<PhaseExecutor>,
    notifier: EventNotifier,
    /// Dispatch config sent with every phase
    phase_config: Value,
    cases: RwLock<HashMap<CaseId, SharedInstance>>,
}

impl Orchestrator {
    pub fn new(graph: Arc<WorkflowGraph>, executor: PhaseExecutor, notifier: EventNotifier) -> Self {
        Self {
            graph,
            executor: Arc::new(executor),
            notifier,
            phase_config: Value::Object(Default::default()),
            cases: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_phase_config(mut self, config: Value) -> Self {
        self.phase_config = config;
        self
    }

    pub fn graph(&self) -> &Arc<WorkflowGraph> {
        &self.graph
    }

    pub fn notifier(&self) -> &EventNotifier {
        &self.notifier
    }

    pub fn executor(&self) -> &PhaseExecutor {
        &self.executor
    }

    /// Create the workflow instance for a case.
    pub async fn open_case(&self, case: CaseFile) -> Result<SharedInstance, OrchestratorError> {
        case.validate()?;
        let mut cases = self.cases.write().await;
        if cases.contains_key(&case.case_id) {
            return Err(OrchestratorError::CaseAlreadyOpen(case.case_id));
        }
        let case_id = case.case_id.clone();
        let instance = WorkflowInstance::new(case, self.graph.clone(), self.notifier.clone()).shared();
        cases.insert(case_id.clone(), instance.clone());
        info!(case_id = %case_id, phases = self.graph.len(), "case opened");
        Ok(instance)
    }

    /// Remove a case, cancelling any phase still in flight.
    pub async fn close_case(&self, case_id: &str) -> Result<WorkflowSummary, OrchestratorError> {
        let instance = self
            .cases
            .write()
            .await
            .remove(case_id)
            .ok_or_else(|| OrchestratorError::CaseNotFound(case_id.to_string()))?;

        let in_flight = instance.lock().await.store.ids_with(|s| s.is_in_flight());
        for phase_id in in_flight {
            if let Err(e) = self.executor.cancel(&instance, &phase_id).await {
                warn!(case_id, phase = %phase_id, error = %e, "cancel on close failed");
            }
        }

        let summary = WorkflowSummary::from_instance(&*instance.lock().await);
        info!(case_id, completed = summary.completed.len(), "case closed");
        Ok(summary)
    }

    pub async fn instance(&self, case_id: &str) -> Result<SharedInstance, OrchestratorError> {
        self.cases
            .read()
            .await
            .get(case_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::CaseNotFound(case_id.to_string()))
    }

    pub async fn case_ids(&self) -> Vec<CaseId> {
        let mut ids: Vec<CaseId> = self.cases.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Dispatch every PENDING phase whose dependencies are complete.
    ///
    /// Each phase is activated under the instance lock, then driven to a
    /// terminal outcome on its own task. A phase whose activation fails is
    /// logged and skipped; its state already records the failure. An ACTIVE
    /// phase that no task is driving (dispatched outside the orchestrator, or
    /// resumed after its runner ended) gets a new poll loop.
    pub async fn advance(&self, case_id: &str) -> Result<Vec<PhaseRun>, OrchestratorError> {
        let instance = self.instance(case_id).await?;

        let launches: Vec<(PhaseId, Launch)> = {
            let mut guard = instance.lock().await;
            let completed = guard.store.completed_set();
            let ready: Vec<PhaseId> = self
                .graph
                .all_executable(&completed)
                .into_iter()
                .filter(|p| guard.store.status(&p.id) == Some(PhaseStatus::Pending))
                .map(|p| p.id.clone())
                .collect();

            let mut launches = Vec::with_capacity(ready.len());
            for phase_id in ready {
                match self.executor.activate(&mut guard, &phase_id, &self.phase_config) {
                    Ok(payload) => launches.push((phase_id, Launch::Dispatch(payload))),
                    Err(e) => warn!(case_id, phase = %phase_id, error = %e, "phase activation failed"),
                }
            }

            let orphans: Vec<(PhaseId, Option<String>)> = guard
                .store
                .states()
                .iter()
                .filter(|s| s.status == PhaseStatus::Active && !guard.runners.contains(&s.phase_id))
                .filter(|s| !launches.iter().any(|(id, _)| id == &s.phase_id))
                .map(|s| (s.phase_id.clone(), s.task_id.clone()))
                .collect();
            for (phase_id, task_id) in orphans {
                let first = match task_id {
                    Some(task) => Ok(task),
                    None => Err(guard
                        .last_failures
                        .get(&phase_id)
                        .map(OrchestratorError::from_failure)
                        .unwrap_or_else(|| OrchestratorError::Network("phase has no task".into()))),
                };
                debug!(case_id, phase = %phase_id, "reattaching poll loop");
                launches.push((phase_id, Launch::Attach(first)));
            }

            for (phase_id, _) in &launches {
                guard.runners.insert(phase_id.clone());
            }
            launches
        };

        if !launches.is_empty() {
            debug!(
                case_id,
                phases = ?launches.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
                "advancing"
            );
        }

        let runs = launches
            .into_iter()
            .map(|(phase_id, launch)| {
                let executor = self.executor.clone();
                let instance = instance.clone();
                let config = self.phase_config.clone();
                let id = phase_id.clone();
                let handle = tokio::spawn(async move {
                    let first = match launch {
                        Launch::Dispatch(payload) => executor.dispatch_activated(&instance, &id, &payload).await,
                        Launch::Attach(first) => first,
                    };
                    let outcome = executor.complete_dispatched(&instance, &id, &config, first).await;
                    instance.lock().await.runners.remove(&id);
                    outcome
                });
                PhaseRun { phase_id, handle }
            })
            .collect();
        Ok(runs)
    }

    /// Advance a case until no phase can make further progress.
    pub async fn drive(&self, case_id: &str) -> Result<WorkflowSummary, OrchestratorError> {
        let mut running = FuturesUnordered::new();
        for run in self.advance(case_id).await? {
            running.push(join(run));
        }

        while let Some((phase_id, outcome)) = running.next().await {
            match outcome {
                Ok(Ok(state)) => info!(case_id, phase = %phase_id, status = %state.status, "phase settled"),
                Ok(Err(OrchestratorError::Cancelled(_))) => {
                    info!(case_id, phase = %phase_id, "phase cancelled")
                }
                Ok(Err(e)) => warn!(case_id, phase = %phase_id, error = %e, "phase did not complete"),
                Err(e) => warn!(case_id, phase = %phase_id, error = %e, "phase task aborted"),
            }
            for run in self.advance(case_id).await? {
                running.push(join(run));
            }
        }

        let summary = self.summary(case_id).await?;
        info!(
            case_id,
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            blocked = summary.blocked.len(),
            overall = summary.overall,
            "workflow settled"
        );
        Ok(summary)
    }

    /// Operator pause of an ACTIVE phase.
    pub async fn pause(&self, case_id: &str, phase_id: &str) -> Result<PhaseState, OrchestratorError> {
        let instance = self.instance(case_id).await?;
        let mut guard = instance.lock().await;
        let state = guard.store.transition(
            phase_id,
            PhaseStatus::Paused,
            StatePatch::default().with_message("paused by operator"),
        )?;
        info!(case_id, phase = phase_id, "phase paused");
        Ok(state)
    }

    /// Operator resume of a PAUSED phase.
    pub async fn resume(&self, case_id: &str, phase_id: &str) -> Result<PhaseState, OrchestratorError> {
        let instance = self.instance(case_id).await?;
        let mut guard = instance.lock().await;
        let state = guard.store.transition(
            phase_id,
            PhaseStatus::Active,
            StatePatch::default().with_message("resumed"),
        )?;
        info!(case_id, phase = phase_id, "phase resumed");
        Ok(state)
    }

    pub async fn cancel(&self, case_id: &str, phase_id: &str) -> Result<PhaseState, OrchestratorError> {
        let instance = self.instance(case_id).await?;
        self.executor.cancel(&instance, phase_id).await
    }

    pub async fn summary(&self, case_id: &str) -> Result<WorkflowSummary, OrchestratorError> {
        let instance = self.instance(case_id).await?;
        let guard = instance.lock().await;
        Ok(WorkflowSummary::from_instance(&guard))
    }
}

async fn join(run: PhaseRun) -> (PhaseId, Result<Result<PhaseState, OrchestratorError>, tokio::task::JoinError>) {
    (run.phase_id, run.handle.await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorConfig;
    use crate::pipeline::case::fixtures::contract_case;
    use crate::worker::ScriptedWorker;
    use docket_common::{ErrorKind, PhaseFailure, StatusResponse};
    use std::time::Duration;

    fn orchestrator(worker: Arc<ScriptedWorker>) -> Orchestrator {
        let graph = Arc::new(WorkflowGraph::standard().unwrap());
        let executor = PhaseExecutor::new(worker, ExecutorConfig::default());
        Orchestrator::new(graph, executor, EventNotifier::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_case_rejects_duplicates() {
        let orch = orchestrator(Arc::new(ScriptedWorker::default()));
        orch.open_case(contract_case()).await.unwrap();
        let err = orch.open_case(contract_case()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::CaseAlreadyOpen(_)));
        assert_eq!(orch.case_ids().await, vec!["case-42".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_case() {
        let orch = orchestrator(Arc::new(ScriptedWorker::default()));
        assert!(matches!(
            orch.advance("nope").await,
            Err(OrchestratorError::CaseNotFound(_))
        ));
        assert!(matches!(
            orch.close_case("nope").await,
            Err(OrchestratorError::CaseNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_dispatches_first_phase_only() {
        let worker = Arc::new(ScriptedWorker::default());
        let orch = orchestrator(worker.clone());
        orch.open_case(contract_case()).await.unwrap();

        let runs = orch.advance("case-42").await.unwrap();
        assert_eq!(runs.iter().map(|r| r.phase_id.as_str()).collect::<Vec<_>>(), vec!["A01"]);

        // Already active, nothing new to dispatch
        assert!(orch.advance("case-42").await.unwrap().is_empty());

        for run in runs {
            run.handle.await.unwrap().unwrap();
        }
        assert_eq!(worker.start_count("A01"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_completes_every_phase() {
        let orch = orchestrator(Arc::new(ScriptedWorker::default()));
        orch.open_case(contract_case()).await.unwrap();

        let summary = orch.drive("case-42").await.unwrap();
        assert!(summary.is_complete());
        assert_eq!(summary.completed.len(), 7);
        assert_eq!(summary.overall, 100.0);

        let instance = orch.instance("case-42").await.unwrap();
        let guard = instance.lock().await;
        let outline = guard.store.get("A03").unwrap().result.clone().unwrap();
        assert_eq!(outline["complianceScore"], 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_blocks_dependents() {
        let worker = Arc::new(ScriptedWorker::default());
        worker.script_run(
            "B01",
            vec![Ok(StatusResponse::failed(PhaseFailure::worker("reviewer rejected outline")))],
        );
        let orch = orchestrator(worker.clone());
        orch.open_case(contract_case()).await.unwrap();

        let summary = orch.drive("case-42").await.unwrap();
        assert_eq!(summary.completed, vec!["A01", "A02", "A03"]);
        assert_eq!(summary.failed, vec!["B01"]);
        assert_eq!(summary.blocked, vec!["B02", "C01", "C02"]);
        assert_eq!(summary.overall, 50.0);
        assert_eq!(worker.start_count("B02"), 0);

        let failure = summary.phases.iter().find(|p| p.phase_id == "B01").unwrap().error.clone();
        assert_eq!(failure.unwrap().kind, ErrorKind::Worker);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_survives_transient_failures() {
        let worker = Arc::new(ScriptedWorker::default());
        worker.fail_start("A02", PhaseFailure::network("connection refused"));
        worker.script_run(
            "A02",
            vec![Ok(StatusResponse::failed(PhaseFailure::new(ErrorKind::RateLimit, "429")))],
        );
        let orch = orchestrator(worker.clone());
        orch.open_case(contract_case()).await.unwrap();

        let summary = orch.drive("case-42").await.unwrap();
        assert!(summary.is_complete());
        assert_eq!(worker.start_count("A02"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operator_cancel_during_drive() {
        let worker = Arc::new(ScriptedWorker::default());
        worker.script_run("A01", vec![Ok(StatusResponse::running(30))]);
        let orch = Arc::new(orchestrator(worker.clone()));
        orch.open_case(contract_case()).await.unwrap();

        let driver = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.drive("case-42").await })
        };
        tokio::time::sleep(Duration::from_secs(12)).await;

        let paused = orch.pause("case-42", "A01").await.unwrap();
        assert_eq!(paused.status, PhaseStatus::Paused);
        let cancelled = orch.cancel("case-42", "A01").await.unwrap();
        assert_eq!(cancelled.status, PhaseStatus::Cancelled);

        let summary = driver.await.unwrap().unwrap();
        assert_eq!(summary.cancelled, vec!["A01"]);
        assert_eq!(summary.blocked.len(), 6);
        assert!(summary.completed.is_empty());
        assert_eq!(worker.cancelled_tasks().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_requires_active_phase() {
        let orch = orchestrator(Arc::new(ScriptedWorker::default()));
        orch.open_case(contract_case()).await.unwrap();
        let err = orch.pause("case-42", "A01").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
        let err = orch.resume("case-42", "A01").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cases_are_isolated() {
        let worker = Arc::new(ScriptedWorker::default());
        let orch = orchestrator(worker);
        orch.open_case(contract_case()).await.unwrap();
        let mut other = contract_case();
        other.case_id = "case-7".into();
        orch.open_case(other).await.unwrap();

        orch.drive("case-42").await.unwrap();
        let untouched = orch.summary("case-7").await.unwrap();
        assert_eq!(untouched.pending.len(), 7);
        assert_eq!(untouched.overall, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_case_cancels_in_flight() {
        let worker = Arc::new(ScriptedWorker::default());
        worker.script_run("A01", vec![Ok(StatusResponse::running(5))]);
        let orch = orchestrator(worker.clone());
        orch.open_case(contract_case()).await.unwrap();
        let runs = orch.advance("case-42").await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        let summary = orch.close_case("case-42").await.unwrap();
        assert_eq!(summary.cancelled, vec!["A01"]);
        assert!(orch.case_ids().await.is_empty());
        for run in runs {
            assert!(matches!(
                run.handle.await.unwrap(),
                Err(OrchestratorError::Cancelled(_))
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_pause_then_resume_completes() {
        let worker = Arc::new(ScriptedWorker::default());
        let orch = Arc::new(orchestrator(worker.clone()));
        orch.open_case(contract_case()).await.unwrap();

        let driver = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.drive("case-42").await })
        };
        tokio::time::sleep(Duration::from_secs(2)).await;
        orch.pause("case-42", "A01").await.unwrap();

        // Well past the 300 unit poll budget
        tokio::time::sleep(Duration::from_secs(400)).await;
        assert!(!driver.is_finished());
        let instance = orch.instance("case-42").await.unwrap();
        assert_eq!(instance.lock().await.store.status("A01"), Some(PhaseStatus::Paused));

        orch.resume("case-42", "A01").await.unwrap();
        let summary = driver.await.unwrap().unwrap();
        assert!(summary.is_complete());
        assert_eq!(worker.start_count("A01"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_reattaches_undriven_active_phase() {
        let worker = Arc::new(ScriptedWorker::default());
        let orch = orchestrator(worker.clone());
        let instance = orch.open_case(contract_case()).await.unwrap();

        // Dispatched directly, so no orchestrator task is polling it
        orch.executor()
            .execute(&instance, "A01", &serde_json::json!({}))
            .await
            .unwrap();

        let summary = orch.drive("case-42").await.unwrap();
        assert!(summary.is_complete());
        assert_eq!(worker.start_count("A01"), 1);
        assert!(instance.lock().await.runners.is_empty());
    }
}
