//! Phase execution against an external worker.
//!
//! `PhaseExecutor` dispatches a phase, polls it to a terminal state, retries
//! retriable failures with exponential backoff and cancels on request. All
//! state it touches lives in the `WorkflowInstance` it is handed, so any
//! number of poll loops for different phases or cases can run concurrently.
//!
//! Lifecycle of one phase:
//!
//! ```text
//! execute ──▶ ACTIVE(task) ──await_completion──▶ COMPLETED
//!                 │                         ├──▶ ERROR      (worker/storage failure)
//!                 │                         └──▶ Timeout    (still ACTIVE)
//!                 └── retriable failure ──retry(n)──▶ ACTIVE(new task) | ERROR (exhausted)
//! ```

mod outline;
mod retry;

pub use outline::OutlineStage;
pub use retry::{DEFAULT_MAX_RETRIES, RetryPolicy};

use crate::dag::{PhaseState, SharedInstance, StatePatch, WorkflowInstance};
use crate::errors::OrchestratorError;
use docket_common::{ErrorKind, PhaseFailure, PhaseStatus, PhaseWorker, RemoteStatus, TaskId};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default length of one time unit.
pub const DEFAULT_TIME_UNIT_MS: u64 = 1000;
/// Default poll interval, in time units.
pub const DEFAULT_POLL_INTERVAL_UNITS: u32 = 5;
/// Default poll budget before a phase times out.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// Configuration for phase execution timing.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Length of one time unit; every delay is a multiple of it.
    pub time_unit: Duration,
    /// Time units between status polls.
    pub poll_interval_units: u32,
    /// Polls before `await_completion` gives up with `Timeout`.
    pub max_poll_attempts: u32,
    /// Retries before a phase fails with `RetriesExhausted`.
    pub max_retries: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            time_unit: Duration::from_millis(DEFAULT_TIME_UNIT_MS),
            poll_interval_units: DEFAULT_POLL_INTERVAL_UNITS,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ExecutorConfig {
    pub fn with_time_unit(mut self, time_unit: Duration) -> Self {
        self.time_unit = time_unit;
        self
    }

    pub fn with_poll_interval_units(mut self, units: u32) -> Self {
        self.poll_interval_units = units;
        self
    }

    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.time_unit.saturating_mul(self.poll_interval_units)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.time_unit, self.max_retries)
    }
}

/// Dispatches, polls, retries and cancels phases on a `PhaseWorker`.
#[derive(Clone)]
pub struct PhaseExecutor {
    worker: Arc<dyn PhaseWorker>,
    config: ExecutorConfig,
    outline: OutlineStage,
}

/// What the local state says about a poll loop's phase.
enum LocalView {
    Poll,
    Skip,
    Done(Result<PhaseState, OrchestratorError>),
}

impl PhaseExecutor {
    pub fn new(worker: Arc<dyn PhaseWorker>, config: ExecutorConfig) -> Self {
        Self {
            worker,
            config,
            outline: OutlineStage::default(),
        }
    }

    pub fn with_outline_stage(mut self, outline: OutlineStage) -> Self {
        self.outline = outline;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn outline_stage(&self) -> &OutlineStage {
        &self.outline
    }

    /// Move a PENDING phase to ACTIVE and build its dispatch config.
    ///
    /// Fails with `InvalidTransition` unless the phase is PENDING and with
    /// `DependenciesNotSatisfied` unless every dependency is COMPLETED. For
    /// the outline phase the section pipeline runs here, before dispatch.
    pub fn activate(
        &self,
        instance: &mut WorkflowInstance,
        phase_id: &str,
        config: &Value,
    ) -> Result<Value, OrchestratorError> {
        instance.store.transition(
            phase_id,
            PhaseStatus::Active,
            StatePatch::default().with_message("dispatching"),
        )?;

        let payload = self.prepare(instance, phase_id, config);
        if let Err(err) = &payload {
            let failure = err.to_failure();
            warn!(case_id = %instance.case_id, phase = phase_id, error = %failure, "phase preparation failed");
            instance
                .store
                .transition(phase_id, PhaseStatus::Error, StatePatch::failure(failure))?;
        }
        payload
    }

    fn prepare(&self, instance: &mut WorkflowInstance, phase_id: &str, config: &Value) -> Result<Value, OrchestratorError> {
        let is_outline = instance
            .store
            .graph()
            .get(phase_id)
            .is_some_and(|p| p.is_outline_phase());
        if is_outline {
            self.outline.plan(instance, phase_id)?;
        }

        let mut payload = match config {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("config".to_string(), other.clone());
                map
            }
        };
        if is_outline {
            self.outline.decorate(instance, &mut payload)?;
        }
        Ok(Value::Object(payload))
    }

    /// Start the worker task for an ACTIVE phase and record its handle.
    async fn dispatch(&self, instance: &SharedInstance, phase_id: &str, payload: &Value) -> Result<TaskId, OrchestratorError> {
        let case_id = instance.lock().await.case_id.clone();
        let started = self.worker.start(phase_id, &case_id, payload).await;

        let mut guard = instance.lock().await;
        match started {
            Ok(task_id) => {
                let status = guard.store.require(phase_id)?.status;
                match status {
                    PhaseStatus::Active | PhaseStatus::Paused => {
                        guard.store.update(
                            phase_id,
                            StatePatch::task(task_id.clone()).with_message("dispatched"),
                        )?;
                        info!(case_id = %case_id, phase = phase_id, task = %task_id, "phase dispatched");
                        Ok(task_id)
                    }
                    PhaseStatus::Cancelled => {
                        drop(guard);
                        debug!(case_id = %case_id, phase = phase_id, task = %task_id, "cancelling task started after cancel");
                        if let Err(e) = self.worker.cancel(phase_id, &task_id).await {
                            warn!(phase = phase_id, task = %task_id, error = %e, "cancel request failed");
                        }
                        Err(OrchestratorError::Cancelled(phase_id.to_string()))
                    }
                    other => Err(OrchestratorError::InvalidTransition {
                        phase: phase_id.to_string(),
                        from: other,
                        to: PhaseStatus::Active,
                    }),
                }
            }
            Err(failure) => {
                if guard.store.status(phase_id) != Some(PhaseStatus::Active) {
                    return Err(failure.into());
                }
                if failure.is_retriable() {
                    warn!(case_id = %case_id, phase = phase_id, error = %failure, "dispatch failed, retriable");
                    guard.last_failures.insert(phase_id.to_string(), failure.clone());
                    guard.store.update(
                        phase_id,
                        StatePatch::default().with_message(format!("dispatch failed: {}", failure.message)),
                    )?;
                } else {
                    warn!(case_id = %case_id, phase = phase_id, error = %failure, "dispatch failed");
                    guard
                        .store
                        .transition(phase_id, PhaseStatus::Error, StatePatch::failure(failure.clone()))?;
                }
                Err(failure.into())
            }
        }
    }

    /// Dispatch a PENDING phase and return its task handle without waiting.
    ///
    /// The phase is ACTIVE once this returns `Ok`. A retriable dispatch
    /// failure leaves it ACTIVE without a task for `retry` to redispatch; a
    /// non-retriable one moves it to ERROR.
    pub async fn execute(&self, instance: &SharedInstance, phase_id: &str, config: &Value) -> Result<TaskId, OrchestratorError> {
        let payload = {
            let mut guard = instance.lock().await;
            self.activate(&mut guard, phase_id, config)?
        };
        self.dispatch(instance, phase_id, &payload).await
    }

    /// Dispatch a phase that `activate` already moved to ACTIVE.
    pub async fn dispatch_activated(
        &self,
        instance: &SharedInstance,
        phase_id: &str,
        payload: &Value,
    ) -> Result<TaskId, OrchestratorError> {
        self.dispatch(instance, phase_id, payload).await
    }

    fn local_view(guard: &WorkflowInstance, phase_id: &str, task_id: &str) -> LocalView {
        let state = match guard.store.require(phase_id) {
            Ok(state) => state,
            Err(e) => return LocalView::Done(Err(e)),
        };
        match state.status {
            PhaseStatus::Active if state.task_id.as_deref() == Some(task_id) => LocalView::Poll,
            PhaseStatus::Active => {
                // A retry replaced this task
                debug!(phase = phase_id, task = task_id, "task superseded");
                LocalView::Done(Err(OrchestratorError::Cancelled(phase_id.to_string())))
            }
            PhaseStatus::Paused => LocalView::Skip,
            PhaseStatus::Completed => LocalView::Done(Ok(state.clone())),
            PhaseStatus::Cancelled => LocalView::Done(Err(OrchestratorError::Cancelled(phase_id.to_string()))),
            PhaseStatus::Error => LocalView::Done(Err(state
                .error
                .as_ref()
                .map(OrchestratorError::from_failure)
                .unwrap_or_else(|| OrchestratorError::Worker("phase failed".into())))),
            PhaseStatus::Pending => LocalView::Done(Err(OrchestratorError::InvalidTransition {
                phase: phase_id.to_string(),
                from: PhaseStatus::Pending,
                to: PhaseStatus::Active,
            })),
        }
    }

    /// Poll a dispatched task until it reaches a terminal state.
    ///
    /// Polls every `poll_interval` for at most `max_poll_attempts` attempts.
    /// Running updates are applied to the store and passed to `on_progress`.
    /// While the phase is PAUSED the loop keeps ticking without polling and
    /// without spending attempts, so a pause of any length can be resumed. A
    /// transient failure of the status call itself costs one attempt. When
    /// the budget runs out the phase stays ACTIVE and `Timeout` is returned.
    pub async fn await_completion<F>(
        &self,
        instance: &SharedInstance,
        phase_id: &str,
        task_id: &str,
        mut on_progress: F,
    ) -> Result<PhaseState, OrchestratorError>
    where
        F: FnMut(u8, Option<&str>) + Send,
    {
        let interval = self.config.poll_interval();

        let mut attempt = 0;
        while attempt < self.config.max_poll_attempts {
            tokio::time::sleep(interval).await;

            match Self::local_view(&*instance.lock().await, phase_id, task_id) {
                LocalView::Poll => {}
                LocalView::Skip => continue,
                LocalView::Done(result) => return result,
            }
            attempt += 1;

            let response = self.worker.status(phase_id, task_id).await;

            let mut guard = instance.lock().await;
            // Local state is authoritative: a result arriving after cancel,
            // pause or supersession is dropped.
            match Self::local_view(&guard, phase_id, task_id) {
                LocalView::Poll => {}
                LocalView::Skip => {
                    debug!(phase = phase_id, "phase paused, worker result not applied");
                    continue;
                }
                LocalView::Done(result) => {
                    debug!(phase = phase_id, "ignoring late worker result");
                    return result;
                }
            }

            let response = match response {
                Ok(response) => response,
                Err(failure) if failure.is_retriable() => {
                    warn!(case_id = %guard.case_id, phase = phase_id, attempt, error = %failure, "status poll failed");
                    guard.last_failures.insert(phase_id.to_string(), failure);
                    continue;
                }
                Err(failure) => return self.fail(&mut guard, phase_id, failure),
            };

            match response.status {
                RemoteStatus::Pending | RemoteStatus::Running => {
                    let mut patch = StatePatch::progress(response.progress);
                    patch.message = response.message.clone();
                    let state = guard.store.update(phase_id, patch)?;
                    drop(guard);
                    on_progress(state.progress, response.message.as_deref());
                }
                RemoteStatus::Completed => {
                    let is_outline = guard
                        .store
                        .graph()
                        .get(phase_id)
                        .is_some_and(|p| p.is_outline_phase());
                    let result = if is_outline {
                        match self.outline.finish(&mut guard, phase_id, response.outputs.as_ref()) {
                            Ok(result) => result,
                            Err(err) => return self.fail(&mut guard, phase_id, err.to_failure()),
                        }
                    } else {
                        response.outputs.clone().unwrap_or(Value::Null)
                    };
                    let state = guard.store.transition(
                        phase_id,
                        PhaseStatus::Completed,
                        StatePatch::result(result).with_message("completed"),
                    )?;
                    guard.last_failures.remove(phase_id);
                    info!(case_id = %guard.case_id, phase = phase_id, attempt, "phase completed");
                    drop(guard);
                    on_progress(100, Some("completed"));
                    return Ok(state);
                }
                RemoteStatus::Error => {
                    let failure = response.failure();
                    if failure.is_retriable() {
                        warn!(case_id = %guard.case_id, phase = phase_id, error = %failure, "worker reported retriable failure");
                        guard.last_failures.insert(phase_id.to_string(), failure.clone());
                        return Err(failure.into());
                    }
                    return self.fail(&mut guard, phase_id, failure);
                }
            }
        }

        let message = format!(
            "no terminal status after {} polls",
            self.config.max_poll_attempts
        );
        let mut guard = instance.lock().await;
        warn!(case_id = %guard.case_id, phase = phase_id, "{}", message);
        guard
            .last_failures
            .insert(phase_id.to_string(), PhaseFailure::new(ErrorKind::Timeout, message.clone()));
        Err(OrchestratorError::Timeout(message))
    }

    fn fail(
        &self,
        guard: &mut WorkflowInstance,
        phase_id: &str,
        failure: PhaseFailure,
    ) -> Result<PhaseState, OrchestratorError> {
        warn!(case_id = %guard.case_id, phase = phase_id, error = %failure, "phase failed");
        guard
            .store
            .transition(phase_id, PhaseStatus::Error, StatePatch::failure(failure.clone()))?;
        Err(failure.into())
    }

    /// Redispatch a phase after a retriable failure.
    ///
    /// Waits `2^attempt` time units first, and then for as long as the phase
    /// stays PAUSED. Once `attempt` reaches the retry budget nothing is
    /// dispatched: the phase moves to ERROR (if in flight) and
    /// `RetriesExhausted` is returned. A stale task is cancelled on a
    /// best-effort basis before the new one starts; progress is kept.
    pub async fn retry(
        &self,
        instance: &SharedInstance,
        phase_id: &str,
        config: &Value,
        attempt: u32,
    ) -> Result<TaskId, OrchestratorError> {
        let Some(delay) = self.config.retry_policy().delay_for(attempt) else {
            let mut guard = instance.lock().await;
            let last = guard
                .last_failures
                .remove(phase_id)
                .unwrap_or_else(|| PhaseFailure::new(ErrorKind::Timeout, "retriable failure"));
            let status = guard.store.require(phase_id)?.status;
            if status.is_in_flight() {
                let failure = PhaseFailure::new(
                    last.kind,
                    format!("retries exhausted after {} attempts: {}", attempt, last.message),
                );
                guard
                    .store
                    .transition(phase_id, PhaseStatus::Error, StatePatch::failure(failure))?;
            }
            warn!(case_id = %guard.case_id, phase = phase_id, attempt, "retries exhausted");
            return Err(OrchestratorError::RetriesExhausted {
                phase: phase_id.to_string(),
                attempts: attempt,
            });
        };

        info!(phase = phase_id, attempt, delay_ms = delay.as_millis() as u64, "retrying phase");
        tokio::time::sleep(delay).await;

        let (payload, stale_task) = loop {
            let mut guard = instance.lock().await;
            let state = guard.store.require(phase_id)?.clone();
            match state.status {
                PhaseStatus::Pending => break (self.activate(&mut guard, phase_id, config)?, None),
                PhaseStatus::Active => match self.prepare(&mut guard, phase_id, config) {
                    Ok(payload) => break (payload, state.task_id),
                    Err(err) => {
                        let failure = err.to_failure();
                        warn!(case_id = %guard.case_id, phase = phase_id, error = %failure, "phase preparation failed");
                        guard
                            .store
                            .transition(phase_id, PhaseStatus::Error, StatePatch::failure(failure))?;
                        return Err(err);
                    }
                },
                PhaseStatus::Paused => {
                    drop(guard);
                    debug!(phase = phase_id, "retry waiting for resume");
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
                PhaseStatus::Cancelled => return Err(OrchestratorError::Cancelled(phase_id.to_string())),
                other => {
                    return Err(OrchestratorError::InvalidTransition {
                        phase: phase_id.to_string(),
                        from: other,
                        to: PhaseStatus::Active,
                    });
                }
            }
        };

        if let Some(task) = stale_task {
            match self.worker.cancel(phase_id, &task).await {
                Ok(acknowledged) => debug!(phase = phase_id, task = %task, acknowledged, "stale task cancelled"),
                Err(e) => warn!(phase = phase_id, task = %task, error = %e, "stale task cancel failed"),
            }
        }
        self.dispatch(instance, phase_id, &payload).await
    }

    /// Cancel an ACTIVE or PAUSED phase.
    ///
    /// Local state moves to CANCELLED immediately; the worker is then asked
    /// to stop the task, and its answer does not affect the outcome.
    /// Cancelling an already CANCELLED phase is a no-op.
    pub async fn cancel(&self, instance: &SharedInstance, phase_id: &str) -> Result<PhaseState, OrchestratorError> {
        let (state, task) = {
            let mut guard = instance.lock().await;
            let current = guard.store.require(phase_id)?.clone();
            match current.status {
                PhaseStatus::Cancelled => return Ok(current),
                PhaseStatus::Active | PhaseStatus::Paused => {
                    let state = guard.store.transition(
                        phase_id,
                        PhaseStatus::Cancelled,
                        StatePatch::default().with_message("cancelled"),
                    )?;
                    info!(case_id = %guard.case_id, phase = phase_id, "phase cancelled");
                    (state, current.task_id)
                }
                other => {
                    return Err(OrchestratorError::InvalidTransition {
                        phase: phase_id.to_string(),
                        from: other,
                        to: PhaseStatus::Cancelled,
                    });
                }
            }
        };

        if let Some(task) = task {
            match self.worker.cancel(phase_id, &task).await {
                Ok(acknowledged) => debug!(phase = phase_id, task = %task, acknowledged, "worker cancel"),
                Err(e) => warn!(phase = phase_id, task = %task, error = %e, "worker cancel failed"),
            }
        }
        Ok(state)
    }

    /// Drive an ACTIVE phase from its first dispatch to a terminal outcome,
    /// retrying retriable failures.
    pub async fn complete_dispatched(
        &self,
        instance: &SharedInstance,
        phase_id: &str,
        config: &Value,
        first: Result<TaskId, OrchestratorError>,
    ) -> Result<PhaseState, OrchestratorError> {
        let mut dispatched = first;
        let mut attempt = 0;
        loop {
            let outcome = match dispatched {
                Ok(task) => self.await_completion(instance, phase_id, &task, |_, _| {}).await,
                Err(e) => Err(e),
            };
            match outcome {
                Err(e) if e.is_retriable() => {
                    dispatched = self.retry(instance, phase_id, config, attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// `execute` followed by `complete_dispatched`.
    pub async fn run(&self, instance: &SharedInstance, phase_id: &str, config: &Value) -> Result<PhaseState, OrchestratorError> {
        match self.execute(instance, phase_id, config).await {
            Err(e) if !e.is_retriable() => Err(e),
            first => self.complete_dispatched(instance, phase_id, config, first).await,
        }
    }
}
