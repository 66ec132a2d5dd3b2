//! Phase dispatch contract between the engine and an external worker.
//!
//! The worker hosts the expensive work (drafting, research, review); the
//! engine only starts it, polls it and cancels it.

use crate::status::{ErrorKind, PhaseFailure};
use crate::TaskId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Response of `start(phaseId, caseId, config)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PhaseFailure>,
}

impl StartResponse {
    /// Normalise the response into the task handle or the reported failure.
    pub fn into_result(self) -> Result<TaskId, PhaseFailure> {
        match (self.success, self.task_id, self.error) {
            (true, Some(task_id), _) => Ok(task_id),
            (_, _, Some(error)) => Err(error),
            (true, None, None) => Err(PhaseFailure::worker("start succeeded without a task id")),
            (false, _, None) => Err(PhaseFailure::worker("start rejected without an error")),
        }
    }
}

/// Status values a worker may report for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Pending,
    Running,
    Completed,
    #[serde(alias = "failed")]
    Error,
}

/// Response of `status(phaseId, taskId)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: RemoteStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PhaseFailure>,
}

impl StatusResponse {
    pub fn running(progress: u8) -> Self {
        Self {
            status: RemoteStatus::Running,
            progress: progress.min(100),
            message: None,
            outputs: None,
            error: None,
        }
    }

    pub fn completed(outputs: serde_json::Value) -> Self {
        Self {
            status: RemoteStatus::Completed,
            progress: 100,
            message: None,
            outputs: Some(outputs),
            error: None,
        }
    }

    pub fn failed(error: PhaseFailure) -> Self {
        Self {
            status: RemoteStatus::Error,
            progress: 0,
            message: Some(error.message.clone()),
            outputs: None,
            error: Some(error),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// The failure carried by an error status, defaulting to a worker failure.
    pub fn failure(&self) -> PhaseFailure {
        self.error.clone().unwrap_or_else(|| {
            PhaseFailure::new(
                ErrorKind::Worker,
                self.message
                    .clone()
                    .unwrap_or_else(|| "worker reported failure".to_string()),
            )
        })
    }
}

/// Response of `cancel(phaseId, taskId)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CancelResponse {
    pub acknowledged: bool,
}

/// An external worker that executes phase work.
///
/// Implementations must be cheap to share across tasks; the engine holds them
/// behind an `Arc` and calls them from concurrent poll loops.
#[async_trait]
pub trait PhaseWorker: Send + Sync {
    /// Start a phase execution and return its task handle.
    async fn start(
        &self,
        phase_id: &str,
        case_id: &str,
        config: &serde_json::Value,
    ) -> Result<TaskId, PhaseFailure>;

    /// Report the current status of a task.
    async fn status(&self, phase_id: &str, task_id: &str) -> Result<StatusResponse, PhaseFailure>;

    /// Request cancellation; returns whether the worker acknowledged it.
    async fn cancel(&self, phase_id: &str, task_id: &str) -> Result<bool, PhaseFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_response_success() {
        let resp: StartResponse =
            serde_json::from_str(r#"{"success":true,"taskId":"t-1"}"#).unwrap();
        assert_eq!(resp.into_result().unwrap(), "t-1");
    }

    #[test]
    fn test_start_response_error_kind_preserved() {
        let resp: StartResponse = serde_json::from_str(
            r#"{"success":false,"error":{"kind":"network","message":"reset"}}"#,
        )
        .unwrap();
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
    }

    #[test]
    fn test_start_response_missing_task_id() {
        let resp = StartResponse {
            success: true,
            task_id: None,
            error: None,
        };
        assert_eq!(resp.into_result().unwrap_err().kind, ErrorKind::Worker);
    }

    #[test]
    fn test_status_accepts_failed_alias() {
        let resp: StatusResponse =
            serde_json::from_str(r#"{"status":"failed","progress":40}"#).unwrap();
        assert_eq!(resp.status, RemoteStatus::Error);
        assert_eq!(resp.failure().kind, ErrorKind::Worker);
    }

    #[test]
    fn test_running_clamps_progress() {
        assert_eq!(StatusResponse::running(250).progress, 100);
    }
}
