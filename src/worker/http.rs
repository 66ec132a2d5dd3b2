//! HTTP client for a remote phase worker.
//!
//! Routes, relative to the configured base URL:
//!
//! | Operation | Request                                   |
//! |-----------|-------------------------------------------|
//! | start     | `POST /phases/{phase}/start`              |
//! | status    | `GET  /phases/{phase}/tasks/{task}`       |
//! | cancel    | `POST /phases/{phase}/tasks/{task}/cancel`|
//!
//! Transport failures and HTTP statuses are mapped onto `ErrorKind` here so
//! the executor never has to interpret error text.

use anyhow::Context;
use async_trait::async_trait;
use docket_common::{
    CancelResponse, ErrorKind, PhaseFailure, PhaseWorker, StartResponse, StatusResponse, TaskId,
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

pub struct HttpPhaseWorker {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for HttpPhaseWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPhaseWorker")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Error body a worker may send with a non-success status.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: PhaseFailure,
}

impl HttpPhaseWorker {
    pub fn new(base_url: &str, request_timeout: Duration, token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("docket/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build worker HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, PhaseFailure> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        response.json::<T>().await.map_err(|e| {
            PhaseFailure::new(ErrorKind::Worker, format!("malformed worker response: {}", e))
        })
    }
}

/// Map a transport-level reqwest failure onto the error taxonomy.
pub fn classify_transport(err: reqwest::Error) -> PhaseFailure {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_decode() {
        ErrorKind::Worker
    } else {
        ErrorKind::Network
    };
    PhaseFailure::new(kind, err.to_string())
}

/// Map a non-success HTTP status onto the error taxonomy.
///
/// A structured `{"error": {"kind", "message"}}` body wins over the status.
pub fn classify_status(status: StatusCode, body: &str) -> PhaseFailure {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.error;
    }
    let kind = match status {
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimit,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Timeout,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => ErrorKind::Network,
        _ => ErrorKind::Worker,
    };
    let detail = body.trim();
    let message = if detail.is_empty() {
        format!("worker returned HTTP {}", status.as_u16())
    } else {
        format!("worker returned HTTP {}: {}", status.as_u16(), detail)
    };
    PhaseFailure::new(kind, message)
}

#[async_trait]
impl PhaseWorker for HttpPhaseWorker {
    async fn start(
        &self,
        phase_id: &str,
        case_id: &str,
        config: &serde_json::Value,
    ) -> Result<TaskId, PhaseFailure> {
        let url = self.url(&format!("phases/{}/start", phase_id));
        debug!(%url, case_id, "starting phase on worker");
        let body = serde_json::json!({ "caseId": case_id, "config": config });
        let response: StartResponse = self.send(self.client.post(&url).json(&body)).await?;
        response.into_result()
    }

    async fn status(&self, phase_id: &str, task_id: &str) -> Result<StatusResponse, PhaseFailure> {
        let url = self.url(&format!("phases/{}/tasks/{}", phase_id, task_id));
        self.send(self.client.get(&url)).await
    }

    async fn cancel(&self, phase_id: &str, task_id: &str) -> Result<bool, PhaseFailure> {
        let url = self.url(&format!("phases/{}/tasks/{}/cancel", phase_id, task_id));
        let response: CancelResponse = self.send(self.client.post(&url)).await?;
        Ok(response.acknowledged)
    }
}
