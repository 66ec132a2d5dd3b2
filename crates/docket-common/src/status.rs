//! Phase status values and structured failures.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution status of a single phase within a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Not started yet
    #[default]
    Pending,
    /// Dispatched to a worker and being polled
    Active,
    /// Held by an operator
    Paused,
    /// Worker reported success
    Completed,
    /// Worker reported failure or retries ran out
    Error,
    /// Explicitly cancelled
    Cancelled,
}

impl PhaseStatus {
    /// Check if the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Check if the phase is in flight (active or paused).
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Active | Self::Paused)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a failure, reported by the worker or raised locally.
///
/// Workers return this tag directly so the engine never has to guess the
/// category from an error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    Worker,
    Storage,
    RateLimit,
}

impl ErrorKind {
    /// Whether the backoff policy may retry a failure of this kind.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::RateLimit)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Worker => "worker",
            Self::Storage => "storage",
            Self::RateLimit => "rate_limit",
        };
        f.write_str(s)
    }
}

/// Structured failure stored on a phase and carried over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct PhaseFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl PhaseFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Worker, message)
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!PhaseStatus::Pending.is_terminal());
        assert!(!PhaseStatus::Active.is_terminal());
        assert!(!PhaseStatus::Paused.is_terminal());
        assert!(PhaseStatus::Completed.is_terminal());
        assert!(PhaseStatus::Error.is_terminal());
        assert!(PhaseStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_retriable_kinds() {
        assert!(ErrorKind::Network.is_retriable());
        assert!(ErrorKind::Timeout.is_retriable());
        assert!(ErrorKind::RateLimit.is_retriable());
        assert!(!ErrorKind::Worker.is_retriable());
        assert!(!ErrorKind::Storage.is_retriable());
    }

    #[test]
    fn test_failure_wire_format() {
        let json = r#"{"kind":"rate_limit","message":"slow down"}"#;
        let failure: PhaseFailure = serde_json::from_str(json).unwrap();
        assert_eq!(failure.kind, ErrorKind::RateLimit);
        assert!(failure.is_retriable());
        assert_eq!(failure.to_string(), "rate_limit error: slow down");
    }
}
