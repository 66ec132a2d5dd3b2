//! Typed error hierarchy for the docket engine.
//!
//! Three enums cover the library:
//! - `OrchestratorError`: everything the engine can fail with, including the
//!   worker failure taxonomy and programming/configuration errors
//! - `RubricError`: invalid compliance rubric definitions
//! - `PoolError`: misuse of the fact/evidence usage ledger, or section ids
//!   that collide
//!
//! Worker failures are never classified by inspecting their message; the
//! `ErrorKind` tag reported by the worker selects the variant.

use docket_common::{ErrorKind, PhaseFailure, PhaseStatus};
use thiserror::Error;

/// Errors from the orchestration engine.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Worker reported failure: {0}")]
    Worker(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Rate limited: {0}")]
    RateLimit(String),

    #[error("Invalid transition for phase {phase}: {from} -> {to}")]
    InvalidTransition {
        phase: String,
        from: PhaseStatus,
        to: PhaseStatus,
    },

    #[error("Retries exhausted for phase {phase} after {attempts} attempts")]
    RetriesExhausted { phase: String, attempts: u32 },

    #[error("Cycle detected in phase dependencies. Involved phases: {phases:?}")]
    CycleDetected { phases: Vec<String> },

    #[error("Unknown phase '{0}'")]
    UnknownPhase(String),

    #[error("Unknown dependency '{dependency}' in phase '{phase}': no phase with that id exists")]
    UnknownDependency { phase: String, dependency: String },

    #[error("Duplicate phase id: {0}")]
    DuplicatePhase(String),

    #[error("Phase weights must sum to 100, got {total}")]
    InvalidWeights { total: u64 },

    #[error("Phase '{0}' has zero weight")]
    ZeroWeight(String),

    #[error("Phase {phase} is not executable: waiting on {waiting_on:?}")]
    DependenciesNotSatisfied {
        phase: String,
        waiting_on: Vec<String>,
    },

    #[error("Phase {0} was cancelled")]
    Cancelled(String),

    #[error("Case {0} not found")]
    CaseNotFound(String),

    #[error("Case {0} already has an open workflow")]
    CaseAlreadyOpen(String),

    #[error(transparent)]
    InvalidRubric(#[from] RubricError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Map a structured worker failure onto the matching variant.
    pub fn from_failure(failure: &PhaseFailure) -> Self {
        let message = failure.message.clone();
        match failure.kind {
            ErrorKind::Network => Self::Network(message),
            ErrorKind::Timeout => Self::Timeout(message),
            ErrorKind::Worker => Self::Worker(message),
            ErrorKind::Storage => Self::Storage(message),
            ErrorKind::RateLimit => Self::RateLimit(message),
        }
    }

    /// The worker-facing error kind, if this error belongs to the taxonomy.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Network(_) => Some(ErrorKind::Network),
            Self::Timeout(_) => Some(ErrorKind::Timeout),
            Self::Worker(_) => Some(ErrorKind::Worker),
            Self::Storage(_) => Some(ErrorKind::Storage),
            Self::RateLimit(_) => Some(ErrorKind::RateLimit),
            _ => None,
        }
    }

    /// Whether the exponential backoff policy applies.
    pub fn is_retriable(&self) -> bool {
        self.kind().is_some_and(|k| k.is_retriable())
    }

    /// Convert into the failure record stored on a phase.
    pub fn to_failure(&self) -> PhaseFailure {
        let kind = self.kind().unwrap_or(ErrorKind::Worker);
        let message = match self {
            Self::Network(m)
            | Self::Timeout(m)
            | Self::Worker(m)
            | Self::Storage(m)
            | Self::RateLimit(m) => m.clone(),
            other => other.to_string(),
        };
        PhaseFailure::new(kind, message)
    }
}

impl From<PhaseFailure> for OrchestratorError {
    fn from(failure: PhaseFailure) -> Self {
        Self::from_failure(&failure)
    }
}

/// Errors from compliance rubric construction.
#[derive(Debug, Error)]
pub enum RubricError {
    #[error("Rubric weights must sum to 100, got {total}")]
    WeightsDoNotSumTo100 { total: u64 },

    #[error("Rubric criterion '{0}' has zero weight")]
    ZeroWeight(String),

    #[error("Rubric has no criteria")]
    Empty,

    #[error("Duplicate rubric criterion '{0}'")]
    DuplicateCriterion(String),
}

/// Errors from the fact/evidence pool usage ledger.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("Unknown pool item '{0}'")]
    UnknownItem(String),

    #[error("Item '{item}' already consumed by section '{section}'")]
    AlreadyConsumed { item: String, section: String },

    #[error("Section id '{0}' is generated more than once")]
    DuplicateSection(String),
}
