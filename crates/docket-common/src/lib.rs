//! Shared domain types for the docket workflow engine.
//!
//! Everything an external phase worker and the engine must agree on lives
//! here: phase status values, the structured error kind, the wire types of
//! the dispatch contract, the notification event record and the async
//! [`PhaseWorker`] trait.

pub mod event;
pub mod status;
pub mod worker;

pub use event::WorkflowEvent;
pub use status::{ErrorKind, PhaseFailure, PhaseStatus};
pub use worker::{
    CancelResponse, PhaseWorker, RemoteStatus, StartResponse, StatusResponse,
};

/// Identifier of a legal case (and therefore of its workflow instance).
pub type CaseId = String;

/// Short phase code such as `"A01"`.
pub type PhaseId = String;

/// Opaque handle to an execution on the external worker.
pub type TaskId = String;
