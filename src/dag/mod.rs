//! Workflow graph and per-case phase state.
//!
//! This module provides the static and the mutable halves of a workflow:
//!
//! 1. **Builder** - validates phase definitions into an acyclic `WorkflowGraph`
//!    and answers dependency queries (`is_satisfied`, `next_executable`)
//! 2. **State** - `PhaseStateStore`, the only place phase status changes
//! 3. **Progress** - weighted overall and per-series progress
//! 4. **Instance** - `WorkflowInstance`, one case's store, pool and outline plan
//!
//! ## Example
//!
//! ```no_run
//! use docket::dag::WorkflowGraph;
//! use std::collections::HashSet;
//!
//! # fn example() -> Result<(), docket::errors::OrchestratorError> {
//! let graph = WorkflowGraph::standard()?;
//! let mut completed = HashSet::new();
//! assert_eq!(graph.next_executable(&completed).map(|p| p.id.as_str()), Some("A01"));
//!
//! completed.insert("A01".to_string());
//! assert!(graph.is_satisfied("A02", &completed));
//! # Ok(())
//! # }
//! ```

mod builder;
mod instance;
mod progress;
mod state;

pub use builder::{GraphBuilder, PhaseIndex, WorkflowGraph};
pub use instance::{SharedInstance, WorkflowInstance};
pub use progress::{ProgressAggregator, ProgressReport};
pub use state::{PhaseState, PhaseStateStore, StatePatch, is_legal_transition};
