//! Phase worker implementations.
//!
//! - `HttpPhaseWorker` talks to a remote worker service over HTTP
//! - `ScriptedWorker` runs in-process for simulation and tests

mod http;
mod scripted;

pub use http::{HttpPhaseWorker, classify_status, classify_transport};
pub use scripted::{ScriptedPoll, ScriptedWorker, simulated_outputs};
