//! Phase workflow orchestration for case document production.
//!
//! A case moves through a fixed graph of weighted phases. Each phase is
//! dispatched to an external worker and polled to completion; the outline
//! phase additionally plans its sections from the case's facts and evidence
//! and scores the result against a compliance rubric.

pub mod compliance;
pub mod config;
pub mod dag;
pub mod errors;
pub mod executor;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod phase;
pub mod pipeline;
pub mod store;
pub mod ui;
pub mod worker;
