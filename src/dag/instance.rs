//! One case's run through the workflow graph.

use crate::dag::builder::WorkflowGraph;
use crate::dag::progress::{ProgressAggregator, ProgressReport};
use crate::dag::state::PhaseStateStore;
use crate::notify::EventNotifier;
use crate::pipeline::{CaseFile, FactEvidencePool, Section};
use chrono::{DateTime, Utc};
use docket_common::PhaseFailure;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A workflow instance shared between the orchestrator and executor tasks.
pub type SharedInstance = Arc<Mutex<WorkflowInstance>>;

/// Per-case arena: phase states, the fact/evidence pool and the outline plan.
///
/// Everything a case owns lives here, so two cases never share mutable state.
#[derive(Debug)]
pub struct WorkflowInstance {
    pub case_id: String,
    pub created_at: DateTime<Utc>,
    pub case: CaseFile,
    pub store: PhaseStateStore,
    pub pool: FactEvidencePool,
    /// Sections planned for the outline phase; set once per instance
    pub outline_plan: Option<Vec<Section>>,
    /// Most recent retriable failure per phase, consulted when retries run out
    pub last_failures: HashMap<String, PhaseFailure>,
    /// Phases currently driven by an orchestrator task
    pub runners: HashSet<String>,
}

impl WorkflowInstance {
    pub fn new(case: CaseFile, graph: Arc<WorkflowGraph>, notifier: EventNotifier) -> Self {
        let store = PhaseStateStore::new(&case.case_id, graph, notifier);
        let pool = FactEvidencePool::from_case(&case);
        Self {
            case_id: case.case_id.clone(),
            created_at: Utc::now(),
            case,
            store,
            pool,
            outline_plan: None,
            last_failures: HashMap::new(),
            runners: HashSet::new(),
        }
    }

    pub fn shared(self) -> SharedInstance {
        Arc::new(Mutex::new(self))
    }

    pub fn progress(&self) -> ProgressReport {
        ProgressAggregator::report(&self.store)
    }
}
