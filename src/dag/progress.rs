//! Weighted progress aggregation over a workflow instance.

use crate::dag::state::PhaseStateStore;
use crate::phase::Series;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Computes whole-workflow and per-series progress from phase states.
pub struct ProgressAggregator;

impl ProgressAggregator {
    /// Weighted progress over all phases, 0-100.
    ///
    /// Each phase contributes `weight * effective_progress / 100`; the sum is
    /// normalised by the graph's total weight (100 for the standard graph).
    pub fn overall_progress(store: &PhaseStateStore) -> f64 {
        let graph = store.graph();
        let total = graph.total_weight();
        if total == 0 {
            return 0.0;
        }
        let weighted: f64 = graph
            .phases()
            .iter()
            .zip(store.states())
            .map(|(phase, state)| phase.weight as f64 * state.effective_progress() as f64 / 100.0)
            .sum();
        weighted * 100.0 / total as f64
    }

    /// Progress of one series, each phase counting equally, 0-100.
    pub fn series_progress(store: &PhaseStateStore, series: Series) -> f64 {
        let progresses: Vec<f64> = store
            .graph()
            .phases()
            .iter()
            .zip(store.states())
            .filter(|(phase, _)| phase.series_id == series)
            .map(|(_, state)| state.effective_progress() as f64)
            .collect();
        if progresses.is_empty() {
            return 0.0;
        }
        progresses.iter().sum::<f64>() / progresses.len() as f64
    }

    /// Overall and per-series progress in one snapshot.
    pub fn report(store: &PhaseStateStore) -> ProgressReport {
        let series = Series::ALL
            .iter()
            .filter(|s| !store.graph().phases_in_series(**s).is_empty())
            .map(|s| (*s, Self::series_progress(store, *s)))
            .collect();
        ProgressReport {
            overall: Self::overall_progress(store),
            series,
        }
    }
}

/// Progress snapshot of a workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub overall: f64,
    pub series: BTreeMap<Series, f64>,
}
