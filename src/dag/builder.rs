//! Workflow graph construction and read-only traversal queries.
//!
//! The builder takes a list of phase definitions with their dependencies and
//! constructs a directed acyclic graph. Construction fails fast on unknown
//! dependencies, duplicate ids, cycles and (when requested) weights that do
//! not sum to the required total.

use crate::errors::OrchestratorError;
use crate::phase::{PhaseDefinition, Series, standard_phases};
use std::collections::{HashMap, HashSet};

/// Index into the phase list.
pub type PhaseIndex = usize;

/// Static definition of the phase nodes, their weights and dependency edges.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    /// Phases in definition order
    phases: Vec<PhaseDefinition>,
    /// Map from phase id to index
    index_map: HashMap<String, PhaseIndex>,
    /// index -> phases that depend on it
    forward_edges: Vec<Vec<PhaseIndex>>,
    /// index -> phases it depends on
    reverse_edges: Vec<Vec<PhaseIndex>>,
}

impl WorkflowGraph {
    /// The fixed seven-phase production graph.
    pub fn standard() -> Result<Self, OrchestratorError> {
        GraphBuilder::new(standard_phases())
            .require_total_weight(100)
            .build()
    }

    /// A graph over custom phase definitions; weights must still sum to 100.
    pub fn from_phases(phases: Vec<PhaseDefinition>) -> Result<Self, OrchestratorError> {
        GraphBuilder::new(phases).require_total_weight(100).build()
    }

    /// Get the number of phases in the graph.
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Get all phases in definition order.
    pub fn phases(&self) -> &[PhaseDefinition] {
        &self.phases
    }

    /// Get a phase by its id.
    pub fn get(&self, id: &str) -> Option<&PhaseDefinition> {
        self.index_map.get(id).and_then(|&i| self.phases.get(i))
    }

    /// Get the index for a phase id.
    pub fn get_index(&self, id: &str) -> Option<PhaseIndex> {
        self.index_map.get(id).copied()
    }

    /// Look up a phase, failing with `UnknownPhase`.
    pub fn require(&self, id: &str) -> Result<&PhaseDefinition, OrchestratorError> {
        self.get(id)
            .ok_or_else(|| OrchestratorError::UnknownPhase(id.to_string()))
    }

    /// Ids of the phases the given phase depends on.
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        self.get_index(id)
            .map(|i| {
                self.reverse_edges[i]
                    .iter()
                    .map(|&d| self.phases[d].id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids of the phases that depend directly on the given phase.
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.get_index(id)
            .map(|i| {
                self.forward_edges[i]
                    .iter()
                    .map(|&d| self.phases[d].id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every phase reachable through dependents, in definition order.
    pub fn transitive_dependents(&self, id: &str) -> Vec<&str> {
        let Some(start) = self.get_index(id) else {
            return Vec::new();
        };
        let mut seen: HashSet<PhaseIndex> = HashSet::new();
        let mut stack = self.forward_edges[start].clone();
        while let Some(node) = stack.pop() {
            if seen.insert(node) {
                stack.extend(self.forward_edges[node].iter().copied());
            }
        }
        let mut indices: Vec<_> = seen.into_iter().collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .map(|i| self.phases[i].id.as_str())
            .collect()
    }

    /// True iff every dependency of the phase is in `completed`.
    pub fn is_satisfied(&self, id: &str, completed: &HashSet<String>) -> bool {
        match self.get_index(id) {
            Some(i) => self.reverse_edges[i]
                .iter()
                .all(|&d| completed.contains(&self.phases[d].id)),
            None => false,
        }
    }

    /// Dependencies of the phase that are not yet in `completed`.
    pub fn unsatisfied(&self, id: &str, completed: &HashSet<String>) -> Vec<String> {
        self.dependencies(id)
            .into_iter()
            .filter(|d| !completed.contains(*d))
            .map(String::from)
            .collect()
    }

    /// First phase in definition order that is not completed and is satisfied.
    pub fn next_executable(&self, completed: &HashSet<String>) -> Option<&PhaseDefinition> {
        self.phases
            .iter()
            .find(|p| !completed.contains(&p.id) && self.is_satisfied(&p.id, completed))
    }

    /// All phases that are not completed and are satisfied, in definition order.
    pub fn all_executable(&self, completed: &HashSet<String>) -> Vec<&PhaseDefinition> {
        self.phases
            .iter()
            .filter(|p| !completed.contains(&p.id) && self.is_satisfied(&p.id, completed))
            .collect()
    }

    /// Phases with no dependencies.
    pub fn root_phases(&self) -> Vec<&str> {
        self.reverse_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| self.phases[i].id.as_str())
            .collect()
    }

    /// Phases no other phase depends on.
    pub fn leaf_phases(&self) -> Vec<&str> {
        self.forward_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| self.phases[i].id.as_str())
            .collect()
    }

    /// Sum of all phase weights, widened so large custom weights cannot overflow.
    pub fn total_weight(&self) -> u64 {
        self.phases.iter().map(|p| u64::from(p.weight)).sum()
    }

    /// Phases belonging to a series, in definition order.
    pub fn phases_in_series(&self, series: Series) -> Vec<&PhaseDefinition> {
        self.phases.iter().filter(|p| p.series_id == series).collect()
    }

    /// Compute execution waves - groups of phases that can run concurrently.
    ///
    /// Each wave holds the phases whose dependencies are all in earlier waves.
    pub fn compute_waves(&self) -> Vec<Vec<String>> {
        let mut waves = Vec::new();
        let mut completed: HashSet<String> = HashSet::new();

        loop {
            let ready: Vec<String> = self
                .all_executable(&completed)
                .into_iter()
                .map(|p| p.id.clone())
                .collect();

            if ready.is_empty() {
                break;
            }

            completed.extend(ready.iter().cloned());
            waves.push(ready);
        }

        waves
    }
}

/// Builder for workflow graphs.
pub struct GraphBuilder {
    phases: Vec<PhaseDefinition>,
    required_total: Option<u32>,
}

impl GraphBuilder {
    /// Create a new builder with the given phases.
    pub fn new(phases: Vec<PhaseDefinition>) -> Self {
        Self {
            phases,
            required_total: None,
        }
    }

    /// Require the phase weights to sum to `total`.
    pub fn require_total_weight(mut self, total: u32) -> Self {
        self.required_total = Some(total);
        self
    }

    /// Build the graph.
    ///
    /// This validates the graph structure:
    /// - Phase ids must be unique
    /// - Every phase must carry a non-zero weight
    /// - All dependencies must reference existing phases
    /// - No cycles are allowed
    /// - Weights must match the required total, if one was set
    pub fn build(self) -> Result<WorkflowGraph, OrchestratorError> {
        let mut index_map = HashMap::new();
        for (i, phase) in self.phases.iter().enumerate() {
            if index_map.insert(phase.id.clone(), i).is_some() {
                return Err(OrchestratorError::DuplicatePhase(phase.id.clone()));
            }
            if phase.weight == 0 {
                return Err(OrchestratorError::ZeroWeight(phase.id.clone()));
            }
        }

        let mut forward_edges: Vec<Vec<PhaseIndex>> = vec![Vec::new(); self.phases.len()];
        let mut reverse_edges: Vec<Vec<PhaseIndex>> = vec![Vec::new(); self.phases.len()];

        for (to_idx, phase) in self.phases.iter().enumerate() {
            for dep in &phase.depends_on {
                let from_idx = *index_map.get(dep).ok_or_else(|| {
                    OrchestratorError::UnknownDependency {
                        phase: phase.id.clone(),
                        dependency: dep.clone(),
                    }
                })?;

                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        let graph = WorkflowGraph {
            phases: self.phases,
            index_map,
            forward_edges,
            reverse_edges,
        };

        Self::validate_no_cycles(&graph)?;

        if let Some(required) = self.required_total {
            let total = graph.total_weight();
            if total != u64::from(required) {
                return Err(OrchestratorError::InvalidWeights { total });
            }
        }

        Ok(graph)
    }

    /// Validate that the graph has no cycles using Kahn's algorithm.
    fn validate_no_cycles(graph: &WorkflowGraph) -> Result<(), OrchestratorError> {
        let mut in_degree: Vec<usize> = graph.reverse_edges.iter().map(|deps| deps.len()).collect();

        let mut queue: Vec<PhaseIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;

        while let Some(node) = queue.pop() {
            processed += 1;

            for &dependent in &graph.forward_edges[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed != graph.len() {
            let phases = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .map(|(i, _)| graph.phases[i].id.clone())
                .collect();

            return Err(OrchestratorError::CycleDetected { phases });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(id: &str, weight: u32, deps: Vec<&str>) -> PhaseDefinition {
        PhaseDefinition::new(
            id,
            &format!("Phase {}", id),
            weight,
            Series::A,
            deps.into_iter().map(String::from).collect(),
        )
    }

    fn completed(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_standard_graph_is_a_chain() {
        let graph = WorkflowGraph::standard().unwrap();
        assert_eq!(graph.len(), 7);
        assert_eq!(graph.total_weight(), 100);
        assert_eq!(graph.root_phases(), vec!["A01"]);
        assert_eq!(graph.leaf_phases(), vec!["C02"]);
        assert_eq!(graph.compute_waves().len(), 7);
    }

    #[test]
    fn test_next_executable_walks_the_chain() {
        let graph = WorkflowGraph::standard().unwrap();
        let mut done = HashSet::new();
        let mut order = Vec::new();
        while let Some(next) = graph.next_executable(&done) {
            assert!(graph.is_satisfied(&next.id, &done));
            order.push(next.id.clone());
            done.insert(next.id.clone());
        }
        assert_eq!(order, vec!["A01", "A02", "A03", "B01", "B02", "C01", "C02"]);
    }

    #[test]
    fn test_next_executable_never_skips_dependencies() {
        let graph = WorkflowGraph::standard().unwrap();
        // A02 completed without A01 is not a state the engine produces, but the
        // query must still only offer phases whose dependencies are complete.
        let done = completed(&["A02"]);
        let next = graph.next_executable(&done).unwrap();
        assert_eq!(next.id, "A01");
        for p in graph.all_executable(&done) {
            assert!(graph.dependencies(&p.id).iter().all(|d| done.contains(*d)));
        }
    }

    #[test]
    fn test_all_executable_diamond() {
        let graph = GraphBuilder::new(vec![
            phase("01", 25, vec![]),
            phase("02", 25, vec!["01"]),
            phase("03", 25, vec!["01"]),
            phase("04", 25, vec!["02", "03"]),
        ])
        .require_total_weight(100)
        .build()
        .unwrap();

        let ready: Vec<_> = graph
            .all_executable(&completed(&["01"]))
            .into_iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ready, vec!["02", "03"]);

        let waves = graph.compute_waves();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[1], vec!["02", "03"]);
        assert_eq!(graph.transitive_dependents("01"), vec!["02", "03", "04"]);
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let graph = GraphBuilder::new(vec![
            phase("01", 10, vec![]),
            phase("02", 10, vec!["01"]),
            phase("03", 10, vec!["01", "02"]),
        ])
        .build()
        .unwrap();

        assert!(graph.dependencies("01").is_empty());
        assert_eq!(graph.dependencies("03"), vec!["01", "02"]);
        assert_eq!(graph.dependents("01"), vec!["02", "03"]);
        assert_eq!(graph.unsatisfied("03", &completed(&["01"])), vec!["02"]);
        assert!(!graph.is_satisfied("missing", &HashSet::new()));
    }

    #[test]
    fn test_cycle_detection() {
        let result = GraphBuilder::new(vec![
            phase("01", 10, vec!["03"]),
            phase("02", 10, vec!["01"]),
            phase("03", 10, vec!["02"]),
        ])
        .build();

        match result {
            Err(OrchestratorError::CycleDetected { phases }) => assert_eq!(phases.len(), 3),
            other => panic!("Expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let result = GraphBuilder::new(vec![phase("01", 10, vec!["nonexistent"])]).build();
        let err = result.unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownDependency { .. }));
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn test_duplicate_phase_id() {
        let result = GraphBuilder::new(vec![phase("01", 10, vec![]), phase("01", 10, vec![])]).build();
        assert!(matches!(result, Err(OrchestratorError::DuplicatePhase(_))));
    }

    #[test]
    fn test_weight_total_enforced() {
        let result = GraphBuilder::new(vec![phase("01", 10, vec![]), phase("02", 20, vec!["01"])])
            .require_total_weight(100)
            .build();
        assert!(matches!(
            result,
            Err(OrchestratorError::InvalidWeights { total: 30 })
        ));
    }

    #[test]
    fn test_zero_weight_phase_rejected() {
        let result = GraphBuilder::new(vec![
            phase("01", 100, vec![]),
            phase("02", 0, vec!["01"]),
        ])
        .require_total_weight(100)
        .build();
        assert!(matches!(result, Err(OrchestratorError::ZeroWeight(ref id)) if id == "02"));
    }

    #[test]
    fn test_oversized_weights_report_total_without_overflow() {
        let result = GraphBuilder::new(vec![phase("01", u32::MAX, vec![]), phase("02", 101, vec![])])
            .require_total_weight(100)
            .build();
        let expected = u64::from(u32::MAX) + 101;
        assert!(matches!(
            result,
            Err(OrchestratorError::InvalidWeights { total }) if total == expected
        ));
    }

    #[test]
    fn test_from_phases_accepts_branching_graph() {
        let graph = WorkflowGraph::from_phases(vec![
            phase("01", 40, vec![]),
            phase("02", 30, vec!["01"]),
            phase("03", 30, vec!["01"]),
        ])
        .unwrap();
        assert_eq!(graph.compute_waves(), vec![vec!["01"], vec!["02", "03"]]);
    }

    #[test]
    fn test_phases_in_series() {
        let graph = WorkflowGraph::standard().unwrap();
        let ids: Vec<_> = graph
            .phases_in_series(Series::B)
            .into_iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["B01", "B02"]);
    }
}
