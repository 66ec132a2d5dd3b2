//! Hooks the executor runs around the outline-production phase.
//!
//! Before dispatch the section pipeline plans the outline and the plan is
//! sent to the worker. On completion the worker's drafts are merged into the
//! plan, the outline is scored and three artifacts are persisted.

use crate::compliance::ComplianceScorer;
use crate::dag::WorkflowInstance;
use crate::errors::OrchestratorError;
use crate::pipeline::{
    ElementAnalysis, FactTimeline, OutlineDocument, SectionDraft, SectionPipeline, apply_drafts,
};
use crate::store::{ArtifactKey, ArtifactKind, ArtifactStore, MemoryArtifactStore};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct OutlineStage {
    pipeline: SectionPipeline,
    scorer: ComplianceScorer,
    artifacts: Arc<dyn ArtifactStore>,
}

impl Default for OutlineStage {
    fn default() -> Self {
        Self {
            pipeline: SectionPipeline::default(),
            scorer: ComplianceScorer::default(),
            artifacts: Arc::new(MemoryArtifactStore::new()),
        }
    }
}

impl OutlineStage {
    pub fn new(pipeline: SectionPipeline, scorer: ComplianceScorer, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            pipeline,
            scorer,
            artifacts,
        }
    }

    pub fn scorer(&self) -> &ComplianceScorer {
        &self.scorer
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    /// Plan the outline once per instance.
    pub fn plan(&self, instance: &mut WorkflowInstance, phase_id: &str) -> Result<(), OrchestratorError> {
        if instance.outline_plan.is_some() {
            return Ok(());
        }
        let WorkflowInstance {
            case, pool, store, ..
        } = &mut *instance;
        let sections = self.pipeline.run(case, pool, |section| {
            store.publish_section(
                phase_id,
                &section.section_id,
                format!(
                    "planned {} ({} facts, {} references)",
                    section.title,
                    section.consumed_fact_ids.len(),
                    section.referenced_fact_ids.len()
                ),
            );
        })?;
        info!(
            case_id = %instance.case_id,
            phase = phase_id,
            sections = sections.len(),
            "outline planned"
        );
        instance.outline_plan = Some(sections);
        Ok(())
    }

    /// Attach the planned sections to the dispatch config.
    pub fn decorate(&self, instance: &WorkflowInstance, payload: &mut Map<String, Value>) -> Result<(), OrchestratorError> {
        if let Some(plan) = &instance.outline_plan {
            let sections = serde_json::to_value(plan).map_err(|e| OrchestratorError::Other(e.into()))?;
            payload.insert("sections".to_string(), sections);
            payload.insert("caseTitle".to_string(), json!(instance.case.title));
        }
        Ok(())
    }

    /// Merge drafts, score the outline and persist its artifacts.
    ///
    /// Returns the phase result: the outline document, its score and the
    /// artifact locations.
    pub fn finish(
        &self,
        instance: &mut WorkflowInstance,
        phase_id: &str,
        outputs: Option<&Value>,
    ) -> Result<Value, OrchestratorError> {
        self.plan(instance, phase_id)?;
        let mut sections = instance.outline_plan.clone().unwrap_or_default();

        let drafts: Vec<SectionDraft> = match outputs.and_then(|o| o.get("drafts")) {
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| OrchestratorError::Worker(format!("malformed section drafts: {}", e)))?,
            None => Vec::new(),
        };
        let applied = apply_drafts(&mut sections, drafts);
        debug!(case_id = %instance.case_id, applied, "drafts merged");

        let score = self.scorer.score(&sections, &instance.case);
        let timeline = FactTimeline::build(&instance.case_id, &instance.pool, &sections);
        let analysis = ElementAnalysis::build(&instance.case, &sections);
        let outline = OutlineDocument::new(&instance.case, sections.clone(), score.clone());

        let to_value = |v: Result<Value, serde_json::Error>| v.map_err(|e| OrchestratorError::Other(e.into()));
        let documents = [
            (ArtifactKind::FactTimeline, to_value(serde_json::to_value(&timeline))?),
            (ArtifactKind::ElementAnalysis, to_value(serde_json::to_value(&analysis))?),
            (ArtifactKind::Outline, to_value(serde_json::to_value(&outline))?),
        ];

        let mut locations = Map::new();
        for (kind, document) in &documents {
            let key = ArtifactKey::new(&instance.case_id, phase_id, *kind);
            let location = self.artifacts.save(&key, document)?;
            locations.insert(kind.as_str().to_string(), json!(location));
        }

        info!(
            case_id = %instance.case_id,
            phase = phase_id,
            score = score.score,
            "outline scored"
        );
        instance.outline_plan = Some(sections);

        Ok(json!({
            "complianceScore": score.score,
            "outline": documents[2].1,
            "artifacts": locations,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::WorkflowGraph;
    use crate::notify::EventNotifier;
    use crate::pipeline::case::fixtures::contract_case;
    use crate::worker::simulated_outputs;

    fn instance() -> WorkflowInstance {
        let graph = Arc::new(WorkflowGraph::standard().unwrap());
        WorkflowInstance::new(contract_case(), graph, EventNotifier::default())
    }

    #[test]
    fn test_plan_runs_once() {
        let stage = OutlineStage::default();
        let mut instance = instance();
        stage.plan(&mut instance, "A03").unwrap();
        let first = instance.outline_plan.clone().unwrap();
        stage.plan(&mut instance, "A03").unwrap();
        assert_eq!(instance.outline_plan.unwrap(), first);
    }

    #[tokio::test]
    async fn test_plan_publishes_section_events() {
        let stage = OutlineStage::default();
        let mut instance = instance();
        let mut rx = instance.store.notifier().subscribe();
        stage.plan(&mut instance, "A03").unwrap();
        let first = rx.try_recv().unwrap();
        assert_eq!(first.phase_id, "A03");
        assert_eq!(first.section_id.as_deref(), Some("caption"));
    }

    #[test]
    fn test_finish_scores_and_persists() {
        let store = Arc::new(MemoryArtifactStore::new());
        let stage = OutlineStage::new(SectionPipeline::default(), ComplianceScorer::default(), store.clone());
        let mut instance = instance();
        stage.plan(&mut instance, "A03").unwrap();

        let mut payload = Map::new();
        stage.decorate(&instance, &mut payload).unwrap();
        let outputs = simulated_outputs("A03", &Value::Object(payload));

        let result = stage.finish(&mut instance, "A03", Some(&outputs)).unwrap();
        assert_eq!(result["complianceScore"], 100.0);
        assert_eq!(store.len(), 3);
        assert!(result["artifacts"]["outline"].as_str().unwrap().ends_with("case-42/A03/outline"));
        assert!(
            instance
                .outline_plan
                .unwrap()
                .iter()
                .all(|s| s.draft.is_some())
        );
    }

    #[test]
    fn test_finish_without_drafts_scores_structure() {
        let stage = OutlineStage::default();
        let mut instance = instance();
        let result = stage.finish(&mut instance, "A03", None).unwrap();
        assert_eq!(result["complianceScore"], 70.0);
    }

    #[test]
    fn test_malformed_drafts_are_worker_errors() {
        let stage = OutlineStage::default();
        let mut instance = instance();
        let err = stage
            .finish(&mut instance, "A03", Some(&json!({"drafts": "nope"})))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Worker(_)));
    }
}
