//! Section generation pipeline for the outline-production phase.
//!
//! The pipeline walks the fixed structural order of an outline and, for each
//! section, asks a `RelevanceRule` which facts and evidence belong to it.
//! Items still available in the `FactEvidencePool` are consumed by the
//! section; items an earlier section already consumed become references and
//! the consuming section is recorded in `dependsOnSections`. No fact is ever
//! restated by two sections.
//!
//! ## Modules
//!
//! | Module      | Contents                                           |
//! |-------------|----------------------------------------------------|
//! | `case`      | `CaseFile` and its facts, evidence, claims         |
//! | `pool`      | `FactEvidencePool` and `UsageLedger`               |
//! | `relevance` | `RelevanceRule` and the default `KeywordRelevance` |
//! | `section`   | `Section`, `SectionKind`, drafts, structural order |
//! | `artifacts` | Fact timeline, element analysis, outline document  |

pub mod artifacts;
pub mod case;
pub mod pool;
pub mod relevance;
pub mod section;

pub use artifacts::{ElementAnalysis, FactTimeline, OutlineDocument};
pub use case::{CaseFile, CauseOfAction, EvidenceItem, Fact, LegalElement, Party};
pub use pool::{FactEvidencePool, UsageLedger};
pub use relevance::{KeywordRelevance, RelevanceRule, Selection};
pub use section::{Section, SectionDraft, SectionKind, SectionSlot, WordTargets, apply_drafts, structural_order};

use crate::errors::PoolError;
use std::sync::Arc;
use tracing::debug;

/// Deterministic, single-writer generator of outline sections.
#[derive(Clone)]
pub struct SectionPipeline {
    rule: Arc<dyn RelevanceRule>,
    word_targets: WordTargets,
}

impl std::fmt::Debug for SectionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionPipeline")
            .field("word_targets", &self.word_targets)
            .finish_non_exhaustive()
    }
}

impl Default for SectionPipeline {
    fn default() -> Self {
        Self::new(Arc::new(KeywordRelevance), WordTargets::default())
    }
}

impl SectionPipeline {
    pub fn new(rule: Arc<dyn RelevanceRule>, word_targets: WordTargets) -> Self {
        Self { rule, word_targets }
    }

    pub fn word_targets(&self) -> &WordTargets {
        &self.word_targets
    }

    /// Generate every section of the outline in structural order.
    ///
    /// `on_section` is invoked after each section is recorded. The pool's
    /// usage ledger is updated as sections are produced and is not rolled
    /// back on error. Fails before planning anything if two slots share a
    /// section id.
    pub fn run(
        &self,
        case: &CaseFile,
        pool: &mut FactEvidencePool,
        mut on_section: impl FnMut(&Section),
    ) -> Result<Vec<Section>, PoolError> {
        let slots = structural_order(case);
        let mut ids = std::collections::HashSet::new();
        if let Some(slot) = slots.iter().find(|slot| !ids.insert(slot.section_id.as_str())) {
            return Err(PoolError::DuplicateSection(slot.section_id.clone()));
        }

        let mut sections: Vec<Section> = Vec::new();
        for slot in slots {
            let section = self.plan_section(&slot, case, pool, &sections)?;
            debug!(
                case_id = %case.case_id,
                section = %section.section_id,
                consumed = section.consumed_fact_ids.len(),
                referenced = section.referenced_fact_ids.len(),
                "section planned"
            );
            on_section(&section);
            sections.push(section);
        }
        Ok(sections)
    }

    /// Produce one section, consuming its available items from `pool`.
    pub fn plan_section(
        &self,
        slot: &SectionSlot,
        case: &CaseFile,
        pool: &mut FactEvidencePool,
        prior: &[Section],
    ) -> Result<Section, PoolError> {
        let mut section = Section::from_slot(slot, self.word_targets.for_kind(slot.kind));
        if let Some(cause) = slot.cause_id.as_deref().and_then(|c| case.cause(c)) {
            section.authorities = cause.authorities.clone();
        }

        let selection = self.rule.select(slot, case, pool);
        let is_prior = |id: &str| prior.iter().any(|s| s.section_id == id);

        for fact_id in dedup(&selection.fact_ids) {
            let consumer = pool.fact_usage().consumer_of(fact_id).map(str::to_string);
            match consumer {
                Some(consumer) => {
                    section.referenced_fact_ids.push(fact_id.to_string());
                    if is_prior(&consumer) && !section.depends_on_sections.contains(&consumer) {
                        section.depends_on_sections.push(consumer);
                    }
                }
                None => {
                    pool.consume_fact(fact_id, &section.section_id)?;
                    section.consumed_fact_ids.push(fact_id.to_string());
                }
            }
        }

        for evidence_id in dedup(&selection.evidence_ids) {
            let consumer = pool.evidence_usage().consumer_of(evidence_id).map(str::to_string);
            match consumer {
                Some(consumer) => {
                    section.referenced_evidence_ids.push(evidence_id.to_string());
                    if is_prior(&consumer) && !section.depends_on_sections.contains(&consumer) {
                        section.depends_on_sections.push(consumer);
                    }
                }
                None => {
                    pool.consume_evidence(evidence_id, &section.section_id)?;
                    section.consumed_evidence_ids.push(evidence_id.to_string());
                }
            }
        }

        Ok(section)
    }
}

fn dedup(ids: &[String]) -> Vec<&str> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .map(String::as_str)
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::case::fixtures::{contract_case, fact};
    use super::*;
    use std::collections::HashSet;

    fn run(case: &CaseFile) -> (Vec<Section>, FactEvidencePool) {
        let mut pool = FactEvidencePool::from_case(case);
        let sections = SectionPipeline::default()
            .run(case, &mut pool, |_| {})
            .unwrap();
        (sections, pool)
    }

    fn by_id<'a>(sections: &'a [Section], id: &str) -> &'a Section {
        sections.iter().find(|s| s.section_id == id).unwrap()
    }

    #[test]
    fn test_contract_case_assignment() {
        let (sections, pool) = run(&contract_case());
        assert_eq!(sections.len(), 11);

        assert_eq!(by_id(&sections, "jurisdiction").consumed_fact_ids, vec!["F5"]);
        assert_eq!(by_id(&sections, "parties").consumed_fact_ids, vec!["F1"]);
        assert_eq!(by_id(&sections, "facts").consumed_fact_ids, vec!["F6"]);

        let existence = by_id(&sections, "coa-breach-existence");
        assert_eq!(existence.consumed_fact_ids, vec!["F2"]);
        assert_eq!(existence.referenced_fact_ids, vec!["F1"]);
        assert_eq!(existence.depends_on_sections, vec!["parties"]);
        assert_eq!(existence.consumed_evidence_ids, vec!["E1"]);
        assert_eq!(existence.authorities, vec!["Cal. Civ. Code § 3300"]);

        let breach = by_id(&sections, "coa-breach-breach");
        assert_eq!(breach.consumed_fact_ids, vec!["F3"]);
        assert_eq!(breach.referenced_fact_ids, vec!["F1", "F2"]);
        assert_eq!(breach.referenced_evidence_ids, vec!["E1"]);
        assert_eq!(breach.depends_on_sections, vec!["parties", "coa-breach-existence"]);

        assert_eq!(pool.available_facts().count(), 0);
        assert_eq!(pool.fact_usage().consumer_of("F4"), Some("coa-breach-damages"));
    }

    #[test]
    fn test_colliding_section_ids_are_rejected() {
        let mut case = contract_case();
        case.causes_of_action[0].id = "x".into();
        case.causes_of_action[0].elements[0].id = "agreement".into();
        let mut second = case.causes_of_action[0].clone();
        second.id = "x-agreement".into();
        case.causes_of_action.push(second);

        let mut pool = FactEvidencePool::from_case(&case);
        let err = SectionPipeline::default()
            .run(&case, &mut pool, |_| {})
            .unwrap_err();
        assert!(matches!(err, PoolError::DuplicateSection(ref id) if id == "coa-x-agreement"));
        assert_eq!(pool.available_facts().count(), 6);
    }

    #[test]
    fn test_reference_instead_of_restating() {
        // Two sections: the first consumes F1, the second cites it by reference.
        let mut case = CaseFile::new("c", "Two sections");
        case.facts = vec![fact("F1", "The parties signed a lease", &["parties"])];
        case.causes_of_action = vec![CauseOfAction {
            id: "lease".into(),
            title: "Breach of Lease".into(),
            authorities: vec![],
            elements: vec![LegalElement {
                id: "agreement".into(),
                name: "Agreement".into(),
                keywords: vec!["lease".into()],
            }],
        }];
        let (sections, _) = run(&case);

        let first = by_id(&sections, "parties");
        let second = by_id(&sections, "coa-lease-agreement");
        assert_eq!(first.consumed_fact_ids, vec!["F1"]);
        assert!(second.consumed_fact_ids.is_empty());
        assert_eq!(second.referenced_fact_ids, vec!["F1"]);
        assert_eq!(second.depends_on_sections, vec!["parties"]);
    }

    #[test]
    fn test_consumed_sets_are_pairwise_disjoint() {
        let mut cases = vec![contract_case()];
        // Variations with overlapping keywords and shared tags
        for n in 0..8 {
            let mut case = contract_case();
            for i in 0..n {
                let text = if i % 2 == 0 { "contract damages failed" } else { "unrelated detail" };
                let tags: &[&str] = if i % 3 == 0 { &["parties", "relief"] } else { &[] };
                case.facts.push(fact(&format!("X{}", i), text, tags));
            }
            cases.push(case);
        }

        for case in &cases {
            let (sections, _) = run(case);
            let mut seen_facts: HashSet<&str> = HashSet::new();
            let mut seen_evidence: HashSet<&str> = HashSet::new();
            for section in &sections {
                for id in &section.consumed_fact_ids {
                    assert!(seen_facts.insert(id), "fact {} restated in {}", id, section.section_id);
                }
                for id in &section.consumed_evidence_ids {
                    assert!(seen_evidence.insert(id));
                }
                // Every dependency is strictly prior
                let position = sections.iter().position(|s| s.section_id == section.section_id).unwrap();
                for dep in &section.depends_on_sections {
                    let dep_position = sections.iter().position(|s| &s.section_id == dep).unwrap();
                    assert!(dep_position < position);
                }
            }
        }
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let case = contract_case();
        let (a, _) = run(&case);
        let (b, _) = run(&case);
        assert_eq!(a, b);
    }

    #[test]
    fn test_on_section_sees_every_section_in_order() {
        let case = contract_case();
        let mut pool = FactEvidencePool::from_case(&case);
        let mut seen = Vec::new();
        SectionPipeline::default()
            .run(&case, &mut pool, |s| seen.push(s.section_id.clone()))
            .unwrap();
        assert_eq!(seen.first().map(String::as_str), Some("caption"));
        assert_eq!(seen.last().map(String::as_str), Some("jury-demand"));
        assert_eq!(seen.len(), 11);
    }

    #[test]
    fn test_word_targets_applied() {
        let targets = WordTargets {
            element_analysis: 999,
            ..WordTargets::default()
        };
        let case = contract_case();
        let mut pool = FactEvidencePool::from_case(&case);
        let sections = SectionPipeline::new(Arc::new(KeywordRelevance), targets)
            .run(&case, &mut pool, |_| {})
            .unwrap();
        assert_eq!(by_id(&sections, "coa-breach-damages").word_target, 999);
        assert_eq!(by_id(&sections, "caption").word_target, 50);
    }
}
