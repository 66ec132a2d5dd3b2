//! Association rules deciding which facts and evidence belong to a section.

use crate::pipeline::case::{CaseFile, EvidenceItem, Fact};
use crate::pipeline::pool::FactEvidencePool;
use crate::pipeline::section::{SectionKind, SectionSlot};
use std::collections::HashSet;

/// Ids relevant to one section, in pool order.
///
/// A selection may name items that an earlier section already consumed; the
/// pipeline turns those into references instead of consuming them again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub fact_ids: Vec<String>,
    pub evidence_ids: Vec<String>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.fact_ids.is_empty() && self.evidence_ids.is_empty()
    }
}

/// Pluggable relevance rule used by the section pipeline.
pub trait RelevanceRule: Send + Sync {
    fn select(&self, slot: &SectionSlot, case: &CaseFile, pool: &FactEvidencePool) -> Selection;
}

/// Default rule: tag routing for structural sections, keyword matching for
/// element sections, and everything unclaimed for the statement of facts.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordRelevance;

fn has_tag(tags: &[String], wanted: &[&str]) -> bool {
    tags.iter()
        .any(|t| wanted.iter().any(|w| t.eq_ignore_ascii_case(w)))
}

fn fact_matches_keywords(fact: &Fact, keywords: &[String]) -> bool {
    let text = fact.text.to_lowercase();
    keywords.iter().any(|k| {
        let k = k.to_lowercase();
        !k.is_empty() && (text.contains(&k) || fact.tags.iter().any(|t| t.to_lowercase() == k))
    })
}

fn evidence_matches(item: &EvidenceItem, facts: &HashSet<&str>, keywords: &[String]) -> bool {
    item.fact_ids.iter().any(|f| facts.contains(f.as_str()))
        || item
            .tags
            .iter()
            .any(|t| keywords.iter().any(|k| t.eq_ignore_ascii_case(k)))
}

impl KeywordRelevance {
    fn all_element_keywords(case: &CaseFile) -> Vec<String> {
        case.causes_of_action
            .iter()
            .flat_map(|c| c.elements.iter())
            .flat_map(|e| e.keywords.iter().cloned())
            .collect()
    }

    fn structural_tags() -> Vec<&'static str> {
        [
            SectionKind::Caption,
            SectionKind::Introduction,
            SectionKind::JurisdictionVenue,
            SectionKind::Parties,
            SectionKind::PrayerForRelief,
        ]
        .iter()
        .flat_map(|k| k.routing_tags().iter().copied())
        .collect()
    }

    fn by_tag(pool: &FactEvidencePool, tags: &[&str]) -> Selection {
        Selection {
            fact_ids: pool
                .facts()
                .iter()
                .filter(|f| has_tag(&f.tags, tags))
                .map(|f| f.id.clone())
                .collect(),
            evidence_ids: pool
                .evidence()
                .iter()
                .filter(|e| has_tag(&e.tags, tags))
                .map(|e| e.id.clone())
                .collect(),
        }
    }

    fn with_linked_evidence(pool: &FactEvidencePool, facts: Vec<String>, keywords: &[String]) -> Selection {
        let fact_set: HashSet<&str> = facts.iter().map(String::as_str).collect();
        let evidence_ids = pool
            .evidence()
            .iter()
            .filter(|e| evidence_matches(e, &fact_set, keywords))
            .map(|e| e.id.clone())
            .collect();
        Selection {
            fact_ids: facts,
            evidence_ids,
        }
    }
}

impl RelevanceRule for KeywordRelevance {
    fn select(&self, slot: &SectionSlot, case: &CaseFile, pool: &FactEvidencePool) -> Selection {
        match slot.kind {
            SectionKind::CauseOfAction | SectionKind::JuryDemand => Selection::default(),
            SectionKind::StatementOfFacts => {
                let keywords = Self::all_element_keywords(case);
                let structural = Self::structural_tags();
                // Narrative facts only; anything an element or structural
                // section will claim is left for that section.
                let facts = pool
                    .available_facts()
                    .filter(|f| !fact_matches_keywords(f, &keywords) && !has_tag(&f.tags, &structural))
                    .map(|f| f.id.clone())
                    .collect();
                Self::with_linked_evidence(pool, facts, &[])
            }
            SectionKind::ElementAnalysis => {
                let element = slot
                    .cause_id
                    .as_deref()
                    .and_then(|c| case.cause(c))
                    .and_then(|c| {
                        c.elements
                            .iter()
                            .find(|e| Some(e.id.as_str()) == slot.element_id.as_deref())
                    });
                let Some(element) = element else {
                    return Selection::default();
                };
                let facts = pool
                    .facts()
                    .iter()
                    .filter(|f| fact_matches_keywords(f, &element.keywords))
                    .map(|f| f.id.clone())
                    .collect();
                Self::with_linked_evidence(pool, facts, &element.keywords)
            }
            kind => Self::by_tag(pool, kind.routing_tags()),
        }
    }
}
