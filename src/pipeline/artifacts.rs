//! Documents persisted when the outline-production phase completes.

use crate::compliance::ComplianceScore;
use crate::pipeline::case::CaseFile;
use crate::pipeline::pool::FactEvidencePool;
use crate::pipeline::section::{Section, SectionKind};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub fact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub text: String,
    /// Section that states the fact
    pub section_id: Option<String>,
    /// Sections that cite the fact by reference
    #[serde(default)]
    pub referenced_by: Vec<String>,
}

/// Facts in chronological order; undated facts follow in pool order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactTimeline {
    pub case_id: String,
    pub entries: Vec<TimelineEntry>,
}

impl FactTimeline {
    pub fn build(case_id: &str, pool: &FactEvidencePool, sections: &[Section]) -> Self {
        let mut entries: Vec<TimelineEntry> = pool
            .facts()
            .iter()
            .map(|fact| TimelineEntry {
                fact_id: fact.id.clone(),
                date: fact.date,
                text: fact.text.clone(),
                section_id: pool.fact_usage().consumer_of(&fact.id).map(str::to_string),
                referenced_by: sections
                    .iter()
                    .filter(|s| s.referenced_fact_ids.contains(&fact.id))
                    .map(|s| s.section_id.clone())
                    .collect(),
            })
            .collect();
        // Stable sort keeps pool order among equal dates and among undated facts
        entries.sort_by_key(|e| (e.date.is_none(), e.date));
        Self {
            case_id: case_id.to_string(),
            entries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementEntry {
    pub element_id: String,
    pub name: String,
    pub sections: Vec<String>,
    pub fact_ids: Vec<String>,
    pub evidence_ids: Vec<String>,
    pub addressed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CauseAnalysis {
    pub cause_id: String,
    pub title: String,
    pub authorities: Vec<String>,
    pub elements: Vec<ElementEntry>,
}

/// Per cause of action, per element: which sections, facts and evidence address it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementAnalysis {
    pub case_id: String,
    pub causes: Vec<CauseAnalysis>,
}

impl ElementAnalysis {
    pub fn build(case: &CaseFile, sections: &[Section]) -> Self {
        let causes = case
            .causes_of_action
            .iter()
            .map(|cause| CauseAnalysis {
                cause_id: cause.id.clone(),
                title: cause.title.clone(),
                authorities: cause.authorities.clone(),
                elements: cause
                    .elements
                    .iter()
                    .map(|element| {
                        let addressing: Vec<&Section> = sections
                            .iter()
                            .filter(|s| {
                                s.kind == SectionKind::ElementAnalysis
                                    && s.cause_id.as_deref() == Some(cause.id.as_str())
                                    && s.element_id.as_deref() == Some(element.id.as_str())
                            })
                            .collect();
                        let fact_ids: Vec<String> = addressing
                            .iter()
                            .flat_map(|s| s.consumed_fact_ids.iter().chain(&s.referenced_fact_ids))
                            .cloned()
                            .collect();
                        let evidence_ids = addressing
                            .iter()
                            .flat_map(|s| {
                                s.consumed_evidence_ids.iter().chain(&s.referenced_evidence_ids)
                            })
                            .cloned()
                            .collect();
                        ElementEntry {
                            element_id: element.id.clone(),
                            name: element.name.clone(),
                            sections: addressing.iter().map(|s| s.section_id.clone()).collect(),
                            addressed: !fact_ids.is_empty(),
                            fact_ids,
                            evidence_ids,
                        }
                    })
                    .collect(),
            })
            .collect();
        Self {
            case_id: case.case_id.clone(),
            causes,
        }
    }

    /// Elements with no supporting facts, as `cause/element` ids.
    pub fn unaddressed(&self) -> Vec<String> {
        self.causes
            .iter()
            .flat_map(|c| {
                c.elements
                    .iter()
                    .filter(|e| !e.addressed)
                    .map(move |e| format!("{}/{}", c.cause_id, e.element_id))
            })
            .collect()
    }
}

/// The ordered section sequence with its compliance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineDocument {
    pub case_id: String,
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<Section>,
    pub compliance: ComplianceScore,
}

impl OutlineDocument {
    pub fn new(case: &CaseFile, sections: Vec<Section>, compliance: ComplianceScore) -> Self {
        Self {
            case_id: case.case_id.clone(),
            title: case.title.clone(),
            generated_at: Utc::now(),
            sections,
            compliance,
        }
    }

    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read outline: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse outline JSON: {}", path.display()))
    }
}
