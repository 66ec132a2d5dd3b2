//! Case file: the structured input a workflow instance is opened with.

use super::section::structural_order;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A party to the case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub name: String,
    /// e.g. "plaintiff", "defendant"
    pub role: String,
}

/// One atomic factual assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A piece of evidence supporting one or more facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceItem {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub fact_ids: Vec<String>,
}

/// One element a cause of action requires the pleading to establish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalElement {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A claim with its legal elements and supporting authorities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CauseOfAction {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authorities: Vec<String>,
    #[serde(default)]
    pub elements: Vec<LegalElement>,
}

/// Everything the engine knows about a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseFile {
    pub case_id: String,
    pub title: String,
    #[serde(default)]
    pub jurisdiction: String,
    #[serde(default)]
    pub parties: Vec<Party>,
    #[serde(default)]
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
    #[serde(default)]
    pub causes_of_action: Vec<CauseOfAction>,
    #[serde(default)]
    pub jury_demand: bool,
}

impl CaseFile {
    /// A case with no facts, evidence or claims.
    pub fn new(case_id: &str, title: &str) -> Self {
        Self {
            case_id: case_id.to_string(),
            title: title.to_string(),
            jurisdiction: String::new(),
            parties: Vec::new(),
            facts: Vec::new(),
            evidence: Vec::new(),
            causes_of_action: Vec::new(),
            jury_demand: false,
        }
    }

    /// Load a case from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read case file: {}", path.display()))?;
        let case: CaseFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse case JSON: {}", path.display()))?;
        case.validate()?;
        Ok(case)
    }

    /// Check id uniqueness and that evidence only points at known facts.
    pub fn validate(&self) -> Result<()> {
        if self.case_id.trim().is_empty() {
            anyhow::bail!("Case file has an empty caseId");
        }
        let mut seen = std::collections::HashSet::new();
        for id in self
            .facts
            .iter()
            .map(|f| &f.id)
            .chain(self.evidence.iter().map(|e| &e.id))
        {
            if !seen.insert(id.as_str()) {
                anyhow::bail!("Duplicate fact/evidence id '{}'", id);
            }
        }
        for item in &self.evidence {
            for fact_id in &item.fact_ids {
                if self.fact(fact_id).is_none() {
                    anyhow::bail!(
                        "Evidence '{}' references unknown fact '{}'",
                        item.id,
                        fact_id
                    );
                }
            }
        }
        let mut causes = std::collections::HashSet::new();
        for cause in &self.causes_of_action {
            if !causes.insert(cause.id.as_str()) {
                anyhow::bail!("Duplicate cause of action id '{}'", cause.id);
            }
            let mut elements = std::collections::HashSet::new();
            for element in &cause.elements {
                if !elements.insert(element.id.as_str()) {
                    anyhow::bail!(
                        "Duplicate element id '{}' in cause of action '{}'",
                        element.id,
                        cause.id
                    );
                }
            }
        }
        // Section ids are derived from cause and element ids, so distinct
        // ids can still collide (cause "a" element "b" vs cause "a-b").
        let mut sections = std::collections::HashSet::new();
        for slot in structural_order(self) {
            if !sections.insert(slot.section_id.clone()) {
                anyhow::bail!(
                    "Cause of action and element ids produce the section id '{}' twice",
                    slot.section_id
                );
            }
        }
        Ok(())
    }

    pub fn fact(&self, id: &str) -> Option<&Fact> {
        self.facts.iter().find(|f| f.id == id)
    }

    pub fn evidence_item(&self, id: &str) -> Option<&EvidenceItem> {
        self.evidence.iter().find(|e| e.id == id)
    }

    pub fn cause(&self, id: &str) -> Option<&CauseOfAction> {
        self.causes_of_action.iter().find(|c| c.id == id)
    }

    /// Total number of legal elements across all causes of action.
    pub fn element_count(&self) -> usize {
        self.causes_of_action.iter().map(|c| c.elements.len()).sum()
    }
}
