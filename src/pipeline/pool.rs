//! Per-case pool of facts and evidence with its usage ledger.
//!
//! The pool is mutated by one `SectionPipeline` run at a time; the pipeline
//! holds `&mut FactEvidencePool` for the whole run, so the ledger never sees
//! concurrent writers.

use crate::errors::PoolError;
use crate::pipeline::case::{CaseFile, EvidenceItem, Fact};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Records which sections consumed which item ids.
///
/// Entries are only ever added. Within one pipeline run an id is consumed by
/// at most one section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageLedger {
    usage: BTreeMap<String, BTreeSet<String>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as consumed by `section_id`.
    ///
    /// Fails with `AlreadyConsumed` if any section already holds the item.
    pub fn consume(&mut self, id: &str, section_id: &str) -> Result<(), PoolError> {
        if let Some(section) = self.consumer_of(id) {
            return Err(PoolError::AlreadyConsumed {
                item: id.to_string(),
                section: section.to_string(),
            });
        }
        self.usage
            .entry(id.to_string())
            .or_default()
            .insert(section_id.to_string());
        Ok(())
    }

    pub fn is_consumed(&self, id: &str) -> bool {
        self.usage.get(id).is_some_and(|s| !s.is_empty())
    }

    /// The section that consumed `id`, if any.
    pub fn consumer_of(&self, id: &str) -> Option<&str> {
        self.usage
            .get(id)
            .and_then(|s| s.iter().next())
            .map(String::as_str)
    }

    /// Sections that consumed `id`.
    pub fn sections_for(&self, id: &str) -> Vec<&str> {
        self.usage
            .get(id)
            .map(|s| s.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.usage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usage.is_empty()
    }
}

/// Facts and evidence available to the section pipeline of one case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactEvidencePool {
    facts: Vec<Fact>,
    evidence: Vec<EvidenceItem>,
    fact_usage: UsageLedger,
    evidence_usage: UsageLedger,
}

impl FactEvidencePool {
    pub fn new(facts: Vec<Fact>, evidence: Vec<EvidenceItem>) -> Self {
        Self {
            facts,
            evidence,
            fact_usage: UsageLedger::new(),
            evidence_usage: UsageLedger::new(),
        }
    }

    /// Seed a fresh pool from a case file.
    pub fn from_case(case: &CaseFile) -> Self {
        Self::new(case.facts.clone(), case.evidence.clone())
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    pub fn evidence(&self) -> &[EvidenceItem] {
        &self.evidence
    }

    /// Facts not yet consumed by any section, in pool order.
    pub fn available_facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts
            .iter()
            .filter(|f| !self.fact_usage.is_consumed(&f.id))
    }

    /// Evidence not yet consumed by any section, in pool order.
    pub fn available_evidence(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.evidence
            .iter()
            .filter(|e| !self.evidence_usage.is_consumed(&e.id))
    }

    pub fn fact_usage(&self) -> &UsageLedger {
        &self.fact_usage
    }

    pub fn evidence_usage(&self) -> &UsageLedger {
        &self.evidence_usage
    }

    pub fn consume_fact(&mut self, id: &str, section_id: &str) -> Result<(), PoolError> {
        if !self.facts.iter().any(|f| f.id == id) {
            return Err(PoolError::UnknownItem(id.to_string()));
        }
        self.fact_usage.consume(id, section_id)
    }

    pub fn consume_evidence(&mut self, id: &str, section_id: &str) -> Result<(), PoolError> {
        if !self.evidence.iter().any(|e| e.id == id) {
            return Err(PoolError::UnknownItem(id.to_string()));
        }
        self.evidence_usage.consume(id, section_id)
    }

    /// Drop all usage records, making every item available again.
    pub fn reset_usage(&mut self) {
        self.fact_usage = UsageLedger::new();
        self.evidence_usage = UsageLedger::new();
    }
}
