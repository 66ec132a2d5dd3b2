//! Outline sections and their drafts.

use crate::pipeline::case::CaseFile;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Structural role of a section in the outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Caption,
    Introduction,
    JurisdictionVenue,
    Parties,
    StatementOfFacts,
    /// Heading that opens one cause of action
    CauseOfAction,
    /// Analysis of one legal element under a cause of action
    ElementAnalysis,
    PrayerForRelief,
    JuryDemand,
}

impl SectionKind {
    /// Tags that route facts and evidence to a structural section.
    pub fn routing_tags(&self) -> &'static [&'static str] {
        match self {
            SectionKind::Caption => &["caption"],
            SectionKind::Introduction => &["introduction", "summary"],
            SectionKind::JurisdictionVenue => &["jurisdiction", "venue"],
            SectionKind::Parties => &["parties", "party"],
            SectionKind::PrayerForRelief => &["relief", "remedy"],
            _ => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SectionKind::Caption => "Caption",
            SectionKind::Introduction => "Introduction",
            SectionKind::JurisdictionVenue => "Jurisdiction and Venue",
            SectionKind::Parties => "Parties",
            SectionKind::StatementOfFacts => "Statement of Facts",
            SectionKind::CauseOfAction => "Cause of Action",
            SectionKind::ElementAnalysis => "Element",
            SectionKind::PrayerForRelief => "Prayer for Relief",
            SectionKind::JuryDemand => "Demand for Jury Trial",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Default word budget per section kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTargets {
    #[serde(default = "default_caption")]
    pub caption: u32,
    #[serde(default = "default_introduction")]
    pub introduction: u32,
    #[serde(default = "default_jurisdiction_venue")]
    pub jurisdiction_venue: u32,
    #[serde(default = "default_parties")]
    pub parties: u32,
    #[serde(default = "default_statement_of_facts")]
    pub statement_of_facts: u32,
    #[serde(default = "default_cause_of_action")]
    pub cause_of_action: u32,
    #[serde(default = "default_element_analysis")]
    pub element_analysis: u32,
    #[serde(default = "default_prayer_for_relief")]
    pub prayer_for_relief: u32,
    #[serde(default = "default_jury_demand")]
    pub jury_demand: u32,
}

fn default_caption() -> u32 {
    50
}
fn default_introduction() -> u32 {
    250
}
fn default_jurisdiction_venue() -> u32 {
    200
}
fn default_parties() -> u32 {
    250
}
fn default_statement_of_facts() -> u32 {
    1200
}
fn default_cause_of_action() -> u32 {
    100
}
fn default_element_analysis() -> u32 {
    400
}
fn default_prayer_for_relief() -> u32 {
    200
}
fn default_jury_demand() -> u32 {
    50
}

impl Default for WordTargets {
    fn default() -> Self {
        Self {
            caption: default_caption(),
            introduction: default_introduction(),
            jurisdiction_venue: default_jurisdiction_venue(),
            parties: default_parties(),
            statement_of_facts: default_statement_of_facts(),
            cause_of_action: default_cause_of_action(),
            element_analysis: default_element_analysis(),
            prayer_for_relief: default_prayer_for_relief(),
            jury_demand: default_jury_demand(),
        }
    }
}

impl WordTargets {
    pub fn for_kind(&self, kind: SectionKind) -> u32 {
        match kind {
            SectionKind::Caption => self.caption,
            SectionKind::Introduction => self.introduction,
            SectionKind::JurisdictionVenue => self.jurisdiction_venue,
            SectionKind::Parties => self.parties,
            SectionKind::StatementOfFacts => self.statement_of_facts,
            SectionKind::CauseOfAction => self.cause_of_action,
            SectionKind::ElementAnalysis => self.element_analysis,
            SectionKind::PrayerForRelief => self.prayer_for_relief,
            SectionKind::JuryDemand => self.jury_demand,
        }
    }
}

/// A position in the outline before any facts are assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSlot {
    pub section_id: String,
    pub kind: SectionKind,
    pub title: String,
    pub cause_id: Option<String>,
    pub element_id: Option<String>,
}

impl SectionSlot {
    fn new(section_id: impl Into<String>, kind: SectionKind, title: impl Into<String>) -> Self {
        Self {
            section_id: section_id.into(),
            kind,
            title: title.into(),
            cause_id: None,
            element_id: None,
        }
    }
}

/// The fixed structural order of an outline for `case`.
///
/// caption, introduction, jurisdiction/venue, parties, statement of facts,
/// then each cause of action expanded element by element, then the prayer
/// for relief and (when demanded) the jury demand.
pub fn structural_order(case: &CaseFile) -> Vec<SectionSlot> {
    let mut slots = vec![
        SectionSlot::new("caption", SectionKind::Caption, case.title.clone()),
        SectionSlot::new("introduction", SectionKind::Introduction, "Introduction"),
        SectionSlot::new("jurisdiction", SectionKind::JurisdictionVenue, "Jurisdiction and Venue"),
        SectionSlot::new("parties", SectionKind::Parties, "Parties"),
        SectionSlot::new("facts", SectionKind::StatementOfFacts, "Statement of Facts"),
    ];

    for (n, cause) in case.causes_of_action.iter().enumerate() {
        let heading_id = format!("coa-{}", cause.id);
        let mut heading = SectionSlot::new(
            heading_id.clone(),
            SectionKind::CauseOfAction,
            format!("Count {}: {}", n + 1, cause.title),
        );
        heading.cause_id = Some(cause.id.clone());
        slots.push(heading);

        for element in &cause.elements {
            let mut slot = SectionSlot::new(
                format!("{}-{}", heading_id, element.id),
                SectionKind::ElementAnalysis,
                element.name.clone(),
            );
            slot.cause_id = Some(cause.id.clone());
            slot.element_id = Some(element.id.clone());
            slots.push(slot);
        }
    }

    slots.push(SectionSlot::new("prayer", SectionKind::PrayerForRelief, "Prayer for Relief"));
    if case.jury_demand {
        slots.push(SectionSlot::new("jury-demand", SectionKind::JuryDemand, "Demand for Jury Trial"));
    }
    slots
}

/// Drafted prose returned by the worker for one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionDraft {
    pub section_id: String,
    pub text: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

impl SectionDraft {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// One structural unit of the generated outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub section_id: String,
    #[serde(rename = "type")]
    pub kind: SectionKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    /// Strictly prior sections this one cites by reference
    #[serde(default)]
    pub depends_on_sections: Vec<String>,
    #[serde(default)]
    pub consumed_fact_ids: Vec<String>,
    #[serde(default)]
    pub consumed_evidence_ids: Vec<String>,
    /// Facts cited through `depends_on_sections` rather than restated
    #[serde(default)]
    pub referenced_fact_ids: Vec<String>,
    #[serde(default)]
    pub referenced_evidence_ids: Vec<String>,
    /// Authorities the drafter should cite
    #[serde(default)]
    pub authorities: Vec<String>,
    pub word_target: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<SectionDraft>,
}

impl Section {
    pub fn from_slot(slot: &SectionSlot, word_target: u32) -> Self {
        Self {
            section_id: slot.section_id.clone(),
            kind: slot.kind,
            title: slot.title.clone(),
            cause_id: slot.cause_id.clone(),
            element_id: slot.element_id.clone(),
            depends_on_sections: Vec::new(),
            consumed_fact_ids: Vec::new(),
            consumed_evidence_ids: Vec::new(),
            referenced_fact_ids: Vec::new(),
            referenced_evidence_ids: Vec::new(),
            authorities: Vec::new(),
            word_target,
            draft: None,
        }
    }

    /// Whether the section carries any factual allegation, directly or by reference.
    pub fn has_facts(&self) -> bool {
        !self.consumed_fact_ids.is_empty() || !self.referenced_fact_ids.is_empty()
    }

    pub fn has_evidence(&self) -> bool {
        !self.consumed_evidence_ids.is_empty() || !self.referenced_evidence_ids.is_empty()
    }

    pub fn citations(&self) -> &[String] {
        self.draft.as_ref().map(|d| d.citations.as_slice()).unwrap_or(&[])
    }

    pub fn word_count(&self) -> usize {
        self.draft.as_ref().map(SectionDraft::word_count).unwrap_or(0)
    }
}

/// Attach worker drafts to their sections, returning how many matched.
///
/// Drafts for unknown section ids are dropped with a warning.
pub fn apply_drafts(sections: &mut [Section], drafts: Vec<SectionDraft>) -> usize {
    let mut applied = 0;
    for draft in drafts {
        match sections.iter_mut().find(|s| s.section_id == draft.section_id) {
            Some(section) => {
                section.draft = Some(draft);
                applied += 1;
            }
            None => warn!(section = %draft.section_id, "draft for unknown section dropped"),
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::case::fixtures::contract_case;

    #[test]
    fn test_structural_order() {
        let case = contract_case();
        let ids: Vec<String> = structural_order(&case)
            .into_iter()
            .map(|s| s.section_id)
            .collect();
        assert_eq!(
            ids,
            vec![
                "caption",
                "introduction",
                "jurisdiction",
                "parties",
                "facts",
                "coa-breach",
                "coa-breach-existence",
                "coa-breach-breach",
                "coa-breach-damages",
                "prayer",
                "jury-demand",
            ]
        );
    }

    #[test]
    fn test_no_jury_demand_slot_when_not_demanded() {
        let mut case = contract_case();
        case.jury_demand = false;
        let slots = structural_order(&case);
        assert_eq!(slots.last().unwrap().kind, SectionKind::PrayerForRelief);
    }

    #[test]
    fn test_apply_drafts() {
        let slot = &structural_order(&contract_case())[0];
        let mut sections = vec![Section::from_slot(slot, 50)];
        let applied = apply_drafts(
            &mut sections,
            vec![
                SectionDraft {
                    section_id: "caption".into(),
                    text: "ACME CORP v. WIDGET CO".into(),
                    citations: vec![],
                },
                SectionDraft {
                    section_id: "nowhere".into(),
                    text: "dropped".into(),
                    citations: vec![],
                },
            ],
        );
        assert_eq!(applied, 1);
        assert_eq!(sections[0].word_count(), 4);
    }

    #[test]
    fn test_kind_serializes_as_type() {
        let slot = &structural_order(&contract_case())[4];
        let json = serde_json::to_value(Section::from_slot(slot, 1200)).unwrap();
        assert_eq!(json["type"], "statement_of_facts");
        assert_eq!(json["wordTarget"], 1200);
        assert!(json.get("draft").is_none());
    }

    #[test]
    fn test_word_targets_toml_defaults() {
        let targets: WordTargets = toml::from_str("element_analysis = 600").unwrap();
        assert_eq!(targets.for_kind(SectionKind::ElementAnalysis), 600);
        assert_eq!(targets.for_kind(SectionKind::StatementOfFacts), 1200);
    }
}
