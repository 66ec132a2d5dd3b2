//! Compliance scoring of a generated outline.
//!
//! A `Rubric` is a list of weighted criteria whose weights must sum to 100.
//! Each criterion evaluates to a satisfaction in `[0, 1]`; the score is the
//! weighted sum, so it always lies in `[0, 100]` and never decreases when a
//! criterion becomes more satisfied.
//!
//! The element-based criteria (evidence linkage, legal authority and element
//! coverage) are vacuously satisfied for a case that pleads no elements. An
//! outline that is missing fact-bearing or structural sections still loses
//! those points.

use crate::errors::RubricError;
use crate::pipeline::{CaseFile, Section, SectionKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// What a rubric criterion checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    /// Every required structural section is present
    RequiredSections,
    /// Fact-bearing sections carry factual allegations
    FactualAllegations,
    /// Element sections are linked to evidence
    EvidenceLinkage,
    /// Element sections cite legal authority
    LegalAuthority,
    /// Aggregate drafted word count meets the minimum
    WordCount,
    /// Every element of every cause of action is addressed
    ElementCoverage,
}

impl CriterionKind {
    pub fn label(&self) -> &'static str {
        match self {
            CriterionKind::RequiredSections => "required sections",
            CriterionKind::FactualAllegations => "factual allegations",
            CriterionKind::EvidenceLinkage => "evidence linkage",
            CriterionKind::LegalAuthority => "legal authority",
            CriterionKind::WordCount => "word count",
            CriterionKind::ElementCoverage => "element coverage",
        }
    }
}

impl fmt::Display for CriterionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One weighted rubric entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub kind: CriterionKind,
    pub weight: u32,
}

/// A validated set of criteria whose weights sum to 100.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rubric {
    criteria: Vec<Criterion>,
}

impl Rubric {
    pub fn new(criteria: Vec<Criterion>) -> Result<Self, RubricError> {
        if criteria.is_empty() {
            return Err(RubricError::Empty);
        }
        let mut seen = HashSet::new();
        for c in &criteria {
            if !seen.insert(c.kind) {
                return Err(RubricError::DuplicateCriterion(c.kind.label().to_string()));
            }
            if c.weight == 0 {
                return Err(RubricError::ZeroWeight(c.kind.label().to_string()));
            }
        }
        let total: u64 = criteria.iter().map(|c| u64::from(c.weight)).sum();
        if total != 100 {
            return Err(RubricError::WeightsDoNotSumTo100 { total });
        }
        Ok(Self { criteria })
    }

    /// The standard six-criterion rubric.
    pub fn standard() -> Self {
        use CriterionKind::*;
        Self {
            criteria: vec![
                Criterion { kind: RequiredSections, weight: 25 },
                Criterion { kind: FactualAllegations, weight: 15 },
                Criterion { kind: EvidenceLinkage, weight: 15 },
                Criterion { kind: LegalAuthority, weight: 15 },
                Criterion { kind: WordCount, weight: 15 },
                Criterion { kind: ElementCoverage, weight: 15 },
            ],
        }
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn total_weight(&self) -> u64 {
        self.criteria.iter().map(|c| u64::from(c.weight)).sum()
    }
}

impl Default for Rubric {
    fn default() -> Self {
        Self::standard()
    }
}

/// Outcome of one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionResult {
    pub kind: CriterionKind,
    pub weight: u32,
    /// Degree of satisfaction in `[0, 1]`
    pub satisfaction: f64,
    pub passed: bool,
    pub points: f64,
    pub detail: String,
}

/// The score of an outline plus per-criterion diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceScore {
    pub score: f64,
    pub criteria: Vec<CriterionResult>,
}

impl ComplianceScore {
    pub fn passed(&self, kind: CriterionKind) -> Option<bool> {
        self.criteria.iter().find(|c| c.kind == kind).map(|c| c.passed)
    }

    pub fn failed_criteria(&self) -> Vec<CriterionKind> {
        self.criteria
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.kind)
            .collect()
    }
}

/// Applies a rubric to sections and their originating case.
#[derive(Debug, Clone)]
pub struct ComplianceScorer {
    rubric: Rubric,
    min_word_count: usize,
}

impl Default for ComplianceScorer {
    fn default() -> Self {
        Self::new(Rubric::standard(), 2500)
    }
}

/// Fraction `hit / total`, treating an empty population as unsatisfied.
fn ratio(hit: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { hit as f64 / total as f64 }
}

impl ComplianceScorer {
    pub fn new(rubric: Rubric, min_word_count: usize) -> Self {
        Self {
            rubric,
            min_word_count,
        }
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    pub fn min_word_count(&self) -> usize {
        self.min_word_count
    }

    pub fn score(&self, sections: &[Section], case: &CaseFile) -> ComplianceScore {
        let criteria: Vec<CriterionResult> = self
            .rubric
            .criteria
            .iter()
            .map(|c| {
                let (satisfaction, detail) = self.evaluate(c.kind, sections, case);
                let satisfaction = satisfaction.clamp(0.0, 1.0);
                CriterionResult {
                    kind: c.kind,
                    weight: c.weight,
                    satisfaction,
                    passed: satisfaction >= 1.0,
                    points: c.weight as f64 * satisfaction,
                    detail,
                }
            })
            .collect();
        let score = criteria.iter().map(|c| c.points).sum::<f64>().clamp(0.0, 100.0);
        ComplianceScore { score, criteria }
    }

    fn evaluate(&self, kind: CriterionKind, sections: &[Section], case: &CaseFile) -> (f64, String) {
        let elements: Vec<&Section> = sections
            .iter()
            .filter(|s| s.kind == SectionKind::ElementAnalysis)
            .collect();

        let element_based = matches!(
            kind,
            CriterionKind::EvidenceLinkage | CriterionKind::LegalAuthority | CriterionKind::ElementCoverage
        );
        if element_based && case.element_count() == 0 {
            return (1.0, "case pleads no elements".to_string());
        }

        match kind {
            CriterionKind::RequiredSections => {
                let required = required_kinds(case);
                let present: HashSet<SectionKind> = sections.iter().map(|s| s.kind).collect();
                let missing: Vec<&str> = required
                    .iter()
                    .filter(|k| !present.contains(k))
                    .map(|k| k.label())
                    .collect();
                let hit = required.len() - missing.len();
                let detail = if missing.is_empty() {
                    format!("all {} required sections present", required.len())
                } else {
                    format!("missing: {}", missing.join(", "))
                };
                (ratio(hit, required.len()), detail)
            }
            CriterionKind::FactualAllegations => {
                let bearing: Vec<&Section> = sections
                    .iter()
                    .filter(|s| matches!(s.kind, SectionKind::StatementOfFacts | SectionKind::ElementAnalysis))
                    .collect();
                let hit = bearing.iter().filter(|s| s.has_facts()).count();
                (ratio(hit, bearing.len()), format!("{}/{} sections allege facts", hit, bearing.len()))
            }
            CriterionKind::EvidenceLinkage => {
                let hit = elements.iter().filter(|s| s.has_evidence()).count();
                (
                    ratio(hit, elements.len()),
                    format!("{}/{} element sections linked to evidence", hit, elements.len()),
                )
            }
            CriterionKind::LegalAuthority => {
                let hit = elements.iter().filter(|s| !s.citations().is_empty()).count();
                (
                    ratio(hit, elements.len()),
                    format!("{}/{} element sections cite authority", hit, elements.len()),
                )
            }
            CriterionKind::WordCount => {
                let words: usize = sections.iter().map(Section::word_count).sum();
                let met = words >= self.min_word_count;
                (
                    if met { 1.0 } else { 0.0 },
                    format!("{} words (minimum {})", words, self.min_word_count),
                )
            }
            CriterionKind::ElementCoverage => {
                let total = case.element_count();
                let addressed = case
                    .causes_of_action
                    .iter()
                    .flat_map(|c| c.elements.iter().map(move |e| (c.id.as_str(), e.id.as_str())))
                    .filter(|(cause, element)| {
                        elements.iter().any(|s| {
                            s.cause_id.as_deref() == Some(*cause)
                                && s.element_id.as_deref() == Some(*element)
                                && s.has_facts()
                        })
                    })
                    .count();
                (ratio(addressed, total), format!("{}/{} elements addressed", addressed, total))
            }
        }
    }
}

/// Structural sections every outline for `case` must contain.
fn required_kinds(case: &CaseFile) -> Vec<SectionKind> {
    let mut kinds = vec![
        SectionKind::Caption,
        SectionKind::Introduction,
        SectionKind::JurisdictionVenue,
        SectionKind::Parties,
        SectionKind::StatementOfFacts,
    ];
    if !case.causes_of_action.is_empty() {
        kinds.push(SectionKind::CauseOfAction);
    }
    kinds.push(SectionKind::PrayerForRelief);
    if case.jury_demand {
        kinds.push(SectionKind::JuryDemand);
    }
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::case::fixtures::contract_case;
    use crate::pipeline::{FactEvidencePool, SectionDraft, SectionPipeline};

    fn planned() -> (Vec<Section>, CaseFile) {
        let case = contract_case();
        let mut pool = FactEvidencePool::from_case(&case);
        let sections = SectionPipeline::default().run(&case, &mut pool, |_| {}).unwrap();
        (sections, case)
    }

    fn draft_all(sections: &mut [Section], words_each: usize, cite: bool) {
        for s in sections.iter_mut() {
            s.draft = Some(SectionDraft {
                section_id: s.section_id.clone(),
                text: vec!["word"; words_each].join(" "),
                citations: if cite { s.authorities.clone() } else { vec![] },
            });
        }
    }

    #[test]
    fn test_standard_rubric_sums_to_100() {
        assert_eq!(Rubric::standard().total_weight(), 100);
        assert_eq!(Rubric::standard().criteria().len(), 6);
    }

    #[test]
    fn test_rubric_validation() {
        let err = Rubric::new(vec![Criterion {
            kind: CriterionKind::WordCount,
            weight: 90,
        }])
        .unwrap_err();
        assert!(matches!(err, RubricError::WeightsDoNotSumTo100 { total: 90 }));

        assert!(matches!(Rubric::new(vec![]), Err(RubricError::Empty)));

        let dup = Rubric::new(vec![
            Criterion { kind: CriterionKind::WordCount, weight: 50 },
            Criterion { kind: CriterionKind::WordCount, weight: 50 },
        ]);
        assert!(matches!(dup, Err(RubricError::DuplicateCriterion(_))));

        let custom = Rubric::new(vec![
            Criterion { kind: CriterionKind::RequiredSections, weight: 60 },
            Criterion { kind: CriterionKind::ElementCoverage, weight: 40 },
        ]);
        assert!(custom.is_ok());
    }

    #[test]
    fn test_rubric_rejects_zero_weight_criterion() {
        let err = Rubric::new(vec![
            Criterion { kind: CriterionKind::RequiredSections, weight: 100 },
            Criterion { kind: CriterionKind::WordCount, weight: 0 },
        ])
        .unwrap_err();
        assert!(matches!(err, RubricError::ZeroWeight(ref label) if label == CriterionKind::WordCount.label()));
    }

    #[test]
    fn test_rubric_oversized_weights_report_total() {
        let err = Rubric::new(vec![
            Criterion { kind: CriterionKind::RequiredSections, weight: u32::MAX },
            Criterion { kind: CriterionKind::WordCount, weight: 101 },
        ])
        .unwrap_err();
        let expected = u64::from(u32::MAX) + 101;
        assert!(matches!(err, RubricError::WeightsDoNotSumTo100 { total } if total == expected));
    }

    #[test]
    fn test_undrafted_outline_scores_structure_only() {
        let (sections, case) = planned();
        let score = ComplianceScorer::default().score(&sections, &case);

        assert_eq!(score.passed(CriterionKind::RequiredSections), Some(true));
        assert_eq!(score.passed(CriterionKind::FactualAllegations), Some(true));
        assert_eq!(score.passed(CriterionKind::ElementCoverage), Some(true));
        assert_eq!(score.passed(CriterionKind::LegalAuthority), Some(false));
        assert_eq!(score.passed(CriterionKind::WordCount), Some(false));
        // existence and damages carry evidence, breach references E1
        assert_eq!(score.passed(CriterionKind::EvidenceLinkage), Some(true));
        assert!((score.score - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_fully_drafted_outline_scores_100() {
        let (mut sections, case) = planned();
        draft_all(&mut sections, 300, true);
        let score = ComplianceScorer::default().score(&sections, &case);
        assert!((score.score - 100.0).abs() < 1e-9, "{:?}", score.failed_criteria());
    }

    #[test]
    fn test_score_is_monotonic_in_satisfaction() {
        let (mut sections, case) = planned();
        let scorer = ComplianceScorer::default();
        let base = scorer.score(&sections, &case).score;

        draft_all(&mut sections, 10, true);
        let with_citations = scorer.score(&sections, &case).score;
        assert!(with_citations >= base);

        draft_all(&mut sections, 300, true);
        let with_words = scorer.score(&sections, &case).score;
        assert!(with_words >= with_citations);
    }

    #[test]
    fn test_score_stays_in_range() {
        let case = contract_case();
        let scorer = ComplianceScorer::default();
        let empty = scorer.score(&[], &case);
        assert_eq!(empty.score, 0.0);
        assert!(empty.criteria.iter().all(|c| !c.passed));

        let (sections, _) = planned();
        let partial = scorer.score(&sections[..3], &case);
        assert!(partial.score >= 0.0 && partial.score <= 100.0);
        assert!(partial.criteria.iter().all(|c| (0.0..=1.0).contains(&c.satisfaction)));
    }

    #[test]
    fn test_case_without_causes_keeps_element_points() {
        let mut case = contract_case();
        case.causes_of_action.clear();
        let mut pool = FactEvidencePool::from_case(&case);
        let mut sections = SectionPipeline::default().run(&case, &mut pool, |_| {}).unwrap();
        draft_all(&mut sections, 400, true);

        let score = ComplianceScorer::default().score(&sections, &case);
        for kind in [
            CriterionKind::ElementCoverage,
            CriterionKind::EvidenceLinkage,
            CriterionKind::LegalAuthority,
        ] {
            assert_eq!(score.passed(kind), Some(true), "{:?}", kind);
        }
        assert!((score.score - 100.0).abs() < 1e-9, "{:?}", score.failed_criteria());
    }

    #[test]
    fn test_missing_sections_are_reported() {
        let (sections, case) = planned();
        let without_prayer: Vec<Section> = sections
            .into_iter()
            .filter(|s| s.kind != SectionKind::PrayerForRelief)
            .collect();
        let score = ComplianceScorer::default().score(&without_prayer, &case);
        let required = score
            .criteria
            .iter()
            .find(|c| c.kind == CriterionKind::RequiredSections)
            .unwrap();
        assert!(!required.passed);
        assert!(required.detail.contains("Prayer for Relief"));
        assert!((required.satisfaction - 7.0 / 8.0).abs() < 1e-9);
    }
}
