//! Phase definitions for the document-production workflow.
//!
//! This module provides:
//! - `PhaseDefinition` describing one node of the workflow graph
//! - `Series` grouping phases into preproduction, production and postproduction
//! - `standard_phases()` with the fixed seven-phase table
//! - `PhasesFile` for loading and saving phase tables as JSON

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Id of the phase that runs the nested section generation pipeline.
pub const OUTLINE_PHASE_ID: &str = "A03";

/// Grouping of phases by production stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Series {
    /// Preproduction
    A,
    /// Production
    B,
    /// Postproduction
    C,
}

impl Series {
    pub const ALL: [Series; 3] = [Series::A, Series::B, Series::C];

    pub fn label(&self) -> &'static str {
        match self {
            Series::A => "preproduction",
            Series::B => "production",
            Series::C => "postproduction",
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Series::A => "A",
            Series::B => "B",
            Series::C => "C",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Series {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(Series::A),
            "B" => Ok(Series::B),
            "C" => Ok(Series::C),
            _ => anyhow::bail!("Invalid series '{}'. Valid values: A, B, C", s),
        }
    }
}

/// One immutable node of the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDefinition {
    /// Short code (e.g., "A01")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Share of overall progress; all weights sum to 100
    pub weight: u32,
    /// Production stage this phase belongs to
    pub series_id: Series,
    /// Ids of phases that must complete first
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl PhaseDefinition {
    pub fn new(id: &str, name: &str, weight: u32, series_id: Series, depends_on: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            weight,
            series_id,
            depends_on,
        }
    }

    /// Whether this phase runs the section generation pipeline.
    pub fn is_outline_phase(&self) -> bool {
        self.id == OUTLINE_PHASE_ID
    }
}

/// The fixed seven-phase production workflow.
pub fn standard_phases() -> Vec<PhaseDefinition> {
    vec![
        PhaseDefinition::new("A01", "Case intake", 10, Series::A, vec![]),
        PhaseDefinition::new("A02", "Legal research", 20, Series::A, vec!["A01".into()]),
        PhaseDefinition::new("A03", "Outline production", 20, Series::A, vec!["A02".into()]),
        PhaseDefinition::new("B01", "Outline review", 10, Series::B, vec!["A03".into()]),
        PhaseDefinition::new("B02", "Drafting", 20, Series::B, vec!["B01".into()]),
        PhaseDefinition::new("C01", "Editing", 10, Series::C, vec!["B02".into()]),
        PhaseDefinition::new("C02", "Final orchestration", 10, Series::C, vec!["C01".into()]),
    ]
}

/// A phase table stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasesFile {
    pub phases: Vec<PhaseDefinition>,
}

impl PhasesFile {
    /// Load phases from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read phases file: {}", path.display()))?;

        let phases_file: PhasesFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse phases JSON: {}", path.display()))?;

        Ok(phases_file)
    }

    /// Save phases to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize phases to JSON")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write phases file: {}", path.display()))?;

        Ok(())
    }

    /// Get a specific phase by id.
    pub fn get_phase(&self, id: &str) -> Option<&PhaseDefinition> {
        self.phases.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_standard_weights_sum_to_100() {
        let total: u32 = standard_phases().iter().map(|p| p.weight).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_standard_has_seven_phases_in_all_series() {
        let phases = standard_phases();
        assert_eq!(phases.len(), 7);
        for series in Series::ALL {
            assert!(phases.iter().any(|p| p.series_id == series));
        }
    }

    #[test]
    fn test_outline_phase_flag() {
        let phases = standard_phases();
        let outline: Vec<_> = phases.iter().filter(|p| p.is_outline_phase()).collect();
        assert_eq!(outline.len(), 1);
        assert_eq!(outline[0].id, "A03");
    }

    #[test]
    fn test_series_parse() {
        assert_eq!("b".parse::<Series>().unwrap(), Series::B);
        assert!("D".parse::<Series>().is_err());
    }

    #[test]
    fn test_phases_file_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phases.json");
        let file = PhasesFile {
            phases: standard_phases(),
        };
        file.save(&path).unwrap();

        let loaded = PhasesFile::load(&path).unwrap();
        assert_eq!(loaded.phases, file.phases);
        assert_eq!(loaded.get_phase("B02").unwrap().name, "Drafting");
        assert!(loaded.get_phase("Z99").is_none());
    }

    #[test]
    fn test_phases_file_uses_camel_case() {
        let json = serde_json::to_string(&standard_phases()[1]).unwrap();
        assert!(json.contains("\"seriesId\":\"A\""));
        assert!(json.contains("\"dependsOn\":[\"A01\"]"));
    }
}
