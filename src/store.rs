//! Persistence of phase artifacts keyed by case, phase and artifact kind.

use crate::errors::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    FactTimeline,
    ElementAnalysis,
    Outline,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::FactTimeline,
        ArtifactKind::ElementAnalysis,
        ArtifactKind::Outline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::FactTimeline => "fact_timeline",
            ArtifactKind::ElementAnalysis => "element_analysis",
            ArtifactKind::Outline => "outline",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactKey {
    pub case_id: String,
    pub phase_id: String,
    pub kind: ArtifactKind,
}

impl ArtifactKey {
    pub fn new(case_id: &str, phase_id: &str, kind: ArtifactKind) -> Self {
        Self {
            case_id: case_id.to_string(),
            phase_id: phase_id.to_string(),
            kind,
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.case_id, self.phase_id, self.kind)
    }
}

/// Storage backend for phase artifacts.
///
/// Failures surface as `OrchestratorError::Storage`, which is not retriable.
pub trait ArtifactStore: Send + Sync {
    /// Persist `value`, returning where it was written.
    fn save(&self, key: &ArtifactKey, value: &serde_json::Value) -> Result<String, OrchestratorError>;

    fn load(&self, key: &ArtifactKey) -> Result<Option<serde_json::Value>, OrchestratorError>;
}

/// Writes `<root>/<caseId>/<phaseId>/<kind>.json`.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.root
            .join(&key.case_id)
            .join(&key.phase_id)
            .join(format!("{}.json", key.kind))
    }
}

fn storage_err(action: &str, path: &Path, err: impl fmt::Display) -> OrchestratorError {
    OrchestratorError::Storage(format!("failed to {} {}: {}", action, path.display(), err))
}

impl ArtifactStore for FileArtifactStore {
    fn save(&self, key: &ArtifactKey, value: &serde_json::Value) -> Result<String, OrchestratorError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| storage_err("create", parent, e))?;
        }
        let content = serde_json::to_string_pretty(value).map_err(|e| storage_err("serialize", &path, e))?;
        std::fs::write(&path, content).map_err(|e| storage_err("write", &path, e))?;
        debug!(artifact = %key, path = %path.display(), "artifact saved");
        Ok(path.display().to_string())
    }

    fn load(&self, key: &ArtifactKey) -> Result<Option<serde_json::Value>, OrchestratorError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| storage_err("read", &path, e))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| storage_err("parse", &path, e))
    }
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    items: Mutex<HashMap<ArtifactKey, serde_json::Value>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn save(&self, key: &ArtifactKey, value: &serde_json::Value) -> Result<String, OrchestratorError> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| OrchestratorError::Storage("artifact store lock poisoned".into()))?;
        items.insert(key.clone(), value.clone());
        Ok(format!("memory://{}", key))
    }

    fn load(&self, key: &ArtifactKey) -> Result<Option<serde_json::Value>, OrchestratorError> {
        let items = self
            .items
            .lock()
            .map_err(|_| OrchestratorError::Storage("artifact store lock poisoned".into()))?;
        Ok(items.get(key).cloned())
    }
}
