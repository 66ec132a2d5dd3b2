//! Configuration for docket, read from `.docket/docket.toml`.
//!
//! Layered: file → environment → CLI. Every field has a default, so a missing
//! or partial file is fine.
//!
//! # Configuration File Format
//!
//! ```toml
//! [executor]
//! time_unit_ms = 1000
//! poll_interval_units = 5
//! max_poll_attempts = 60
//! max_retries = 3
//!
//! [worker]
//! base_url = "http://localhost:8700/api/"
//! request_timeout_secs = 30
//!
//! [pipeline]
//! min_word_count = 2500
//!
//! [pipeline.word_targets]
//! statement_of_facts = 1500
//!
//! [[rubric.criteria]]
//! kind = "required_sections"
//! weight = 40
//!
//! [[rubric.criteria]]
//! kind = "element_coverage"
//! weight = 60
//!
//! [artifacts]
//! dir = "artifacts"
//! ```
//!
//! Environment overrides: `DOCKET_WORKER_URL`, `DOCKET_WORKER_TOKEN`,
//! `DOCKET_TIME_UNIT_MS`.

use crate::compliance::{ComplianceScorer, Criterion, Rubric};
use crate::errors::RubricError;
use crate::executor::{
    DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL_UNITS, DEFAULT_TIME_UNIT_MS,
    ExecutorConfig,
};
use crate::pipeline::{SectionPipeline, WordTargets};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const ENV_WORKER_URL: &str = "DOCKET_WORKER_URL";
pub const ENV_WORKER_TOKEN: &str = "DOCKET_WORKER_TOKEN";
pub const ENV_TIME_UNIT_MS: &str = "DOCKET_TIME_UNIT_MS";

/// Timing of phase execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSection {
    #[serde(default = "default_time_unit_ms")]
    pub time_unit_ms: u64,
    #[serde(default = "default_poll_interval_units")]
    pub poll_interval_units: u32,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_time_unit_ms() -> u64 {
    DEFAULT_TIME_UNIT_MS
}

fn default_poll_interval_units() -> u32 {
    DEFAULT_POLL_INTERVAL_UNITS
}

fn default_max_poll_attempts() -> u32 {
    DEFAULT_MAX_POLL_ATTEMPTS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            time_unit_ms: default_time_unit_ms(),
            poll_interval_units: default_poll_interval_units(),
            max_poll_attempts: default_max_poll_attempts(),
            max_retries: default_max_retries(),
        }
    }
}

/// Connection to the external phase worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Bearer token; prefer `DOCKET_WORKER_TOKEN` over storing it here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            api_token: None,
        }
    }
}

/// Section pipeline and scoring thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,
    #[serde(default)]
    pub word_targets: WordTargets,
}

fn default_min_word_count() -> usize {
    2500
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            min_word_count: default_min_word_count(),
            word_targets: WordTargets::default(),
        }
    }
}

/// Rubric override. Empty means the standard rubric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RubricSection {
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactsSection {
    /// Relative paths resolve against `.docket/`
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

impl Default for ArtifactsSection {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
        }
    }
}

/// Parsed `docket.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocketToml {
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub rubric: RubricSection,
    #[serde(default)]
    pub artifacts: ArtifactsSection,
}

impl DocketToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse docket.toml")
    }

    /// Load `docket.toml` from `docket_dir`, or defaults if it does not exist.
    pub fn load_or_default(docket_dir: &Path) -> Result<Self> {
        let path = docket_dir.join("docket.toml");
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize docket.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Worker URL (env → file).
    pub fn worker_url(&self) -> Option<String> {
        std::env::var(ENV_WORKER_URL)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.worker.base_url.clone())
    }

    /// Worker token (env → file).
    pub fn worker_token(&self) -> Option<String> {
        std::env::var(ENV_WORKER_TOKEN)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.worker.api_token.clone())
    }

    /// Time unit in milliseconds (env → file). An unparsable env value is ignored.
    pub fn time_unit_ms(&self) -> u64 {
        std::env::var(ENV_TIME_UNIT_MS)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.executor.time_unit_ms)
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::default()
            .with_time_unit(Duration::from_millis(self.time_unit_ms()))
            .with_poll_interval_units(self.executor.poll_interval_units)
            .with_max_poll_attempts(self.executor.max_poll_attempts)
            .with_max_retries(self.executor.max_retries)
    }

    pub fn rubric(&self) -> Result<Rubric, RubricError> {
        if self.rubric.criteria.is_empty() {
            Ok(Rubric::standard())
        } else {
            Rubric::new(self.rubric.criteria.clone())
        }
    }

    pub fn scorer(&self) -> Result<ComplianceScorer, RubricError> {
        Ok(ComplianceScorer::new(self.rubric()?, self.pipeline.min_word_count))
    }

    pub fn section_pipeline(&self) -> SectionPipeline {
        SectionPipeline::new(
            Arc::new(crate::pipeline::KeywordRelevance),
            self.pipeline.word_targets.clone(),
        )
    }

    /// Problems that make the configuration unusable, as messages.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.executor.time_unit_ms == 0 {
            errors.push("executor.time_unit_ms must be greater than 0".to_string());
        }
        if self.executor.poll_interval_units == 0 {
            errors.push("executor.poll_interval_units must be greater than 0".to_string());
        }
        if self.executor.max_poll_attempts == 0 {
            errors.push("executor.max_poll_attempts must be greater than 0".to_string());
        }
        if self.worker.request_timeout_secs == 0 {
            errors.push("worker.request_timeout_secs must be greater than 0".to_string());
        }
        if let Some(url) = &self.worker.base_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            errors.push(format!("worker.base_url '{}' must be an http(s) URL", url));
        }
        if let Err(e) = self.rubric() {
            errors.push(format!("rubric: {}", e));
        }

        errors
    }
}

/// Resolved configuration for one project directory.
#[derive(Debug, Clone)]
pub struct DocketConfig {
    pub project_dir: PathBuf,
    pub docket_dir: PathBuf,
    pub toml: DocketToml,
    /// CLI override for the worker URL
    pub cli_worker_url: Option<String>,
}

impl DocketConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let docket_dir = project_dir.join(".docket");
        let toml = DocketToml::load_or_default(&docket_dir)?;

        Ok(Self {
            project_dir,
            docket_dir,
            toml,
            cli_worker_url: None,
        })
    }

    pub fn with_cli_args(project_dir: PathBuf, worker_url: Option<String>) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.cli_worker_url = worker_url;
        Ok(config)
    }

    pub fn config_file(&self) -> PathBuf {
        self.docket_dir.join("docket.toml")
    }

    /// Optional phase definitions overriding the standard graph.
    pub fn phases_file(&self) -> PathBuf {
        self.docket_dir.join("phases.json")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        if self.toml.artifacts.dir.is_absolute() {
            self.toml.artifacts.dir.clone()
        } else {
            self.docket_dir.join(&self.toml.artifacts.dir)
        }
    }

    /// Worker URL (CLI → env → file).
    pub fn worker_url(&self) -> Option<String> {
        self.cli_worker_url.clone().or_else(|| self.toml.worker_url())
    }

    pub fn worker_token(&self) -> Option<String> {
        self.toml.worker_token()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.toml.worker.request_timeout_secs)
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        self.toml.executor_config()
    }

    pub fn scorer(&self) -> Result<ComplianceScorer, RubricError> {
        self.toml.scorer()
    }

    pub fn section_pipeline(&self) -> SectionPipeline {
        self.toml.section_pipeline()
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }

    /// Write a default `docket.toml` unless one exists. Returns its path.
    pub fn init(&self) -> Result<PathBuf> {
        let path = self.config_file();
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        std::fs::create_dir_all(&self.docket_dir)
            .with_context(|| format!("Failed to create {}", self.docket_dir.display()))?;
        DocketToml::default().save(&path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::CriterionKind;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults() {
        let toml = DocketToml::default();
        assert_eq!(toml.executor.time_unit_ms, 1000);
        assert_eq!(toml.executor.poll_interval_units, 5);
        assert_eq!(toml.executor.max_poll_attempts, 60);
        assert_eq!(toml.executor.max_retries, 3);
        assert_eq!(toml.pipeline.min_word_count, 2500);
        assert_eq!(toml.artifacts.dir, PathBuf::from("artifacts"));
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let toml = DocketToml::parse(
            r#"
[executor]
max_retries = 5

[pipeline.word_targets]
statement_of_facts = 1500
"#,
        )
        .unwrap();
        assert_eq!(toml.executor.max_retries, 5);
        assert_eq!(toml.executor.poll_interval_units, 5);
        assert_eq!(toml.pipeline.word_targets.statement_of_facts, 1500);
        assert_eq!(toml.pipeline.word_targets.caption, 50);
    }

    #[test]
    fn test_rubric_override() {
        let toml = DocketToml::parse(
            r#"
[[rubric.criteria]]
kind = "required_sections"
weight = 40

[[rubric.criteria]]
kind = "element_coverage"
weight = 60
"#,
        )
        .unwrap();
        let rubric = toml.rubric().unwrap();
        assert_eq!(rubric.criteria().len(), 2);
        assert_eq!(rubric.criteria()[1].kind, CriterionKind::ElementCoverage);
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_invalid_rubric_is_reported() {
        let toml = DocketToml::parse(
            r#"
[[rubric.criteria]]
kind = "word_count"
weight = 30
"#,
        )
        .unwrap();
        assert!(toml.rubric().is_err());
        let errors = toml.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("rubric:"));
    }

    #[test]
    fn test_validate_rejects_zero_timing_and_bad_url() {
        let mut toml = DocketToml::default();
        toml.executor.poll_interval_units = 0;
        toml.worker.base_url = Some("ftp://example".into());
        assert_eq!(toml.validate().len(), 2);
    }

    #[test]
    fn test_env_overrides_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved_url = std::env::var(ENV_WORKER_URL).ok();
        let saved_unit = std::env::var(ENV_TIME_UNIT_MS).ok();

        let mut toml = DocketToml::default();
        toml.worker.base_url = Some("http://file".into());

        unsafe { std::env::remove_var(ENV_WORKER_URL) };
        unsafe { std::env::remove_var(ENV_TIME_UNIT_MS) };
        assert_eq!(toml.worker_url().as_deref(), Some("http://file"));
        assert_eq!(toml.time_unit_ms(), 1000);

        unsafe { std::env::set_var(ENV_WORKER_URL, "http://env") };
        unsafe { std::env::set_var(ENV_TIME_UNIT_MS, "10") };
        assert_eq!(toml.worker_url().as_deref(), Some("http://env"));
        assert_eq!(toml.executor_config().time_unit, Duration::from_millis(10));
        assert_eq!(toml.executor_config().poll_interval(), Duration::from_millis(50));

        unsafe { std::env::set_var(ENV_TIME_UNIT_MS, "fast") };
        assert_eq!(toml.time_unit_ms(), 1000);

        unsafe { std::env::remove_var(ENV_WORKER_URL) };
        unsafe { std::env::remove_var(ENV_TIME_UNIT_MS) };
        if let Some(v) = saved_url {
            unsafe { std::env::set_var(ENV_WORKER_URL, v) };
        }
        if let Some(v) = saved_unit {
            unsafe { std::env::set_var(ENV_TIME_UNIT_MS, v) };
        }
    }

    #[test]
    fn test_init_and_reload() {
        let dir = tempdir().unwrap();
        let config = DocketConfig::new(dir.path().to_path_buf()).unwrap();
        let path = config.init().unwrap();
        assert!(path.exists());
        assert!(config.init().is_err());

        let reloaded = DocketConfig::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(reloaded.toml, DocketToml::default());
        assert!(reloaded.artifacts_dir().ends_with(".docket/artifacts"));
    }

    #[test]
    fn test_cli_worker_url_wins() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let dir = tempdir().unwrap();
        let config =
            DocketConfig::with_cli_args(dir.path().to_path_buf(), Some("http://cli".into())).unwrap();
        assert_eq!(config.worker_url().as_deref(), Some("http://cli"));
    }
}
