//! Workflow execution: `docket run`.

use anyhow::{Context, Result};
use docket::config::DocketConfig;
use docket::executor::{OutlineStage, PhaseExecutor};
use docket::notify::EventNotifier;
use docket::orchestrator::{Orchestrator, WorkflowSummary};
use docket::pipeline::CaseFile;
use docket::store::FileArtifactStore;
use docket::ui::{UiMode, WorkflowUI};
use docket::worker::{HttpPhaseWorker, ScriptedWorker};
use docket_common::PhaseWorker;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::super::Cli;

/// Time unit of a simulated run unless one is given explicitly.
const SIMULATED_TIME_UNIT_MS: u64 = 10;

pub struct RunOptions {
    pub simulate: bool,
    pub worker_url: Option<String>,
    pub time_unit_ms: Option<u64>,
    pub ui: String,
}

/// Drive one case to a settled state. Returns whether every phase completed.
pub async fn cmd_run(cli: &Cli, project_dir: PathBuf, case_path: &Path, options: RunOptions) -> Result<bool> {
    let config = DocketConfig::with_cli_args(project_dir.clone(), options.worker_url.clone())?;
    let problems = config.validate();
    if !problems.is_empty() {
        anyhow::bail!("Invalid configuration:\n  - {}", problems.join("\n  - "));
    }
    let mode: UiMode = options.ui.parse()?;
    let case = CaseFile::load(case_path)?;
    let case_id = case.case_id.clone();

    let worker: Arc<dyn PhaseWorker> = if options.simulate {
        Arc::new(ScriptedWorker::default())
    } else {
        let url = config
            .worker_url()
            .context("No worker URL: pass --worker-url, set DOCKET_WORKER_URL, or use --simulate")?;
        Arc::new(HttpPhaseWorker::new(&url, config.request_timeout(), config.worker_token())?)
    };

    let mut executor_config = config.executor_config();
    match options.time_unit_ms {
        Some(ms) => executor_config = executor_config.with_time_unit(Duration::from_millis(ms)),
        None if options.simulate => {
            executor_config = executor_config.with_time_unit(Duration::from_millis(SIMULATED_TIME_UNIT_MS))
        }
        None => {}
    }

    let artifacts_dir = config.artifacts_dir();
    let outline = OutlineStage::new(
        config.section_pipeline(),
        config.scorer().context("Invalid rubric in docket.toml")?,
        Arc::new(FileArtifactStore::new(&artifacts_dir)),
    );
    let executor = PhaseExecutor::new(worker, executor_config).with_outline_stage(outline);

    let graph = Arc::new(super::load_graph(&project_dir)?);
    let notifier = EventNotifier::default();
    let ui = WorkflowUI::new(&graph, mode, cli.verbose);
    let mut events = notifier.subscribe();
    let _log_sink = notifier.spawn_log_sink();

    let orchestrator = Orchestrator::new(graph, executor, notifier).with_phase_config(json!({
        "jurisdiction": case.jurisdiction,
        "juryDemand": case.jury_demand,
    }));
    orchestrator.open_case(case).await?;
    info!(case_id = %case_id, simulate = options.simulate, "starting workflow");

    let drive = orchestrator.drive(&case_id);
    tokio::pin!(drive);
    let summary: WorkflowSummary = loop {
        tokio::select! {
            result = &mut drive => break result?,
            event = events.recv() => match event {
                Ok(event) => ui.handle_event(&event),
                Err(_) => {}
            },
        }
    };
    while let Ok(event) = events.try_recv() {
        ui.handle_event(&event);
    }

    ui.finish(&summary);
    if mode != UiMode::Json && summary.completed.iter().any(|id| id == docket::phase::OUTLINE_PHASE_ID) {
        println!("Artifacts: {}", artifacts_dir.join(&case_id).display());
    }
    Ok(summary.is_complete())
}
