use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "docket")]
#[command(version, about = "Phase workflow orchestration for case document production")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the phase graph, weights and execution waves
    Phases,
    /// Plan the outline for a case offline and score its structure
    Plan {
        /// Path to the case file (JSON)
        #[arg(short, long)]
        case: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drive a case through every phase
    Run {
        /// Path to the case file (JSON)
        #[arg(short, long)]
        case: PathBuf,

        /// Use the in-process scripted worker instead of the HTTP worker
        #[arg(long)]
        simulate: bool,

        /// Worker base URL. Overrides DOCKET_WORKER_URL and docket.toml
        #[arg(long)]
        worker_url: Option<String>,

        /// Length of one time unit in milliseconds (10 with --simulate)
        #[arg(long)]
        time_unit_ms: Option<u64>,

        /// UI output mode: full, minimal, json
        #[arg(long, default_value = "full")]
        ui: String,
    },
    /// Re-score a persisted outline against its case
    Score {
        #[arg(short, long)]
        case: PathBuf,

        /// Path to an outline artifact (outline.json)
        #[arg(short, long)]
        outline: PathBuf,
    },
    /// View, validate or initialise configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and list problems
    Validate,
    /// Write a default docket.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    docket::logging::init_tracing(cli.verbose, cli.json_logs)?;

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Phases => cmd::cmd_phases(&project_dir)?,
        Commands::Plan { case, json } => cmd::cmd_plan(&project_dir, case, *json)?,
        Commands::Run {
            case,
            simulate,
            worker_url,
            time_unit_ms,
            ui,
        } => {
            let options = cmd::run::RunOptions {
                simulate: *simulate,
                worker_url: worker_url.clone(),
                time_unit_ms: *time_unit_ms,
                ui: ui.clone(),
            };
            let ok = cmd::cmd_run(&cli, project_dir, case, options).await?;
            if !ok {
                std::process::exit(2);
            }
        }
        Commands::Score { case, outline } => cmd::cmd_score(&project_dir, case, outline)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
