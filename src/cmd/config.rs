//! Configuration view and validation commands: `docket config`.

use anyhow::Result;
use docket::config::DocketConfig;
use std::path::Path;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config = DocketConfig::new(project_dir.to_path_buf())?;
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Docket Configuration");
            println!("====================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No docket.toml found at {}; using defaults.", config_path.display());
            }
            println!();

            let toml = &config.toml;
            println!("[executor]");
            println!("  time_unit_ms = {}", toml.executor.time_unit_ms);
            println!("  poll_interval_units = {}", toml.executor.poll_interval_units);
            println!("  max_poll_attempts = {}", toml.executor.max_poll_attempts);
            println!("  max_retries = {}", toml.executor.max_retries);
            println!();
            println!("[worker]");
            match &toml.worker.base_url {
                Some(url) => println!("  base_url = \"{}\"", url),
                None => println!("  base_url = (unset)"),
            }
            println!("  request_timeout_secs = {}", toml.worker.request_timeout_secs);
            println!();
            println!("[pipeline]");
            println!("  min_word_count = {}", toml.pipeline.min_word_count);
            println!();
            println!("[rubric]");
            match config.scorer() {
                Ok(scorer) => {
                    for criterion in scorer.rubric().criteria() {
                        println!("  {:<20} {}", criterion.kind.label(), criterion.weight);
                    }
                }
                Err(e) => println!("  invalid: {}", e),
            }
            println!();
            println!("[artifacts]");
            println!("  dir = {}", config.artifacts_dir().display());
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!(
                "  worker_url = {}",
                config.worker_url().unwrap_or_else(|| "(unset)".to_string())
            );
            println!("  worker_token = {}", if config.worker_token().is_some() { "(set)" } else { "(unset)" });
            println!("  time_unit = {:?}", config.executor_config().time_unit);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();
            let problems = config.validate();
            if problems.is_empty() {
                println!("Configuration is valid.");
                println!();
            } else {
                println!("Configuration problems:");
                for problem in &problems {
                    println!("  - {}", problem);
                }
                println!();
                anyhow::bail!("{} configuration problem(s)", problems.len());
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("docket.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            let path = config.init()?;
            println!("Created docket.toml at {}", path.display());
            println!();
            println!("You can now customize:");
            println!("  - [executor] timing and retry budget");
            println!("  - [worker] base_url, request_timeout_secs");
            println!("  - [pipeline] min_word_count and word_targets");
            println!("  - [[rubric.criteria]] weights (must sum to 100)");
            println!();
        }
    }

    Ok(())
}
