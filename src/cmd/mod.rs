//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `phases`  | `Phases`         |
//! | `plan`    | `Plan`, `Score`  |
//! | `run`     | `Run`            |
//! | `config`  | `Config`         |

pub mod config;
pub mod phases;
pub mod plan;
pub mod run;

pub use config::cmd_config;
pub use phases::cmd_phases;
pub use plan::{cmd_plan, cmd_score};
pub use run::cmd_run;

use anyhow::{Context, Result};
use docket::dag::WorkflowGraph;
use docket::phase::PhasesFile;
use std::path::Path;

/// The project's phase graph: `.docket/phases.json` if present, else the
/// standard seven phases.
pub(crate) fn load_graph(project_dir: &Path) -> Result<WorkflowGraph> {
    let path = project_dir.join(".docket").join("phases.json");
    if path.exists() {
        let file = PhasesFile::load(&path)?;
        WorkflowGraph::from_phases(file.phases)
            .with_context(|| format!("Invalid phase graph in {}", path.display()))
    } else {
        WorkflowGraph::standard().context("Invalid standard phase graph")
    }
}
