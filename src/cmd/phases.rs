//! Phase graph listing: `docket phases`.

use anyhow::Result;
use console::style;
use std::path::Path;

pub fn cmd_phases(project_dir: &Path) -> Result<()> {
    let graph = super::load_graph(project_dir)?;

    println!();
    println!("{}", style("Phases").bold());
    println!("======");
    println!("{:<5} {:<22} {:<7} {:>6}  Depends on", "Id", "Name", "Series", "Weight");
    for phase in graph.phases() {
        let deps = if phase.depends_on.is_empty() {
            "-".to_string()
        } else {
            phase.depends_on.join(", ")
        };
        println!(
            "{:<5} {:<22} {:<7} {:>6}  {}",
            style(&phase.id).cyan(),
            phase.name,
            phase.series_id.to_string(),
            phase.weight,
            deps
        );
    }
    println!("Total weight: {}", graph.total_weight());

    println!();
    println!("{}", style("Execution waves").bold());
    for (i, wave) in graph.compute_waves().iter().enumerate() {
        println!("  Wave {}: {}", i, wave.join(", "));
    }
    println!();
    Ok(())
}
