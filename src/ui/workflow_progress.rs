//! Terminal rendering of a running workflow.
//!
//! `WorkflowUI` consumes the `WorkflowEvent` stream of one case. Output modes:
//! - `full`: a weighted overall bar plus one bar per active phase
//! - `minimal`: one line per phase status change
//! - `json`: each event as a JSON line on stdout

use crate::dag::WorkflowGraph;
use crate::orchestrator::WorkflowSummary;
use crate::ui::icons::{BLOCKER, CANCELLED, CHECK, CROSS, PAUSED, RUNNING, SECTION, SPARKLE};
use console::{Term, style};
use docket_common::{PhaseStatus, WorkflowEvent};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Output mode for the workflow UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    #[default]
    Full,
    Minimal,
    Json,
}

impl std::str::FromStr for UiMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "minimal" => Ok(Self::Minimal),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Invalid UI mode '{}'. Valid values: full, minimal, json", s),
        }
    }
}

#[derive(Debug)]
struct PhaseView {
    name: String,
    weight: u32,
    status: PhaseStatus,
    progress: u8,
    bar: Option<ProgressBar>,
}

impl PhaseView {
    fn effective_progress(&self) -> u32 {
        match self.status {
            PhaseStatus::Completed => 100,
            PhaseStatus::Active => self.progress as u32,
            _ => 0,
        }
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

pub struct WorkflowUI {
    mode: UiMode,
    multi: MultiProgress,
    header_bar: ProgressBar,
    phases: Mutex<HashMap<String, PhaseView>>,
    /// Phase ids in graph order
    order: Vec<String>,
    total_weight: u64,
    verbose: bool,
    term: Term,
}

impl WorkflowUI {
    pub fn new(graph: &WorkflowGraph, mode: UiMode, verbose: bool) -> Self {
        let multi = MultiProgress::new();
        if mode != UiMode::Full {
            multi.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        }

        let header_bar = multi.add(ProgressBar::new(100));
        header_bar.set_style(bar_style("{prefix:.bold} [{bar:40.cyan/blue}] {pos}% {msg}"));
        header_bar.set_prefix("Workflow");
        header_bar.set_message("starting");

        let phases = graph
            .phases()
            .iter()
            .map(|p| {
                (
                    p.id.clone(),
                    PhaseView {
                        name: p.name.clone(),
                        weight: p.weight,
                        status: PhaseStatus::Pending,
                        progress: 0,
                        bar: None,
                    },
                )
            })
            .collect();

        Self {
            mode,
            multi,
            header_bar,
            phases: Mutex::new(phases),
            order: graph.phases().iter().map(|p| p.id.clone()).collect(),
            total_weight: graph.total_weight(),
            verbose,
            term: Term::stdout(),
        }
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    /// Weighted overall progress of the phases seen so far, 0-100.
    pub fn overall_progress(&self) -> f64 {
        let Ok(phases) = self.phases.lock() else {
            return 0.0;
        };
        if self.total_weight == 0 {
            return 0.0;
        }
        let weighted: u64 = phases
            .values()
            .map(|p| u64::from(p.weight) * u64::from(p.effective_progress()))
            .sum();
        weighted as f64 / self.total_weight as f64
    }

    pub fn handle_event(&self, event: &WorkflowEvent) {
        let changed = self.record(event);
        match self.mode {
            UiMode::Json => self.handle_json(event),
            UiMode::Minimal => {
                if changed {
                    self.handle_minimal(event)
                }
            }
            UiMode::Full => self.handle_full(event, changed),
        }
    }

    /// Apply an event to the phase table; true when the status changed.
    fn record(&self, event: &WorkflowEvent) -> bool {
        let Ok(mut phases) = self.phases.lock() else {
            return false;
        };
        let Some(view) = phases.get_mut(&event.phase_id) else {
            return false;
        };
        let changed = view.status != event.status;
        view.status = event.status;
        view.progress = view.progress.max(event.progress);
        changed
    }

    fn handle_json(&self, event: &WorkflowEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(&self.term, "{}", json);
        }
    }

    fn handle_minimal(&self, event: &WorkflowEvent) {
        if event.section_id.is_some() {
            return;
        }
        let line = match event.status {
            PhaseStatus::Active => format!("> {} started", event.phase_id),
            PhaseStatus::Paused => format!("|| {} paused", event.phase_id),
            PhaseStatus::Completed => format!("✓ {}", event.phase_id),
            PhaseStatus::Error => format!("✗ {} ({})", event.phase_id, event.message),
            PhaseStatus::Cancelled => format!("✗ {} cancelled", event.phase_id),
            PhaseStatus::Pending => return,
        };
        let _ = writeln!(&self.term, "{} [{:.0}%]", line, self.overall_progress());
    }

    fn handle_full(&self, event: &WorkflowEvent, changed: bool) {
        let overall = self.overall_progress();
        self.header_bar.set_position(overall.round() as u64);

        if let Some(section) = &event.section_id {
            if self.verbose {
                self.multi
                    .println(format!(
                        "    {} {} {}",
                        SECTION,
                        style(section).cyan(),
                        style(&event.message).dim()
                    ))
                    .ok();
            }
            return;
        }

        let Ok(mut phases) = self.phases.lock() else {
            return;
        };
        let Some(view) = phases.get_mut(&event.phase_id) else {
            return;
        };

        match event.status {
            PhaseStatus::Active => {
                let bar = view.bar.get_or_insert_with(|| {
                    let bar = self.multi.add(ProgressBar::new(100));
                    bar.set_style(bar_style("  {prefix:.bold} [{bar:30.green/white}] {pos}% {msg}"));
                    bar.set_prefix(format!("[{}]", event.phase_id));
                    bar.enable_steady_tick(Duration::from_millis(100));
                    bar
                });
                bar.set_position(view.progress as u64);
                bar.set_message(format!("{}{}", RUNNING, event.message));
                if changed {
                    self.header_bar.set_message(format!("{} running", view.name));
                }
            }
            PhaseStatus::Paused => {
                if let Some(bar) = &view.bar {
                    bar.set_message(format!("{}paused", PAUSED));
                }
            }
            PhaseStatus::Completed => {
                if let Some(bar) = view.bar.take() {
                    bar.set_style(bar_style("  {prefix:.bold} [{bar:30.green/green}] {msg}"));
                    bar.set_position(100);
                    bar.finish_with_message(format!("{}{}", CHECK, view.name));
                }
                self.multi
                    .println(format!(
                        "  {} Phase {} {}",
                        SPARKLE,
                        style(&event.phase_id).green().bold(),
                        style("complete").green()
                    ))
                    .ok();
            }
            PhaseStatus::Error | PhaseStatus::Cancelled => {
                let (icon, word) = if event.status == PhaseStatus::Error {
                    (CROSS, "failed")
                } else {
                    (CANCELLED, "cancelled")
                };
                if let Some(bar) = view.bar.take() {
                    bar.set_style(bar_style("  {prefix:.bold} [{bar:30.red/red}] {msg}"));
                    bar.abandon_with_message(format!("{}{}", icon, event.message));
                }
                self.multi
                    .println(format!(
                        "  {} Phase {} {}: {}",
                        icon,
                        style(&event.phase_id).red().bold(),
                        style(word).red(),
                        event.message
                    ))
                    .ok();
            }
            PhaseStatus::Pending => {}
        }
    }

    /// Close the bars and print the outcome of the workflow.
    pub fn finish(&self, summary: &WorkflowSummary) {
        match self.mode {
            UiMode::Json => {
                if let Ok(json) = serde_json::to_string(summary) {
                    let _ = writeln!(&self.term, "{}", json);
                }
            }
            UiMode::Minimal => {
                let _ = writeln!(
                    &self.term,
                    "Done: {}/{} completed, {:.0}% {}",
                    summary.completed.len(),
                    summary.total(),
                    summary.overall,
                    if summary.is_complete() { "✓" } else { "✗" }
                );
            }
            UiMode::Full => {
                if let Ok(mut phases) = self.phases.lock() {
                    for view in phases.values_mut() {
                        if let Some(bar) = view.bar.take() {
                            bar.abandon();
                        }
                    }
                }
                self.header_bar.set_position(summary.overall.round() as u64);
                self.header_bar.finish_with_message(if summary.is_complete() {
                    format!("{}done", CHECK)
                } else {
                    format!("{}stopped", CROSS)
                });
                self.print_summary(summary);
            }
        }
    }

    fn print_summary(&self, summary: &WorkflowSummary) {
        let _ = writeln!(&self.term);
        let _ = writeln!(
            &self.term,
            "{} Case {}: {:.1}% overall",
            crate::ui::icons::PROGRESS,
            style(&summary.case_id).bold(),
            summary.overall
        );
        for (series, progress) in &summary.series {
            let _ = writeln!(&self.term, "    series {}: {:.1}%", series, progress);
        }
        for id in &self.order {
            let Some(state) = summary.phases.iter().find(|p| &p.phase_id == id) else {
                continue;
            };
            let marker = if summary.blocked.contains(id) {
                format!("{}blocked", BLOCKER)
            } else {
                state.status.to_string()
            };
            let _ = writeln!(&self.term, "    {:<4} {}", id, marker);
        }
    }
}
