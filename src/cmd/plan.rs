//! Offline outline planning and scoring: `docket plan`, `docket score`.

use anyhow::{Context, Result};
use console::style;
use docket::compliance::ComplianceScore;
use docket::config::DocketConfig;
use docket::pipeline::{CaseFile, FactEvidencePool, OutlineDocument};
use std::path::Path;

pub fn cmd_plan(project_dir: &Path, case_path: &Path, json: bool) -> Result<()> {
    let config = DocketConfig::new(project_dir.to_path_buf())?;
    let case = CaseFile::load(case_path)?;
    let scorer = config.scorer().context("Invalid rubric in docket.toml")?;

    let mut pool = FactEvidencePool::from_case(&case);
    let sections = config
        .section_pipeline()
        .run(&case, &mut pool, |_| {})
        .context("Section planning failed")?;
    let score = scorer.score(&sections, &case);
    let outline = OutlineDocument::new(&case, sections, score);

    if json {
        println!("{}", serde_json::to_string_pretty(&outline)?);
        return Ok(());
    }

    println!();
    println!("{} ({})", style(&case.title).bold(), case.case_id);
    println!();
    for (i, section) in outline.sections.iter().enumerate() {
        println!(
            "{:>3}. {:<28} {:>5} words  facts [{}]",
            i + 1,
            section.section_id,
            section.word_target,
            section.consumed_fact_ids.join(", ")
        );
        if !section.referenced_fact_ids.is_empty() {
            println!(
                "       references [{}] via {}",
                section.referenced_fact_ids.join(", "),
                section.depends_on_sections.join(", ")
            );
        }
    }
    let unused: Vec<&str> = pool.available_facts().map(|f| f.id.as_str()).collect();
    if !unused.is_empty() {
        println!();
        println!("Unassigned facts: {}", unused.join(", "));
    }
    print_score(&outline.compliance);
    Ok(())
}

pub fn cmd_score(project_dir: &Path, case_path: &Path, outline_path: &Path) -> Result<()> {
    let config = DocketConfig::new(project_dir.to_path_buf())?;
    let case = CaseFile::load(case_path)?;
    let outline = OutlineDocument::load(outline_path)?;
    if outline.case_id != case.case_id {
        anyhow::bail!(
            "Outline belongs to case '{}', not '{}'",
            outline.case_id,
            case.case_id
        );
    }

    let scorer = config.scorer().context("Invalid rubric in docket.toml")?;
    let score = scorer.score(&outline.sections, &case);
    print_score(&score);
    Ok(())
}

fn print_score(score: &ComplianceScore) {
    println!();
    println!("Compliance score: {}", style(format!("{:.1}", score.score)).bold());
    for result in &score.criteria {
        let mark = if result.passed {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!(
            "  {} {:<20} {:>5.1}/{:<3} {}",
            mark,
            result.kind.label(),
            result.points,
            result.weight,
            style(&result.detail).dim()
        );
    }
    println!();
}
