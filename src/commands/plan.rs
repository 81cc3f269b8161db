//! `sharestack plan` - preview a provisioning run

use crate::Context;
use crate::backends::BackendRegistry;
use crate::provision::{self, Collaborators};
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use declarative::{DiffSummary, ResourceDiff, ResourceState};
use similar::{ChangeTag, TextDiff};
use std::fs;

pub fn run(ctx: &Context) -> Result<()> {
    let settings = &ctx.settings;
    let registry = BackendRegistry::from_settings(settings)?;
    let collab = Collaborators::from_settings(settings);
    let pipeline = provision::build_pipeline(settings, &registry, &collab)?;

    let artifact = provision::artifact(settings, &registry)?;
    if !ctx.quiet {
        ui::header("Plan");
        ui::kv(
            "backends",
            &format!(
                "{} ({})",
                artifact.backend_sections().join(", "),
                if registry.is_multi_backend() {
                    "multi-backend"
                } else {
                    "single backend"
                }
            ),
        );
        ui::kv("services", &settings.enabled_services.join(", "));
    }

    let diffs = declarative::preview(&pipeline)?;
    display(&pipeline.stage_names(), &diffs);

    let path = settings.paths.config_file();
    let rendered = artifact.render();
    let installed = fs::read_to_string(&path).unwrap_or_default();
    if installed != rendered {
        ui::header(&path.display().to_string());
        print_text_diff(&installed, &rendered);
    }
    Ok(())
}

fn symbol(diff: &ResourceDiff) -> colored::ColoredString {
    match (&diff.current, &diff.desired) {
        (ResourceState::Absent, _) => "+".green(),
        (ResourceState::Modified { .. }, _) => "~".yellow(),
        _ => "?".dimmed(),
    }
}

fn state_desc(diff: &ResourceDiff) -> String {
    match &diff.current {
        ResourceState::Absent => "(missing)".to_string(),
        ResourceState::Modified { from, to } => format!("{from} → {to}"),
        ResourceState::Unknown => "(decided at apply time)".to_string(),
        ResourceState::Present { .. } => String::new(),
    }
}

fn display(stages: &[&str], diffs: &[ResourceDiff]) {
    if diffs.is_empty() {
        println!();
        println!("  {} Nothing to provision", "✓".green());
        return;
    }

    for stage in stages {
        let in_stage: Vec<_> = diffs.iter().filter(|d| d.stage == *stage).collect();
        if in_stage.is_empty() {
            continue;
        }
        println!();
        println!("{}", stage.cyan().bold());
        for diff in in_stage {
            let sudo = if diff.requires_sudo {
                " [sudo]".red().to_string()
            } else {
                String::new()
            };
            println!(
                "  {} {}{} {}",
                symbol(diff),
                diff.resource_id,
                sudo,
                state_desc(diff).dimmed()
            );
        }
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!();
    ui::kv("to create", &summary.additions.to_string());
    ui::kv("to update", &summary.modifications.to_string());
    ui::kv("undetermined", &summary.undetermined.to_string());
    if summary.sudo_required > 0 {
        ui::kv("need sudo", &summary.sudo_required.to_string());
    }
}

fn print_text_diff(old: &str, new: &str) {
    let diff = TextDiff::from_lines(old, new);
    for change in diff.iter_all_changes() {
        let line = change.value().trim_end_matches('\n');
        match change.tag() {
            ChangeTag::Delete => println!("{}", format!("-{line}").red()),
            ChangeTag::Insert => println!("{}", format!("+{line}").green()),
            ChangeTag::Equal => println!(" {}", line.dimmed()),
        }
    }
}
