//! Terminal progress for pipeline runs: a stage header and one spinner
//! per resource, replaced by a result line when it finishes.

use colored::Colorize;
use declarative::{ApplyResult, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub struct SpinnerProgress {
    quiet: bool,
    current: Option<ProgressBar>,
}

impl SpinnerProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            current: None,
        }
    }

    fn finish(&mut self, line: String) {
        if let Some(pb) = self.current.take() {
            pb.finish_and_clear();
        }
        if !self.quiet {
            println!("  {line}");
        }
    }
}

impl ProgressCallback for SpinnerProgress {
    fn on_stage_start(&mut self, stage: &str, count: usize) {
        if !self.quiet {
            println!();
            println!("{} {}", stage.cyan().bold(), format!("({count})").dimmed());
        }
    }

    fn on_resource_start(&mut self, _id: &str, description: &str) {
        let pb = spinner(description);
        if self.quiet {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        self.current = Some(pb);
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        let symbol = match result {
            ApplyResult::NoChange => result.symbol().dimmed(),
            ApplyResult::Created | ApplyResult::Modified => result.symbol().green(),
            ApplyResult::Skipped { .. } => result.symbol().yellow(),
        };
        let detail = match result {
            ApplyResult::NoChange => "unchanged".dimmed().to_string(),
            ApplyResult::Created => "created".to_string(),
            ApplyResult::Modified => "updated".to_string(),
            ApplyResult::Skipped { reason } => format!("skipped: {reason}").dimmed().to_string(),
        };
        self.finish(format!("{symbol} {id} {detail}"));
    }

    fn on_resource_failed(&mut self, id: &str, error: &anyhow::Error) {
        self.finish(format!("{} {} {}", "✗".red(), id, format!("{error:#}").red()));
    }
}
