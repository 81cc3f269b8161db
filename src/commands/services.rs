//! `sharestack start|stop|restart|status`

use crate::Context;
use crate::supervisor::{StartOutcome, StopOutcome, Supervisor, SystemProcesses};
use crate::ui;
use anyhow::{Result, bail};
use colored::Colorize;
use std::sync::Arc;

fn supervisor(ctx: &Context) -> Supervisor {
    Supervisor::new(&ctx.settings, Arc::new(SystemProcesses))
}

fn report_start(ctx: &Context, name: &str, outcome: &StartOutcome) {
    if ctx.quiet {
        return;
    }
    match outcome {
        StartOutcome::Started { pid } => ui::success(&format!("{name} started (pid {pid})")),
        StartOutcome::AlreadyRunning { pid } => {
            ui::dim(&format!("{name} already running (pid {pid})"));
        }
    }
}

pub fn start(ctx: &Context, services: &[String]) -> Result<()> {
    let mut sup = supervisor(ctx);
    if sup.processes().is_empty() {
        ui::warn("No services enabled");
        return Ok(());
    }
    if services.is_empty() {
        for (name, outcome) in sup.start_all()? {
            report_start(ctx, &name, &outcome);
        }
    } else {
        for name in services {
            let outcome = sup.start(name)?;
            report_start(ctx, name, &outcome);
        }
    }
    Ok(())
}

pub fn stop(ctx: &Context, services: &[String]) -> Result<()> {
    let mut sup = supervisor(ctx);
    if !services.is_empty() {
        for name in services {
            match sup.stop(name)? {
                StopOutcome::Stopped { pid } if !ctx.quiet => {
                    ui::success(&format!("{name} stopped (pid {pid})"));
                }
                StopOutcome::NotRunning if !ctx.quiet => ui::dim(&format!("{name} not running")),
                _ => {}
            }
        }
        return Ok(());
    }

    let report = sup.stop_all();
    if !ctx.quiet {
        for name in &report.stopped {
            ui::success(&format!("{name} stopped"));
        }
        for name in &report.not_running {
            ui::dim(&format!("{name} not running"));
        }
    }
    for (name, error) in &report.failed {
        ui::error(&format!("{name}: {error}"));
    }
    if !report.is_clean() {
        bail!("{} process(es) failed to stop", report.failed.len());
    }
    Ok(())
}

pub fn restart(ctx: &Context) -> Result<()> {
    stop(ctx, &[])?;
    start(ctx, &[])
}

pub fn status(ctx: &Context) -> Result<()> {
    let mut sup = supervisor(ctx);
    let statuses = sup.status()?;

    ui::header("Services");
    if statuses.is_empty() {
        ui::dim("No services enabled");
        return Ok(());
    }
    for status in statuses {
        let pid = status
            .pid
            .map(|p| format!("pid {p}"))
            .unwrap_or_default();
        let since = status
            .started_at
            .map(|t| format!("since {}", t.format("%Y-%m-%d %H:%M:%S UTC")))
            .unwrap_or_default();
        println!(
            "  {:<10} {:<18} {:<10} {}",
            status.name.bold(),
            ui::state_label(status.state.as_str()),
            pid,
            since.dimmed()
        );
        if ctx.verbose > 0 {
            ui::dim(&status.command);
        }
    }
    Ok(())
}
