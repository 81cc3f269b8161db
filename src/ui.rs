use colored::Colorize;
use declarative::RunSummary;

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Colored process state for status tables
pub fn state_label(state: &str) -> String {
    match state {
        "running" => state.green().to_string(),
        "stopped" => state.dimmed().to_string(),
        _ => state.yellow().to_string(),
    }
}

/// Print the outcome of a provisioning run
pub fn run_summary(summary: &RunSummary) {
    println!();
    if summary.total_changes() == 0 {
        println!("  {} Already provisioned, nothing changed", "✓".green().bold());
    } else {
        println!("  {} Provisioning complete", "✓".green().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources updated", summary.modified);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.no_change > 0 {
        println!("    • {} already in place", summary.no_change);
    }
}
