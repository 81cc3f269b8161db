mod artifact;
mod backends;
mod cli;
mod commands;
mod error;
mod paths;
mod progress;
mod provision;
mod resource;
mod runner;
mod settings;
mod sudo;
mod supervisor;
mod template;
#[cfg(test)]
mod testing;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use settings::{ENV_PREFIX, Settings};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub settings: Settings,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Command::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "sharestack", &mut io::stdout());
        return Ok(());
    }

    let (path, explicit) = paths::settings_file(cli.config.as_deref())?;
    let settings = Settings::resolve(&path, explicit, |key| {
        std::env::var(format!("{ENV_PREFIX}{key}")).ok()
    })?;
    log::debug!("Loaded settings from {}", path.display());

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        settings,
    };

    match cli.command {
        Command::Render => commands::render::run(&ctx),
        Command::Plan => commands::plan::run(&ctx),
        Command::Provision(args) => commands::provision::run(&ctx, args),
        Command::Start(args) => commands::services::start(&ctx, &args.services),
        Command::Stop(args) => commands::services::stop(&ctx, &args.services),
        Command::Restart => commands::services::restart(&ctx),
        Command::Status => commands::services::status(&ctx),
        Command::Completions { .. } => Ok(()),
    }
}
