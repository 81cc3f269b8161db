//! Unprivileged command execution
//!
//! Resources that shell out (`ssh-keygen`, `manila-manage`) take a
//! [`CommandRunner`] so tests can script the tools instead of running them.

use anyhow::{Context, Result, bail};
use declarative::CommandOutput;
use std::fmt;
use std::process::{Command, Stdio};

pub trait CommandRunner: Send + Sync + fmt::Debug {
    /// Run a command and capture its output
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Run a command, failing with its stderr if it exits non-zero
    fn run_checked(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let output = self.run(cmd, args)?;
        if !output.success {
            bail!(
                "Command failed: {} {}: {}",
                cmd,
                args.join(" "),
                output.stderr_str().trim()
            );
        }
        Ok(output.stdout_str())
    }
}

/// Runs commands on the host
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        log::debug!("running {} {}", cmd, args.join(" "));
        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;
        Ok(output.into())
    }
}

/// Check if a command exists on PATH
pub fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
