//! Apply context and provider traits
//!
//! These traits keep the engine free of any concrete sudo, progress or
//! prompt implementation.

use crate::types::{ApplyResult, CommandOutput};
use anyhow::Result;

/// Provider for elevated privilege operations
///
/// The implementation handles privilege acquisition and release.
pub trait SudoProvider: Send + Sync {
    /// Run a command with elevated privileges
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Run a command and return just success/failure
    fn run_status(&self, cmd: &str, args: &[&str]) -> Result<bool> {
        Ok(self.run(cmd, args)?.success)
    }

    /// Run a command, failing with its stderr if it exits non-zero
    fn run_checked(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let output = self.run(cmd, args)?;
        if !output.success {
            anyhow::bail!(
                "Command failed: {} {}: {}",
                cmd,
                args.join(" "),
                output.stderr_str().trim()
            );
        }
        Ok(output.stdout_str())
    }
}

/// Progress callback for pipeline runs
pub trait ProgressCallback: Send {
    /// Called when a stage begins
    fn on_stage_start(&mut self, stage: &str, count: usize);

    /// Called before a resource is applied
    fn on_resource_start(&mut self, id: &str, description: &str);

    /// Called after a resource applied successfully
    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult);

    /// Called when a resource failed; the run aborts afterwards
    fn on_resource_failed(&mut self, id: &str, error: &anyhow::Error);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_stage_start(&mut self, _stage: &str, _count: usize) {}
    fn on_resource_start(&mut self, _id: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _result: &ApplyResult) {}
    fn on_resource_failed(&mut self, _id: &str, _error: &anyhow::Error) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Context passed to resource apply operations
pub struct ApplyContext<'a> {
    pub verbose: bool,
    /// Present once the run has acquired privileges
    pub sudo: Option<&'a dyn SudoProvider>,
}

impl<'a> ApplyContext<'a> {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            sudo: None,
        }
    }

    pub fn with_sudo(verbose: bool, sudo: &'a dyn SudoProvider) -> Self {
        Self {
            verbose,
            sudo: Some(sudo),
        }
    }

    /// Get the sudo provider, or error if not available
    pub fn require_sudo(&self) -> Result<&'a dyn SudoProvider> {
        self.sudo
            .ok_or_else(|| anyhow::anyhow!("Sudo required but not available"))
    }
}
