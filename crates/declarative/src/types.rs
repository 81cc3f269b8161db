//! Core types for check-then-act provisioning

use serde::{Deserialize, Serialize};
use std::process::Output;

/// Requirement level for sudo/elevated privileges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SudoRequirement {
    /// No elevated privileges needed
    #[default]
    None,
    /// Elevated privileges required with a reason
    Required { reason: String },
}

/// Observed or desired state of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    /// Resource exists/is configured
    Present { details: Option<String> },
    /// Resource does not exist
    Absent,
    /// Resource exists but differs from desired
    Modified { from: String, to: String },
    /// State cannot be determined without acting (or without privileges)
    Unknown,
}

impl ResourceState {
    pub fn present() -> Self {
        Self::Present { details: None }
    }

    pub fn present_with(details: impl Into<String>) -> Self {
        Self::Present {
            details: Some(details.into()),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Outcome of a successful apply.
///
/// Failures are not a variant: `Resource::apply` returns `Err` and the
/// executor aborts the run. Together with `Err` this gives the
/// already-present / created / failed tri-state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// Already in the desired state
    NoChange,
    /// Resource was created
    Created,
    /// Existing resource was replaced or updated
    Modified,
    /// Not applicable to this environment (e.g. owning service disabled)
    Skipped { reason: String },
}

impl ApplyResult {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Whether the apply changed anything
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Modified)
    }

    /// Short symbol for progress output
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::NoChange => "○",
            Self::Created | Self::Modified => "✓",
            Self::Skipped { .. } => "⊘",
        }
    }
}

/// Summary of a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub created: usize,
    pub modified: usize,
    pub skipped: usize,
    pub no_change: usize,
    /// Resource ids in the order they were applied
    pub applied: Vec<String>,
}

impl RunSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.skipped + self.no_change
    }

    pub fn record(&mut self, id: &str, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
        self.applied.push(id.to_string());
    }
}

/// Options for a pipeline run
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Compute states only, change nothing
    pub dry_run: bool,
    /// Verbose output
    pub verbose: bool,
}

/// Output from an external or privileged command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    /// A successful output with the given stdout
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: Vec::new(),
            success: true,
        }
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
