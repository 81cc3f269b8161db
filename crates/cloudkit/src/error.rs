//! Error types for calls into the external cloud services.
//!
//! Errors are categorized so callers can tell a benign race (someone else
//! created the same thing first) from a real failure, and so the operator
//! gets a hint about what to fix before re-running.

use thiserror::Error;

/// Categories of collaborator errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Credentials rejected or insufficient
    Auth,
    /// The referenced object does not exist
    NotFound,
    /// The object already exists (a concurrent run may have created it)
    Conflict,
    /// Service unreachable or overloaded
    Unavailable,
    /// Client tool not installed
    ToolMissing,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether the failure may just mean another run got there first.
    ///
    /// Callers re-check for the resource before treating it as fatal.
    pub fn is_benign_race(&self) -> bool {
        matches!(self, Self::Conflict)
    }

    /// Actionable advice for the operator
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Auth => "Check the admin credentials and identity endpoint",
            Self::NotFound => "Check that prerequisite projects and services exist",
            Self::Conflict => "Re-run; existing objects are detected and reused",
            Self::Unavailable => "Check that the service is running and reachable, then re-run",
            Self::ToolMissing => "Install the client tool and make sure it is on PATH",
            Self::Other => "Check the error details, fix the environment and re-run",
        }
    }
}

/// Errors from collaborator calls
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials were rejected
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Referenced object does not exist
    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    /// Object already exists
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Service unreachable
    #[error("service unavailable: {message}")]
    Unavailable { message: String },

    /// Client binary missing from PATH
    #[error("{tool} not found on PATH")]
    ToolMissing { tool: String },

    /// Command exited non-zero for an unrecognized reason
    #[error("command failed: {command}: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Input rejected before calling out
    #[error("invalid input: {0}")]
    Invalid(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("unexpected output from {command}: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Auth { .. } => ErrorCategory::Auth,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::Unavailable { .. } => ErrorCategory::Unavailable,
            Error::ToolMissing { .. } => ErrorCategory::ToolMissing,
            _ => ErrorCategory::Other,
        }
    }

    pub fn is_benign_race(&self) -> bool {
        self.category().is_benign_race()
    }

    /// Classify a failed command from its stderr.
    pub fn from_cli_output(command: &str, stderr: &str) -> Self {
        let stderr_lower = stderr.to_lowercase();
        let message = stderr.trim().to_string();

        if stderr_lower.contains("already exists")
            || stderr_lower.contains("conflict")
            || stderr_lower.contains("(http 409)")
            || stderr_lower.contains("database exists")
        {
            return Error::Conflict { message };
        }

        if stderr_lower.contains("unauthorized")
            || stderr_lower.contains("(http 401)")
            || stderr_lower.contains("(http 403)")
            || stderr_lower.contains("access denied")
            || stderr_lower.contains("authentication failed")
        {
            return Error::Auth { message };
        }

        if stderr_lower.contains("unable to establish connection")
            || stderr_lower.contains("connection refused")
            || stderr_lower.contains("timed out")
            || stderr_lower.contains("(http 503)")
            || stderr_lower.contains("can't connect")
            || stderr_lower.contains("could not connect")
        {
            return Error::Unavailable { message };
        }

        if stderr_lower.contains("no security_group found")
            || stderr_lower.contains("could not find")
            || stderr_lower.contains("(http 404)")
        {
            return Error::NotFound {
                kind: "object".to_string(),
                name: message,
            };
        }

        Error::CommandFailed {
            command: command.to_string(),
            stderr: message,
        }
    }
}

/// Result type for collaborator calls.
pub type Result<T> = std::result::Result<T, Error>;
