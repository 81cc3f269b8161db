//! Scoped sudo context
//!
//! Sudo is never requested for the entire process:
//! 1. Unprivileged steps run first, without a password prompt
//! 2. Sudo is acquired once, right before the first privileged step
//! 3. The timestamp is invalidated when the context drops at the end of the run

use anyhow::{Context, Result, bail};
use declarative::{CommandOutput, SudoProvider};
use std::process::{Command, Output, Stdio};

/// Scoped sudo context - automatically invalidates on drop
pub struct SudoContext {
    validated: bool,
}

impl SudoContext {
    /// Acquire sudo privileges with a reason shown to user
    pub fn acquire(reason: &str) -> Result<Self> {
        if Self::is_valid() {
            log::debug!("sudo timestamp still valid, not prompting");
            return Ok(Self { validated: true });
        }

        eprintln!();
        eprintln!("  Sudo required: {}", reason);
        eprintln!();

        // Validate sudo (will prompt for password)
        let status = Command::new("sudo")
            .args(["-v"])
            .status()
            .context("Failed to execute sudo")?;

        if !status.success() {
            bail!("Failed to acquire sudo privileges");
        }

        log::debug!("sudo timestamp validated");
        Ok(Self { validated: true })
    }

    /// Check if sudo is currently valid (without prompting)
    pub fn is_valid() -> bool {
        Command::new("sudo")
            .args(["-n", "true"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn run_internal(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        if !self.validated {
            bail!("Sudo context not validated");
        }

        log::debug!("sudo {} {}", cmd, args.join(" "));
        Command::new("sudo")
            .arg("-n")
            .arg(cmd)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute: sudo {} {:?}", cmd, args))
    }
}

impl SudoProvider for SudoContext {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run_internal(cmd, args)?;
        Ok(output.into())
    }
}

impl Drop for SudoContext {
    fn drop(&mut self) {
        // Invalidate sudo timestamp to release privileges
        let _ = Command::new("sudo").args(["-k"]).status();
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Handler = Arc<dyn Fn(&str, &[&str]) -> Result<CommandOutput> + Send + Sync>;

    /// Records privileged command lines instead of running them
    #[derive(Clone)]
    pub struct RecordingSudo {
        calls: Arc<Mutex<Vec<String>>>,
        handler: Handler,
    }

    impl RecordingSudo {
        pub fn succeeding() -> Self {
            Self::with_handler(|_, _| Ok(CommandOutput::ok(Vec::new())))
        }

        pub fn with_handler<F>(handler: F) -> Self
        where
            F: Fn(&str, &[&str]) -> Result<CommandOutput> + Send + Sync + 'static,
        {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                handler: Arc::new(handler),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SudoProvider for RecordingSudo {
        fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
            let line = std::iter::once(cmd)
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .join(" ");
            self.calls.lock().unwrap().push(line);
            (self.handler)(cmd, args)
        }
    }
}
