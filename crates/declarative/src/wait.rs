//! Bounded polling for resources that become visible asynchronously.

use anyhow::Result;
use std::thread;
use std::time::{Duration, Instant};

/// Timeout and poll interval for a visibility wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl WaitConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_secs(1),
        }
    }
}

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The check passed after this many attempts (1-indexed)
    Ready { attempts: u32 },
    /// The check never passed within the timeout
    TimedOut { waited: Duration },
}

impl WaitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Run `check` until it returns `true` or `config.timeout` has elapsed.
///
/// The first check runs immediately. Errors from `check` end the wait and
/// are returned as-is; only a `false` answer is polled again.
pub fn poll_until<F>(config: &WaitConfig, mut check: F) -> Result<WaitOutcome>
where
    F: FnMut() -> Result<bool>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if check()? {
            return Ok(WaitOutcome::Ready { attempts });
        }

        let elapsed = started.elapsed();
        if elapsed >= config.timeout {
            log::debug!("gave up after {} attempts ({:?})", attempts, elapsed);
            return Ok(WaitOutcome::TimedOut { waited: elapsed });
        }

        let remaining = config.timeout - elapsed;
        thread::sleep(config.interval.min(remaining));
    }
}
