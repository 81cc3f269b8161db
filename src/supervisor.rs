//! Long-running service processes
//!
//! Each managed process is tracked through a pid file in the run
//! directory (`<name>.pid`, JSON) and moves through
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`. Starts are
//! sequential; `stop_all` signals every process at once and reports
//! per-process failures instead of stopping at the first one.

use crate::artifact::write_atomic;
use crate::settings::{API, SCHEDULER, SHARE, Settings, TLS_PROXY};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{process}: cannot go from {from} to {to}")]
pub struct InvalidTransition {
    pub process: String,
    pub from: ProcessState,
    pub to: ProcessState,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }

    /// Whether `self -> to` is a legal step. A failed launch falls back
    /// from `Starting` to `Stopped`.
    pub fn can_move_to(self, to: ProcessState) -> bool {
        use ProcessState::{Running, Starting, Stopped, Stopping};
        matches!(
            (self, to),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Process set
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedProcess {
    /// Service name, also the pid/log file stem
    pub name: String,
    pub binary: PathBuf,
    pub args: Vec<String>,
    state: ProcessState,
}

impl ManagedProcess {
    pub fn new(name: impl Into<String>, binary: impl AsRef<Path>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            binary: binary.as_ref().to_path_buf(),
            args,
            state: ProcessState::Stopped,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn transition(&mut self, to: ProcessState) -> Result<(), InvalidTransition> {
        if !self.state.can_move_to(to) {
            return Err(InvalidTransition {
                process: self.name.clone(),
                from: self.state,
                to,
            });
        }
        log::debug!("{}: {} -> {}", self.name, self.state, to);
        self.state = to;
        Ok(())
    }

    pub fn command_line(&self) -> String {
        let mut line = self.binary.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Processes for the enabled services, in start order.
///
/// The TLS proxy only runs in front of an enabled API.
pub fn process_set(settings: &Settings) -> Vec<ManagedProcess> {
    let paths = &settings.paths;
    let config = paths.config_file().to_string_lossy().into_owned();
    let service = |binary: &str| {
        (
            paths.binary(binary),
            vec!["--config-file".to_string(), config.clone()],
        )
    };

    let mut processes = Vec::new();
    if settings.api_enabled() {
        let (binary, args) = service("manila-api");
        processes.push(ManagedProcess::new(API, binary, args));

        if settings.tls_proxy_enabled() {
            let svc = &settings.service;
            processes.push(ManagedProcess::new(
                TLS_PROXY,
                &settings.tls.proxy_binary,
                vec![
                    "--tls".to_string(),
                    "-f".to_string(),
                    format!("*,{}", svc.port),
                    "-b".to_string(),
                    format!("{},{}", svc.host, svc.internal_port),
                    settings.tls.certificate.clone(),
                ],
            ));
        }
    }
    for (name, binary) in [(SCHEDULER, "manila-scheduler"), (SHARE, "manila-share")] {
        if settings.is_service_enabled(name) {
            let (binary, args) = service(binary);
            processes.push(ManagedProcess::new(name, binary, args));
        }
    }
    processes
}

// ============================================================================
// OS seam
// ============================================================================

pub trait ProcessControl: Send + Sync + fmt::Debug {
    /// Launch detached with stdout and stderr appended to `log`; returns the pid
    fn spawn(&self, program: &Path, args: &[String], log: &Path) -> Result<u32>;

    fn is_alive(&self, pid: u32) -> bool;

    /// Send SIGTERM
    fn terminate(&self, pid: u32) -> Result<()>;
}

/// Whether a recorded pid names one ordinary process.
///
/// kill(2) treats 0 and negative pids as process groups, and pid 1 is init.
pub fn is_valid_pid(pid: u32) -> bool {
    pid > 1 && i32::try_from(pid).is_ok()
}

fn signalable(pid: u32) -> Option<libc::pid_t> {
    if !is_valid_pid(pid) {
        return None;
    }
    libc::pid_t::try_from(pid).ok()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcesses;

impl ProcessControl for SystemProcesses {
    fn spawn(&self, program: &Path, args: &[String], log: &Path) -> Result<u32> {
        if let Some(dir) = log.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        }
        let out = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .with_context(|| format!("Failed to open log file: {}", log.display()))?;
        let err = out.try_clone()?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(out)
            .stderr(err)
            .spawn()
            .with_context(|| format!("Failed to launch {}", program.display()))?;
        Ok(child.id())
    }

    fn is_alive(&self, pid: u32) -> bool {
        let Some(pid) = signalable(pid) else {
            return false;
        };
        // SAFETY: signal 0 performs only the existence and permission check.
        let rc = unsafe { libc::kill(pid, 0) };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        let Some(target) = signalable(pid) else {
            bail!("Refusing to signal pid {pid}");
        };
        // SAFETY: kill(2) takes plain integers and touches no memory of ours.
        let rc = unsafe { libc::kill(target, libc::SIGTERM) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("Failed to signal pid {pid}"));
        }
        Ok(())
    }
}

// ============================================================================
// Supervisor
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidRecord {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: u32 },
    AlreadyRunning { pid: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { pid: u32 },
    NotRunning,
}

/// Result of stopping every process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    pub stopped: Vec<String>,
    pub not_running: Vec<String>,
    /// Process name and error
    pub failed: Vec<(String, String)>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStatus {
    pub name: String,
    pub command: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Supervisor {
    processes: Vec<ManagedProcess>,
    run_dir: PathBuf,
    log_dir: PathBuf,
    control: Arc<dyn ProcessControl>,
}

fn pid_file(run_dir: &Path, name: &str) -> PathBuf {
    run_dir.join(format!("{name}.pid"))
}

fn read_pid(run_dir: &Path, name: &str) -> Result<Option<PidRecord>> {
    let path = pid_file(run_dir, name);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    match serde_json::from_str::<PidRecord>(&content) {
        Ok(record) if is_valid_pid(record.pid) => Ok(Some(record)),
        Ok(record) => {
            log::warn!(
                "Ignoring pid file {} with out-of-range pid {}",
                path.display(),
                record.pid
            );
            Ok(None)
        }
        Err(e) => {
            log::warn!("Ignoring unreadable pid file {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

fn remove_pid(run_dir: &Path, name: &str) -> Result<()> {
    let path = pid_file(run_dir, name);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Live pid record for `name`; a record for a dead process is removed
fn live_record(
    control: &dyn ProcessControl,
    run_dir: &Path,
    name: &str,
) -> Result<Option<PidRecord>> {
    match read_pid(run_dir, name)? {
        Some(record) if control.is_alive(record.pid) => Ok(Some(record)),
        Some(record) => {
            log::info!("Removing stale pid file for {} (pid {})", name, record.pid);
            remove_pid(run_dir, name)?;
            Ok(None)
        }
        None => Ok(None),
    }
}

fn stop_process(
    control: &dyn ProcessControl,
    run_dir: &Path,
    process: &mut ManagedProcess,
) -> Result<StopOutcome> {
    let Some(record) = live_record(control, run_dir, &process.name)? else {
        process.state = ProcessState::Stopped;
        return Ok(StopOutcome::NotRunning);
    };

    process.state = ProcessState::Running;
    process.transition(ProcessState::Stopping)?;
    log::info!("Stopping {} (pid {})", process.name, record.pid);
    control
        .terminate(record.pid)
        .with_context(|| format!("Failed to stop {}", process.name))?;
    remove_pid(run_dir, &process.name)?;
    process.transition(ProcessState::Stopped)?;
    Ok(StopOutcome::Stopped { pid: record.pid })
}

impl Supervisor {
    pub fn new(settings: &Settings, control: Arc<dyn ProcessControl>) -> Self {
        Self::with_processes(
            process_set(settings),
            settings.paths.run_dir(),
            settings.paths.log_dir(),
            control,
        )
    }

    pub fn with_processes(
        processes: Vec<ManagedProcess>,
        run_dir: impl AsRef<Path>,
        log_dir: impl AsRef<Path>,
        control: Arc<dyn ProcessControl>,
    ) -> Self {
        Self {
            processes,
            run_dir: run_dir.as_ref().to_path_buf(),
            log_dir: log_dir.as_ref().to_path_buf(),
            control,
        }
    }

    pub fn processes(&self) -> &[ManagedProcess] {
        &self.processes
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut ManagedProcess> {
        match self.processes.iter_mut().find(|p| p.name == name) {
            Some(process) => Ok(process),
            None => bail!("'{name}' is not an enabled service"),
        }
    }

    /// Start one process. Already running is a no-op.
    pub fn start(&mut self, name: &str) -> Result<StartOutcome> {
        let control = self.control.clone();
        let run_dir = self.run_dir.clone();
        let log = self.log_dir.join(format!("{name}.log"));
        let process = self.find_mut(name)?;

        if let Some(record) = live_record(control.as_ref(), &run_dir, name)? {
            process.state = ProcessState::Running;
            log::debug!("{} already running as pid {}", name, record.pid);
            return Ok(StartOutcome::AlreadyRunning { pid: record.pid });
        }

        process.state = ProcessState::Stopped;
        process.transition(ProcessState::Starting)?;
        log::info!("Starting {}: {}", name, process.command_line());

        let pid = match control.spawn(&process.binary, &process.args, &log) {
            Ok(pid) => pid,
            Err(e) => {
                process.transition(ProcessState::Stopped)?;
                return Err(e);
            }
        };

        let record = PidRecord {
            pid,
            started_at: Utc::now(),
            command: process.command_line(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        write_atomic(&pid_file(&run_dir, name), json.as_bytes(), 0o644)?;
        process.transition(ProcessState::Running)?;
        Ok(StartOutcome::Started { pid })
    }

    /// Start every process in order, stopping at the first failure
    pub fn start_all(&mut self) -> Result<Vec<(String, StartOutcome)>> {
        let names: Vec<String> = self.processes.iter().map(|p| p.name.clone()).collect();
        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            let outcome = self.start(&name)?;
            outcomes.push((name, outcome));
        }
        Ok(outcomes)
    }

    pub fn stop(&mut self, name: &str) -> Result<StopOutcome> {
        let control = self.control.clone();
        let run_dir = self.run_dir.clone();
        let process = self.find_mut(name)?;
        stop_process(control.as_ref(), &run_dir, process)
    }

    /// Signal every process concurrently. One failure never keeps the
    /// others running.
    pub fn stop_all(&mut self) -> StopReport {
        let control = self.control.as_ref();
        let run_dir = self.run_dir.as_path();

        let results: Vec<(String, Result<StopOutcome>)> = self
            .processes
            .par_iter_mut()
            .map(|process| {
                let result = stop_process(control, run_dir, process);
                (process.name.clone(), result)
            })
            .collect();

        let mut report = StopReport::default();
        for (name, result) in results {
            match result {
                Ok(StopOutcome::Stopped { .. }) => report.stopped.push(name),
                Ok(StopOutcome::NotRunning) => report.not_running.push(name),
                Err(e) => report.failed.push((name, format!("{e:#}"))),
            }
        }
        report
    }

    /// Observed state of every process
    pub fn status(&mut self) -> Result<Vec<ProcessStatus>> {
        let mut statuses = Vec::with_capacity(self.processes.len());
        for process in &mut self.processes {
            let record = read_pid(&self.run_dir, &process.name)?
                .filter(|r| self.control.is_alive(r.pid));
            process.state = if record.is_some() {
                ProcessState::Running
            } else {
                ProcessState::Stopped
            };
            statuses.push(ProcessStatus {
                name: process.name.clone(),
                command: process.command_line(),
                state: process.state(),
                pid: record.as_ref().map(|r| r.pid),
                started_at: record.map(|r| r.started_at),
            });
        }
        Ok(statuses)
    }
}
