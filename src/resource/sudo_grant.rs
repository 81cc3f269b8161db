//! Password-less sudo for the privilege wrapper

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState, SudoProvider, SudoRequirement};
use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

/// A sudoers fragment allowing `user` to run the rootwrap wrapper as root.
///
/// The fragment is staged beside the target under a dotted name (sudo
/// skips files containing a '.'), checked with `visudo`, and only then
/// renamed into place. A broken fragment never becomes active.
#[derive(Debug, Clone)]
pub struct SudoGrant {
    user: String,
    wrapper: PathBuf,
    /// Present when rootwrap filters are deployed
    rootwrap_config: Option<PathBuf>,
    target: PathBuf,
}

impl SudoGrant {
    pub fn new(
        user: impl Into<String>,
        wrapper: impl AsRef<Path>,
        rootwrap_config: Option<PathBuf>,
        target: impl AsRef<Path>,
    ) -> Self {
        Self {
            user: user.into(),
            wrapper: wrapper.as_ref().to_path_buf(),
            rootwrap_config,
            target: target.as_ref().to_path_buf(),
        }
    }

    /// The command the grant allows
    pub fn wrapper_command(&self) -> String {
        match &self.rootwrap_config {
            Some(config) => format!("{} {} *", self.wrapper.display(), config.display()),
            None => self.wrapper.display().to_string(),
        }
    }

    /// Fragment content, one line
    pub fn content(&self) -> String {
        format!(
            "{} ALL=(root) NOPASSWD: {}\n",
            self.user,
            self.wrapper_command()
        )
    }

    fn staging_path(&self) -> PathBuf {
        let name = self
            .target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sudoers".to_string());
        self.target.with_file_name(format!(".{name}.staged"))
    }

    fn installed_matches(&self, sudo: &dyn SudoProvider) -> Result<bool> {
        let target = self.target.to_string_lossy();
        Ok(sudo.run_checked("cat", &[&target])? == self.content())
    }

    fn install(&self, sudo: &dyn SudoProvider) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new().context("Failed to create temp file")?;
        tmp.write_all(self.content().as_bytes())
            .context("Failed to write sudoers fragment")?;
        tmp.flush()?;

        let source = tmp.path().to_string_lossy().into_owned();
        let staging = self.staging_path().to_string_lossy().into_owned();
        let target = self.target.to_string_lossy();

        sudo.run_checked(
            "install",
            &["-m", "0440", "-o", "root", "-g", "root", &source, &staging],
        )?;

        if !sudo.run_status("visudo", &["-c", "-q", "-f", &staging])? {
            let _ = sudo.run("rm", &["-f", &staging]);
            bail!("visudo rejected the fragment for {}", target);
        }

        sudo.run_checked("mv", &["-f", &staging, &target])?;
        Ok(())
    }
}

impl Resource for SudoGrant {
    fn id(&self) -> String {
        format!("sudoers:{}", self.target.display())
    }

    fn description(&self) -> String {
        format!(
            "Sudo grant for {} to run {}",
            self.user,
            self.wrapper.display()
        )
    }

    fn resource_type(&self) -> &'static str {
        "sudo_grant"
    }

    fn sudo_requirement(&self) -> SudoRequirement {
        SudoRequirement::Required {
            reason: format!("install {}", self.target.display()),
        }
    }

    fn current_state(&self) -> Result<ResourceState> {
        match fs::read_to_string(&self.target) {
            Ok(content) if content == self.content() => Ok(ResourceState::present()),
            Ok(content) => Ok(ResourceState::Modified {
                from: content.trim().to_string(),
                to: self.content().trim().to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ResourceState::Absent),
            // sudoers fragments are 0440 root; unreadable without privileges
            Err(e) if e.kind() == ErrorKind::PermissionDenied => Ok(ResourceState::Unknown),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read {}", self.target.display()))
            }
        }
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present()
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let sudo = ctx.require_sudo()?;
        let existed = sudo.run_status("test", &["-f", &self.target.to_string_lossy()])?;

        if existed && self.installed_matches(sudo)? {
            return Ok(ApplyResult::NoChange);
        }

        log::info!("Installing sudo grant {}", self.target.display());
        self.install(sudo)?;
        Ok(if existed {
            ApplyResult::Modified
        } else {
            ApplyResult::Created
        })
    }
}
