//! Service directories owned by the stack user

use anyhow::{Context, Result};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState, SudoRequirement};
use std::fs;
use std::path::{Path, PathBuf};

/// A directory that must exist and belong to `owner`.
///
/// Created directly when the nearest existing ancestor is writable,
/// otherwise with `sudo install -d -o <owner>`.
#[derive(Debug, Clone)]
pub struct Directory {
    path: PathBuf,
    owner: String,
}

impl Directory {
    pub fn new(path: impl AsRef<Path>, owner: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            owner: owner.into(),
        }
    }

    fn needs_privileges(&self) -> bool {
        if self.path.is_dir() {
            return false;
        }
        !self
            .path
            .ancestors()
            .skip(1)
            .find(|p| p.exists())
            .is_some_and(is_writable)
    }
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: access(2) only reads the NUL-terminated path we own.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| !m.permissions().readonly())
}

impl Resource for Directory {
    fn id(&self) -> String {
        format!("dir:{}", self.path.display())
    }

    fn description(&self) -> String {
        format!("Directory {} owned by {}", self.path.display(), self.owner)
    }

    fn resource_type(&self) -> &'static str {
        "directory"
    }

    fn sudo_requirement(&self) -> SudoRequirement {
        if self.needs_privileges() {
            SudoRequirement::Required {
                reason: format!("create {}", self.path.display()),
            }
        } else {
            SudoRequirement::None
        }
    }

    fn current_state(&self) -> Result<ResourceState> {
        Ok(if self.path.is_dir() {
            ResourceState::present()
        } else {
            ResourceState::Absent
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present()
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if self.path.is_dir() {
            return Ok(ApplyResult::NoChange);
        }

        let path = self.path.to_string_lossy();
        if self.needs_privileges() {
            let sudo = ctx.require_sudo()?;
            log::info!("Creating {} as root for {}", path, self.owner);
            sudo.run_checked("install", &["-d", "-o", &self.owner, "-m", "0755", &path])?;
        } else {
            log::info!("Creating {}", path);
            fs::create_dir_all(&self.path)
                .with_context(|| format!("Failed to create directory: {path}"))?;
        }
        Ok(ApplyResult::Created)
    }
}
