//! SSH keypair used to reach the service instances

use crate::runner::CommandRunner;
use anyhow::{Context, Result};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// RSA keypair, generated once.
///
/// The private key is the source of truth: it is never regenerated once
/// present. A missing public half is re-derived from it.
#[derive(Debug)]
pub struct KeyPair {
    private_key: PathBuf,
    public_key: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl KeyPair {
    pub fn new(
        private_key: impl AsRef<Path>,
        public_key: impl AsRef<Path>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            private_key: private_key.as_ref().to_path_buf(),
            public_key: public_key.as_ref().to_path_buf(),
            runner,
        }
    }

    /// Where `ssh-keygen -f` drops the public half
    fn generated_public_key(&self) -> PathBuf {
        let mut name = self.private_key.clone().into_os_string();
        name.push(".pub");
        PathBuf::from(name)
    }

    fn generate(&self) -> Result<()> {
        // only a key directory created here is restricted to the owner
        if let Some(parent) = self.private_key.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create key directory: {}", parent.display())
            })?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                    .with_context(|| format!("Failed to restrict {}", parent.display()))?;
            }
        }

        log::info!("Generating RSA keypair at {}", self.private_key.display());
        let private = self.private_key.to_string_lossy();
        self.runner
            .run_checked("ssh-keygen", &["-q", "-t", "rsa", "-N", "", "-f", &private])
            .context("Failed to generate keypair")?;
        Ok(())
    }

    fn derive_public(&self) -> Result<()> {
        log::info!(
            "Deriving {} from {}",
            self.public_key.display(),
            self.private_key.display()
        );
        let private = self.private_key.to_string_lossy();
        let public = self
            .runner
            .run_checked("ssh-keygen", &["-y", "-f", &private])
            .context("Failed to derive public key")?;

        let mut content = public.trim_end().to_string();
        content.push('\n');
        fs::write(&self.public_key, content)
            .with_context(|| format!("Failed to write {}", self.public_key.display()))
    }
}

impl Resource for KeyPair {
    fn id(&self) -> String {
        format!("keypair:{}", self.private_key.display())
    }

    fn description(&self) -> String {
        format!("SSH keypair {}", self.private_key.display())
    }

    fn resource_type(&self) -> &'static str {
        "keypair"
    }

    fn current_state(&self) -> Result<ResourceState> {
        Ok(match (self.private_key.exists(), self.public_key.exists()) {
            (true, true) => ResourceState::present(),
            (true, false) => ResourceState::Modified {
                from: "public key missing".into(),
                to: format!("derive {}", self.public_key.display()),
            },
            (false, _) => ResourceState::Absent,
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present()
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if self.private_key.exists() {
            if self.public_key.exists() {
                return Ok(ApplyResult::NoChange);
            }
            self.derive_public()?;
            return Ok(ApplyResult::Modified);
        }

        self.generate()?;
        if self.public_key != self.generated_public_key() || !self.public_key.exists() {
            self.derive_public()?;
        }
        Ok(ApplyResult::Created)
    }
}
