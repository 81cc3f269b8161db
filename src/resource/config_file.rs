//! The rendered service configuration on disk

use crate::artifact::{ConfigArtifact, write_artifact};
use anyhow::{Context, Result};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    artifact: ConfigArtifact,
}

impl ConfigFile {
    pub fn new(path: impl AsRef<Path>, artifact: ConfigArtifact) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            artifact,
        }
    }

    fn installed(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }
}

impl Resource for ConfigFile {
    fn id(&self) -> String {
        format!("config:{}", self.path.display())
    }

    fn description(&self) -> String {
        format!(
            "Service configuration {} ({} sections)",
            self.path.display(),
            self.artifact.section_names().len()
        )
    }

    fn resource_type(&self) -> &'static str {
        "config"
    }

    fn current_state(&self) -> Result<ResourceState> {
        Ok(match self.installed()? {
            None => ResourceState::Absent,
            Some(content) if content == self.artifact.render() => ResourceState::present(),
            Some(content) => ResourceState::Modified {
                from: format!("{} bytes", content.len()),
                to: format!("{} bytes", self.artifact.render().len()),
            },
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present()
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let result = match self.installed()? {
            None => ApplyResult::Created,
            Some(content) if content == self.artifact.render() => return Ok(ApplyResult::NoChange),
            Some(_) => ApplyResult::Modified,
        };
        log::info!("Writing {}", self.path.display());
        write_artifact(&self.path, &self.artifact)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Assignment, DEFAULT_SECTION};
    use tempfile::TempDir;

    fn artifact(backend: &str) -> ConfigArtifact {
        ConfigArtifact::from_assignments(&[
            Assignment::new(DEFAULT_SECTION, "enabled_share_backends", backend),
            Assignment::new(backend, "share_backend_name", backend.to_uppercase()),
        ])
        .unwrap()
    }

    #[test]
    fn writes_then_converges() {
        let dir = TempDir::new().unwrap();
        let file = ConfigFile::new(dir.path().join("manila.conf"), artifact("london"));
        let mut ctx = ApplyContext::new(false);

        assert_eq!(file.current_state().unwrap(), ResourceState::Absent);
        assert_eq!(file.apply(&mut ctx).unwrap(), ApplyResult::Created);
        assert_eq!(file.current_state().unwrap(), ResourceState::present());
        assert_eq!(file.apply(&mut ctx).unwrap(), ApplyResult::NoChange);
    }

    #[test]
    fn replaces_a_different_artifact_entirely() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manila.conf");
        ConfigFile::new(&path, artifact("london"))
            .apply(&mut ApplyContext::new(false))
            .unwrap();

        let file = ConfigFile::new(&path, artifact("paris"));
        assert!(matches!(
            file.current_state().unwrap(),
            ResourceState::Modified { .. }
        ));
        assert_eq!(
            file.apply(&mut ApplyContext::new(false)).unwrap(),
            ApplyResult::Modified
        );
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[paris]"));
        assert!(!content.contains("london"));
    }
}
