//! The INI configuration artifact
//!
//! Built fresh from assignments on every run and swapped into place in one
//! rename, so readers see either the old file or the new one.

use crate::error::BootstrapError;
use crate::template::{Assignment, DEFAULT_SECTION};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::Path;

/// Ordered `(section, key) -> value` mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigArtifact {
    sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl ConfigArtifact {
    /// Group assignments into sections.
    ///
    /// DEFAULT comes first, other sections in order of first appearance.
    /// Duplicate keys within a section and values with line breaks are
    /// configuration errors.
    pub fn from_assignments(assignments: &[Assignment]) -> Result<Self, BootstrapError> {
        let mut artifact = Self {
            sections: vec![Section {
                name: DEFAULT_SECTION.to_string(),
                entries: Vec::new(),
            }],
        };
        let mut seen: HashSet<(&str, &str)> = HashSet::new();

        for a in assignments {
            if a.section.is_empty() || a.section.contains([']', '\n', '\r']) {
                return Err(BootstrapError::configuration(format!(
                    "invalid section name '{}'",
                    a.section
                )));
            }
            if a.key.is_empty() || a.key.contains(['=', '\n', '\r']) {
                return Err(BootstrapError::configuration(format!(
                    "invalid key '{}' in [{}]",
                    a.key, a.section
                )));
            }
            if a.value.contains(['\n', '\r']) {
                return Err(BootstrapError::configuration(format!(
                    "value of {}.{} contains a line break",
                    a.section, a.key
                )));
            }
            if !seen.insert((a.section.as_str(), a.key.as_str())) {
                return Err(BootstrapError::configuration(format!(
                    "duplicate key {} in [{}]",
                    a.key, a.section
                )));
            }

            let index = match artifact.sections.iter().position(|s| s.name == a.section) {
                Some(index) => index,
                None => {
                    artifact.sections.push(Section {
                        name: a.section.clone(),
                        entries: Vec::new(),
                    });
                    artifact.sections.len() - 1
                }
            };
            artifact.sections[index]
                .entries
                .push((a.key.clone(), a.value.clone()));
        }

        Ok(artifact)
    }

    /// INI text: `key = value` lines, sections separated by a blank line
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "[{}]", section.name);
            for (key, value) in &section.entries {
                let _ = writeln!(out, "{key} = {value}");
            }
        }
        out
    }

    #[cfg(test)]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == section)?
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }

    /// Sections other than DEFAULT
    pub fn backend_sections(&self) -> Vec<&str> {
        self.section_names()
            .into_iter()
            .filter(|s| *s != DEFAULT_SECTION)
            .collect()
    }
}

/// Replace the file at `path` with the rendered artifact.
///
/// The content goes to a temporary file in the same directory which is
/// then renamed over the target.
pub fn write_artifact(path: &Path, artifact: &ConfigArtifact) -> Result<()> {
    write_atomic(path, artifact.render().as_bytes(), 0o644)
}

/// Write `content` beside `path` and rename it into place with `mode`
pub fn write_atomic(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(content)
        .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync {}", tmp.path().display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set mode on {}", tmp.path().display()))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
