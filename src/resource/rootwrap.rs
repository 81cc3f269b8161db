//! Rootwrap filter definitions and config
//!
//! The privilege wrapper reads `rootwrap.conf` and the `*.filters` files it
//! points at. Both are root-owned so the stack user can't widen its own
//! grant.

use crate::artifact::ConfigArtifact;
use crate::template::{Assignment, DEFAULT_SECTION};
use anyhow::{Context, Result};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState, SudoRequirement};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const SYSTEM_EXEC_DIRS: [&str; 4] = ["/sbin", "/usr/sbin", "/bin", "/usr/bin"];

#[derive(Debug, Clone)]
pub struct RootwrapFilters {
    source_dir: PathBuf,
    filters_dir: PathBuf,
    config_path: PathBuf,
    bin_dir: PathBuf,
}

impl RootwrapFilters {
    pub fn new(
        source_dir: impl AsRef<Path>,
        filters_dir: impl AsRef<Path>,
        config_path: impl AsRef<Path>,
        bin_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            source_dir: source_dir.as_ref().to_path_buf(),
            filters_dir: filters_dir.as_ref().to_path_buf(),
            config_path: config_path.as_ref().to_path_buf(),
            bin_dir: bin_dir.as_ref().to_path_buf(),
        }
    }

    /// Filter files shipped in the source tree, sorted by name
    fn filters(&self) -> Result<Vec<PathBuf>> {
        let mut filters = Vec::new();
        for entry in WalkDir::new(&self.source_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry
                .with_context(|| format!("Failed to list {}", self.source_dir.display()))?;
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "filters")
            {
                filters.push(entry.into_path());
            }
        }
        Ok(filters)
    }

    fn installed_path(&self, filter: &Path) -> PathBuf {
        match filter.file_name() {
            Some(name) => self.filters_dir.join(name),
            None => self.filters_dir.clone(),
        }
    }

    pub fn config_content(&self) -> Result<String> {
        let mut exec_dirs: Vec<String> = SYSTEM_EXEC_DIRS.iter().map(|d| d.to_string()).collect();
        exec_dirs.push(self.bin_dir.to_string_lossy().into_owned());
        if !exec_dirs.iter().any(|d| d == "/usr/local/bin") {
            exec_dirs.push("/usr/local/bin".to_string());
        }

        let artifact = ConfigArtifact::from_assignments(&[
            Assignment::new(
                DEFAULT_SECTION,
                "filters_path",
                self.filters_dir.to_string_lossy(),
            ),
            Assignment::new(DEFAULT_SECTION, "exec_dirs", exec_dirs.join(",")),
            Assignment::new(DEFAULT_SECTION, "use_syslog", "False"),
        ])?;
        Ok(artifact.render())
    }

    /// Filters whose installed copy is missing or differs
    fn stale_filters(&self) -> Result<Vec<PathBuf>> {
        let mut stale = Vec::new();
        for filter in self.filters()? {
            let wanted = fs::read(&filter)
                .with_context(|| format!("Failed to read {}", filter.display()))?;
            if fs::read(self.installed_path(&filter)).ok().as_ref() != Some(&wanted) {
                stale.push(filter);
            }
        }
        Ok(stale)
    }

    fn config_current(&self) -> Result<bool> {
        let wanted = self.config_content()?;
        Ok(fs::read_to_string(&self.config_path).is_ok_and(|c| c == wanted))
    }
}

impl Resource for RootwrapFilters {
    fn id(&self) -> String {
        format!("rootwrap:{}", self.filters_dir.display())
    }

    fn description(&self) -> String {
        format!(
            "Rootwrap filters from {} and {}",
            self.source_dir.display(),
            self.config_path.display()
        )
    }

    fn resource_type(&self) -> &'static str {
        "rootwrap"
    }

    fn sudo_requirement(&self) -> SudoRequirement {
        SudoRequirement::Required {
            reason: format!("install root-owned filters in {}", self.filters_dir.display()),
        }
    }

    fn current_state(&self) -> Result<ResourceState> {
        let total = self.filters()?.len();
        let stale = self.stale_filters()?.len();
        let config_current = self.config_current()?;

        Ok(match (stale, config_current) {
            (0, true) => ResourceState::present(),
            (n, false) if n == total && !self.config_path.exists() => ResourceState::Absent,
            (n, _) => ResourceState::Modified {
                from: format!(
                    "{n} of {total} filters stale{}",
                    if config_current { "" } else { ", config outdated" }
                ),
                to: format!("{total} filters"),
            },
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present()
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let stale = self.stale_filters()?;
        let config_current = self.config_current()?;
        if stale.is_empty() && config_current {
            return Ok(ApplyResult::NoChange);
        }

        let sudo = ctx.require_sudo()?;
        let existed = self.config_path.exists();
        let dir = self.filters_dir.to_string_lossy();
        sudo.run_checked(
            "install",
            &["-d", "-m", "0755", "-o", "root", "-g", "root", &dir],
        )?;

        for filter in &stale {
            let source = filter.to_string_lossy();
            let dest = self.installed_path(filter);
            log::info!("Installing {}", dest.display());
            sudo.run_checked(
                "install",
                &[
                    "-m",
                    "0644",
                    "-o",
                    "root",
                    "-g",
                    "root",
                    &source,
                    &dest.to_string_lossy(),
                ],
            )?;
        }

        if !config_current {
            let mut tmp = tempfile::NamedTempFile::new().context("Failed to create temp file")?;
            tmp.write_all(self.config_content()?.as_bytes())?;
            tmp.flush()?;
            log::info!("Installing {}", self.config_path.display());
            sudo.run_checked(
                "install",
                &[
                    "-m",
                    "0644",
                    "-o",
                    "root",
                    "-g",
                    "root",
                    &tmp.path().to_string_lossy(),
                    &self.config_path.to_string_lossy(),
                ],
            )?;
        }

        Ok(if existed {
            ApplyResult::Modified
        } else {
            ApplyResult::Created
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sudo::testing::RecordingSudo;
    use declarative::CommandOutput;
    use tempfile::TempDir;

    struct Layout {
        _dir: TempDir,
        source: PathBuf,
        installed: PathBuf,
        config: PathBuf,
    }

    fn layout() -> Layout {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src/etc/manila/rootwrap.d");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("share.filters"), "[Filters]\nls: CommandFilter, ls, root\n")
            .unwrap();
        fs::write(source.join("volume.filters"), "[Filters]\n").unwrap();
        fs::write(source.join("README"), "not a filter").unwrap();
        Layout {
            installed: dir.path().join("etc/rootwrap.d"),
            config: dir.path().join("etc/rootwrap.conf"),
            source,
            _dir: dir,
        }
    }

    fn resource(l: &Layout) -> RootwrapFilters {
        RootwrapFilters::new(&l.source, &l.installed, &l.config, "/usr/local/bin")
    }

    /// Executes `install` without ownership flags so tests can run unprivileged
    fn local_install() -> RecordingSudo {
        RecordingSudo::with_handler(|cmd, args| {
            if cmd == "install" {
                if args[0] == "-d" {
                    fs::create_dir_all(args[args.len() - 1]).unwrap();
                } else {
                    fs::copy(args[args.len() - 2], args[args.len() - 1]).unwrap();
                }
            }
            Ok(CommandOutput::ok(Vec::new()))
        })
    }

    #[test]
    fn only_filter_files_are_picked_up() {
        let l = layout();
        let names: Vec<_> = resource(&l)
            .filters()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["share.filters", "volume.filters"]);
    }

    #[test]
    fn config_points_at_installed_filters() {
        let l = layout();
        let content = resource(&l).config_content().unwrap();
        assert!(content.starts_with("[DEFAULT]\n"));
        assert!(content.contains(&format!("filters_path = {}", l.installed.display())));
        assert!(content.contains("exec_dirs = /sbin,/usr/sbin,/bin,/usr/bin,/usr/local/bin\n"));
    }

    #[test]
    fn installs_everything_then_converges() {
        let l = layout();
        let rootwrap = resource(&l);
        assert_eq!(rootwrap.current_state().unwrap(), ResourceState::Absent);

        let sudo = local_install();
        let mut ctx = ApplyContext::with_sudo(false, &sudo);
        assert_eq!(rootwrap.apply(&mut ctx).unwrap(), ApplyResult::Created);
        assert_eq!(sudo.calls().len(), 4);
        assert!(l.installed.join("share.filters").exists());
        assert!(!l.installed.join("README").exists());

        assert_eq!(rootwrap.current_state().unwrap(), ResourceState::present());
        assert_eq!(rootwrap.apply(&mut ctx).unwrap(), ApplyResult::NoChange);
        assert_eq!(sudo.calls().len(), 4);
    }

    #[test]
    fn changed_filter_is_reinstalled_alone() {
        let l = layout();
        let rootwrap = resource(&l);
        let sudo = local_install();
        let mut ctx = ApplyContext::with_sudo(false, &sudo);
        rootwrap.apply(&mut ctx).unwrap();

        fs::write(l.source.join("volume.filters"), "[Filters]\nmount: CommandFilter\n").unwrap();
        assert!(matches!(
            rootwrap.current_state().unwrap(),
            ResourceState::Modified { .. }
        ));
        assert_eq!(rootwrap.apply(&mut ctx).unwrap(), ApplyResult::Modified);

        let calls = sudo.calls();
        let last = &calls[calls.len() - 1];
        assert!(last.contains("volume.filters"));
        assert_eq!(calls.len(), 6);
    }
}
