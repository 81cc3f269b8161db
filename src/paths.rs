//! Settings file location and path expansion
//!
//! # Path Resolution Priority
//!
//! For the settings file:
//! 1. `--config <path>` (or `SHARESTACK_CONFIG`, through clap)
//! 2. `XDG_CONFIG_HOME/sharestack/sharestack.toml` (if set)
//! 3. Platform default: `~/.config/sharestack/sharestack.toml`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming the settings file
pub const ENV_CONFIG: &str = "SHARESTACK_CONFIG";

const APP_DIR: &str = "sharestack";
const CONFIG_FILE: &str = "sharestack.toml";

/// Directory holding the settings file
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.is_empty()
    {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join(APP_DIR))
}

/// Settings file to load, and whether the user named it explicitly.
///
/// An explicit path that does not exist is an error; the default location
/// may be absent, which means "all defaults".
pub fn settings_file(explicit: Option<&Path>) -> Result<(PathBuf, bool)> {
    match explicit {
        Some(path) => Ok((expand(&path.to_string_lossy()), true)),
        None => Ok((config_dir()?.join(CONFIG_FILE), false)),
    }
}

/// Expand `~` and environment variables in a path string.
///
/// Unknown variables are left as-is.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand a path string in place, keeping it a `String` for serialization
pub fn expand_in_place(path: &mut String) {
    let expanded = expand(path);
    *path = expanded.to_string_lossy().into_owned();
}
