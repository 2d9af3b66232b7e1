//! Configuration file lookup and scratch directory resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application directory name used under the platform config/cache dirs
pub const APP_DIR_NAME: &str = "jukebot";

/// Scratch directory resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. `scratch_dir` from the TOML config
/// 4. OS-dependent default (`<cache dir>/jukebot/downloads`)
pub fn resolve_scratch_dir(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        debug!(path = %path.display(), "Scratch directory from command line");
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            debug!(%path, "Scratch directory from {}", env_var_name);
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        debug!(path = %path.display(), "Scratch directory from config file");
        return path.to_path_buf();
    }

    default_scratch_dir()
}

/// Locate the TOML config file.
///
/// An explicit path (CLI or `JUKEBOT_CONFIG`) must exist. Otherwise the user
/// config (`~/.config/jukebot/config.toml`) is preferred over the system one
/// (`/etc/jukebot/config.toml`). Returns `Ok(None)` when neither exists.
pub fn find_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(Error::NotFound(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc").join(APP_DIR_NAME).join("config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }
    }

    Ok(None)
}

/// Read and parse a TOML file into any deserializable config type
pub fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(toml::from_str(&content)?)
}

/// OS-dependent default scratch directory
pub fn default_scratch_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join(APP_DIR_NAME).join("downloads"))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR_NAME).join("downloads"))
}
