//! Locating the configuration file.

use anyhow::{Context, Result};
use ck_core::config::Config;
use std::path::{Path, PathBuf};

/// Searched in order when no `--config` is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./camkeep.json",
    "~/.config/camkeep/config.json",
    "/etc/camkeep/config.json",
];

/// The config file to use: `custom` if given, else the first default
/// location that exists.
pub fn locate(custom: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = custom {
        return Ok(path.to_path_buf());
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }

    anyhow::bail!(
        "No config file found (tried {}); pass one with --config",
        DEFAULT_CONFIG_PATHS.join(", ")
    )
}

/// Locate, parse and check the configuration. Warnings are logged.
pub fn load(custom: Option<&Path>) -> Result<(PathBuf, Config)> {
    let path = locate(custom)?;
    let config =
        Config::load(&path).with_context(|| format!("Failed to load config file: {:?}", path))?;

    for warning in config.validate() {
        tracing::warn!("Config: {warning}");
    }
    Ok((path, config))
}
