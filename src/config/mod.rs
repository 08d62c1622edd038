//! Configuration module
//!
//! Handles locating, loading and validating settings from YAML files and
//! environment variables.

mod settings;

pub use settings::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "RELAY_CONFIG";

/// Candidate config file locations, in search order
pub fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        paths.push(PathBuf::from(path));
    }
    paths.push(PathBuf::from("config.yaml"));
    paths.push(PathBuf::from("configs/config.yaml"));
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("responses-relay").join("config.yaml"));
    }
    paths
}

/// Load settings from the first existing candidate, then apply env overrides.
///
/// An explicitly named file that does not exist is an error; the implicit
/// locations fall back to defaults.
pub fn load(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("config file {} not found", path.display());
        }
    }

    let mut settings = match candidate_paths(explicit).into_iter().find(|p| p.exists()) {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            Settings::from_file(&path)?
        }
        None => {
            info!("No configuration file found, using defaults");
            Settings::default()
        }
    };

    settings.merge_env();
    settings.validate().context("invalid configuration")?;
    Ok(settings)
}
