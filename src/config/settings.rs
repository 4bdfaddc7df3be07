//! Engine settings.
//!
//! Loaded from `~/.threadport/config.json` when present. Environment
//! variables override the file:
//!
//! - `THREADPORT_DEFAULT_FORMAT` - format used by `export` when none is given
//! - `THREADPORT_MAX_RETRY_PASSES` - retry passes over deferred records

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transfer::DEFAULT_MAX_RETRY_PASSES;

use super::threadport_home;

/// Settings for transfer jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Export format when `--format` is not given.
    pub default_format: String,
    /// Passes over deferred records before they fail as unresolved.
    pub max_retry_passes: usize,
    /// Render import progress as HTML by default.
    pub html_progress: bool,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            default_format: "native".to_string(),
            max_retry_passes: DEFAULT_MAX_RETRY_PASSES,
            html_progress: false,
        }
    }
}

impl TransferSettings {
    /// Apply overrides from a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `THREADPORT_MAX_RETRY_PASSES` is not a number.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(format) = lookup("THREADPORT_DEFAULT_FORMAT") {
            if !format.trim().is_empty() {
                self.default_format = format.trim().to_string();
            }
        }

        if let Some(passes) = lookup("THREADPORT_MAX_RETRY_PASSES") {
            self.max_retry_passes = passes.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "THREADPORT_MAX_RETRY_PASSES must be a non-negative integer, got '{passes}'"
                ))
            })?;
        }

        Ok(self)
    }
}

/// Load settings from the default location plus environment overrides.
///
/// # Errors
///
/// Returns `Config` if the file exists but cannot be read or parsed, or an
/// override is invalid.
pub fn load_settings() -> Result<TransferSettings> {
    let settings = match threadport_home() {
        Some(home) => load_settings_from(&home.join("config.json"))?,
        None => TransferSettings::default(),
    };
    settings.apply_env(|key| std::env::var(key).ok())
}

/// Load settings from a specific file. A missing file yields defaults.
///
/// # Errors
///
/// Returns `Config` if the file cannot be read or parsed.
pub fn load_settings_from(path: &Path) -> Result<TransferSettings> {
    if !path.exists() {
        debug!(path = %path.display(), "No settings file, using defaults");
        return Ok(TransferSettings::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}
