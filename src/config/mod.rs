//! Configuration management.
//!
//! This module resolves where threadport keeps its data and loads the
//! engine settings.
//!
//! # Layout
//!
//! Everything lives under `~/.threadport/`:
//! - **Database**: `~/.threadport/data/threadport.db`
//! - **Test database**: `~/.threadport/test/threadport.db` (see [`is_test_mode`])
//! - **Settings**: `~/.threadport/config.json`

mod settings;

pub use settings::{load_settings, load_settings_from, TransferSettings};

use std::path::{Path, PathBuf};

/// Get the threadport home directory (`~/.threadport/`).
#[must_use]
pub fn threadport_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".threadport"))
}

/// Check if test mode is enabled.
///
/// Test mode is enabled by setting `TPORT_TEST_DB=1` (or any non-empty value).
/// This redirects all database operations to an isolated test database.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("TPORT_TEST_DB").is_ok_and(|v| is_truthy(&v))
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0" && value.to_lowercase() != "false"
}

/// Get the test database path.
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    threadport_home().map(|dir| dir.join("test").join("threadport.db"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided (`--db` or `TPORT_DB`), use it directly
/// 2. `TPORT_TEST_DB` environment variable → uses test database
/// 3. `THREADPORT_DB` environment variable
/// 4. Global location: `~/.threadport/data/threadport.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if is_test_mode() {
        return test_db_path();
    }

    if let Ok(db_path) = std::env::var("THREADPORT_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    threadport_home().map(|dir| dir.join("data").join("threadport.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/db.sqlite");
        let result = resolve_db_path(Some(&explicit));
        assert_eq!(result, Some(explicit));
    }

    #[test]
    fn test_resolve_db_path_defaults_to_home() {
        let path = resolve_db_path(None).unwrap();
        assert!(path.ends_with("threadport.db"));
    }

    #[test]
    fn test_test_db_path_is_separate() {
        let home = threadport_home().unwrap();
        let test = test_db_path().unwrap();

        assert!(test.to_string_lossy().contains("/test/"));
        assert_ne!(home.join("data").join("threadport.db"), test);
    }

    #[test]
    fn test_truthy_values() {
        assert!(!is_truthy(""));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy("FALSE"));

        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(is_truthy("yes"));
    }
}
