//! Status command implementation.

use std::path::PathBuf;

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;

/// Show how many records of each kind are stored.
///
/// # Errors
///
/// Returns an error if the database does not exist or cannot be queried.
pub fn execute(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))?;
    if !db_path.exists() {
        return Err(Error::NotInitialized { path: db_path });
    }

    let storage = SqliteStorage::open(&db_path)?;
    let counts = storage.counts()?;

    if json {
        let output = serde_json::json!({
            "database": db_path.display().to_string(),
            "counts": counts,
            "total": counts.total(),
        });
        println!("{output}");
        return Ok(());
    }

    println!("Database: {}", db_path.display());
    println!();
    println!("  Sites:    {}", counts.sites);
    println!("  Pages:    {}", counts.pages);
    println!("  Comments: {}", counts.comments);
    println!("  Users:    {}", counts.users);
    println!();
    println!("  Total: {} records", counts.total());
    Ok(())
}
