//! Export command implementation.

use std::fs;
use std::path::PathBuf;

use colored::Colorize;

use crate::cli::ExportArgs;
use crate::config::{load_settings, resolve_db_path};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use crate::transfer::{AdapterRegistry, ExportScope, Exporter, TransferJob};

/// Execute the export command.
///
/// # Errors
///
/// Returns an error if the database does not exist, the format is unknown,
/// or serialization fails.
pub fn execute(args: &ExportArgs, db_path: Option<&PathBuf>, json: bool, quiet: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))?;
    if !db_path.exists() {
        return Err(Error::NotInitialized { path: db_path });
    }

    let settings = load_settings()?;
    let format = args
        .format
        .clone()
        .unwrap_or_else(|| settings.default_format.clone());

    let storage = SqliteStorage::open(&db_path)?;
    let registry = AdapterRegistry::builtin();
    let adapter = registry.resolve(&format)?;
    let scope = ExportScope::from_site(args.site.as_deref());

    let mut options = vec![format!("format:{format}")];
    if let ExportScope::Site(site) = &scope {
        options.push(format!("site:{site}"));
    }
    let mut job = TransferJob::export(options);
    let blob = Exporter::new(&storage).run(&mut job, &scope, adapter)?;

    if let Some(path) = &args.output {
        fs::write(path, &blob)?;
        if json {
            let output = serde_json::json!({
                "path": path.display().to_string(),
                "format": format,
                "scope": scope.to_string(),
                "bytes": blob.len(),
            });
            println!("{output}");
        } else if !quiet {
            println!(
                "{} Exported {} ({format}, {} bytes) to {}",
                "✓".green(),
                scope,
                blob.len(),
                path.display()
            );
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::json!({ "data": blob }));
    } else {
        print!("{blob}");
        if !blob.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}
