//! Formats command implementation.

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::transfer::AdapterRegistry;

#[derive(Serialize)]
struct FormatInfo {
    name: &'static str,
    description: &'static str,
    import: bool,
    export: bool,
}

/// List the registered formats.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let registry = AdapterRegistry::builtin();
    let formats: Vec<FormatInfo> = registry
        .iter()
        .map(|a| FormatInfo {
            name: a.name(),
            description: a.description(),
            import: a.supports_import(),
            export: a.supports_export(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string(&formats)?);
        return Ok(());
    }

    for format in &formats {
        let directions = match (format.import, format.export) {
            (true, true) => "import, export",
            (true, false) => "import",
            (false, true) => "export",
            (false, false) => "-",
        };
        println!(
            "{:<10} {} {}",
            format.name.bold(),
            format.description,
            format!("({directions})").dimmed()
        );
    }
    Ok(())
}
