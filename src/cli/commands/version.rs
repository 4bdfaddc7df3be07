//! Version command implementation.

use crate::error::Result;
use crate::transfer::adapter::native::FORMAT_VERSION;
use crate::transfer::AdapterRegistry;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    native_format_version: u32,
    formats: Vec<&'static str>,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };
    let formats = AdapterRegistry::builtin().names();

    if json {
        let output = VersionOutput {
            version,
            build,
            native_format_version: FORMAT_VERSION,
            formats,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("tport version {version} ({build})");
    println!("native format v{FORMAT_VERSION}; formats: {}", formats.join(", "));
    Ok(())
}
