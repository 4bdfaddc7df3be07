//! Upload command implementation.

use std::path::Path;

use crate::error::Result;
use crate::transfer::stage_upload;

/// Stage `file` for a later import.
///
/// Prints the staged path, which is what the `file` import option expects.
///
/// # Errors
///
/// Returns an error if the file cannot be read or staged.
pub fn execute(file: &Path, json: bool) -> Result<()> {
    let staged = stage_upload(file)?;

    if json {
        let output = serde_json::json!({ "filename": staged.display().to_string() });
        println!("{output}");
    } else {
        println!("{}", staged.display());
    }
    Ok(())
}
