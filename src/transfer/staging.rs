//! Staging of uploaded import files.
//!
//! An upload is copied into a uniquely named file in the system temp
//! directory and kept there, so a later import job can reference it with a
//! `file:<path>` option. Staged files are never cleaned up automatically.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::Builder;
use tracing::info;

use crate::error::{Error, Result};

/// Filename prefix of staged uploads.
pub const STAGED_PREFIX: &str = "threadport-import-";

/// Copy `source` into a new staged file and return its path.
///
/// # Errors
///
/// Returns `InvalidArgument` if `source` is missing or not a file, or an
/// IO error if the copy fails.
pub fn stage_upload(source: &Path) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(Error::InvalidArgument(format!(
            "upload source is not a file: {}",
            source.display()
        )));
    }

    let mut input = File::open(source)?;
    let mut staged = new_staged_file()?;
    let bytes = io::copy(&mut input, &mut staged)?;
    staged.flush()?;

    let (_, path) = staged.keep().map_err(io::Error::from)?;
    info!(source = %source.display(), staged = %path.display(), bytes, "Staged upload");
    Ok(path)
}

fn new_staged_file() -> io::Result<tempfile::NamedTempFile> {
    Builder::new().prefix(STAGED_PREFIX).tempfile()
}
