//! Command implementations.

pub mod completions;
pub mod export;
pub mod formats;
pub mod import;
pub mod status;
pub mod upload;
pub mod version;
