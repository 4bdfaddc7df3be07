//! Error types for threadport.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 4=options, 6=transfer, etc.)
//! - Retryability flags for scripted callers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Per-record failures are not represented here: they are recovered inside
//! the executor as [`crate::transfer::RecordError`] and never bubble up.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for threadport operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    DatabaseError,

    // Job could not start (exit 4)
    InvalidOptions,
    UnknownFormat,
    InvalidArgument,

    // Transfer aborted or incomplete (exit 6)
    ConfirmationDenied,
    SinkClosed,
    MalformedInput,
    TransferIncomplete,
    SerializationError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::InvalidOptions => "INVALID_OPTIONS",
            Self::UnknownFormat => "UNKNOWN_FORMAT",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ConfirmationDenied => "CONFIRMATION_DENIED",
            Self::SinkClosed => "SINK_CLOSED",
            Self::MalformedInput => "MALFORMED_INPUT",
            Self::TransferIncomplete => "TRANSFER_INCOMPLETE",
            Self::SerializationError => "SERIALIZATION_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::DatabaseError => 2,
            Self::InvalidOptions | Self::UnknownFormat | Self::InvalidArgument => 4,
            Self::ConfirmationDenied
            | Self::SinkClosed
            | Self::MalformedInput
            | Self::TransferIncomplete
            | Self::SerializationError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether re-running with corrected input is expected to help.
    ///
    /// Imports are idempotent against an identity-keyed target, so an
    /// aborted or partial transfer can always be re-run.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidOptions
                | Self::UnknownFormat
                | Self::InvalidArgument
                | Self::ConfirmationDenied
                | Self::TransferIncomplete
                | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in threadport operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("No database at {}", path.display())]
    NotInitialized { path: PathBuf },

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Unknown format: {name}")]
    UnknownFormat { name: String, available: Vec<String> },

    #[error("Confirmation denied: {action}")]
    ConfirmationDenied { action: String },

    #[error("Progress channel closed: {0}")]
    SinkClosed(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Transfer {status}: {failed} of {total} records failed")]
    TransferIncomplete {
        status: String,
        failed: usize,
        total: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::InvalidOptions(_) => ErrorCode::InvalidOptions,
            Self::UnknownFormat { .. } => ErrorCode::UnknownFormat,
            Self::ConfirmationDenied { .. } => ErrorCode::ConfirmationDenied,
            Self::SinkClosed(_) => ErrorCode::SinkClosed,
            Self::MalformedInput(_) => ErrorCode::MalformedInput,
            Self::TransferIncomplete { .. } => ErrorCode::TransferIncomplete,
            Self::Serialization(_) => ErrorCode::SerializationError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized { path } => Some(format!(
                "Nothing has been imported into {} yet. Run `tport import` first or pass --db.",
                path.display()
            )),

            Self::InvalidOptions(msg) => {
                if msg.contains("format") || msg.contains("site") {
                    Some(
                        "Required payload keys: format, site, and one of file or data. \
                         Example: {\"format\":\"native\",\"site\":\"demo\",\"file\":\"/tmp/export.jsonl\"}"
                            .to_string(),
                    )
                } else if msg.contains("mode") {
                    Some("Valid modes: overwrite (default), skip".to_string())
                } else {
                    None
                }
            }

            Self::UnknownFormat { available, .. } => Some(format!(
                "Registered formats: {}. Format names are case-sensitive.",
                available.join(", ")
            )),

            Self::ConfirmationDenied { .. } => Some(
                "Records processed before the conflict were kept. \
                 Re-run with --yes to overwrite, or set \"mode\":\"skip\" to keep existing records."
                    .to_string(),
            ),

            Self::TransferIncomplete { .. } => Some(
                "Imports are idempotent: fix the failed records and re-run the same import."
                    .to_string(),
            ),

            Self::SinkClosed(_)
            | Self::MalformedInput(_)
            | Self::Serialization(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_start_errors_share_exit_code() {
        let invalid = Error::InvalidOptions("missing required option: site".to_string());
        let unknown = Error::UnknownFormat {
            name: "wordpress".to_string(),
            available: vec!["artrans".to_string(), "native".to_string()],
        };
        assert_eq!(invalid.exit_code(), 4);
        assert_eq!(unknown.exit_code(), 4);
        assert_eq!(invalid.error_code().as_str(), "INVALID_OPTIONS");
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::UnknownFormat {
            name: "Native".to_string(),
            available: vec!["artrans".to_string(), "native".to_string()],
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "UNKNOWN_FORMAT");
        assert_eq!(json["error"]["exit_code"], 4);
        assert!(json["error"]["hint"].as_str().unwrap().contains("artrans, native"));
    }

    #[test]
    fn test_sink_closed_has_no_hint() {
        let err = Error::SinkClosed("broken pipe".to_string());
        assert!(err.hint().is_none());
        assert!(!err.error_code().is_retryable());
        assert_eq!(err.exit_code(), 6);
    }
}
