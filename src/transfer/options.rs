//! Job options.
//!
//! Callers hand the engine a JSON object payload. Each pair is flattened
//! into a `key:value` string, which is the wire shape the admin tooling has
//! always used. The engine then folds that list into [`Options`] where a
//! repeated key keeps its last value.
//!
//! Object iteration order is not guaranteed by callers, so nothing here may
//! depend on option order beyond that last-write-wins rule.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde_json::Value;

use crate::error::{Error, Result};

/// Option keys understood by the executor. Adapters may claim others.
pub mod keys {
    pub const FORMAT: &str = "format";
    pub const SITE: &str = "site";
    pub const MODE: &str = "mode";
    pub const FILE: &str = "file";
    pub const DATA: &str = "data";
}

/// A single `key:value` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOption {
    pub key: String,
    pub value: String,
}

impl TransferOption {
    /// Parse `key:value`, splitting at the first colon.
    ///
    /// The key is trimmed; the value is kept verbatim so paths and inline
    /// data may themselves contain colons.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOptions` if there is no colon or the key is empty.
    pub fn parse(raw: &str) -> Result<Self> {
        let (key, value) = raw
            .split_once(':')
            .ok_or_else(|| Error::InvalidOptions(format!("expected key:value, got '{raw}'")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidOptions(format!("empty option key in '{raw}'")));
        }
        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

impl fmt::Display for TransferOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}

/// Flatten a JSON object payload into `key:value` strings.
///
/// # Errors
///
/// Returns `InvalidOptions` if the payload is not a JSON object.
pub fn flatten_payload(payload: &str) -> Result<Vec<String>> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| Error::InvalidOptions(format!("payload is not valid JSON: {e}")))?;

    let Value::Object(map) = value else {
        return Err(Error::InvalidOptions(
            "payload must be a JSON object".to_string(),
        ));
    };

    Ok(map
        .into_iter()
        .map(|(key, value)| format!("{key}:{}", stringify(&value)))
        .collect())
}

/// Render a JSON value as an option value.
///
/// Strings are taken verbatim, null becomes empty, and compound values
/// stay as compact JSON for the adapter to interpret.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Normalized option set with last-write-wins on duplicate keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    values: BTreeMap<String, String>,
}

impl Options {
    /// Fold a raw option list. Later entries replace earlier ones.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOptions` if any entry is not `key:value`.
    pub fn from_list<S: AsRef<str>>(raw: &[S]) -> Result<Self> {
        let mut values = BTreeMap::new();
        for entry in raw {
            let option = TransferOption::parse(entry.as_ref())?;
            values.insert(option.key, option.value);
        }
        Ok(Self { values })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Get a value, treating blank values as absent.
    #[must_use]
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Get a required, non-blank value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOptions` naming the missing key.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get_non_empty(key)
            .ok_or_else(|| Error::InvalidOptions(format!("missing required option: {key}")))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What to do when an incoming record collides with a different stored one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictMode {
    /// Replace the stored record (requires confirmation).
    #[default]
    Overwrite,
    /// Keep the stored record.
    Skip,
}

impl std::str::FromStr for ConflictMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "overwrite" => Ok(Self::Overwrite),
            "skip" => Ok(Self::Skip),
            other => Err(Error::InvalidOptions(format!(
                "invalid mode '{other}' (expected overwrite or skip)"
            ))),
        }
    }
}

/// Where an import reads its raw input from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A previously staged file.
    File(PathBuf),
    /// Data carried inline in the payload.
    Inline(String),
}

/// Validated import directives.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub format: String,
    pub site: String,
    pub mode: ConflictMode,
    pub source: InputSource,
    /// The full option set, for adapters to claim their own keys.
    pub options: Options,
}

impl ImportRequest {
    /// Validate required options.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOptions` if `format`, `site` or an input source is
    /// missing, if both `file` and `data` are given, or if `mode` is invalid.
    pub fn from_options(options: Options) -> Result<Self> {
        let format = options.require(keys::FORMAT)?.to_string();
        let site = options.require(keys::SITE)?.to_string();

        let mode = match options.get_non_empty(keys::MODE) {
            Some(mode) => mode.parse()?,
            None => ConflictMode::default(),
        };

        let source = match (options.get_non_empty(keys::FILE), options.get(keys::DATA)) {
            (Some(_), Some(data)) if !data.trim().is_empty() => {
                return Err(Error::InvalidOptions(
                    "give either file or data, not both".to_string(),
                ));
            }
            (Some(path), _) => InputSource::File(PathBuf::from(path)),
            (None, Some(data)) if !data.trim().is_empty() => InputSource::Inline(data.to_string()),
            _ => {
                return Err(Error::InvalidOptions(
                    "missing required option: file or data".to_string(),
                ));
            }
        };

        Ok(Self {
            format,
            site,
            mode,
            source,
            options,
        })
    }
}
