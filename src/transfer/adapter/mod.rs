//! Format adapters and their registry.
//!
//! An adapter converts between one external interchange format and the
//! canonical [`Record`] model. Import is lazy: `open` returns an iterator
//! that reads the input as it is consumed. Export renders a collected
//! [`ExportSet`] into a string.

pub mod artrans;
pub mod native;

use std::io::BufRead;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{Comment, Page, Record, Site, User};

use super::options::Options;
use super::types::RecordError;

pub use artrans::ArtransAdapter;
pub use native::NativeAdapter;

/// Lazy sequence of records produced by an adapter.
pub type RecordStream<'a> =
    Box<dyn Iterator<Item = std::result::Result<Incoming, RecordError>> + 'a>;

/// One record read from an import stream.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub record: Record,
    /// Filled in from another entry's fields (the site, page or author a
    /// comment mentions) instead of read as an entry of its own. Implied
    /// records are created when missing and never replace a stored one.
    pub implied: bool,
}

impl Incoming {
    /// A record the input states in full.
    #[must_use]
    pub const fn entry(record: Record) -> Self {
        Self {
            record,
            implied: false,
        }
    }

    /// A record derived from another entry.
    #[must_use]
    pub const fn implied(record: Record) -> Self {
        Self {
            record,
            implied: true,
        }
    }
}

/// What an adapter knows about the import it is serving.
#[derive(Debug, Clone)]
pub struct ImportContext {
    /// Target site key.
    pub site: String,
    /// All job options; adapters read the keys they claim.
    pub options: Options,
}

/// Records collected for one export, already in walk order.
#[derive(Debug, Default, Clone)]
pub struct ExportSet {
    pub sites: Vec<Site>,
    pub pages: Vec<Page>,
    pub comments: Vec<Comment>,
    pub users: Vec<User>,
}

impl ExportSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len() + self.pages.len() + self.comments.len() + self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Metadata written ahead of the records by formats that have a header.
#[derive(Debug, Clone, Serialize)]
pub struct ExportHeader {
    pub format: String,
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    /// `all` or `site:<key>`.
    pub scope: String,
}

/// One interchange format.
pub trait FormatAdapter: Send + Sync {
    /// Registry name, matched exactly.
    fn name(&self) -> &'static str;

    /// One-line description for listings.
    fn description(&self) -> &'static str;

    fn supports_import(&self) -> bool {
        true
    }

    fn supports_export(&self) -> bool {
        true
    }

    /// Start reading records from `reader`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if the container itself is unusable (wrong
    /// header, not an array, unreadable). Problems with individual entries
    /// surface later as `RecordError` items of the stream.
    fn open(&self, ctx: &ImportContext, reader: Box<dyn BufRead>) -> Result<RecordStream<'static>>;

    /// Render `records` into `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be serialized.
    fn write(&self, records: &ExportSet, out: &mut String, header: &ExportHeader) -> Result<()>;
}

/// Name → adapter lookup, fixed at construction.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn FormatAdapter>>,
}

impl AdapterRegistry {
    /// Registry with the built-in formats.
    #[must_use]
    pub fn builtin() -> Self {
        Self::with_adapters(vec![Box::new(NativeAdapter), Box::new(ArtransAdapter)])
    }

    #[must_use]
    pub fn with_adapters(adapters: Vec<Box<dyn FormatAdapter>>) -> Self {
        Self { adapters }
    }

    /// Look up an adapter by exact, case-sensitive name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownFormat` listing the registered names.
    pub fn resolve(&self, name: &str) -> Result<&dyn FormatAdapter> {
        self.adapters
            .iter()
            .find(|a| a.name() == name)
            .map(|a| &**a)
            .ok_or_else(|| Error::UnknownFormat {
                name: name.to_string(),
                available: self.names().iter().map(ToString::to_string).collect(),
            })
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn FormatAdapter> {
        self.adapters.iter().map(|a| &**a)
    }
}
