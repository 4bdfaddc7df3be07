//! Export serializer.
//!
//! Walks the store in a fixed order (sites, pages, comments, users, each by
//! identity) and hands the collected set to an adapter. The blob is built in
//! memory and only returned once complete.

use std::fmt;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::storage::SqliteStorage;

use super::adapter::{ExportHeader, ExportSet, FormatAdapter};
use super::adapter::native::FORMAT_VERSION;
use super::types::{JobStatus, TransferJob};

/// Which part of the store to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportScope {
    All,
    Site(String),
}

impl ExportScope {
    /// Scope for an optional site key; blank means everything.
    #[must_use]
    pub fn from_site(site: Option<&str>) -> Self {
        match site.map(str::trim) {
            Some(key) if !key.is_empty() => Self::Site(key.to_string()),
            _ => Self::All,
        }
    }

    fn site_key(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Site(key) => Some(key),
        }
    }
}

impl fmt::Display for ExportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Site(key) => write!(f, "site:{key}"),
        }
    }
}

pub struct Exporter<'a> {
    storage: &'a SqliteStorage,
}

impl<'a> Exporter<'a> {
    #[must_use]
    pub const fn new(storage: &'a SqliteStorage) -> Self {
        Self { storage }
    }

    /// Read every record in scope, in walk order.
    ///
    /// # Errors
    ///
    /// Returns an error if a store query fails.
    pub fn collect(&self, scope: &ExportScope) -> Result<ExportSet> {
        let site = scope.site_key();
        Ok(ExportSet {
            sites: self.storage.list_sites(site)?,
            pages: self.storage.list_pages(site)?,
            comments: self.storage.list_comments(site)?,
            users: self.storage.list_users(site)?,
        })
    }

    /// Render the scope with `adapter`.
    ///
    /// An empty or unknown scope still yields a well-formed blob.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` for any failure; no partial blob is returned.
    pub fn serialize(&self, scope: &ExportScope, adapter: &dyn FormatAdapter) -> Result<String> {
        if !adapter.supports_export() {
            return Err(Error::Serialization(format!(
                "format '{}' cannot be exported",
                adapter.name()
            )));
        }

        let set = self
            .collect(scope)
            .map_err(|e| Error::Serialization(format!("reading store: {e}")))?;
        debug!(
            sites = set.sites.len(),
            pages = set.pages.len(),
            comments = set.comments.len(),
            users = set.users.len(),
            "Collected export set"
        );

        let header = ExportHeader {
            format: adapter.name().to_string(),
            version: FORMAT_VERSION,
            exported_at: Utc::now(),
            scope: scope.to_string(),
        };

        let mut out = String::new();
        adapter
            .write(&set, &mut out, &header)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(out)
    }

    /// Run an export job, moving it to a terminal status.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the blob cannot be produced; the job is
    /// then marked Failed.
    pub fn run(
        &self,
        job: &mut TransferJob,
        scope: &ExportScope,
        adapter: &dyn FormatAdapter,
    ) -> Result<String> {
        job.status = JobStatus::Running;
        match self.serialize(scope, adapter) {
            Ok(blob) => {
                job.status = JobStatus::Succeeded;
                info!(
                    format = adapter.name(),
                    %scope,
                    bytes = blob.len(),
                    elapsed_ms = job.elapsed_ms(),
                    "Export finished"
                );
                Ok(blob)
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                Err(e)
            }
        }
    }
}
