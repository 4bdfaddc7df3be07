//! Record store for threadport.
//!
//! The transfer engine talks to persistence only through [`RecordStore`];
//! [`SqliteStorage`] is the production implementation.
//!
//! # Submodules
//!
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation
//!
//! # Concurrency
//!
//! Several transfer jobs may share one store. The executor's "does this
//! record already exist" check is a point-in-time read followed by a
//! separate write, so two concurrent jobs importing the same identity can
//! race between check and write. The store only guarantees that each
//! individual write is atomic.

pub mod schema;
pub mod sqlite;

pub use sqlite::{SqliteStorage, StoreCounts};

use crate::error::Result;
use crate::model::{Record, RecordId};

/// Persistence seam used by the transfer executor.
pub trait RecordStore {
    /// Look up the persisted record with this identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn find(&self, id: &RecordId) -> Result<Option<Record>>;

    /// Whether a record with this identity is persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn exists(&self, id: &RecordId) -> Result<bool> {
        Ok(self.find(id)?.is_some())
    }

    /// Insert or replace a record. Must be atomic per record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn persist(&mut self, record: &Record) -> Result<()>;
}
