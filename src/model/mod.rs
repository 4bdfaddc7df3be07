//! Data models for threadport.
//!
//! This module contains the canonical record model shared by every
//! format adapter:
//! - Site
//! - Page
//! - Comment
//! - User

pub mod record;

pub use record::{Comment, Page, Record, RecordId, RecordKind, Site, User};
