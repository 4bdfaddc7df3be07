//! Database schema definitions.
//!
//! This module contains the complete SQLite schema for the record store.
//! References between tables are identity keys and are not enforced with
//! foreign keys: imported keys are format-local, and reference resolution
//! is the transfer executor's job.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the threadport database.
///
/// Note: Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Record Tables
-- ====================

CREATE TABLE IF NOT EXISTS sites (
    key TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    urls TEXT NOT NULL DEFAULT '[]',
    imported_at INTEGER NOT NULL
);

-- Page and comment keys are unique per site only.
CREATE TABLE IF NOT EXISTS pages (
    site_key TEXT NOT NULL,
    key TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL DEFAULT '',
    admin_only INTEGER NOT NULL DEFAULT 0,
    imported_at INTEGER NOT NULL,
    PRIMARY KEY (site_key, key)
);

CREATE TABLE IF NOT EXISTS comments (
    site_key TEXT NOT NULL,
    key TEXT NOT NULL,
    page_key TEXT NOT NULL,
    parent_key TEXT,
    user_key TEXT,
    content TEXT NOT NULL DEFAULT '',
    ua TEXT NOT NULL DEFAULT '',
    ip TEXT NOT NULL DEFAULT '',
    is_pending INTEGER NOT NULL DEFAULT 0,
    is_collapsed INTEGER NOT NULL DEFAULT 0,
    is_pinned INTEGER NOT NULL DEFAULT 0,
    vote_up INTEGER NOT NULL DEFAULT 0,
    vote_down INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL DEFAULT 0,
    imported_at INTEGER NOT NULL,
    PRIMARY KEY (site_key, key)
);

CREATE INDEX IF NOT EXISTS idx_comments_page ON comments(site_key, page_key);
CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(site_key, parent_key);
CREATE INDEX IF NOT EXISTS idx_comments_user ON comments(user_key);

CREATE TABLE IF NOT EXISTS users (
    key TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT '',
    link TEXT NOT NULL DEFAULT '',
    badge_name TEXT NOT NULL DEFAULT '',
    badge_color TEXT NOT NULL DEFAULT '',
    imported_at INTEGER NOT NULL
);
";

/// Apply pragmas and the schema to a connection.
///
/// Idempotent: safe to call on every open.
///
/// # Errors
///
/// Returns an error if a pragma or DDL statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}
