//! SQLite storage implementation.
//!
//! This module provides the record store backend using SQLite. Every write
//! is a single `INSERT ... ON CONFLICT DO UPDATE` statement, which gives the
//! executor the per-record atomicity it relies on.

use crate::error::Result;
use crate::model::{Comment, Page, Record, RecordId, RecordKind, Site, User};
use crate::storage::schema::apply_schema;
use crate::storage::RecordStore;
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Counts of stored records per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoreCounts {
    pub sites: usize,
    pub pages: usize,
    pub comments: usize,
    pub users: usize,
}

impl StoreCounts {
    /// Returns total number of records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.sites + self.pages + self.comments + self.users
    }
}

const SITE_COLUMNS: &str = "key, name, urls";
const PAGE_COLUMNS: &str = "key, site_key, title, url, admin_only";
const COMMENT_COLUMNS: &str = "c.key, c.site_key, c.page_key, c.parent_key, c.user_key, c.content, c.ua, c.ip, \
     c.is_pending, c.is_collapsed, c.is_pinned, c.vote_up, c.vote_down, c.created_at, c.updated_at";
const USER_COLUMNS: &str = "key, name, email, link, badge_name, badge_color";

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    // ==================
    // Point lookups
    // ==================

    /// Get a site by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_site(&self, key: &str) -> Result<Option<Site>> {
        let sql = format!("SELECT {SITE_COLUMNS} FROM sites WHERE key = ?1");
        Ok(self.conn.query_row(&sql, [key], site_from_row).optional()?)
    }

    /// Get a page of `site` by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_page(&self, site: &str, key: &str) -> Result<Option<Page>> {
        let sql = format!("SELECT {PAGE_COLUMNS} FROM pages WHERE site_key = ?1 AND key = ?2");
        Ok(self.conn.query_row(&sql, [site, key], page_from_row).optional()?)
    }

    /// Get a comment of `site` by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_comment(&self, site: &str, key: &str) -> Result<Option<Comment>> {
        let sql =
            format!("SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.site_key = ?1 AND c.key = ?2");
        Ok(self.conn.query_row(&sql, [site, key], comment_from_row).optional()?)
    }

    /// Get a user by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_user(&self, key: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE key = ?1");
        Ok(self.conn.query_row(&sql, [key], user_from_row).optional()?)
    }

    // ==================
    // Upserts (for import)
    // ==================

    /// Upsert a site.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn upsert_site(&mut self, site: &Site) -> Result<()> {
        let urls = serde_json::to_string(&site.urls)?;
        self.conn.execute(
            "INSERT INTO sites (key, name, urls, imported_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
               name = excluded.name,
               urls = excluded.urls,
               imported_at = excluded.imported_at",
            rusqlite::params![site.key, site.name, urls, now_millis()],
        )?;
        Ok(())
    }

    /// Upsert a page.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn upsert_page(&mut self, page: &Page) -> Result<()> {
        self.conn.execute(
            "INSERT INTO pages (key, site_key, title, url, admin_only, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(site_key, key) DO UPDATE SET
               title = excluded.title,
               url = excluded.url,
               admin_only = excluded.admin_only,
               imported_at = excluded.imported_at",
            rusqlite::params![
                page.key,
                page.site_key,
                page.title,
                page.url,
                page.admin_only,
                now_millis()
            ],
        )?;
        Ok(())
    }

    /// Upsert a comment.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn upsert_comment(&mut self, comment: &Comment) -> Result<()> {
        self.conn.execute(
            "INSERT INTO comments (key, site_key, page_key, parent_key, user_key, content, ua, ip, is_pending, is_collapsed, is_pinned, vote_up, vote_down, created_at, updated_at, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(site_key, key) DO UPDATE SET
               page_key = excluded.page_key,
               parent_key = excluded.parent_key,
               user_key = excluded.user_key,
               content = excluded.content,
               ua = excluded.ua,
               ip = excluded.ip,
               is_pending = excluded.is_pending,
               is_collapsed = excluded.is_collapsed,
               is_pinned = excluded.is_pinned,
               vote_up = excluded.vote_up,
               vote_down = excluded.vote_down,
               created_at = excluded.created_at,
               updated_at = excluded.updated_at,
               imported_at = excluded.imported_at",
            rusqlite::params![
                comment.key,
                comment.site_key,
                comment.page_key,
                comment.parent_key,
                comment.user_key,
                comment.content,
                comment.ua,
                comment.ip,
                comment.is_pending,
                comment.is_collapsed,
                comment.is_pinned,
                to_sql_count(comment.vote_up),
                to_sql_count(comment.vote_down),
                comment.created_at,
                comment.updated_at,
                now_millis(),
            ],
        )?;
        Ok(())
    }

    /// Upsert a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn upsert_user(&mut self, user: &User) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (key, name, email, link, badge_name, badge_color, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(key) DO UPDATE SET
               name = excluded.name,
               email = excluded.email,
               link = excluded.link,
               badge_name = excluded.badge_name,
               badge_color = excluded.badge_color,
               imported_at = excluded.imported_at",
            rusqlite::params![
                user.key,
                user.name,
                user.email,
                user.link,
                user.badge_name,
                user.badge_color,
                now_millis()
            ],
        )?;
        Ok(())
    }

    // ==================
    // Scoped listings (for export)
    // ==================
    //
    // `site` = None selects every site. Listings are ordered by identity:
    // site key first for pages and comments, then key.

    /// List sites in scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_sites(&self, site: Option<&str>) -> Result<Vec<Site>> {
        let sql = format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE ?1 IS NULL OR key = ?1 ORDER BY key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([site], site_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// List pages in scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_pages(&self, site: Option<&str>) -> Result<Vec<Page>> {
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM pages WHERE ?1 IS NULL OR site_key = ?1 ORDER BY site_key, key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([site], page_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// List comments in scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_comments(&self, site: Option<&str>) -> Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c
             WHERE ?1 IS NULL OR c.site_key = ?1
             ORDER BY c.site_key, c.key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([site], comment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// List users in scope.
    ///
    /// For a single site these are the authors of that site's comments;
    /// without a site every user is listed.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_users(&self, site: Option<&str>) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE ?1 IS NULL OR key IN (
                 SELECT c.user_key FROM comments c
                 WHERE c.site_key = ?1 AND c.user_key IS NOT NULL
             )
             ORDER BY key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([site], user_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Count stored records per kind.
    ///
    /// # Errors
    ///
    /// Returns an error if a count query fails.
    pub fn counts(&self) -> Result<StoreCounts> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or(0))
        };

        Ok(StoreCounts {
            sites: count("sites")?,
            pages: count("pages")?,
            comments: count("comments")?,
            users: count("users")?,
        })
    }
}

impl RecordStore for SqliteStorage {
    fn find(&self, id: &RecordId) -> Result<Option<Record>> {
        Ok(match id.kind {
            RecordKind::Site => self.get_site(&id.key)?.map(Record::Site),
            RecordKind::Page => self.get_page(site_of(id), &id.key)?.map(Record::Page),
            RecordKind::Comment => self.get_comment(site_of(id), &id.key)?.map(Record::Comment),
            RecordKind::User => self.get_user(&id.key)?.map(Record::User),
        })
    }

    fn exists(&self, id: &RecordId) -> Result<bool> {
        let found: Option<i32> = match id.kind {
            RecordKind::Site | RecordKind::User => {
                let table = if id.kind == RecordKind::Site { "sites" } else { "users" };
                self.conn
                    .query_row(&format!("SELECT 1 FROM {table} WHERE key = ?1"), [&id.key], |row| {
                        row.get(0)
                    })
                    .optional()?
            }
            RecordKind::Page | RecordKind::Comment => {
                let table = if id.kind == RecordKind::Page { "pages" } else { "comments" };
                self.conn
                    .query_row(
                        &format!("SELECT 1 FROM {table} WHERE site_key = ?1 AND key = ?2"),
                        [site_of(id), id.key.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?
            }
        };
        Ok(found.is_some())
    }

    fn persist(&mut self, record: &Record) -> Result<()> {
        match record {
            Record::Site(site) => self.upsert_site(site),
            Record::Page(page) => self.upsert_page(page),
            Record::Comment(comment) => self.upsert_comment(comment),
            Record::User(user) => self.upsert_user(user),
        }
    }
}

/// Site part of a page or comment identity.
fn site_of(id: &RecordId) -> &str {
    id.site.as_deref().unwrap_or_default()
}

// ==================
// Row mapping
// ==================

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<Site> {
    let urls: String = row.get(2)?;
    let urls = serde_json::from_str(&urls).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Site {
        key: row.get(0)?,
        name: row.get(1)?,
        urls,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        key: row.get(0)?,
        site_key: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        admin_only: row.get(4)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        key: row.get(0)?,
        site_key: row.get(1)?,
        page_key: row.get(2)?,
        parent_key: row.get(3)?,
        user_key: row.get(4)?,
        content: row.get(5)?,
        ua: row.get(6)?,
        ip: row.get(7)?,
        is_pending: row.get(8)?,
        is_collapsed: row.get(9)?,
        is_pinned: row.get(10)?,
        vote_up: from_sql_count(row.get(11)?),
        vote_down: from_sql_count(row.get(12)?),
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        key: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        link: row.get(3)?,
        badge_name: row.get(4)?,
        badge_color: row.get(5)?,
    })
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn to_sql_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_sql_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}
