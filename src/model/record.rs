//! Canonical record model for transfers.
//!
//! Records are pure data. Relationships between them (page → site,
//! comment → page, comment → parent comment, comment → user) are held as
//! identity keys and resolved against the store, never as structural
//! references, so the in-memory graph of a transfer has no cycles.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// The four kinds of transferable entity.
///
/// The declaration order is the export walk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Site,
    Page,
    Comment,
    User,
}

impl RecordKind {
    /// All kinds, in export order.
    pub const ALL: [Self; 4] = [Self::Site, Self::Page, Self::Comment, Self::User];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Page => "page",
            Self::Comment => "comment",
            Self::User => "user",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "site" => Ok(Self::Site),
            "page" => Ok(Self::Page),
            "comment" => Ok(Self::Comment),
            "user" => Ok(Self::User),
            _ => Err(format!("Unknown record kind: {s}")),
        }
    }
}

/// Identity of a record.
///
/// Site and user keys are unique across the store. Page and comment keys
/// are only unique within their site (two blogs can both have `/about`),
/// so their identity also carries the site key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub key: String,
}

impl RecordId {
    /// Identity of a store-wide record (site or user).
    #[must_use]
    pub fn new(kind: RecordKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            site: None,
            key: key.into(),
        }
    }

    /// Identity of a record keyed within a site (page or comment).
    #[must_use]
    pub fn in_site(kind: RecordKind, site: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind,
            site: Some(site.into()),
            key: key.into(),
        }
    }
}

/// Renders as `kind:key`. An import job writes into one site, so progress
/// lines leave the site out.
impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.key)
    }
}

/// A site hosting pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

/// A commentable page belonging to a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub key: String,
    pub site_key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub admin_only: bool,
}

/// A comment on a page, optionally a reply to another comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub key: String,
    /// Site of the page; comment keys are unique within it.
    #[serde(default)]
    pub site_key: String,
    pub page_key: String,
    /// Parent comment key for threaded replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    /// Author key. Weak reference: the user may arrive later or not at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_key: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub ua: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub is_pending: bool,
    #[serde(default)]
    pub is_collapsed: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub vote_up: u64,
    #[serde(default)]
    pub vote_down: u64,
    /// Creation timestamp (Unix milliseconds)
    #[serde(default)]
    pub created_at: i64,
    /// Last update timestamp (Unix milliseconds)
    #[serde(default)]
    pub updated_at: i64,
}

/// A comment author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub badge_name: String,
    #[serde(default)]
    pub badge_color: String,
}

/// Tagged union of transferable entities.
///
/// Serializes as `{"type":"comment","key":"42",...}`, which is also the
/// line format of the native export.
///
/// Equality and hashing use the record's identity only; compare the inner
/// structs (or their content hashes) to compare field values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Site(Site),
    Page(Page),
    Comment(Comment),
    User(User),
}

impl Record {
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Site(_) => RecordKind::Site,
            Self::Page(_) => RecordKind::Page,
            Self::Comment(_) => RecordKind::Comment,
            Self::User(_) => RecordKind::User,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Site(s) => &s.key,
            Self::Page(p) => &p.key,
            Self::Comment(c) => &c.key,
            Self::User(u) => &u.key,
        }
    }

    #[must_use]
    pub fn id(&self) -> RecordId {
        match self {
            Self::Site(s) => RecordId::new(RecordKind::Site, &s.key),
            Self::Page(p) => RecordId::in_site(RecordKind::Page, &p.site_key, &p.key),
            Self::Comment(c) => RecordId::in_site(RecordKind::Comment, &c.site_key, &c.key),
            Self::User(u) => RecordId::new(RecordKind::User, &u.key),
        }
    }

    /// References that must resolve before this record can be persisted.
    ///
    /// The comment author is deliberately absent: users are weak references.
    #[must_use]
    pub fn references(&self) -> Vec<RecordId> {
        match self {
            Self::Site(_) | Self::User(_) => Vec::new(),
            Self::Page(p) => vec![RecordId::new(RecordKind::Site, &p.site_key)],
            Self::Comment(c) => {
                let mut refs = vec![RecordId::in_site(RecordKind::Page, &c.site_key, &c.page_key)];
                if let Some(parent) = &c.parent_key {
                    refs.push(RecordId::in_site(RecordKind::Comment, &c.site_key, parent));
                }
                refs
            }
        }
    }

    /// Move a record into the target site.
    ///
    /// Sites take the target key (keeping a non-empty name). Pages and
    /// comments are re-parented. Users are shared by every site.
    pub fn rehome(&mut self, site_key: &str) {
        match self {
            Self::Site(site) => {
                if site.name.trim().is_empty() {
                    site.name = site_key.to_string();
                }
                site.key = site_key.to_string();
            }
            Self::Page(page) => page.site_key = site_key.to_string(),
            Self::Comment(comment) => comment.site_key = site_key.to_string(),
            Self::User(_) => {}
        }
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}
