//! The Artrans interchange format.
//!
//! A JSON array in which every element is one comment with its page, site
//! and author denormalized into it. Values are conventionally strings
//! (`"vote_up": "3"`, `"is_pinned": "false"`), but numbers and booleans are
//! accepted too since hand-edited files use them.
//!
//! Import scans the array one element at a time, so only a single element
//! is held in memory. Each element expands into the site, page and user
//! records it mentions (on first sight) followed by the comment itself.
//! Only the comment is a full entry; the others are implied by it and are
//! created when missing but never overwrite what the store already has.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, BufRead};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Comment, Page, Record, Site, User};
use crate::transfer::types::RecordError;

use super::{ExportHeader, ExportSet, FormatAdapter, ImportContext, Incoming, RecordStream};

pub const FORMAT_NAME: &str = "artrans";

/// Adapter-specific option: prefix joined onto page keys that start with `/`.
pub const URL_PREFIX_OPTION: &str = "url_prefix";

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One flat Artrans entry.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Artran {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub rid: String,
    #[serde(deserialize_with = "lenient_string")]
    pub content: String,
    #[serde(deserialize_with = "lenient_string")]
    pub ua: String,
    #[serde(deserialize_with = "lenient_string")]
    pub ip: String,
    #[serde(deserialize_with = "lenient_string")]
    pub is_collapsed: String,
    #[serde(deserialize_with = "lenient_string")]
    pub is_pending: String,
    #[serde(deserialize_with = "lenient_string")]
    pub is_pinned: String,
    #[serde(deserialize_with = "lenient_string")]
    pub vote_up: String,
    #[serde(deserialize_with = "lenient_string")]
    pub vote_down: String,
    #[serde(deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(deserialize_with = "lenient_string")]
    pub updated_at: String,
    #[serde(deserialize_with = "lenient_string")]
    pub nick: String,
    #[serde(deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(deserialize_with = "lenient_string")]
    pub link: String,
    #[serde(deserialize_with = "lenient_string")]
    pub badge_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub badge_color: String,
    #[serde(deserialize_with = "lenient_string")]
    pub page_key: String,
    #[serde(deserialize_with = "lenient_string")]
    pub page_title: String,
    #[serde(deserialize_with = "lenient_string")]
    pub page_admin_only: String,
    #[serde(deserialize_with = "lenient_string")]
    pub site_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub site_urls: String,
}

/// Accept strings, numbers, booleans and null for a string field.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ArtransAdapter;

impl FormatAdapter for ArtransAdapter {
    fn name(&self) -> &'static str {
        FORMAT_NAME
    }

    fn description(&self) -> &'static str {
        "Artrans interchange array (one denormalized comment per element)"
    }

    fn open(&self, ctx: &ImportContext, reader: Box<dyn BufRead>) -> Result<RecordStream<'static>> {
        let mut scanner = ArrayScanner::new(reader);
        scanner
            .open()
            .map_err(|e| Error::MalformedInput(format!("artrans input is not a JSON array: {e}")))?;

        let url_prefix = ctx
            .options
            .get_non_empty(URL_PREFIX_OPTION)
            .map(|p| p.trim_end_matches('/').to_string());

        Ok(Box::new(ArtransStream {
            scanner,
            site: ctx.site.clone(),
            url_prefix,
            queue: VecDeque::new(),
            site_emitted: false,
            pages: HashSet::new(),
            users: HashSet::new(),
            done: false,
        }))
    }

    fn write(&self, records: &ExportSet, out: &mut String, _header: &ExportHeader) -> Result<()> {
        let sites: HashMap<&str, &Site> = records.sites.iter().map(|s| (s.key.as_str(), s)).collect();
        let pages: HashMap<(&str, &str), &Page> = records
            .pages
            .iter()
            .map(|p| ((p.site_key.as_str(), p.key.as_str()), p))
            .collect();
        let users: HashMap<&str, &User> = records.users.iter().map(|u| (u.key.as_str(), u)).collect();

        let artrans: Vec<Artran> = records
            .comments
            .iter()
            .map(|comment| {
                let page = pages
                    .get(&(comment.site_key.as_str(), comment.page_key.as_str()))
                    .copied();
                let site = sites.get(comment.site_key.as_str()).copied();
                let user = comment
                    .user_key
                    .as_deref()
                    .and_then(|k| users.get(k).copied());
                flatten(comment, page, site, user)
            })
            .collect();

        out.push_str(&serde_json::to_string_pretty(&artrans)?);
        Ok(())
    }
}

// ==================
// Export
// ==================

fn flatten(comment: &Comment, page: Option<&Page>, site: Option<&Site>, user: Option<&User>) -> Artran {
    Artran {
        id: comment.key.clone(),
        rid: comment.parent_key.clone().unwrap_or_else(|| "0".to_string()),
        content: comment.content.clone(),
        ua: comment.ua.clone(),
        ip: comment.ip.clone(),
        is_collapsed: comment.is_collapsed.to_string(),
        is_pending: comment.is_pending.to_string(),
        is_pinned: comment.is_pinned.to_string(),
        vote_up: comment.vote_up.to_string(),
        vote_down: comment.vote_down.to_string(),
        date: format_date(comment.created_at),
        updated_at: format_date(comment.updated_at),
        nick: user.map(|u| u.name.clone()).unwrap_or_default(),
        email: user.map(|u| u.email.clone()).unwrap_or_default(),
        link: user.map(|u| u.link.clone()).unwrap_or_default(),
        badge_name: user.map(|u| u.badge_name.clone()).unwrap_or_default(),
        badge_color: user.map(|u| u.badge_color.clone()).unwrap_or_default(),
        page_key: comment.page_key.clone(),
        page_title: page.map(|p| p.title.clone()).unwrap_or_default(),
        page_admin_only: page.is_some_and(|p| p.admin_only).to_string(),
        site_name: site.map(|s| s.name.clone()).unwrap_or_default(),
        site_urls: site.map(|s| s.urls.join(",")).unwrap_or_default(),
    }
}

fn format_date(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

// ==================
// Import
// ==================

fn parse_date(field: &str, value: &str) -> std::result::Result<Option<i64>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, DATE_FORMAT) {
        return Ok(Some(naive.and_utc().timestamp_millis()));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|t| Some(t.timestamp_millis()))
        .map_err(|_| format!("invalid {field} '{value}'"))
}

fn parse_bool(field: &str, value: &str) -> std::result::Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        other => Err(format!("invalid {field} '{other}'")),
    }
}

fn parse_count(field: &str, value: &str) -> std::result::Result<u64, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    value.parse().map_err(|_| format!("invalid {field} '{value}'"))
}

/// Identity of the author: lowercased email, else nickname.
fn user_key(artran: &Artran) -> Option<String> {
    let email = artran.email.trim();
    if !email.is_empty() {
        return Some(email.to_lowercase());
    }
    let nick = artran.nick.trim();
    (!nick.is_empty()).then(|| nick.to_string())
}

struct ArtransStream {
    scanner: ArrayScanner,
    site: String,
    url_prefix: Option<String>,
    /// Records expanded from the current element, not yet yielded.
    queue: VecDeque<Incoming>,
    site_emitted: bool,
    pages: HashSet<String>,
    users: HashSet<String>,
    done: bool,
}

impl ArtransStream {
    fn page_key(&self, raw: &str) -> String {
        match &self.url_prefix {
            Some(prefix) if raw.starts_with('/') => format!("{prefix}{raw}"),
            _ => raw.to_string(),
        }
    }

    /// Turn one element into records. Nothing is marked as seen unless the
    /// whole element converts.
    fn expand(&mut self, artran: Artran) -> std::result::Result<Vec<Incoming>, String> {
        let key = artran.id.trim().to_string();
        if key.is_empty() {
            return Err("missing id".to_string());
        }
        let raw_page = artran.page_key.trim();
        if raw_page.is_empty() {
            return Err(format!("comment {key}: missing page_key"));
        }
        let page_key = self.page_key(raw_page);

        let created_at = parse_date("date", &artran.date)?.unwrap_or(0);
        let updated_at = parse_date("updated_at", &artran.updated_at)?.unwrap_or(created_at);
        let parent_key = match artran.rid.trim() {
            "" | "0" => None,
            rid => Some(rid.to_string()),
        };
        let user_key = user_key(&artran);

        let comment = Comment {
            key,
            site_key: self.site.clone(),
            page_key: page_key.clone(),
            parent_key,
            user_key: user_key.clone(),
            content: artran.content,
            ua: artran.ua,
            ip: artran.ip,
            is_pending: parse_bool("is_pending", &artran.is_pending)?,
            is_collapsed: parse_bool("is_collapsed", &artran.is_collapsed)?,
            is_pinned: parse_bool("is_pinned", &artran.is_pinned)?,
            vote_up: parse_count("vote_up", &artran.vote_up)?,
            vote_down: parse_count("vote_down", &artran.vote_down)?,
            created_at,
            updated_at,
        };
        let admin_only = parse_bool("page_admin_only", &artran.page_admin_only)?;

        let mut records = Vec::with_capacity(4);
        if !self.site_emitted {
            self.site_emitted = true;
            records.push(Incoming::implied(Record::Site(Site {
                key: self.site.clone(),
                name: artran.site_name.trim().to_string(),
                urls: artran
                    .site_urls
                    .split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(String::from)
                    .collect(),
            })));
        }
        if self.pages.insert(page_key.clone()) {
            let url = if page_key.contains("://") {
                page_key.clone()
            } else {
                String::new()
            };
            records.push(Incoming::implied(Record::Page(Page {
                key: page_key,
                site_key: self.site.clone(),
                title: artran.page_title,
                url,
                admin_only,
            })));
        }
        if let Some(user_key) = user_key {
            if self.users.insert(user_key.clone()) {
                records.push(Incoming::implied(Record::User(User {
                    key: user_key,
                    name: artran.nick.trim().to_string(),
                    email: artran.email.trim().to_string(),
                    link: artran.link,
                    badge_name: artran.badge_name,
                    badge_color: artran.badge_color,
                })));
            }
        }
        records.push(Incoming::entry(Record::Comment(comment)));
        Ok(records)
    }
}

impl Iterator for ArtransStream {
    type Item = std::result::Result<Incoming, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(record) = self.queue.pop_front() {
            return Some(Ok(record));
        }
        if self.done {
            return None;
        }

        let raw = match self.scanner.next_element() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(RecordError::Read {
                    position: self.scanner.elements + 1,
                    message: e.to_string(),
                }));
            }
        };
        let position = self.scanner.elements;

        let expanded = serde_json::from_slice::<Artran>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|artran| self.expand(artran));

        match expanded {
            Ok(records) => {
                debug!(position, records = records.len(), "Expanded artrans element");
                self.queue.extend(records);
                self.queue.pop_front().map(Ok)
            }
            Err(message) => Some(Err(RecordError::Parse { position, message })),
        }
    }
}

// ==================
// Array scanner
// ==================

#[derive(Debug, thiserror::Error)]
enum ScanError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("unexpected '{found}' at byte {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("unexpected end of input at byte {offset}")]
    Eof { offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    BeforeArray,
    FirstElement,
    AfterElement,
    Finished,
}

/// Splits a top-level JSON array into raw element bytes without parsing
/// the elements.
struct ArrayScanner {
    reader: Box<dyn BufRead>,
    offset: usize,
    state: ScanState,
    /// Elements returned so far.
    elements: usize,
}

impl ArrayScanner {
    fn new(reader: Box<dyn BufRead>) -> Self {
        Self {
            reader,
            offset: 0,
            state: ScanState::BeforeArray,
            elements: 0,
        }
    }

    fn peek(&mut self) -> io::Result<Option<u8>> {
        Ok(self.reader.fill_buf()?.first().copied())
    }

    fn bump(&mut self) {
        self.reader.consume(1);
        self.offset += 1;
    }

    fn skip_whitespace(&mut self) -> io::Result<()> {
        while let Some(b) = self.peek()? {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.bump();
        }
        Ok(())
    }

    fn unexpected(&self, found: Option<u8>) -> ScanError {
        match found {
            Some(b) => ScanError::Unexpected {
                found: char::from(b),
                offset: self.offset,
            },
            None => ScanError::Eof { offset: self.offset },
        }
    }

    /// Consume the opening bracket.
    fn open(&mut self) -> std::result::Result<(), ScanError> {
        // UTF-8 byte order mark
        if self.reader.fill_buf()?.starts_with(&[0xEF, 0xBB, 0xBF]) {
            self.reader.consume(3);
            self.offset += 3;
        }
        self.skip_whitespace()?;
        match self.peek()? {
            Some(b'[') => {
                self.bump();
                self.state = ScanState::FirstElement;
                Ok(())
            }
            other => Err(self.unexpected(other)),
        }
    }

    /// Raw bytes of the next element, or `None` after the closing bracket.
    fn next_element(&mut self) -> std::result::Result<Option<Vec<u8>>, ScanError> {
        self.skip_whitespace()?;
        match self.state {
            ScanState::BeforeArray => {
                self.open()?;
                return self.next_element();
            }
            ScanState::Finished => return Ok(None),
            ScanState::FirstElement => {
                if self.peek()? == Some(b']') {
                    self.bump();
                    self.state = ScanState::Finished;
                    return Ok(None);
                }
            }
            ScanState::AfterElement => match self.peek()? {
                Some(b',') => {
                    self.bump();
                    self.skip_whitespace()?;
                }
                Some(b']') => {
                    self.bump();
                    self.state = ScanState::Finished;
                    return Ok(None);
                }
                other => return Err(self.unexpected(other)),
            },
        }

        let element = self.read_value()?;
        self.state = ScanState::AfterElement;
        self.elements += 1;
        Ok(Some(element))
    }

    /// Read one JSON value by tracking string and bracket nesting.
    fn read_value(&mut self) -> std::result::Result<Vec<u8>, ScanError> {
        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        loop {
            let Some(b) = self.peek()? else {
                if depth == 0 && !in_string && !buf.is_empty() {
                    break;
                }
                return Err(ScanError::Eof { offset: self.offset });
            };

            if in_string {
                self.bump();
                buf.push(b);
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                    if depth == 0 {
                        break;
                    }
                }
                continue;
            }

            match b {
                b'"' => {
                    in_string = true;
                    self.bump();
                    buf.push(b);
                }
                b'{' | b'[' => {
                    depth += 1;
                    self.bump();
                    buf.push(b);
                }
                b'}' | b']' => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    self.bump();
                    buf.push(b);
                    if depth == 0 {
                        break;
                    }
                }
                b',' if depth == 0 => break,
                b if depth == 0 && b.is_ascii_whitespace() => break,
                _ => {
                    self.bump();
                    buf.push(b);
                }
            }
        }

        if buf.is_empty() {
            let found = self.peek()?;
            return Err(self.unexpected(found));
        }
        Ok(buf)
    }
}
