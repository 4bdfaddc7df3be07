//! The native JSON Lines format.
//!
//! ```text
//! {"type":"header","format":"native","version":1,"exported_at":"…","scope":"all"}
//! {"type":"site","key":"demo","name":"Demo","urls":[]}
//! {"type":"page","key":"/posts/hello","site_key":"demo",…}
//! {"type":"comment","key":"42","page_key":"/posts/hello",…}
//! ```
//!
//! The header is optional on import so hand-written files work. Every other
//! non-blank line is one tagged record.

use std::io::{self, BufRead};
use std::string::FromUtf8Error;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Comment, Page, Record, Site, User};
use crate::transfer::types::RecordError;

use super::{ExportHeader, ExportSet, FormatAdapter, ImportContext, Incoming, RecordStream};

pub const FORMAT_NAME: &str = "native";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeAdapter;

impl FormatAdapter for NativeAdapter {
    fn name(&self) -> &'static str {
        FORMAT_NAME
    }

    fn description(&self) -> &'static str {
        "threadport JSON Lines (one tagged record per line)"
    }

    fn open(&self, _ctx: &ImportContext, reader: Box<dyn BufRead>) -> Result<RecordStream<'static>> {
        let mut stream = NativeStream {
            reader,
            buf: Vec::new(),
            line_no: 0,
            pending: None,
            done: false,
        };

        if let Some((line_no, line)) = stream.next_line().transpose().map_err(|e| {
            Error::MalformedInput(format!("could not read native input: {e}"))
        })? {
            let header = line.as_deref().ok().and_then(parse_header);
            match header {
                Some(header) => check_header(&header)?,
                None => stream.pending = Some((line_no, line)),
            }
        }

        Ok(Box::new(stream))
    }

    fn write(&self, records: &ExportSet, out: &mut String, header: &ExportHeader) -> Result<()> {
        push_line(out, &HeaderLine { tag: "header", header })?;
        for site in &records.sites {
            push_line(out, &RecordRef::Site(site))?;
        }
        for page in &records.pages {
            push_line(out, &RecordRef::Page(page))?;
        }
        for comment in &records.comments {
            push_line(out, &RecordRef::Comment(comment))?;
        }
        for user in &records.users {
            push_line(out, &RecordRef::User(user))?;
        }
        Ok(())
    }
}

fn push_line<T: Serialize>(out: &mut String, value: &T) -> Result<()> {
    out.push_str(&serde_json::to_string(value)?);
    out.push('\n');
    Ok(())
}

// ==================
// Header
// ==================

#[derive(Serialize)]
struct HeaderLine<'a> {
    #[serde(rename = "type")]
    tag: &'static str,
    #[serde(flatten)]
    header: &'a ExportHeader,
}

#[derive(Debug, Deserialize)]
struct ParsedHeader {
    #[serde(rename = "type")]
    tag: String,
    #[serde(default)]
    format: String,
    #[serde(default)]
    version: u32,
}

/// Parse `line` as a header line, if it is one.
fn parse_header(line: &str) -> Option<ParsedHeader> {
    serde_json::from_str::<ParsedHeader>(line)
        .ok()
        .filter(|h| h.tag == "header")
}

fn check_header(header: &ParsedHeader) -> Result<()> {
    if header.format != FORMAT_NAME {
        return Err(Error::MalformedInput(format!(
            "header names format '{}', expected '{FORMAT_NAME}'",
            header.format
        )));
    }
    if header.version != FORMAT_VERSION {
        return Err(Error::MalformedInput(format!(
            "unsupported native version {} (this build reads version {FORMAT_VERSION})",
            header.version
        )));
    }
    Ok(())
}

/// Borrowing twin of [`Record`] so export does not clone every row.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RecordRef<'a> {
    Site(&'a Site),
    Page(&'a Page),
    Comment(&'a Comment),
    User(&'a User),
}

// ==================
// Import stream
// ==================

/// A line as read: text, or the bytes that were not UTF-8.
type RawLine = std::result::Result<String, FromUtf8Error>;

struct NativeStream {
    reader: Box<dyn BufRead>,
    buf: Vec<u8>,
    line_no: usize,
    /// First record line, read while looking for the header.
    pending: Option<(usize, RawLine)>,
    done: bool,
}

impl NativeStream {
    /// Next non-blank line with its 1-based number.
    ///
    /// Lines are split on raw bytes so a line that is not UTF-8 only spoils
    /// itself. `Err` is reserved for the reader failing.
    fn next_line(&mut self) -> Option<io::Result<(usize, RawLine)>> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e)),
            }
            self.line_no += 1;

            let mut bytes = std::mem::take(&mut self.buf);
            if bytes.last() == Some(&b'\n') {
                bytes.pop();
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
            }
            if bytes.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(Ok((self.line_no, String::from_utf8(bytes))));
        }
    }
}

impl Iterator for NativeStream {
    type Item = std::result::Result<Incoming, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let (line_no, line) = match self.pending.take().map(Ok).or_else(|| self.next_line())? {
            Ok(entry) => entry,
            Err(e) => {
                // A broken reader will not recover; report once and stop.
                self.done = true;
                return Some(Err(RecordError::Read {
                    position: self.line_no + 1,
                    message: e.to_string(),
                }));
            }
        };

        let parsed = match line {
            Ok(text) => serde_json::from_str::<Record>(&text).map_err(|e| e.to_string()),
            Err(e) => Err(format!("line is not valid UTF-8: {}", e.utf8_error())),
        };
        Some(parsed.map(Incoming::entry).map_err(|message| RecordError::Parse {
            position: line_no,
            message,
        }))
    }
}
