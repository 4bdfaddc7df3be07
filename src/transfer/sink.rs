//! Progress sinks.
//!
//! The executor emits every event synchronously and in order; whether the
//! events end up in a buffer or on a live connection is up to the sink.

use std::io::Write;

use colored::Colorize;

use super::types::{Outcome, ProgressEvent, SinkClosed};

/// Destination for progress events.
pub trait ProgressSink {
    /// Deliver one event. May block while the transport applies backpressure.
    ///
    /// # Errors
    ///
    /// Returns `SinkClosed` once the destination can no longer accept events.
    fn emit(&mut self, event: &ProgressEvent) -> Result<(), SinkClosed>;
}

/// Collects events for callers that only want the final text.
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    events: Vec<ProgressEvent>,
}

impl BufferSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<ProgressEvent> {
        self.events
    }

    /// Events about individual records or input entries.
    pub fn record_events(&self) -> impl Iterator<Item = &ProgressEvent> {
        self.events.iter().filter(|e| !e.is_job_level())
    }

    /// All events rendered as lines.
    #[must_use]
    pub fn render(&self) -> String {
        let mut text = String::new();
        for event in &self.events {
            text.push_str(&event.render());
            text.push('\n');
        }
        text
    }
}

impl ProgressSink for BufferSink {
    fn emit(&mut self, event: &ProgressEvent) -> Result<(), SinkClosed> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// How a stream sink renders lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderStyle {
    /// One plain line per event.
    #[default]
    Plain,
    /// HTML for a browser reading the response body as it arrives: a
    /// monospace preamble, escaped lines, and a scroll hint after each chunk.
    Html,
}

const HTML_PREAMBLE: &str = "<style>* { font-family: Menlo, Consolas, Monaco, monospace; \
word-wrap: break-word; white-space: pre-wrap; font-size: 13px; }</style>\n\
<script>function scroll() { if (!!document.body) { document.body.scrollTo(0, 999999999999); } }</script>\n";

const SCROLL_HINT: &str = "<script>scroll();</script>";

/// Writes each event to a live transport and flushes it immediately.
///
/// The first failed write or flush closes the sink for good; every later
/// `emit` fails with the same reason.
pub struct StreamSink<W: Write> {
    writer: W,
    style: RenderStyle,
    color: bool,
    started: bool,
    closed: Option<String>,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: W, style: RenderStyle) -> Self {
        Self {
            writer,
            style,
            color: false,
            started: false,
            closed: None,
        }
    }

    /// Colorize outcome tags (plain style only).
    #[must_use]
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn format(&self, event: &ProgressEvent) -> String {
        match self.style {
            RenderStyle::Html => {
                format!("{}\n{SCROLL_HINT}", escape_html(&event.render()))
            }
            RenderStyle::Plain if self.color => {
                let tag = event.outcome.tag();
                let tag = match event.outcome {
                    Outcome::Info => tag.cyan(),
                    Outcome::Success => tag.green(),
                    Outcome::Skipped => tag.yellow(),
                    Outcome::Failed => tag.red().bold(),
                };
                format!("{tag} {}\n", event.body())
            }
            RenderStyle::Plain => format!("{}\n", event.render()),
        }
    }

    fn write_chunk(&mut self, chunk: &str) -> std::io::Result<()> {
        if !self.started && self.style == RenderStyle::Html {
            self.writer.write_all(HTML_PREAMBLE.as_bytes())?;
        }
        self.started = true;
        self.writer.write_all(chunk.as_bytes())?;
        self.writer.flush()
    }
}

impl<W: Write> ProgressSink for StreamSink<W> {
    fn emit(&mut self, event: &ProgressEvent) -> Result<(), SinkClosed> {
        if let Some(reason) = &self.closed {
            return Err(SinkClosed {
                reason: reason.clone(),
            });
        }

        let chunk = self.format(event);
        self.write_chunk(&chunk).map_err(|e| {
            let reason = e.to_string();
            self.closed = Some(reason.clone());
            SinkClosed { reason }
        })
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
