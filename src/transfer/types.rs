//! Transfer job, progress and outcome types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Error;
use crate::model::{RecordId, RecordKind};

/// Direction of a transfer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    Import,
    Export,
}

/// Lifecycle status of a transfer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    PartiallySucceeded,
}

impl JobStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::PartiallySucceeded => "partially_succeeded",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One import or export run.
///
/// The assume-yes flag and option list are fixed when the job is created;
/// only the status moves.
#[derive(Debug, Clone, Serialize)]
pub struct TransferJob {
    pub mode: TransferMode,
    /// Raw `key:value` options, in the order the caller produced them.
    pub options: Vec<String>,
    pub assume_yes: bool,
    pub started_at: DateTime<Utc>,
    pub status: JobStatus,
}

impl TransferJob {
    /// Create a pending import job.
    #[must_use]
    pub fn import(options: Vec<String>, assume_yes: bool) -> Self {
        Self {
            mode: TransferMode::Import,
            options,
            assume_yes,
            started_at: Utc::now(),
            status: JobStatus::Pending,
        }
    }

    /// Create a pending export job.
    #[must_use]
    pub fn export(options: Vec<String>) -> Self {
        Self {
            mode: TransferMode::Export,
            options,
            assume_yes: false,
            started_at: Utc::now(),
            status: JobStatus::Pending,
        }
    }

    /// Milliseconds since the job started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}

// ── Progress ─────────────────────────────────────────────────

/// Outcome carried by a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Info,
    Success,
    Skipped,
    Failed,
}

impl Outcome {
    /// Fixed-width tag used when rendering lines.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Info => "[INFO]",
            Self::Success => "[ OK ]",
            Self::Skipped => "[SKIP]",
            Self::Failed => "[FAIL]",
        }
    }
}

/// What a progress event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum Subject {
    /// The job as a whole (start, summary, fatal errors).
    Job,
    /// A record the adapter produced.
    Record(RecordId),
    /// An input entry that could not be turned into a record (1-based).
    Entry(usize),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Job => f.write_str("job"),
            Self::Record(id) => write!(f, "{id}"),
            Self::Entry(n) => write!(f, "entry #{n}"),
        }
    }
}

/// One reportable outcome. Never mutated after emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub subject: Subject,
    pub outcome: Outcome,
    pub message: String,
}

impl ProgressEvent {
    #[must_use]
    pub fn job(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            subject: Subject::Job,
            outcome,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn record(id: RecordId, outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            subject: Subject::Record(id),
            outcome,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn entry(position: usize, message: impl Into<String>) -> Self {
        Self {
            subject: Subject::Entry(position),
            outcome: Outcome::Failed,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_job_level(&self) -> bool {
        matches!(self.subject, Subject::Job)
    }

    /// Render as a single human-readable line (no trailing newline).
    #[must_use]
    pub fn render(&self) -> String {
        format!("{} {}", self.outcome.tag(), self.body())
    }

    /// The line without its outcome tag.
    #[must_use]
    pub fn body(&self) -> String {
        match &self.subject {
            Subject::Job => self.message.clone(),
            subject => format!("{subject}: {}", self.message),
        }
    }
}

// ── Statistics ───────────────────────────────────────────────

/// Per-kind counters for one job.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    /// Records that did not exist before.
    pub created: usize,
    /// Existing records replaced with different content.
    pub updated: usize,
    /// Records left as they were (unchanged, or kept by `mode:skip`).
    pub skipped: usize,
    /// Records that failed to persist.
    pub failed: usize,
}

impl EntityStats {
    /// Total records processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.failed
    }
}

/// Counters for a whole job.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    pub sites: EntityStats,
    pub pages: EntityStats,
    pub comments: EntityStats,
    pub users: EntityStats,
    /// Input entries that never became a record.
    pub rejected: usize,
}

impl TransferStats {
    pub fn for_kind_mut(&mut self, kind: RecordKind) -> &mut EntityStats {
        match kind {
            RecordKind::Site => &mut self.sites,
            RecordKind::Page => &mut self.pages,
            RecordKind::Comment => &mut self.comments,
            RecordKind::User => &mut self.users,
        }
    }

    fn kinds(&self) -> [&EntityStats; 4] {
        [&self.sites, &self.pages, &self.comments, &self.users]
    }

    #[must_use]
    pub fn created(&self) -> usize {
        self.kinds().iter().map(|s| s.created).sum()
    }

    #[must_use]
    pub fn updated(&self) -> usize {
        self.kinds().iter().map(|s| s.updated).sum()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.kinds().iter().map(|s| s.skipped).sum()
    }

    /// Failed records plus rejected entries.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.kinds().iter().map(|s| s.failed).sum::<usize>() + self.rejected
    }

    /// Everything that did not fail.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.created() + self.updated() + self.skipped()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded() + self.failed()
    }

    /// Status of a job whose stream ran to completion.
    #[must_use]
    pub fn settle(&self) -> JobStatus {
        if self.failed() == 0 {
            JobStatus::Succeeded
        } else if self.succeeded() == 0 {
            JobStatus::Failed
        } else {
            JobStatus::PartiallySucceeded
        }
    }

    /// One-line summary used in the final progress event.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} records: {} created, {} updated, {} skipped, {} failed",
            self.total(),
            self.created(),
            self.updated(),
            self.skipped(),
            self.failed()
        )
    }
}

// ── Errors local to a transfer ──────────────────────────────

/// A per-record failure. Recorded as a Failed event; never aborts the job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// The input entry could not be converted into a record.
    #[error("Invalid entry at {position}: {message}")]
    Parse { position: usize, message: String },

    /// The input could not be read past this point.
    #[error("Read failed at {position}: {message}")]
    Read { position: usize, message: String },

    /// A required reference never became available.
    #[error("Unresolved reference: {reference}")]
    Unresolved { reference: RecordId },

    /// The store rejected the write.
    #[error("Store error: {0}")]
    Store(String),
}

impl RecordError {
    /// Input position for errors that have no record identity.
    #[must_use]
    pub const fn position(&self) -> Option<usize> {
        match self {
            Self::Parse { position, .. } | Self::Read { position, .. } => Some(*position),
            Self::Unresolved { .. } | Self::Store(_) => None,
        }
    }
}

/// The progress channel can no longer accept events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct SinkClosed {
    pub reason: String,
}

/// Kinds of destructive action that require consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DestructiveAction {
    /// Replace an existing record with different content.
    Overwrite,
}

impl DestructiveAction {
    /// Question shown to an operator.
    #[must_use]
    pub const fn prompt(&self) -> &'static str {
        match self {
            Self::Overwrite => {
                "This import will overwrite existing records with the same identity. Continue?"
            }
        }
    }
}

impl fmt::Display for DestructiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overwrite => f.write_str("overwrite existing records"),
        }
    }
}

// ── Report ───────────────────────────────────────────────────

/// Why a job stopped before its stream was exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum AbortReason {
    ConfirmationDenied(DestructiveAction),
    SinkClosed(String),
    StreamFailed(String),
}

impl AbortReason {
    #[must_use]
    pub fn into_error(self) -> Error {
        match self {
            Self::ConfirmationDenied(action) => Error::ConfirmationDenied {
                action: action.to_string(),
            },
            Self::SinkClosed(reason) => Error::SinkClosed(reason),
            Self::StreamFailed(reason) => Error::MalformedInput(reason),
        }
    }
}

/// Final result of an import job.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub job: TransferJob,
    pub stats: TransferStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort: Option<AbortReason>,
}

impl TransferReport {
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.job.status
    }

    /// Convert anything short of full success into an error.
    ///
    /// # Errors
    ///
    /// Returns the abort reason as an error, or `TransferIncomplete` when
    /// records failed.
    pub fn into_result(self) -> crate::error::Result<Self> {
        if self.status() == JobStatus::Succeeded {
            return Ok(self);
        }
        if let Some(abort) = self.abort {
            return Err(abort.into_error());
        }
        Err(Error::TransferIncomplete {
            status: self.status().to_string(),
            failed: self.stats.failed(),
            total: self.stats.total(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_status() {
        let mut stats = TransferStats::default();
        assert_eq!(stats.settle(), JobStatus::Succeeded);

        stats.comments.created = 2;
        assert_eq!(stats.settle(), JobStatus::Succeeded);

        stats.comments.failed = 1;
        assert_eq!(stats.settle(), JobStatus::PartiallySucceeded);

        let mut all_failed = TransferStats::default();
        all_failed.pages.failed = 1;
        all_failed.rejected = 2;
        assert_eq!(all_failed.settle(), JobStatus::Failed);
        assert_eq!(all_failed.failed(), 3);
    }

    #[test]
    fn test_render_lines() {
        let id = RecordId::new(RecordKind::Comment, "comment-42");
        let event = ProgressEvent::record(id, Outcome::Success, "created");
        assert_eq!(event.render(), "[ OK ] comment:comment-42: created");
        assert!(!event.is_job_level());

        let summary = ProgressEvent::job(Outcome::Info, "done");
        assert_eq!(summary.render(), "[INFO] done");
        assert!(summary.is_job_level());

        let rejected = ProgressEvent::entry(3, "missing id");
        assert_eq!(rejected.render(), "[FAIL] entry #3: missing id");
    }

    #[test]
    fn test_report_into_result() {
        let mut job = TransferJob::import(vec![], false);
        job.status = JobStatus::Failed;
        let report = TransferReport {
            job,
            stats: TransferStats::default(),
            abort: Some(AbortReason::ConfirmationDenied(DestructiveAction::Overwrite)),
        };
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, Error::ConfirmationDenied { .. }));

        let mut job = TransferJob::import(vec![], true);
        job.status = JobStatus::PartiallySucceeded;
        let mut stats = TransferStats::default();
        stats.comments.created = 1;
        stats.comments.failed = 1;
        let err = TransferReport { job, stats, abort: None }.into_result().unwrap_err();
        assert!(matches!(err, Error::TransferIncomplete { failed: 1, total: 2, .. }));
    }

    #[test]
    fn test_entity_stats_total() {
        let stats = EntityStats {
            created: 10,
            updated: 5,
            skipped: 2,
            failed: 1,
        };
        assert_eq!(stats.total(), 18);
    }
}
