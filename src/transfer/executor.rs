//! Import executor.
//!
//! Runs one import job end to end:
//!
//! 1. Validate options and resolve the adapter. Failures here happen before
//!    any store access and are the job's only result.
//! 2. Open the adapter's lazy record stream.
//! 3. Apply records one at a time, emitting exactly one progress event per
//!    stream item. Records whose required references are not persisted yet
//!    are set aside and retried after the stream is exhausted. Implied
//!    records (a comment's site, page or author) are only created when
//!    missing.
//! 4. Settle the job status and emit a summary.
//!
//! Nothing is rolled back when a job stops early; re-running the same
//! import converges because unchanged records are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{Record, RecordId};
use crate::storage::RecordStore;

use super::adapter::{AdapterRegistry, FormatAdapter, ImportContext, Incoming, RecordStream};
use super::gate::{ConfirmPolicy, ConfirmationGate, RequireFlag};
use super::hash::same_content;
use super::options::{ConflictMode, ImportRequest, InputSource, Options};
use super::sink::ProgressSink;
use super::types::{
    AbortReason, DestructiveAction, JobStatus, Outcome, ProgressEvent, RecordError, SinkClosed,
    TransferJob, TransferReport, TransferStats,
};

/// Retry passes over deferred records when nothing else is configured.
pub const DEFAULT_MAX_RETRY_PASSES: usize = 10;

/// Why the record loop stopped early.
enum Abort {
    Denied(DestructiveAction),
    Sink(SinkClosed),
}

impl From<SinkClosed> for Abort {
    fn from(closed: SinkClosed) -> Self {
        Self::Sink(closed)
    }
}

impl From<Abort> for AbortReason {
    fn from(abort: Abort) -> Self {
        match abort {
            Abort::Denied(action) => Self::ConfirmationDenied(action),
            Abort::Sink(closed) => Self::SinkClosed(closed.reason),
        }
    }
}

/// Mutable state of the job being run.
struct JobState {
    gate: ConfirmationGate,
    mode: ConflictMode,
    stats: TransferStats,
}

/// Executes one import job against a store.
///
/// The confirmation policy and sink are explicit values; nothing is read
/// from process-wide state. `fallback` answers confirmations unless the
/// job itself carries assume-yes.
pub struct TransferExecutor<'a, S: RecordStore> {
    store: &'a mut S,
    registry: &'a AdapterRegistry,
    fallback: Option<Box<dyn ConfirmPolicy>>,
    sink: &'a mut dyn ProgressSink,
    max_retry_passes: usize,
}

impl<'a, S: RecordStore> TransferExecutor<'a, S> {
    pub fn new(
        store: &'a mut S,
        registry: &'a AdapterRegistry,
        fallback: Box<dyn ConfirmPolicy>,
        sink: &'a mut dyn ProgressSink,
    ) -> Self {
        Self {
            store,
            registry,
            fallback: Some(fallback),
            sink,
            max_retry_passes: DEFAULT_MAX_RETRY_PASSES,
        }
    }

    #[must_use]
    pub fn with_max_retry_passes(mut self, passes: usize) -> Self {
        self.max_retry_passes = passes;
        self
    }

    /// Run an import job to a terminal status.
    ///
    /// The confirmation policy is fixed here from the job's assume-yes flag,
    /// so an executor runs exactly one job.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOptions` or `UnknownFormat` if the job cannot start.
    /// The error is also emitted as a single job-level event. Everything
    /// that happens after the job starts is reported in the returned
    /// [`TransferReport`] instead.
    pub fn run_import(mut self, mut job: TransferJob) -> Result<TransferReport> {
        job.status = JobStatus::Running;

        let (request, adapter) = match self.prepare(&job) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(error = %e, "Import rejected before start");
                job.status = JobStatus::Failed;
                // The caller gets the error either way.
                self.emit_final(&ProgressEvent::job(Outcome::Failed, e.to_string()));
                return Err(e);
            }
        };

        let fallback = self.fallback.take().unwrap_or_else(|| Box::new(RequireFlag));
        let mut state = JobState {
            gate: ConfirmationGate::for_job(job.assume_yes, fallback),
            mode: request.mode,
            stats: TransferStats::default(),
        };

        info!(
            format = adapter.name(),
            site = %request.site,
            mode = ?request.mode,
            policy = state.gate.policy_name(),
            "Starting import"
        );

        let start = ProgressEvent::job(
            Outcome::Info,
            format!(
                "Importing {} data into site '{}'",
                adapter.name(),
                request.site
            ),
        );
        if let Err(closed) = self.sink.emit(&start) {
            return Ok(finish_aborted(job, state.stats, AbortReason::SinkClosed(closed.reason)));
        }

        let stream = match open_stream(adapter, &request) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Could not open import stream");
                let reason = AbortReason::StreamFailed(e.to_string());
                // Status is Failed whether or not this reaches the client.
                self.emit_final(&ProgressEvent::job(Outcome::Failed, e.to_string()));
                return Ok(finish_aborted(job, state.stats, reason));
            }
        };

        if let Err(abort) = self.process(stream, &request.site, &mut state) {
            let reason = AbortReason::from(abort);
            warn!(?reason, "Import aborted");
            if let AbortReason::ConfirmationDenied(action) = &reason {
                let summary = format!(
                    "Aborted: confirmation denied to {action} ({})",
                    state.stats.summary()
                );
                self.emit_final(&ProgressEvent::job(Outcome::Failed, summary));
            }
            return Ok(finish_aborted(job, state.stats, reason));
        }

        let stats = state.stats;

        job.status = stats.settle();
        let outcome = match job.status {
            JobStatus::Failed => Outcome::Failed,
            _ => Outcome::Info,
        };
        let summary = ProgressEvent::job(
            outcome,
            format!("Import {}: {}", job.status, stats.summary()),
        );
        if let Err(closed) = self.sink.emit(&summary) {
            return Ok(finish_aborted(job, stats, AbortReason::SinkClosed(closed.reason)));
        }

        info!(
            status = %job.status,
            created = stats.created(),
            updated = stats.updated(),
            skipped = stats.skipped(),
            failed = stats.failed(),
            elapsed_ms = job.elapsed_ms(),
            "Import finished"
        );

        Ok(TransferReport {
            job,
            stats,
            abort: None,
        })
    }

    /// Emit a closing event whose delivery does not change the outcome.
    fn emit_final(&mut self, event: &ProgressEvent) {
        if let Err(closed) = self.sink.emit(event) {
            warn!(reason = %closed.reason, "Progress sink closed before the final event");
        }
    }

    fn prepare(&self, job: &TransferJob) -> Result<(ImportRequest, &'a dyn FormatAdapter)> {
        let options = Options::from_list(&job.options)?;
        let request = ImportRequest::from_options(options)?;
        let adapter = self.registry.resolve(&request.format)?;
        if !adapter.supports_import() {
            return Err(Error::InvalidOptions(format!(
                "format '{}' cannot be imported",
                adapter.name()
            )));
        }
        Ok((request, adapter))
    }

    fn process(
        &mut self,
        stream: RecordStream<'_>,
        site: &str,
        state: &mut JobState,
    ) -> std::result::Result<(), Abort> {
        let mut deferred = Vec::new();

        for item in stream {
            let mut incoming = match item {
                Ok(incoming) => incoming,
                Err(e) => {
                    state.stats.rejected += 1;
                    let event = ProgressEvent::entry(e.position().unwrap_or(0), e.to_string());
                    self.sink.emit(&event)?;
                    continue;
                }
            };

            incoming.record.rehome(site);
            match self.missing_reference(&incoming.record) {
                Ok(None) => self.apply(incoming, state)?,
                Ok(Some(missing)) => {
                    debug!(record = %incoming.record.id(), %missing, "Deferring until reference exists");
                    deferred.push(incoming);
                }
                Err(e) => {
                    let id = incoming.record.id();
                    self.fail(id, &RecordError::Store(e.to_string()), &mut state.stats)?;
                }
            }
        }

        self.retry_deferred(deferred, state)
    }

    /// Retry set-aside records until they all resolve, a pass makes no
    /// progress, or the pass budget runs out. Whatever is left fails.
    fn retry_deferred(
        &mut self,
        mut deferred: Vec<Incoming>,
        state: &mut JobState,
    ) -> std::result::Result<(), Abort> {
        let mut pass = 0;
        while !deferred.is_empty() && pass < self.max_retry_passes {
            pass += 1;
            let before = deferred.len();
            let mut waiting = Vec::new();

            for incoming in deferred {
                match self.missing_reference(&incoming.record) {
                    Ok(None) => self.apply(incoming, state)?,
                    Ok(Some(_)) => waiting.push(incoming),
                    Err(e) => {
                        let id = incoming.record.id();
                        self.fail(id, &RecordError::Store(e.to_string()), &mut state.stats)?;
                    }
                }
            }

            debug!(pass, before, after = waiting.len(), "Retry pass finished");
            deferred = waiting;
            if deferred.len() == before {
                break;
            }
        }

        for Incoming { record, .. } in deferred {
            let reference = match self.missing_reference(&record) {
                Ok(Some(missing)) => missing,
                _ => record.id(),
            };
            self.fail(record.id(), &RecordError::Unresolved { reference }, &mut state.stats)?;
        }
        Ok(())
    }

    /// First required reference of `record` that is not persisted.
    fn missing_reference(&self, record: &Record) -> Result<Option<RecordId>> {
        for reference in record.references() {
            if !self.store.exists(&reference)? {
                return Ok(Some(reference));
            }
        }
        Ok(None)
    }

    fn apply(&mut self, incoming: Incoming, state: &mut JobState) -> std::result::Result<(), Abort> {
        let Incoming { record, implied } = incoming;
        let id = record.id();
        let stats = &mut state.stats;

        let existing = match self.store.find(&id) {
            Ok(existing) => existing,
            Err(e) => return self.fail(id, &RecordError::Store(e.to_string()), stats),
        };

        let (created, message) = match existing {
            None => (true, "created"),
            Some(stored) if same_content(&stored, &record) => {
                return self.skip(id, "unchanged", stats);
            }
            Some(_) if implied || state.mode == ConflictMode::Skip => {
                return self.skip(id, "exists", stats);
            }
            Some(_) => {
                if !state.gate.may_proceed(DestructiveAction::Overwrite) {
                    return Err(Abort::Denied(DestructiveAction::Overwrite));
                }
                (false, "updated")
            }
        };

        if let Err(e) = self.store.persist(&record) {
            return self.fail(id, &RecordError::Store(e.to_string()), stats);
        }

        let counters = stats.for_kind_mut(id.kind);
        if created {
            counters.created += 1;
        } else {
            counters.updated += 1;
        }
        debug!(record = %id, message, "Record applied");
        self.sink
            .emit(&ProgressEvent::record(id, Outcome::Success, message))?;
        Ok(())
    }

    fn skip(
        &mut self,
        id: RecordId,
        reason: &str,
        stats: &mut TransferStats,
    ) -> std::result::Result<(), Abort> {
        stats.for_kind_mut(id.kind).skipped += 1;
        self.sink
            .emit(&ProgressEvent::record(id, Outcome::Skipped, reason))?;
        Ok(())
    }

    fn fail(
        &mut self,
        id: RecordId,
        error: &RecordError,
        stats: &mut TransferStats,
    ) -> std::result::Result<(), Abort> {
        debug!(record = %id, %error, "Record failed");
        stats.for_kind_mut(id.kind).failed += 1;
        self.sink
            .emit(&ProgressEvent::record(id, Outcome::Failed, error.to_string()))?;
        Ok(())
    }
}

fn finish_aborted(mut job: TransferJob, stats: TransferStats, reason: AbortReason) -> TransferReport {
    job.status = JobStatus::Failed;
    TransferReport {
        job,
        stats,
        abort: Some(reason),
    }
}

fn open_stream(adapter: &dyn FormatAdapter, request: &ImportRequest) -> Result<RecordStream<'static>> {
    let reader: Box<dyn BufRead> = match &request.source {
        InputSource::File(path) => {
            let file = File::open(path).map_err(|e| {
                Error::MalformedInput(format!("cannot open {}: {e}", path.display()))
            })?;
            Box::new(BufReader::new(file))
        }
        InputSource::Inline(data) => Box::new(Cursor::new(data.clone().into_bytes())),
    };

    let ctx = ImportContext {
        site: request.site.clone(),
        options: request.options.clone(),
    };
    adapter.open(&ctx, reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Comment, Page, RecordKind, Site};
    use crate::storage::SqliteStorage;
    use crate::model::User;
    use crate::transfer::sink::BufferSink;
    use crate::transfer::types::Subject;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counting {
        calls: Rc<Cell<usize>>,
        answer: bool,
    }

    impl ConfirmPolicy for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn confirm(&mut self, _action: DestructiveAction) -> bool {
            self.calls.set(self.calls.get() + 1);
            self.answer
        }
    }

    /// Sink that accepts a fixed number of events, then closes.
    struct ClosingSink {
        remaining: usize,
    }

    impl ProgressSink for ClosingSink {
        fn emit(&mut self, _event: &ProgressEvent) -> std::result::Result<(), SinkClosed> {
            if self.remaining == 0 {
                return Err(SinkClosed {
                    reason: "connection reset".to_string(),
                });
            }
            self.remaining -= 1;
            Ok(())
        }
    }

    /// Store wrapper that rejects writes of one comment key.
    struct FailingStore {
        inner: SqliteStorage,
        reject: &'static str,
    }

    impl RecordStore for FailingStore {
        fn find(&self, id: &RecordId) -> Result<Option<Record>> {
            self.inner.find(id)
        }

        fn persist(&mut self, record: &Record) -> Result<()> {
            if record.key() == self.reject {
                return Err(Error::Other("disk full".to_string()));
            }
            self.inner.persist(record)
        }
    }

    const SITE: &str = r#"{"type":"site","key":"demo","name":"Demo"}"#;
    const PAGE: &str = r#"{"type":"page","key":"/p","site_key":"demo","title":"P"}"#;

    fn comment_line(key: &str, content: &str) -> String {
        format!(r#"{{"type":"comment","key":"{key}","page_key":"/p","content":"{content}"}}"#)
    }

    fn reply_line(key: &str, parent: &str) -> String {
        format!(
            r#"{{"type":"comment","key":"{key}","page_key":"/p","parent_key":"{parent}","content":"re"}}"#
        )
    }

    fn options(lines: &[&str], extra: &[&str]) -> Vec<String> {
        let mut options = vec![
            "format:native".to_string(),
            "site:demo".to_string(),
            format!("data:{}", lines.join("\n")),
        ];
        options.extend(extra.iter().map(ToString::to_string));
        options
    }

    fn run<S: RecordStore>(
        store: &mut S,
        fallback: Box<dyn ConfirmPolicy>,
        options: Vec<String>,
        assume_yes: bool,
    ) -> (Result<TransferReport>, BufferSink) {
        let registry = AdapterRegistry::builtin();
        let mut sink = BufferSink::new();
        let result = TransferExecutor::new(store, &registry, fallback, &mut sink)
            .run_import(TransferJob::import(options, assume_yes));
        (result, sink)
    }

    /// Run with `--yes`; the fallback must never be consulted.
    fn run_yes<S: RecordStore>(
        store: &mut S,
        options: Vec<String>,
    ) -> (Result<TransferReport>, BufferSink) {
        run(store, Box::new(RequireFlag), options, true)
    }

    fn seeded() -> SqliteStorage {
        let mut store = SqliteStorage::open_memory().unwrap();
        store
            .persist(&Record::Site(Site {
                key: "demo".to_string(),
                name: "Demo".to_string(),
                urls: vec![],
            }))
            .unwrap();
        store
            .persist(&Record::Page(Page {
                key: "/p".to_string(),
                site_key: "demo".to_string(),
                title: "P".to_string(),
                url: String::new(),
                admin_only: false,
            }))
            .unwrap();
        store
    }

    fn stored_comment(store: &SqliteStorage, key: &str) -> Option<Comment> {
        store.get_comment("demo", key).unwrap()
    }

    fn job_failures(sink: &BufferSink) -> usize {
        sink.events()
            .iter()
            .filter(|e| e.is_job_level() && e.outcome == Outcome::Failed)
            .count()
    }

    #[test]
    fn test_imports_into_empty_store() {
        let mut store = SqliteStorage::open_memory().unwrap();
        let c1 = comment_line("1", "hello");
        let lines = [SITE, PAGE, c1.as_str()];
        let (result, sink) = run_yes(&mut store, options(&lines, &[]));

        let report = result.unwrap();
        assert_eq!(report.status(), JobStatus::Succeeded);
        assert_eq!(report.stats.created(), 3);
        assert_eq!(sink.record_events().count(), 3);
        assert_eq!(store.counts().unwrap().total(), 3);
    }

    #[test]
    fn test_denied_overwrite_aborts_and_keeps_stored_record() {
        let mut store = seeded();
        store
            .persist(&Record::Comment(Comment {
                content: "original".to_string(),
                ..comment_fixture("comment-42")
            }))
            .unwrap();

        let incoming = comment_line("comment-42", "replacement");
        let (result, sink) = run(
            &mut store,
            Box::new(RequireFlag),
            options(&[PAGE, incoming.as_str()], &["mode:overwrite"]),
            false,
        );

        let report = result.unwrap();
        assert_eq!(report.status(), JobStatus::Failed);
        assert_eq!(
            report.abort,
            Some(AbortReason::ConfirmationDenied(DestructiveAction::Overwrite))
        );
        assert_eq!(job_failures(&sink), 1);
        assert_eq!(stored_comment(&store, "comment-42").unwrap().content, "original");
    }

    fn comment_fixture(key: &str) -> Comment {
        Comment {
            key: key.to_string(),
            site_key: "demo".to_string(),
            page_key: "/p".to_string(),
            parent_key: None,
            user_key: None,
            content: String::new(),
            ua: String::new(),
            ip: String::new(),
            is_pending: false,
            is_collapsed: false,
            is_pinned: false,
            vote_up: 0,
            vote_down: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_missing_option_leaves_store_untouched() {
        let mut store = SqliteStorage::open_memory().unwrap();
        let c1 = comment_line("1", "hello");
        let options = vec!["format:native".to_string(), format!("data:{c1}")];
        let (result, sink) = run_yes(&mut store, options);

        assert!(matches!(result, Err(Error::InvalidOptions(_))));
        assert_eq!(store.counts().unwrap().total(), 0);
        assert_eq!(sink.events().len(), 1);
        assert_eq!(job_failures(&sink), 1);
    }

    #[test]
    fn test_unknown_format_fails_before_start() {
        let mut store = SqliteStorage::open_memory().unwrap();
        let options = vec![
            "format:wordpress".to_string(),
            "site:demo".to_string(),
            "data:[]".to_string(),
        ];
        let (result, _) = run_yes(&mut store, options);
        assert!(matches!(result, Err(Error::UnknownFormat { .. })));
        assert_eq!(store.counts().unwrap().total(), 0);
    }

    #[test]
    fn test_status_follows_failure_count() {
        // K = 0
        let mut store = seeded();
        let (a, b) = (comment_line("a", "x"), comment_line("b", "y"));
        let (result, sink) = run_yes(&mut store, options(&[a.as_str(), b.as_str()], &[]));
        assert_eq!(result.unwrap().status(), JobStatus::Succeeded);
        assert_eq!(sink.record_events().count(), 2);

        // 0 < K < N
        let mut store = seeded();
        let (result, sink) = run_yes(
            &mut store,
            options(&[a.as_str(), "{broken", b.as_str()], &[]),
        );
        let report = result.unwrap();
        assert_eq!(report.status(), JobStatus::PartiallySucceeded);
        assert_eq!(report.stats.rejected, 1);
        assert_eq!(sink.record_events().count(), 3);
        assert!(sink
            .record_events()
            .any(|e| e.subject == Subject::Entry(2) && e.outcome == Outcome::Failed));

        // K = N
        let mut store = seeded();
        let (result, sink) = run_yes(&mut store, options(&["{broken", "[]"], &[]));
        assert_eq!(result.unwrap().status(), JobStatus::Failed);
        assert_eq!(sink.record_events().count(), 2);
    }

    #[test]
    fn test_gate_asked_once_for_many_conflicts() {
        let mut store = seeded();
        store.persist(&Record::Comment(comment_fixture("a"))).unwrap();
        store.persist(&Record::Comment(comment_fixture("b"))).unwrap();

        let calls = Rc::new(Cell::new(0));
        let policy = Box::new(Counting {
            calls: Rc::clone(&calls),
            answer: true,
        });
        let (a, b) = (comment_line("a", "new a"), comment_line("b", "new b"));
        let (result, _) = run(&mut store, policy, options(&[a.as_str(), b.as_str()], &[]), false);

        let report = result.unwrap();
        assert_eq!(report.status(), JobStatus::Succeeded);
        assert_eq!(report.stats.comments.updated, 2);
        assert_eq!(calls.get(), 1);
        assert_eq!(stored_comment(&store, "b").unwrap().content, "new b");
    }

    #[test]
    fn test_assume_yes_flag_bypasses_fallback() {
        let mut store = seeded();
        store.persist(&Record::Comment(comment_fixture("a"))).unwrap();

        let calls = Rc::new(Cell::new(0));
        let policy = Box::new(Counting {
            calls: Rc::clone(&calls),
            answer: false,
        });
        let a = comment_line("a", "changed");
        let (result, _) = run(&mut store, policy, options(&[a.as_str()], &[]), true);

        let report = result.unwrap();
        assert!(report.job.assume_yes);
        assert_eq!(report.status(), JobStatus::Succeeded);
        assert_eq!(report.stats.comments.updated, 1);
        assert_eq!(calls.get(), 0);
        assert_eq!(stored_comment(&store, "a").unwrap().content, "changed");
    }

    #[test]
    fn test_artrans_into_existing_site_only_adds_missing_context() {
        let mut store = SqliteStorage::open_memory().unwrap();
        let site = Site {
            key: "demo".to_string(),
            name: "Demo".to_string(),
            urls: vec!["https://demo.example".to_string()],
        };
        let user = User {
            key: "ann@example.com".to_string(),
            name: "Ann Smith".to_string(),
            email: "ann@example.com".to_string(),
            link: "https://ann.example".to_string(),
            badge_name: String::new(),
            badge_color: String::new(),
        };
        store.persist(&Record::Site(site.clone())).unwrap();
        store
            .persist(&Record::Page(Page {
                key: "/p".to_string(),
                site_key: "demo".to_string(),
                title: "P".to_string(),
                url: String::new(),
                admin_only: true,
            }))
            .unwrap();
        store.persist(&Record::User(user.clone())).unwrap();

        let data = r#"[
            {"id":"100","page_key":"/p","nick":"Ann","email":"ann@example.com","content":"hi"},
            {"id":"101","page_key":"/new","page_title":"New","content":"there"}
        ]"#;
        let options = vec![
            "format:artrans".to_string(),
            "site:demo".to_string(),
            format!("data:{data}"),
        ];

        let calls = Rc::new(Cell::new(0));
        let policy = Box::new(Counting {
            calls: Rc::clone(&calls),
            answer: false,
        });
        let (result, sink) = run(&mut store, policy, options, false);

        let report = result.unwrap();
        assert_eq!(report.status(), JobStatus::Succeeded);
        assert_eq!(calls.get(), 0);
        assert_eq!(report.stats.comments.created, 2);
        assert_eq!(report.stats.pages.created, 1);
        assert_eq!(report.stats.sites.skipped, 1);
        assert_eq!(report.stats.pages.skipped, 1);
        assert_eq!(report.stats.users.skipped, 1);
        assert_eq!(sink.record_events().count(), 6);

        assert_eq!(store.get_site("demo").unwrap(), Some(site));
        assert_eq!(store.get_user("ann@example.com").unwrap(), Some(user));
        let page = store.get_page("demo", "/p").unwrap().unwrap();
        assert_eq!(page.title, "P");
        assert!(page.admin_only);
        assert_eq!(store.get_page("demo", "/new").unwrap().unwrap().title, "New");
        assert!(stored_comment(&store, "100").is_some());
    }

    #[test]
    fn test_skip_mode_keeps_existing_without_asking() {
        let mut store = seeded();
        store.persist(&Record::Comment(comment_fixture("a"))).unwrap();

        let calls = Rc::new(Cell::new(0));
        let policy = Box::new(Counting {
            calls: Rc::clone(&calls),
            answer: false,
        });
        let a = comment_line("a", "changed");
        let (result, sink) = run(&mut store, policy, options(&[a.as_str()], &["mode:skip"]), false);

        assert_eq!(result.unwrap().stats.comments.skipped, 1);
        assert_eq!(calls.get(), 0);
        assert_eq!(sink.record_events().next().unwrap().message, "exists");
        assert_eq!(stored_comment(&store, "a").unwrap().content, "");
    }

    #[test]
    fn test_rerun_converges() {
        let mut store = SqliteStorage::open_memory().unwrap();
        let (c1, r1) = (comment_line("1", "hello"), reply_line("2", "1"));
        let lines = [SITE, PAGE, c1.as_str(), r1.as_str()];

        let (first, _) = run_yes(&mut store, options(&lines, &[]));
        assert_eq!(first.unwrap().stats.created(), 4);
        let after_first = store.counts().unwrap();

        let (second, sink) = run_yes(&mut store, options(&lines, &[]));
        let report = second.unwrap();
        assert_eq!(report.status(), JobStatus::Succeeded);
        assert_eq!(report.stats.skipped(), 4);
        assert!(sink
            .record_events()
            .all(|e| e.outcome == Outcome::Skipped && e.message == "unchanged"));
        assert_eq!(store.counts().unwrap(), after_first);
    }

    #[test]
    fn test_children_before_parents_are_deferred() {
        let mut store = SqliteStorage::open_memory().unwrap();
        let (c1, r1, r2) = (comment_line("1", "root"), reply_line("2", "1"), reply_line("3", "2"));
        // Reverse dependency order: replies, then comment, then page, then site.
        let lines = [r2.as_str(), r1.as_str(), c1.as_str(), PAGE, SITE];

        let (result, sink) = run_yes(&mut store, options(&lines, &[]));
        let report = result.unwrap();
        assert_eq!(report.status(), JobStatus::Succeeded);
        assert_eq!(report.stats.created(), 5);
        assert_eq!(sink.record_events().count(), 5);
        assert_eq!(stored_comment(&store, "3").unwrap().parent_key.as_deref(), Some("2"));
    }

    #[test]
    fn test_unresolvable_reference_fails_record_only() {
        let mut store = seeded();
        let orphan = r#"{"type":"comment","key":"x","page_key":"/missing","content":"?"}"#;
        let ok = comment_line("y", "fine");
        let (result, sink) = run_yes(&mut store, options(&[orphan, ok.as_str()], &[]));

        let report = result.unwrap();
        assert_eq!(report.status(), JobStatus::PartiallySucceeded);
        assert_eq!(report.stats.comments.failed, 1);
        let failed = sink
            .record_events()
            .find(|e| e.outcome == Outcome::Failed)
            .unwrap();
        assert_eq!(
            failed.subject,
            Subject::Record(RecordId::in_site(RecordKind::Comment, "demo", "x"))
        );
        assert!(failed.message.contains("page:/missing"));
    }

    #[test]
    fn test_zero_retry_passes_fails_deferred_records() {
        let mut store = SqliteStorage::open_memory().unwrap();
        let registry = AdapterRegistry::builtin();
        let mut sink = BufferSink::new();
        let report = TransferExecutor::new(
            &mut store,
            &registry,
            Box::new(RequireFlag),
            &mut sink,
        )
        .with_max_retry_passes(0)
        .run_import(TransferJob::import(options(&[PAGE, SITE], &[]), true))
        .unwrap();

        assert_eq!(report.status(), JobStatus::PartiallySucceeded);
        assert_eq!(report.stats.pages.failed, 1);
        assert_eq!(report.stats.sites.created, 1);
    }

    #[test]
    fn test_sites_and_pages_move_to_target_site() {
        let mut store = SqliteStorage::open_memory().unwrap();
        let site = r#"{"type":"site","key":"legacy","name":""}"#;
        let page = r#"{"type":"page","key":"/p","site_key":"legacy"}"#;
        let (result, _) = run_yes(&mut store, options(&[site, page], &[]));

        assert_eq!(result.unwrap().status(), JobStatus::Succeeded);
        assert_eq!(store.get_site("demo").unwrap().unwrap().name, "demo");
        assert!(store.get_site("legacy").unwrap().is_none());
        assert_eq!(store.get_page("demo", "/p").unwrap().unwrap().site_key, "demo");
    }

    #[test]
    fn test_store_failure_is_per_record() {
        let mut store = FailingStore {
            inner: seeded(),
            reject: "bad",
        };
        let (bad, good) = (comment_line("bad", "x"), comment_line("good", "y"));
        let (result, sink) = run_yes(&mut store, options(&[bad.as_str(), good.as_str()], &[]));

        let report = result.unwrap();
        assert_eq!(report.status(), JobStatus::PartiallySucceeded);
        assert_eq!(report.stats.comments.failed, 1);
        assert_eq!(report.stats.comments.created, 1);
        assert_eq!(sink.record_events().count(), 2);
        assert!(stored_comment(&store.inner, "good").is_some());
    }

    #[test]
    fn test_sink_closing_aborts_and_keeps_committed() {
        let mut store = seeded();
        let registry = AdapterRegistry::builtin();
        // Start event plus one record event, then the client goes away.
        let mut sink = ClosingSink { remaining: 2 };
        let (a, b, c) = (comment_line("a", "1"), comment_line("b", "2"), comment_line("c", "3"));

        let report = TransferExecutor::new(
            &mut store,
            &registry,
            Box::new(RequireFlag),
            &mut sink,
        )
        .run_import(TransferJob::import(
            options(&[a.as_str(), b.as_str(), c.as_str()], &[]),
            true,
        ))
        .unwrap();

        assert_eq!(report.status(), JobStatus::Failed);
        assert!(matches!(report.abort, Some(AbortReason::SinkClosed(_))));
        assert!(stored_comment(&store, "a").is_some());
        // The record whose event could not be delivered was already written.
        assert!(stored_comment(&store, "b").is_some());
        assert!(stored_comment(&store, "c").is_none());
    }

    #[test]
    fn test_unreadable_file_fails_job() {
        let mut store = SqliteStorage::open_memory().unwrap();
        let options = vec![
            "format:native".to_string(),
            "site:demo".to_string(),
            "file:/nonexistent/threadport-import-missing".to_string(),
        ];
        let (result, sink) = run_yes(&mut store, options);

        let report = result.unwrap();
        assert_eq!(report.status(), JobStatus::Failed);
        assert!(matches!(report.abort, Some(AbortReason::StreamFailed(_))));
        assert_eq!(job_failures(&sink), 1);
        assert_eq!(sink.record_events().count(), 0);
    }
}
