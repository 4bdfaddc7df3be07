//! Import command implementation.
//!
//! Flattens the JSON payload into `key:value` options, builds the gate and
//! sink for this terminal, and hands the job to the executor.

use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use serde::Serialize;

use crate::cli::ImportArgs;
use crate::config::{load_settings, resolve_db_path};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use crate::transfer::{
    flatten_payload, AdapterRegistry, BufferSink, ConfirmPolicy, Interactive, ProgressEvent,
    RenderStyle, RequireFlag, StreamSink, TransferExecutor, TransferJob, TransferReport,
};

#[derive(Serialize)]
struct ImportOutput<'a> {
    report: &'a TransferReport,
    events: &'a [ProgressEvent],
}

/// Execute the import command.
///
/// # Errors
///
/// Returns an error if the payload is invalid, the job cannot start, or
/// the job ends in any status other than succeeded.
pub fn execute(
    args: &ImportArgs,
    db_path: Option<&PathBuf>,
    json: bool,
    quiet: bool,
    no_color: bool,
) -> Result<()> {
    let payload = read_payload(args)?;
    let options = flatten_payload(&payload)?;
    let settings = load_settings()?;

    let db_path = resolve_db_path(db_path.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))?;
    let mut storage = SqliteStorage::open(&db_path)?;
    let registry = AdapterRegistry::builtin();

    let job = TransferJob::import(options, args.yes);
    // Asked only when the job lacks --yes.
    let fallback: Box<dyn ConfirmPolicy> = if !json && io::stdin().is_terminal() {
        Box::new(Interactive::new(io::stdin().lock(), io::stderr()))
    } else {
        Box::new(RequireFlag)
    };

    if json || quiet {
        let mut sink = BufferSink::new();
        let report = TransferExecutor::new(&mut storage, &registry, fallback, &mut sink)
            .with_max_retry_passes(settings.max_retry_passes)
            .run_import(job)?;

        if json {
            let events = sink.into_events();
            let output = ImportOutput {
                report: &report,
                events: &events,
            };
            println!("{}", serde_json::to_string(&output)?);
        }
        return report.into_result().map(|_| ());
    }

    let style = if args.html || settings.html_progress {
        RenderStyle::Html
    } else {
        RenderStyle::Plain
    };
    let color = !no_color && style == RenderStyle::Plain && io::stdout().is_terminal();
    let mut sink = StreamSink::new(io::stdout().lock(), style).with_color(color);
    let report = TransferExecutor::new(&mut storage, &registry, fallback, &mut sink)
        .with_max_retry_passes(settings.max_retry_passes)
        .run_import(job)?;

    report.into_result().map(|_| ())
}

fn read_payload(args: &ImportArgs) -> Result<String> {
    match (&args.payload, &args.payload_file) {
        (Some(payload), _) => Ok(payload.clone()),
        (None, Some(path)) => fs::read_to_string(path).map_err(|e| {
            Error::InvalidArgument(format!("cannot read payload file {}: {e}", path.display()))
        }),
        (None, None) => Err(Error::InvalidArgument(
            "an options payload is required (--payload or --payload-file)".to_string(),
        )),
    }
}
