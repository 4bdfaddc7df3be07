//! Transfer engine: import and export of comment data.
//!
//! # Import flow
//!
//! ```text
//! key:value options ──► TransferExecutor ──► FormatAdapter::open ──► records
//!                           │                                          │
//!                           ├── ConfirmationGate (overwrite consent)   │
//!                           ├── RecordStore (lookup, persist) ◄────────┘
//!                           └── ProgressSink (one event per record)
//! ```
//!
//! # Export flow
//!
//! `Exporter` collects a scope from the store in a fixed walk order and
//! renders it through an adapter into a single string.
//!
//! # Submodules
//!
//! - [`adapter`] - Format adapters and the registry
//! - [`executor`] - Import job orchestration
//! - [`export`] - Export serializer
//! - [`gate`] - Confirmation policies
//! - [`hash`] - Content hashing for change detection
//! - [`options`] - `key:value` option parsing
//! - [`sink`] - Progress sinks
//! - [`staging`] - Upload staging
//! - [`types`] - Jobs, events, stats and reports

pub mod adapter;
pub mod executor;
pub mod export;
pub mod gate;
pub mod hash;
pub mod options;
pub mod sink;
pub mod staging;
pub mod types;

pub use adapter::{AdapterRegistry, FormatAdapter, ImportContext, Incoming, RecordStream};
pub use executor::{TransferExecutor, DEFAULT_MAX_RETRY_PASSES};
pub use export::{ExportScope, Exporter};
pub use gate::{AssumeYes, ConfirmPolicy, ConfirmationGate, Interactive, RequireFlag};
pub use options::{flatten_payload, ConflictMode, ImportRequest, Options};
pub use sink::{BufferSink, ProgressSink, RenderStyle, StreamSink};
pub use staging::stage_upload;
pub use types::{
    AbortReason, DestructiveAction, JobStatus, Outcome, ProgressEvent, RecordError, TransferJob,
    TransferReport, TransferStats,
};
