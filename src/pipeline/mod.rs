//! Inspection pipeline
//!
//! Two ways to run an inspection over a book:
//!
//! - **Live**: [`LivePipeline`] watches a scan folder and pushes each new
//!   scan through three worker threads (normalize, classify, confirm)
//!   connected by typed queues. Results surface as [`ScanReport`]s through a
//!   [`ResultSink`].
//! - **Batch**: [`cut_folder`] normalizes every scan of a book, then
//!   [`inspect_folder`] classifies the saved pages, confirms candidates and
//!   writes collages and the defect map.
//!
//! Both modes share one [`PipelineSession`] carrying configuration,
//! telemetry and failure counters.
//!
//! # Example
//!
//! ```rust,no_run
//! use page_inspector::{cut_folder, inspect_folder, Config, PipelineSession, SilentProgress};
//! use page_inspector::logging::TracingTelemetry;
//! use std::path::Path;
//!
//! let session = PipelineSession::new(Config::default(), TracingTelemetry::shared());
//! let book = Path::new("/scans/B123");
//! cut_folder(&session, book, &SilentProgress).unwrap();
//! let report = inspect_folder(&session, book, &SilentProgress).unwrap();
//! println!("{} defects", report.finish.total_confirmed());
//! ```

mod batch;
mod live;
mod messages;
mod session;
mod types;
mod watcher;

pub use batch::{cut_folder, inspect_folder, list_pages, CutReport, InspectReport};
pub use live::{LivePipeline, ResultSink};
pub use messages::{DefectBatch, HalfPage, PageBatch, ScanReport, StageMessage};
pub use session::{InspectionGuard, PipelineSession, SessionStats};
pub use types::{PipelineError, Result};
pub use watcher::{is_raw_scan, list_raw_scans, FolderWatcher, WatcherHandle};
