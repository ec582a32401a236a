//! page-inspector - Defect inspection for scanned book pages
//!
//! Finds blurry and missing-content regions in book scans, both while a
//! book is being captured and in batch over finished books.
//!
//! # Modules
//!
//! - [`geometry`]: spread splitting, border cropping, tiling, coordinate map
//! - [`features`]: five-number patch descriptors
//! - [`classifier`]: preset-driven patch classification
//! - [`confirm`]: secondary blur confirmation model
//! - [`aggregate`]: class buffers, spill files, collages and the defect map
//! - [`pipeline`]: live three-stage pipeline and batch mode
//! - [`severity`]: per-spread risk color
//!
//! # Example
//!
//! ```rust,no_run
//! use page_inspector::{Config, LivePipeline, PipelineSession, ScanReport};
//! use page_inspector::logging::TracingTelemetry;
//! use std::path::Path;
//!
//! let session = PipelineSession::shared(Config::default(), TracingTelemetry::shared());
//! let mut pipeline = LivePipeline::start(session, "B123").unwrap();
//! pipeline.watch(Path::new("/scans/B123")).unwrap();
//! pipeline.poll(&mut |report: ScanReport| println!("{} {}", report.scan_id, report.severity()));
//! pipeline.stop();
//! ```

pub mod aggregate;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod confirm;
pub mod features;
pub mod geometry;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod severity;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use aggregate::{
    AddOutcome, AggregateError, AggregatorOptions, Collage, DefectClass, DefectMap, DefectRect,
    FinishReport, ResultAggregator,
};
pub use classifier::{ClassifierError, DefectRecord, Label, PatchClassifier, PresetBundle};
pub use cli::{exit_codes, BookArgs, Cli, CommonArgs, Commands, LiveArgs};
pub use config::{BookPaths, CliOverrides, Config, ConfigError};
pub use confirm::{BlurConfirmer, BlurModel, BlurScores, ConfirmError, OnnxBlurModel};
pub use features::{extract, FeatureVector, FEATURE_COUNT};
pub use geometry::{
    tile, tile_image, CoordMap, FrameCoords, GeometryError, GeometryNormalizer, GridCell,
    NormalizeOptions, Page, PageGeometry, PageSide, Patch, PixelPoint, Scan, ScanId,
};
pub use logging::{MemoryTelemetry, Telemetry, TracingTelemetry};
pub use pipeline::{
    cut_folder, inspect_folder, list_raw_scans, CutReport, InspectReport, LivePipeline,
    PipelineError, PipelineSession, ResultSink, ScanReport, SessionStats,
};
pub use progress::{OutputMode, ProcessingStage, ProgressCallback, ProgressTracker, SilentProgress};
pub use retry::RetryPolicy;
pub use severity::{Severity, SeverityEstimator};
