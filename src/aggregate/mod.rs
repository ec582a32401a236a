//! Result aggregation
//!
//! Collects classified records for a book, bounds memory by spilling full
//! class buffers to disk, confirms blur candidates, and writes the book's
//! outputs:
//!
//! - `collages/<barcode>/<class>/collage_<class>.png` plus `.metadata` sidecar
//! - `collages/<barcode>_patches.xml` defect map in original-scan pixels

mod aggregator;
mod buffer;
mod collage;
mod defect_map;
mod types;

pub use aggregator::ResultAggregator;
pub use buffer::{ClassBuffer, SpillHandle, SpillStore};
pub use collage::{Collage, METADATA_EXTENSION};
pub use defect_map::{DefectMap, DefectRect};
pub use types::{
    AddOutcome, AggregateError, AggregatorOptions, AggregatorOptionsBuilder, DefectClass,
    FinishReport, Result, DEFAULT_GRID_SIZE, DEFAULT_PATCH_SIZE, DEFAULT_SPILL_THRESHOLD,
    DEFAULT_TEMP_IMAGE_SIZE,
};
