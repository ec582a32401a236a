//! Core types for result aggregation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::classifier::Label;
use crate::retry::RetryPolicy;

// ============================================================
// Constants
// ============================================================

/// Records held in memory per class before spilling to disk
pub const DEFAULT_SPILL_THRESHOLD: usize = 10_000;

/// Collage cells per row (one grid row of patches)
pub const DEFAULT_GRID_SIZE: u32 = 10;

/// Collage cell edge length
pub const DEFAULT_PATCH_SIZE: u32 = 200;

/// Normalized page edge length used to derive remap scales
pub const DEFAULT_TEMP_IMAGE_SIZE: u32 = 2000;

// ============================================================
// Error Types
// ============================================================

/// Aggregation error types
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Spill file {path}: {reason}")]
    Spill { path: PathBuf, reason: String },

    #[error("Defect map error: {0}")]
    DefectMap(String),

    #[error("Collage metadata error: {0}")]
    Metadata(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Confirmation failed: {0}")]
    Confirm(#[from] crate::confirm::ConfirmError),

    #[error("Coordinate map error: {0}")]
    Geometry(#[from] crate::geometry::GeometryError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AggregateError>;

// ============================================================
// Classes
// ============================================================

/// Defect classes that are buffered, confirmed and written out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefectClass {
    Blurry,
    Indeterminate,
}

impl DefectClass {
    pub const ALL: [DefectClass; 2] = [DefectClass::Blurry, DefectClass::Indeterminate];

    /// Buffered class for a label; sharp and empty are never buffered
    pub fn for_label(label: Label) -> Option<Self> {
        match label {
            Label::Blurry => Some(DefectClass::Blurry),
            Label::Indeterminate => Some(DefectClass::Indeterminate),
            Label::Sharp | Label::Empty => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DefectClass::Blurry => "blurry",
            DefectClass::Indeterminate => "indeterminate",
        }
    }
}

impl fmt::Display for DefectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What `add` did with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Sharp: nothing stored
    Ignored,
    /// Empty: counted, not stored
    CountedEmpty,
    /// Blurry or indeterminate: buffered
    Buffered,
}

impl AddOutcome {
    /// Numeric code (0 ignored, 1 empty, 2 buffered)
    pub fn code(&self) -> u8 {
        match self {
            AddOutcome::Ignored => 0,
            AddOutcome::CountedEmpty => 1,
            AddOutcome::Buffered => 2,
        }
    }
}

// ============================================================
// Options
// ============================================================

/// Aggregator options
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    pub spill_threshold: usize,
    /// Collage row length
    pub grid_size: u32,
    /// Collage cell edge length
    pub patch_size: u32,
    /// Edge length the pages were normalized to
    pub temp_image_size: u32,
    pub retry: RetryPolicy,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            grid_size: DEFAULT_GRID_SIZE,
            patch_size: DEFAULT_PATCH_SIZE,
            temp_image_size: DEFAULT_TEMP_IMAGE_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl AggregatorOptions {
    pub fn builder() -> AggregatorOptionsBuilder {
        AggregatorOptionsBuilder::default()
    }

    /// Options matching a loaded configuration
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            spill_threshold: config.spill_threshold,
            grid_size: config.grid_size,
            patch_size: config.patch_size(),
            temp_image_size: config.temp_image_size,
            retry: config.retry_policy(),
        }
    }
}

/// Builder for [`AggregatorOptions`]
#[derive(Debug, Default)]
pub struct AggregatorOptionsBuilder {
    options: AggregatorOptions,
}

impl AggregatorOptionsBuilder {
    #[must_use]
    pub fn spill_threshold(mut self, threshold: usize) -> Self {
        self.options.spill_threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn grid_size(mut self, grid: u32) -> Self {
        self.options.grid_size = grid.max(1);
        self
    }

    #[must_use]
    pub fn patch_size(mut self, size: u32) -> Self {
        self.options.patch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn temp_image_size(mut self, size: u32) -> Self {
        self.options.temp_image_size = size.max(1);
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.options.retry = retry;
        self
    }

    pub fn build(self) -> AggregatorOptions {
        self.options
    }
}

// ============================================================
// Results
// ============================================================

/// Summary of a finished aggregation
#[derive(Debug, Clone, Default)]
pub struct FinishReport {
    /// Confirmed records per class
    pub confirmed: BTreeMap<DefectClass, usize>,
    /// Records handed to confirmation per class, spilled ones included
    pub candidates: BTreeMap<DefectClass, usize>,
    pub empty_count: usize,
    /// Collage images written
    pub collages: Vec<PathBuf>,
    /// Confirmed records whose page was missing from the coordinate map
    pub unmapped: usize,
    /// Spilled records that could not be reloaded, per class
    pub lost: BTreeMap<DefectClass, usize>,
    pub defect_map: Option<PathBuf>,
}

impl FinishReport {
    pub fn total_confirmed(&self) -> usize {
        self.confirmed.values().sum()
    }

    pub fn total_lost(&self) -> usize {
        self.lost.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_for_label() {
        assert_eq!(DefectClass::for_label(Label::Blurry), Some(DefectClass::Blurry));
        assert_eq!(
            DefectClass::for_label(Label::Indeterminate),
            Some(DefectClass::Indeterminate)
        );
        assert_eq!(DefectClass::for_label(Label::Sharp), None);
        assert_eq!(DefectClass::for_label(Label::Empty), None);
    }

    #[test]
    fn test_add_outcome_codes() {
        assert_eq!(AddOutcome::Ignored.code(), 0);
        assert_eq!(AddOutcome::CountedEmpty.code(), 1);
        assert_eq!(AddOutcome::Buffered.code(), 2);
    }

    #[test]
    fn test_options_builder() {
        let options = AggregatorOptions::builder()
            .spill_threshold(0)
            .grid_size(4)
            .patch_size(50)
            .build();
        assert_eq!(options.spill_threshold, 1);
        assert_eq!(options.grid_size, 4);
        assert_eq!(options.patch_size, 50);
        assert_eq!(options.temp_image_size, DEFAULT_TEMP_IMAGE_SIZE);
    }
}
