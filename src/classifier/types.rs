//! Core types for patch classification

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::geometry::{GridCell, PageSide, Patch, PixelPoint, ScanId};

// ============================================================
// Error Types
// ============================================================

/// Classifier error types
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Failed to load preset {path}: {reason}")]
    PresetLoad { path: PathBuf, reason: String },

    #[error("Invalid preset: {0}")]
    InvalidPreset(String),

    #[error("Feature vector has {actual} values, preset expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Non-finite feature value in patch {grid:?} of {page}")]
    NonFiniteFeature { page: String, grid: GridCell },
}

pub type Result<T> = std::result::Result<T, ClassifierError>;

// ============================================================
// Labels
// ============================================================

/// Coarse classifier verdict for a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Sharp,
    Blurry,
    Empty,
    Indeterminate,
}

impl Label {
    /// Parse a preset label name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sharp" => Some(Label::Sharp),
            "blurry" => Some(Label::Blurry),
            "empty" => Some(Label::Empty),
            "indeterminate" => Some(Label::Indeterminate),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Label::Sharp => "sharp",
            Label::Blurry => "blurry",
            Label::Empty => "empty",
            Label::Indeterminate => "indeterminate",
        }
    }

    /// Whether the confirmation model re-checks records with this label
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Label::Blurry | Label::Indeterminate)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================
// Defect Record
// ============================================================

/// One classified patch flowing through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectRecord {
    #[serde(with = "pixels_base64")]
    pub patch: GrayImage,
    pub scan_id: ScanId,
    pub side: PageSide,
    pub label: Label,
    /// Largest absolute discriminant margin
    pub confidence: f32,
    /// Patch top-left inside the normalized page
    pub position: PixelPoint,
    pub grid: GridCell,
    /// Basename of the normalized page the patch was cut from
    pub source_page: String,
}

impl DefectRecord {
    /// Record for a classified patch
    pub fn from_patch(patch: Patch, label: Label, confidence: f32) -> Self {
        Self {
            patch: patch.pixels,
            scan_id: patch.scan_id,
            side: patch.side,
            label,
            confidence,
            position: patch.position,
            grid: patch.grid,
            source_page: patch.page_basename,
        }
    }

    /// Move a right-page record into the combined spread coordinate space
    pub fn shifted_right(self, page_width: u32, grid_size: u32) -> Self {
        Self {
            position: PixelPoint::new(self.position.x + page_width, self.position.y),
            grid: GridCell::new(self.grid.col + grid_size, self.grid.row),
            ..self
        }
    }
}

/// Serde adapter storing grayscale pixels as `{width, height, data}` with base64 data
mod pixels_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use image::GrayImage;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct EncodedPixels {
        width: u32,
        height: u32,
        data: String,
    }

    pub fn serialize<S: Serializer>(image: &GrayImage, serializer: S) -> Result<S::Ok, S::Error> {
        EncodedPixels {
            width: image.width(),
            height: image.height(),
            data: STANDARD.encode(image.as_raw()),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<GrayImage, D::Error> {
        let encoded = EncodedPixels::deserialize(deserializer)?;
        let bytes = STANDARD
            .decode(encoded.data.as_bytes())
            .map_err(serde::de::Error::custom)?;
        GrayImage::from_raw(encoded.width, encoded.height, bytes)
            .ok_or_else(|| serde::de::Error::custom("pixel data does not match dimensions"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn record(label: Label) -> DefectRecord {
        DefectRecord {
            patch: GrayImage::from_fn(4, 3, |x, y| Luma([(x * 10 + y) as u8])),
            scan_id: ScanId::parse("0003").unwrap(),
            side: PageSide::Right,
            label,
            confidence: 1.5,
            position: PixelPoint::new(50, 150),
            grid: GridCell::new(0, 1),
            source_page: "0003_right.png".to_string(),
        }
    }

    #[test]
    fn test_label_names() {
        for label in [Label::Sharp, Label::Blurry, Label::Empty, Label::Indeterminate] {
            assert_eq!(Label::from_name(label.name()), Some(label));
        }
        assert_eq!(Label::from_name(" Blurry "), Some(Label::Blurry));
        assert_eq!(Label::from_name("smudged"), None);
    }

    #[test]
    fn test_needs_confirmation() {
        assert!(Label::Blurry.needs_confirmation());
        assert!(Label::Indeterminate.needs_confirmation());
        assert!(!Label::Sharp.needs_confirmation());
        assert!(!Label::Empty.needs_confirmation());
    }

    #[test]
    fn test_shifted_right() {
        let shifted = record(Label::Blurry).shifted_right(2000, 10);
        assert_eq!(shifted.position, PixelPoint::new(2050, 150));
        assert_eq!(shifted.grid, GridCell::new(10, 1));
        assert_eq!(shifted.source_page, "0003_right.png");
    }

    #[test]
    fn test_json_keeps_pixels() {
        let original = record(Label::Indeterminate);
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("\"label\":\"indeterminate\""));
        let parsed: DefectRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }
}
