//! Core types for scan geometry

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Number of leading digits that identify a scan
pub const SCAN_ID_DIGITS: usize = 4;

// ============================================================
// Error Types
// ============================================================

/// Geometry error types
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("Corrupt image {path}: {reason}")]
    CorruptImage { path: PathBuf, reason: String },

    #[error("Scan file name does not start with a {SCAN_ID_DIGITS}-digit sequence number: {0}")]
    InvalidScanName(String),

    #[error("Page {width}x{height} is too small for a {grid}x{grid} grid")]
    DegeneratePage { width: u32, height: u32, grid: u32 },

    #[error("Coordinate map error: {0}")]
    CoordMap(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GeometryError {
    /// Corrupt-image error for an in-memory buffer
    pub fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::CorruptImage {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GeometryError>;

// ============================================================
// Identifiers
// ============================================================

/// Four-digit scan sequence number taken from the scan file name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(String);

impl ScanId {
    /// Parse the leading digits of a file name (`0012_raw.tif` -> `0012`)
    pub fn parse(file_name: &str) -> Result<Self> {
        let prefix: String = file_name.chars().take(SCAN_ID_DIGITS).collect();
        if prefix.len() == SCAN_ID_DIGITS && prefix.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self(prefix))
        } else {
            Err(GeometryError::InvalidScanName(file_name.to_string()))
        }
    }

    /// Numeric form of the sequence number
    pub fn number(&self) -> u32 {
        self.0.parse().unwrap_or(0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which half of a two-page spread a page came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSide {
    Left,
    Right,
}

impl PageSide {
    /// Index tag preserving left/right order within a scan
    pub fn index(&self) -> usize {
        match self {
            PageSide::Left => 0,
            PageSide::Right => 1,
        }
    }

    /// File name suffix
    pub fn suffix(&self) -> &'static str {
        match self {
            PageSide::Left => "left",
            PageSide::Right => "right",
        }
    }

    /// Side encoded in a page file name such as `0001_right.png`
    pub fn from_basename(basename: &str) -> Option<Self> {
        let stem = basename.split('.').next().unwrap_or(basename);
        [PageSide::Left, PageSide::Right]
            .into_iter()
            .find(|side| stem.ends_with(&format!("_{}", side.suffix())))
    }
}

impl fmt::Display for PageSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

// ============================================================
// Coordinates
// ============================================================

/// Pixel coordinate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: u32,
    pub y: u32,
}

impl PixelPoint {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Grid index of a patch (column, row)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GridCell {
    pub col: u32,
    pub row: u32,
}

impl GridCell {
    pub fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }
}

/// Placement of a normalized page inside its original scan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Absolute top-left of the crop in scan pixels
    pub origin: PixelPoint,
    /// Scan pixels per normalized pixel, horizontally
    pub scale_x: f64,
    /// Scan pixels per normalized pixel, vertically
    pub scale_y: f64,
}

impl PageGeometry {
    /// Geometry from crop corners and the normalized square edge length
    pub fn from_corners(top_left: PixelPoint, bottom_right: PixelPoint, square_size: u32) -> Self {
        let size = square_size.max(1) as f64;
        Self {
            origin: top_left,
            scale_x: bottom_right.x.saturating_sub(top_left.x) as f64 / size,
            scale_y: bottom_right.y.saturating_sub(top_left.y) as f64 / size,
        }
    }

    /// Map a normalized-page pixel to absolute scan pixels
    pub fn to_scan(&self, local: PixelPoint) -> PixelPoint {
        PixelPoint {
            x: (self.origin.x as f64 + local.x as f64 * self.scale_x) as u32,
            y: (self.origin.y as f64 + local.y as f64 * self.scale_y) as u32,
        }
    }

    /// Scale a normalized-page extent to scan pixels
    pub fn scale_extent(&self, width: u32, height: u32) -> (u32, u32) {
        (
            (width as f64 * self.scale_x) as u32,
            (height as f64 * self.scale_y) as u32,
        )
    }
}

// ============================================================
// Scan / Page / Patch
// ============================================================

/// A raw capture on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub path: PathBuf,
    pub id: ScanId,
    /// File stem, used to name derived pages
    pub stem: String,
}

impl Scan {
    /// Identify a scan from its path
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let id = ScanId::parse(&file_name)?;
        let stem = file_name
            .split('.')
            .next()
            .unwrap_or(file_name.as_str())
            .to_string();
        Ok(Self {
            path: path.to_path_buf(),
            id,
            stem,
        })
    }

    /// File name of the normalized page for `side`
    pub fn page_basename(&self, side: PageSide) -> String {
        format!("{}_{}.png", self.stem, side.suffix())
    }
}

/// One normalized page of a spread
#[derive(Debug, Clone)]
pub struct Page {
    pub scan_id: ScanId,
    pub side: PageSide,
    /// File name the page is (or would be) stored under
    pub basename: String,
    pub pixels: GrayImage,
    /// Absolute bottom-right of the crop in scan pixels
    pub bottom_right: PixelPoint,
    pub geometry: PageGeometry,
}

impl Page {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Absolute top-left of the crop in scan pixels
    pub fn top_left(&self) -> PixelPoint {
        self.geometry.origin
    }
}

/// A fixed-size tile of a page
#[derive(Debug, Clone)]
pub struct Patch {
    pub pixels: GrayImage,
    pub grid: GridCell,
    /// Top-left of the patch inside the normalized page
    pub position: PixelPoint,
    pub scan_id: ScanId,
    pub side: PageSide,
    pub page_basename: String,
}
