//! Scan geometry module
//!
//! Turns raw two-page scans into normalized pages and page patches, and keeps
//! the bookkeeping needed to map patch coordinates back onto the scan.
//!
//! # Features
//!
//! - Spread splitting at the vertical midline
//! - Iterative border cropping with a monotonicity guard
//! - Fixed `grid × grid` patch tiling
//! - Coordinate map XML for later remapping
//!
//! # Example
//!
//! ```rust,no_run
//! use page_inspector::{GeometryNormalizer, NormalizeOptions, RetryPolicy, Scan, tile};
//! use std::path::Path;
//!
//! let normalizer = GeometryNormalizer::new(NormalizeOptions::builder().square_size(2000).build());
//! let scan = Scan::from_path(Path::new("0001.tif")).unwrap();
//! let (left, right) = normalizer.normalize_file(&scan, &RetryPolicy::default()).unwrap();
//! let patches = tile(&left, 10).unwrap();
//! assert_eq!(patches.len(), 100);
//! # let _ = right;
//! ```

mod coord_map;
mod normalize;
mod tile;
mod types;

pub use coord_map::{CoordMap, FrameCoords, COORD_MAP_FILE};
pub use normalize::{
    split_spread, CropResult, GeometryNormalizer, NormalizeOptions, NormalizeOptionsBuilder,
    DEFAULT_SQUARE_SIZE,
};
pub use tile::{patch_dimensions, tile, tile_image};
pub use types::{
    GeometryError, GridCell, Page, PageGeometry, PageSide, Patch, PixelPoint, Result, Scan,
    ScanId, SCAN_ID_DIGITS,
};
