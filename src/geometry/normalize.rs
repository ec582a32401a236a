//! Spread splitting and border cropping
//!
//! # Algorithm
//!
//! 1. Split the raw scan at the vertical midline
//! 2. For each half, up to `max_rounds` times:
//!    - Gaussian blur, Otsu threshold, external contours
//!    - Take the bounding box of the largest contour
//!    - Stop if it covers less than `min_coverage` of the remaining area,
//!      or if it did not shrink compared to the previous round
//!    - Crop and accumulate the top-left offset
//! 3. Resize the final crop to a `square_size` square
//!
//! The right half's absolute x is shifted by the left half's width.

use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::gaussian_blur_f32;
use std::path::Path;
use tracing::debug;

use super::types::{
    GeometryError, Page, PageGeometry, PageSide, PixelPoint, Result, Scan,
};
use crate::retry::{Attempt, RetryPolicy};

// ============================================================
// Constants
// ============================================================

/// Default normalized page edge length
pub const DEFAULT_SQUARE_SIZE: u32 = 2000;

/// Maximum cropping rounds
const DEFAULT_MAX_ROUNDS: u32 = 5;

/// Minimum share of the remaining area a crop candidate must cover
const DEFAULT_MIN_COVERAGE: f64 = 0.6;

/// Sigma equivalent to a 5x5 Gaussian kernel
const DEFAULT_BLUR_SIGMA: f32 = 1.1;

// ============================================================
// Options
// ============================================================

/// Normalization options
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Edge length of the normalized square page
    pub square_size: u32,
    /// Upper bound on cropping rounds
    pub max_rounds: u32,
    /// Minimum coverage of the remaining area for a crop to be accepted
    pub min_coverage: f64,
    /// Pre-threshold blur sigma
    pub blur_sigma: f32,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            square_size: DEFAULT_SQUARE_SIZE,
            max_rounds: DEFAULT_MAX_ROUNDS,
            min_coverage: DEFAULT_MIN_COVERAGE,
            blur_sigma: DEFAULT_BLUR_SIGMA,
        }
    }
}

impl NormalizeOptions {
    /// Create a builder
    pub fn builder() -> NormalizeOptionsBuilder {
        NormalizeOptionsBuilder::default()
    }
}

/// Builder for NormalizeOptions
#[derive(Debug, Default)]
pub struct NormalizeOptionsBuilder {
    options: NormalizeOptions,
}

impl NormalizeOptionsBuilder {
    /// Set the normalized edge length
    #[must_use]
    pub fn square_size(mut self, size: u32) -> Self {
        self.options.square_size = size.max(1);
        self
    }

    /// Set the round limit
    #[must_use]
    pub fn max_rounds(mut self, rounds: u32) -> Self {
        self.options.max_rounds = rounds;
        self
    }

    /// Set the coverage threshold (0.0-1.0)
    #[must_use]
    pub fn min_coverage(mut self, coverage: f64) -> Self {
        self.options.min_coverage = coverage.clamp(0.0, 1.0);
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> NormalizeOptions {
        self.options
    }
}

// ============================================================
// Crop result
// ============================================================

/// Result of cropping one half
#[derive(Debug, Clone)]
pub struct CropResult {
    /// Cropped and resized page
    pub image: GrayImage,
    /// Top-left of the crop inside the half
    pub top_left: PixelPoint,
    /// Bottom-right of the crop inside the half
    pub bottom_right: PixelPoint,
    /// Rounds that actually cropped
    pub rounds: u32,
}

/// Axis-aligned box in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoundingBox {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl BoundingBox {
    fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

// ============================================================
// Normalizer
// ============================================================

/// Turns raw spreads into normalized page pairs
#[derive(Debug, Clone, Default)]
pub struct GeometryNormalizer {
    options: NormalizeOptions,
}

impl GeometryNormalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    /// Decode a scan as grayscale, retrying transient read failures.
    ///
    /// Decode failures and zero-sized images are corrupt input and are not retried.
    pub fn load_scan(path: &Path, retry: &RetryPolicy) -> Result<GrayImage> {
        if !path.exists() {
            return Err(GeometryError::ImageNotFound(path.to_path_buf()));
        }

        let image = retry.run(&format!("read {}", path.display()), || {
            image::open(path).map_err(|e| match e {
                image::ImageError::IoError(io) => Attempt::Transient(GeometryError::IoError(io)),
                other => Attempt::Fatal(GeometryError::corrupt(path, other.to_string())),
            })
        })?;

        let gray = image.to_luma8();
        if gray.width() == 0 || gray.height() == 0 {
            return Err(GeometryError::corrupt(path, "zero dimension"));
        }
        Ok(gray)
    }

    /// Load and normalize a scan file
    pub fn normalize_file(&self, scan: &Scan, retry: &RetryPolicy) -> Result<(Page, Page)> {
        let image = Self::load_scan(&scan.path, retry)?;
        self.normalize(scan, &image)
    }

    /// Split a decoded spread and normalize both halves
    pub fn normalize(&self, scan: &Scan, image: &GrayImage) -> Result<(Page, Page)> {
        let (width, height) = image.dimensions();
        if width < 2 || height == 0 {
            return Err(GeometryError::corrupt(
                &scan.path,
                format!("cannot split a {}x{} image", width, height),
            ));
        }

        let (left, right) = split_spread(image);
        let half_width = width / 2;

        let left_page = self.build_page(scan, PageSide::Left, &left, 0);
        let right_page = self.build_page(scan, PageSide::Right, &right, half_width);

        debug!(
            "Normalized scan {}: left origin {:?}, right origin {:?}",
            scan.id,
            left_page.top_left(),
            right_page.top_left()
        );

        Ok((left_page, right_page))
    }

    fn build_page(&self, scan: &Scan, side: PageSide, half: &GrayImage, x_shift: u32) -> Page {
        let crop = self.crop_to_page(half);
        let top_left = PixelPoint::new(crop.top_left.x + x_shift, crop.top_left.y);
        let bottom_right = PixelPoint::new(crop.bottom_right.x + x_shift, crop.bottom_right.y);

        Page {
            scan_id: scan.id.clone(),
            side,
            basename: scan.page_basename(side),
            pixels: crop.image,
            bottom_right,
            geometry: PageGeometry::from_corners(top_left, bottom_right, self.options.square_size),
        }
    }

    /// Iteratively crop non-page borders from one half and resize it
    pub fn crop_to_page(&self, half: &GrayImage) -> CropResult {
        let mut current = half.clone();
        let mut blurred = gaussian_blur_f32(half, self.options.blur_sigma);

        let mut offset_x = 0u32;
        let mut offset_y = 0u32;
        let mut last_area = u64::MAX;
        let mut rounds = 0;

        for _ in 0..self.options.max_rounds {
            let remaining = current.width() as u64 * current.height() as u64;
            if remaining == 0 {
                break;
            }

            let level = otsu_level(&blurred);
            let binary = threshold(&blurred, level, ThresholdType::Binary);

            let Some(bbox) = largest_contour_bbox(&binary) else {
                break;
            };

            let area = bbox.area();
            // Monotonicity guard: a candidate that does not shrink ends the search
            if (area as f64) < self.options.min_coverage * remaining as f64 || last_area <= area {
                break;
            }
            last_area = area;

            offset_x += bbox.x;
            offset_y += bbox.y;
            current = imageops::crop_imm(&current, bbox.x, bbox.y, bbox.width, bbox.height)
                .to_image();
            blurred = imageops::crop_imm(&blurred, bbox.x, bbox.y, bbox.width, bbox.height)
                .to_image();
            rounds += 1;
        }

        let bottom_right = PixelPoint::new(offset_x + current.width(), offset_y + current.height());
        let size = self.options.square_size;
        let image = imageops::resize(&current, size, size, FilterType::Triangle);

        CropResult {
            image,
            top_left: PixelPoint::new(offset_x, offset_y),
            bottom_right,
            rounds,
        }
    }
}

/// Split a spread at the vertical midline
pub fn split_spread(image: &GrayImage) -> (GrayImage, GrayImage) {
    let (width, height) = image.dimensions();
    let mid = width / 2;
    let left = imageops::crop_imm(image, 0, 0, mid, height).to_image();
    let right = imageops::crop_imm(image, mid, 0, width - mid, height).to_image();
    (left, right)
}

/// Bounding box of the largest outermost foreground contour
fn largest_contour_bbox(binary: &GrayImage) -> Option<BoundingBox> {
    let contours = find_contours::<i32>(binary);

    contours
        .iter()
        .filter(|c| c.parent.is_none() && matches!(c.border_type, BorderType::Outer))
        .filter(|c| !c.points.is_empty())
        .map(|c| {
            let points: Vec<(i32, i32)> = c.points.iter().map(|p| (p.x, p.y)).collect();
            (polygon_area(&points), bounding_box(&points))
        })
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, bbox)| bbox)
}

/// Shoelace area of a closed polygon
fn polygon_area(points: &[(i32, i32)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0i64;
    for (i, &(x0, y0)) in points.iter().enumerate() {
        let (x1, y1) = points[(i + 1) % points.len()];
        twice_area += x0 as i64 * y1 as i64 - x1 as i64 * y0 as i64;
    }
    (twice_area as f64 / 2.0).abs()
}

fn bounding_box(points: &[(i32, i32)]) -> BoundingBox {
    let min_x = points.iter().map(|p| p.0).min().unwrap_or(0).max(0);
    let max_x = points.iter().map(|p| p.0).max().unwrap_or(0).max(0);
    let min_y = points.iter().map(|p| p.1).min().unwrap_or(0).max(0);
    let max_y = points.iter().map(|p| p.1).max().unwrap_or(0).max(0);
    BoundingBox {
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    }
}
