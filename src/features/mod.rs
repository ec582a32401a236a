//! Patch feature extraction
//!
//! Every patch is described by five numbers, always in this order:
//!
//! | Index | Feature |
//! |-------|---------|
//! | 0 | Power spectrum slope |
//! | 1 | Sobel magnitude histogram span |
//! | 2 | Horizontal gradient variance |
//! | 3 | Vertical gradient variance |
//! | 4 | Co-occurrence contrast |
//!
//! Extraction is pure, so batches are spread across the rayon pool.

mod gradient;
mod spectral;
mod texture;

pub use gradient::{gradient_stats, magnitude_span, GradientStats};
pub use spectral::power_spectrum_slope;
pub use texture::glcm_contrast;

use crate::geometry::Patch;
use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Number of features per patch
pub const FEATURE_COUNT: usize = 5;

/// Fixed-length patch descriptor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn slope(&self) -> f64 {
        self.0[0]
    }

    pub fn gradient_span(&self) -> f64 {
        self.0[1]
    }

    pub fn contrast(&self) -> f64 {
        self.0[4]
    }
}

/// Describe one patch
pub fn extract(image: &GrayImage) -> FeatureVector {
    let gradients = gradient_stats(image);
    FeatureVector([
        power_spectrum_slope(image),
        gradients.span,
        gradients.x_variance,
        gradients.y_variance,
        glcm_contrast(image),
    ])
}

/// Describe a batch of patches, preserving order
pub fn extract_batch(patches: &[Patch]) -> Vec<FeatureVector> {
    patches.par_iter().map(|p| extract(&p.pixels)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GridCell, PageSide, PixelPoint, ScanId};
    use image::Luma;

    fn patch(value: u8) -> Patch {
        Patch {
            pixels: GrayImage::from_fn(32, 32, |x, y| {
                Luma([if (x + y) % 4 < 2 { value } else { 0 }])
            }),
            grid: GridCell::new(0, 0),
            position: PixelPoint::new(0, 0),
            scan_id: ScanId::parse("0001").unwrap(),
            side: PageSide::Left,
            page_basename: "0001_left.png".to_string(),
        }
    }

    #[test]
    fn test_extract_is_deterministic() {
        let p = patch(200);
        assert_eq!(extract(&p.pixels), extract(&p.pixels));
    }

    #[test]
    fn test_extract_batch_preserves_order() {
        let patches = vec![patch(10), patch(250), patch(120)];
        let batch = extract_batch(&patches);
        assert_eq!(batch.len(), 3);
        for (features, p) in batch.iter().zip(&patches) {
            assert_eq!(*features, extract(&p.pixels));
        }
    }

    #[test]
    fn test_flat_patch_features() {
        let features = extract(&GrayImage::from_pixel(16, 16, Luma([255])));
        assert_eq!(features.gradient_span(), 0.0);
        assert_eq!(features.contrast(), 0.0);
        assert!(features.as_slice().iter().all(|v| v.is_finite()));
    }
}
