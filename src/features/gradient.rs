//! Sobel gradient statistics

use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

/// Histogram bins over magnitudes `[0, 256)`, one per integer value
const HISTOGRAM_BINS: usize = 256;

/// Lower cumulative fraction of the histogram span
const LOWER_FRACTION: f64 = 0.05;

/// Upper cumulative fraction of the histogram span
const UPPER_FRACTION: f64 = 0.95;

/// Gradient statistics of one patch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStats {
    /// Width of the 5th–95th percentile band of the magnitude histogram
    pub span: f64,
    /// Variance of the horizontal derivative
    pub x_variance: f64,
    /// Variance of the vertical derivative
    pub y_variance: f64,
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// First bin whose normalized cumulative count reaches `fraction`
fn search_cumulative(cumulative: &[f64], fraction: f64) -> usize {
    cumulative
        .iter()
        .position(|&c| c >= fraction)
        .unwrap_or(cumulative.len())
}

/// Histogram span of Sobel magnitudes in `[0, 256)`.
///
/// Magnitudes of 256 and above fall outside the histogram. A patch with no
/// magnitude inside the range has a span of zero.
pub fn magnitude_span(magnitudes: &[f64]) -> f64 {
    let mut histogram = [0u64; HISTOGRAM_BINS];
    for &m in magnitudes {
        if (0.0..=HISTOGRAM_BINS as f64).contains(&m) {
            let bin = (m as usize).min(HISTOGRAM_BINS - 1);
            histogram[bin] += 1;
        }
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0.0;
    }

    let mut running = 0u64;
    let cumulative: Vec<f64> = histogram
        .iter()
        .map(|count| {
            running += count;
            running as f64 / total as f64
        })
        .collect();

    let lower = search_cumulative(&cumulative, LOWER_FRACTION);
    let upper = search_cumulative(&cumulative, UPPER_FRACTION);
    upper.saturating_sub(lower) as f64
}

/// Compute gradient span and directional variances
pub fn gradient_stats(image: &GrayImage) -> GradientStats {
    let gx = horizontal_sobel(image);
    let gy = vertical_sobel(image);

    let gx: Vec<f64> = gx.pixels().map(|p| p.0[0] as f64).collect();
    let gy: Vec<f64> = gy.pixels().map(|p| p.0[0] as f64).collect();

    let magnitudes: Vec<f64> = gx
        .iter()
        .zip(&gy)
        .map(|(x, y)| (x * x + y * y).sqrt())
        .collect();

    GradientStats {
        span: magnitude_span(&magnitudes),
        x_variance: variance(&gx),
        y_variance: variance(&gy),
    }
}
