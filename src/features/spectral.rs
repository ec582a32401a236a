//! Power spectrum slope
//!
//! Sharp patches keep energy at high spatial frequencies, so the radially
//! averaged magnitude spectrum falls off slowly. The slope of a straight-line
//! fit in log-log space is the feature.

use image::GrayImage;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Added to radial bin counts and profile values before dividing or taking logs
const EPSILON: f64 = 1e-5;

/// 2D FFT magnitude spectrum, row-major, unshifted
fn magnitude_spectrum(image: &GrayImage) -> Vec<f64> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let mut buffer: Vec<Complex<f64>> = image
        .pixels()
        .map(|p| Complex::new(p.0[0] as f64, 0.0))
        .collect();

    let mut planner = FftPlanner::<f64>::new();

    let row_fft = planner.plan_fft_forward(width);
    for row in buffer.chunks_exact_mut(width) {
        row_fft.process(row);
    }

    let col_fft = planner.plan_fft_forward(height);
    let mut column = vec![Complex::new(0.0, 0.0); height];
    for x in 0..width {
        for y in 0..height {
            column[y] = buffer[y * width + x];
        }
        col_fft.process(&mut column);
        for y in 0..height {
            buffer[y * width + x] = column[y];
        }
    }

    buffer.iter().map(|c| c.norm()).collect()
}

/// Integer distance of frequency bin `(x, y)` from the shifted spectrum centre
fn radius(x: usize, y: usize, width: usize, height: usize) -> usize {
    // position after moving the zero frequency to (width / 2, height / 2)
    let sx = ((x + width / 2) % width) as f64 - (width / 2) as f64;
    let sy = ((y + height / 2) % height) as f64 - (height / 2) as f64;
    (sx * sx + sy * sy).sqrt() as usize
}

/// Least-squares slope of `ys` against `xs`
fn fit_slope(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    if xs.len() < 2 {
        return 0.0;
    }
    let sum_x: f64 = xs.iter().sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();
    let sum_xx: f64 = xs.iter().map(|x| x * x).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}

/// Slope of the log-log radial power profile.
///
/// The DC bin and empty radial bins are excluded from the fit. Patches too
/// small to yield two usable bins score `0.0`.
pub fn power_spectrum_slope(image: &GrayImage) -> f64 {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width == 0 || height == 0 {
        return 0.0;
    }

    let magnitude = magnitude_spectrum(image);

    let half_w = (width / 2) as f64;
    let half_h = (height / 2) as f64;
    let bins = (half_w * half_w + half_h * half_h).sqrt() as usize + 1;
    let mut sums = vec![0.0f64; bins];
    let mut counts = vec![0u32; bins];
    for y in 0..height {
        for x in 0..width {
            let r = radius(x, y, width, height);
            sums[r] += magnitude[y * width + x];
            counts[r] += 1;
        }
    }

    let (log_radii, log_profile): (Vec<f64>, Vec<f64>) = sums
        .iter()
        .zip(&counts)
        .enumerate()
        .skip(1)
        .map(|(r, (sum, count))| (r, sum / (*count as f64 + EPSILON)))
        .filter(|(_, value)| *value > 0.0)
        .map(|(r, value)| ((r as f64).ln(), (value + EPSILON).ln()))
        .unzip();

    fit_slope(&log_radii, &log_profile)
}
