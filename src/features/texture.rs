//! Gray-level co-occurrence contrast

use image::GrayImage;

/// Contrast of the symmetric, normalized co-occurrence matrix at distance 1,
/// angle 0 (each pixel paired with its right-hand neighbour).
///
/// With a normalized matrix the contrast `Σ P(i,j)·(i-j)²` reduces to the mean
/// squared difference over all horizontal neighbour pairs, so the matrix itself
/// is never materialized.
pub fn glcm_contrast(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    if width < 2 || height == 0 {
        return 0.0;
    }

    let mut sum = 0u64;
    for y in 0..height {
        for x in 0..width - 1 {
            let a = image.get_pixel(x, y).0[0] as i64;
            let b = image.get_pixel(x + 1, y).0[0] as i64;
            sum += ((a - b) * (a - b)) as u64;
        }
    }
    let pairs = (width as u64 - 1) * height as u64;
    sum as f64 / pairs as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_uniform_has_no_contrast() {
        assert_eq!(glcm_contrast(&GrayImage::from_pixel(8, 8, Luma([40]))), 0.0);
    }

    #[test]
    fn test_alternating_columns() {
        let img = GrayImage::from_fn(4, 2, |x, _| Luma([if x % 2 == 0 { 0 } else { 10 }]));
        assert_eq!(glcm_contrast(&img), 100.0);
    }

    #[test]
    fn test_vertical_change_is_ignored() {
        let img = GrayImage::from_fn(4, 4, |_, y| Luma([(y * 50) as u8]));
        assert_eq!(glcm_contrast(&img), 0.0);
    }

    #[test]
    fn test_single_column() {
        assert_eq!(glcm_contrast(&GrayImage::new(1, 5)), 0.0);
    }
}
