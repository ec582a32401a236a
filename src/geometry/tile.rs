//! Patch grid tiling
//!
//! A page is cut into `grid × grid` equally sized patches. Patch origins start
//! half a patch in from the top-left and advance by one patch; an origin that
//! would push the patch past the page edge is pulled back so the patch stays
//! full size. Pixels beyond the last full patch are not examined.

use image::imageops;
use image::GrayImage;

use super::types::{GeometryError, GridCell, Page, Patch, PixelPoint, Result};

/// Patch edge lengths for a page of `width × height` cut into a `grid × grid` grid
pub fn patch_dimensions(width: u32, height: u32, grid: u32) -> Result<(u32, u32)> {
    if grid == 0 {
        return Err(GeometryError::DegeneratePage { width, height, grid });
    }
    let patch_w = width / grid;
    let patch_h = height / grid;
    if patch_w == 0 || patch_h == 0 {
        return Err(GeometryError::DegeneratePage { width, height, grid });
    }
    Ok((patch_w, patch_h))
}

/// Origin of the `index`-th patch along one axis
fn patch_origin(index: u32, patch: u32, extent: u32) -> u32 {
    (patch / 2 + index * patch).min(extent - patch)
}

/// Cut a raw image into `grid × grid` tiles, returning `(pixels, position, cell)` triples
pub fn tile_image(image: &GrayImage, grid: u32) -> Result<Vec<(GrayImage, PixelPoint, GridCell)>> {
    let (width, height) = image.dimensions();
    let (patch_w, patch_h) = patch_dimensions(width, height, grid)?;

    let mut tiles = Vec::with_capacity((grid * grid) as usize);
    for row in 0..grid {
        let y = patch_origin(row, patch_h, height);
        for col in 0..grid {
            let x = patch_origin(col, patch_w, width);
            let pixels = imageops::crop_imm(image, x, y, patch_w, patch_h).to_image();
            tiles.push((pixels, PixelPoint::new(x, y), GridCell::new(col, row)));
        }
    }
    Ok(tiles)
}

/// Tile a normalized page into patches
pub fn tile(page: &Page, grid: u32) -> Result<Vec<Patch>> {
    Ok(tile_image(&page.pixels, grid)?
        .into_iter()
        .map(|(pixels, position, cell)| Patch {
            pixels,
            grid: cell,
            position,
            scan_id: page.scan_id.clone(),
            side: page.side,
            page_basename: page.basename.clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::types::{PageGeometry, PageSide, ScanId};
    use std::collections::HashSet;

    fn page(width: u32, height: u32) -> Page {
        Page {
            scan_id: ScanId::parse("0001").unwrap(),
            side: PageSide::Left,
            basename: "0001_left.png".to_string(),
            pixels: GrayImage::new(width, height),
            bottom_right: PixelPoint::new(width, height),
            geometry: PageGeometry::from_corners(
                PixelPoint::new(0, 0),
                PixelPoint::new(width, height),
                width,
            ),
        }
    }

    #[test]
    fn test_tile_1000_grid_10() {
        let patches = tile(&page(1000, 1000), 10).unwrap();
        assert_eq!(patches.len(), 100);
        for patch in &patches {
            assert_eq!(patch.pixels.dimensions(), (100, 100));
        }
        assert_eq!(patches[0].grid, GridCell::new(0, 0));
        assert_eq!(patches[0].position, PixelPoint::new(50, 50));
        assert_eq!(patches[99].grid, GridCell::new(9, 9));
        assert_eq!(patches[99].position, PixelPoint::new(900, 900));
    }

    #[test]
    fn test_tile_grid_coordinates_complete() {
        for grid in 1..=12u32 {
            let size = grid * 37;
            let patches = tile(&page(size, size), grid).unwrap();
            assert_eq!(patches.len(), (grid * grid) as usize);

            let cells: HashSet<GridCell> = patches.iter().map(|p| p.grid).collect();
            assert_eq!(cells.len(), (grid * grid) as usize, "duplicates for grid {}", grid);
            for row in 0..grid {
                for col in 0..grid {
                    assert!(cells.contains(&GridCell::new(col, row)));
                }
            }
        }
    }

    #[test]
    fn test_tile_patches_stay_inside_page() {
        let patches = tile(&page(1013, 997), 10).unwrap();
        for patch in &patches {
            assert!(patch.position.x + patch.pixels.width() <= 1013);
            assert!(patch.position.y + patch.pixels.height() <= 997);
        }
    }

    #[test]
    fn test_tile_carries_page_identity() {
        let patches = tile(&page(100, 100), 2).unwrap();
        assert!(patches.iter().all(|p| p.page_basename == "0001_left.png"));
        assert!(patches.iter().all(|p| p.scan_id.as_str() == "0001"));
    }

    #[test]
    fn test_tile_degenerate() {
        assert!(matches!(
            tile(&page(5, 5), 10),
            Err(GeometryError::DegeneratePage { .. })
        ));
        assert!(tile(&page(10, 10), 0).is_err());
    }
}
