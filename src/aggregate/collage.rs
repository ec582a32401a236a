//! Collage images with scan-id sidecars
//!
//! Confirmed patches are laid out row-major, `grid` cells per row, each cell
//! resized to `cell × cell`. The sidecar `.metadata` file lists the scan id of
//! every cell in the same order, separated by spaces, so a click on the
//! collage can be traced back to its scan.

use image::imageops::{self, FilterType};
use image::GrayImage;
use std::path::{Path, PathBuf};

use super::types::{AggregateError, DefectClass, Result};
use crate::classifier::DefectRecord;
use crate::geometry::ScanId;
use crate::retry::{Attempt, RetryPolicy};

/// Sidecar extension
pub const METADATA_EXTENSION: &str = "metadata";

/// A rendered collage and the scan id behind each cell
#[derive(Debug, Clone)]
pub struct Collage {
    pub image: GrayImage,
    pub scan_ids: Vec<ScanId>,
    pub grid: u32,
    pub cell: u32,
}

impl Collage {
    /// Lay out records in the given order
    pub fn build(records: &[DefectRecord], grid: u32, cell: u32) -> Self {
        let grid = grid.max(1);
        let cell = cell.max(1);
        let rows = (records.len() as u32).div_ceil(grid).max(1);
        let mut image = GrayImage::new(grid * cell, rows * cell);

        for (idx, record) in records.iter().enumerate() {
            let idx = idx as u32;
            let x = (idx % grid) * cell;
            let y = (idx / grid) * cell;
            let resized = imageops::resize(&record.patch, cell, cell, FilterType::Triangle);
            imageops::replace(&mut image, &resized, x as i64, y as i64);
        }

        Self {
            image,
            scan_ids: records.iter().map(|r| r.scan_id.clone()).collect(),
            grid,
            cell,
        }
    }

    /// Scan id of the cell containing collage pixel `(x, y)`
    pub fn scan_at(&self, x: u32, y: u32) -> Option<&ScanId> {
        if x >= self.grid * self.cell {
            return None;
        }
        let index = (y / self.cell) * self.grid + x / self.cell;
        self.scan_ids.get(index as usize)
    }

    /// Sidecar contents
    pub fn metadata(&self) -> String {
        self.scan_ids
            .iter()
            .map(|id| format!("{} ", id))
            .collect()
    }

    /// Parse sidecar contents
    pub fn parse_metadata(text: &str) -> Result<Vec<ScanId>> {
        text.split_whitespace()
            .map(|token| {
                ScanId::parse(token)
                    .map_err(|_| AggregateError::Metadata(format!("bad scan id '{}'", token)))
            })
            .collect()
    }

    /// Image path for `class` under a book's collage folder
    pub fn path_for(collage_dir: &Path, class: DefectClass) -> PathBuf {
        collage_dir
            .join(class.name())
            .join(format!("collage_{}.png", class.name()))
    }

    /// Write image and sidecar, returning the image path
    pub fn save(&self, collage_dir: &Path, class: DefectClass, retry: &RetryPolicy) -> Result<PathBuf> {
        let path = Self::path_for(collage_dir, class);
        if let Some(parent) = path.parent() {
            retry.create_dir_all(parent)?;
        }
        retry.save_image(&self.image, &path)?;

        let metadata_path = path.with_extension(METADATA_EXTENSION);
        let metadata = self.metadata();
        retry.run(&format!("write {}", metadata_path.display()), || {
            std::fs::write(&metadata_path, metadata.as_bytes())
                .map_err(|e| Attempt::Transient(AggregateError::IoError(e)))
        })?;
        Ok(path)
    }

    /// Reload a saved collage for hit-testing
    pub fn load(image_path: &Path, grid: u32, cell: u32) -> Result<Self> {
        let image = image::open(image_path)?.into_luma8();
        let text = std::fs::read_to_string(image_path.with_extension(METADATA_EXTENSION))?;
        Ok(Self {
            image,
            scan_ids: Self::parse_metadata(&text)?,
            grid: grid.max(1),
            cell: cell.max(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Label;
    use crate::test_support::record_with;

    fn records(n: usize) -> Vec<DefectRecord> {
        (0..n)
            .map(|i| {
                let mut r = record_with(Label::Blurry, 1.0, (i * 20) as u8);
                r.scan_id = ScanId::parse(&format!("{:04}", i + 1)).unwrap();
                r
            })
            .collect()
    }

    #[test]
    fn test_layout_dimensions() {
        let collage = Collage::build(&records(7), 3, 10);
        assert_eq!(collage.image.dimensions(), (30, 30));
        // empty collage still has one row
        let empty = Collage::build(&[], 3, 10);
        assert_eq!(empty.image.dimensions(), (30, 10));
    }

    #[test]
    fn test_cells_hold_resized_patches() {
        let collage = Collage::build(&records(4), 2, 8);
        // cell (1, 1) holds record 3, value 60
        assert_eq!(collage.image.get_pixel(12, 12).0[0], 60);
    }

    #[test]
    fn test_scan_at() {
        let collage = Collage::build(&records(5), 2, 10);
        assert_eq!(collage.scan_at(0, 0).unwrap().as_str(), "0001");
        assert_eq!(collage.scan_at(15, 0).unwrap().as_str(), "0002");
        assert_eq!(collage.scan_at(5, 25).unwrap().as_str(), "0005");
        assert!(collage.scan_at(15, 25).is_none());
        assert!(collage.scan_at(25, 0).is_none());
    }

    #[test]
    fn test_metadata_round_trip() {
        let collage = Collage::build(&records(3), 2, 4);
        assert_eq!(collage.metadata(), "0001 0002 0003 ");
        assert_eq!(
            Collage::parse_metadata(&collage.metadata()).unwrap(),
            collage.scan_ids
        );
        assert!(Collage::parse_metadata("0001 xx").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let collage = Collage::build(&records(3), 2, 4);
        let path = collage
            .save(dir.path(), DefectClass::Indeterminate, &RetryPolicy::no_retry())
            .unwrap();
        assert!(path.ends_with("indeterminate/collage_indeterminate.png"));
        assert!(path.with_extension("metadata").exists());

        let loaded = Collage::load(&path, 2, 4).unwrap();
        assert_eq!(loaded.image.dimensions(), (8, 8));
        assert_eq!(loaded.scan_at(4, 4).map(|s| s.as_str()), None);
        assert_eq!(loaded.scan_at(0, 4).unwrap().as_str(), "0003");
    }
}
