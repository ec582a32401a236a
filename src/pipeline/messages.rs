//! Typed messages passed between live pipeline stages

use std::path::PathBuf;

use crate::classifier::DefectRecord;
use crate::geometry::{GridCell, PageGeometry, PageSide, Patch, PixelPoint, Scan, ScanId};
use crate::severity::{Severity, SeverityEstimator};

/// Unit of work on a stage queue
#[derive(Debug)]
pub enum StageMessage {
    /// Raw scan waiting for normalization
    Scan(Scan),
    /// Tiled pages of one scan, waiting for classification
    PageBatch(PageBatch),
    /// Classified records of one scan, waiting for confirmation
    DefectBatch(DefectBatch),
    /// Graceful stop, forwarded downstream
    Stop,
}

impl StageMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            StageMessage::Scan(_) => "scan",
            StageMessage::PageBatch(_) => "page batch",
            StageMessage::DefectBatch(_) => "defect batch",
            StageMessage::Stop => "stop",
        }
    }
}

/// Patches of one half of a spread
#[derive(Debug)]
pub struct HalfPage {
    pub side: PageSide,
    pub geometry: PageGeometry,
    /// Where the normalized page was written
    pub path: PathBuf,
    pub patches: Vec<Patch>,
}

/// Both tiled halves of one scan, left first
#[derive(Debug)]
pub struct PageBatch {
    pub scan_id: ScanId,
    pub halves: [HalfPage; 2],
}

impl PageBatch {
    pub fn page_paths(&self) -> [PathBuf; 2] {
        [self.halves[0].path.clone(), self.halves[1].path.clone()]
    }

    pub fn geometries(&self) -> [PageGeometry; 2] {
        [self.halves[0].geometry, self.halves[1].geometry]
    }
}

/// Records of one scan in combined spread coordinates
#[derive(Debug)]
pub struct DefectBatch {
    pub scan_id: ScanId,
    pub records: Vec<DefectRecord>,
    pub page_paths: [PathBuf; 2],
    pub geometries: [PageGeometry; 2],
}

/// Final result for one scan, handed to the result sink
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub scan_id: ScanId,
    /// Confirmed defects in combined spread coordinates
    pub defects: Vec<DefectRecord>,
    /// Normalized left and right page images
    pub page_paths: [PathBuf; 2],
    /// Left and right page geometry for remapping into the raw scan
    pub geometries: [PageGeometry; 2],
    /// Normalized page edge length used for the right-half shift
    pub page_size: u32,
    pub grid_size: u32,
}

impl ScanReport {
    /// Grid cells holding at least one confirmed defect
    pub fn defect_cells(&self) -> Vec<GridCell> {
        self.defects.iter().map(|d| d.grid).collect()
    }

    /// Severity over the whole spread
    pub fn severity(&self) -> Severity {
        let estimator = SeverityEstimator::new(self.grid_size);
        estimator.estimate(&self.defect_cells(), estimator.spread_cells())
    }

    /// Raw-scan top-left of a defect, undoing the right-half shift
    pub fn to_scan(&self, defect: &DefectRecord) -> PixelPoint {
        let (geometry, local) = match defect.side {
            PageSide::Left => (&self.geometries[0], defect.position),
            PageSide::Right => (
                &self.geometries[1],
                PixelPoint::new(defect.position.x.saturating_sub(self.page_size), defect.position.y),
            ),
        };
        geometry.to_scan(local)
    }
}
