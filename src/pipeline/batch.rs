//! Batch mode: cut a book folder into pages, then inspect every page
//!
//! Both steps run on a bounded rayon pool sized by
//! [`Config::worker_count`](crate::config::Config::worker_count).

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::session::PipelineSession;
use super::types::{PipelineError, Result};
use super::watcher::list_raw_scans;
use crate::aggregate::{AggregatorOptions, FinishReport, ResultAggregator};
use crate::classifier::{DefectRecord, PatchClassifier};
use crate::config::{BookPaths, Config};
use crate::geometry::{
    self, CoordMap, FrameCoords, GeometryNormalizer, NormalizeOptions, PageSide, Patch, Scan,
    ScanId,
};
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;

/// Outcome of cutting one book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutReport {
    pub barcode: String,
    /// Raw scans found
    pub scans: usize,
    /// Page images written
    pub pages: usize,
    /// Scans dropped as corrupt
    pub dropped: usize,
    pub coord_map: PathBuf,
}

/// Outcome of inspecting one book
#[derive(Debug, Clone)]
pub struct InspectReport {
    pub barcode: String,
    pub pages: usize,
    /// Pages that could not be read or classified
    pub failed_pages: usize,
    /// Records buffered for confirmation
    pub candidates: usize,
    pub finish: FinishReport,
}

fn worker_pool(config: &Config) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count())
        .thread_name(|i| format!("inspect-{}", i))
        .build()
        .map_err(|e| PipelineError::ThreadPool(e.to_string()))
}

fn book_paths(config: &Config, folder: &Path) -> Result<BookPaths> {
    BookPaths::barcode_of(folder)
        .map(|barcode| config.book_paths(&barcode))
        .ok_or_else(|| PipelineError::FolderNotFound(folder.to_path_buf()))
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"))
}

/// Remove page images left over from an earlier cut
fn clear_stale_pages(dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_png(&path) {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Normalized page images of a book, sorted by name
pub fn list_pages(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::NoPages(dir.to_path_buf()));
    }
    let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_png(path))
        .collect();
    pages.sort();
    Ok(pages)
}

// ============================================================
// Cutting
// ============================================================

/// Normalize one scan and write both pages. `None` if the scan is dropped.
fn cut_scan(
    session: &PipelineSession,
    normalizer: &GeometryNormalizer,
    paths: &BookPaths,
    path: &Path,
    retry: &RetryPolicy,
) -> Option<Vec<(String, FrameCoords)>> {
    let pages = Scan::from_path(path).and_then(|scan| normalizer.normalize_file(&scan, retry));
    let (left, right) = match pages {
        Ok(pages) => pages,
        Err(e) => {
            session.record_dropped_scan(&path.display().to_string(), &e);
            return None;
        }
    };

    let mut frames = Vec::with_capacity(2);
    for page in [left, right] {
        let target = paths.temp_images.join(&page.basename);
        match retry.save_image(&page.pixels, &target) {
            Ok(()) => frames.push((
                page.basename.clone(),
                FrameCoords {
                    top_left: page.top_left(),
                    bottom_right: page.bottom_right,
                },
            )),
            Err(e) => session.record_failed_item(&format!("Write {}", target.display()), &e),
        }
    }
    Some(frames)
}

/// Normalize every raw scan in `folder` into the book's temp image folder
/// and write its coordinate map.
pub fn cut_folder(
    session: &PipelineSession,
    folder: &Path,
    progress: &dyn ProgressCallback,
) -> Result<CutReport> {
    if !folder.is_dir() {
        return Err(PipelineError::FolderNotFound(folder.to_path_buf()));
    }
    let config = session.config();
    let paths = book_paths(config, folder)?;
    let retry = config.retry_policy();

    retry.create_dir_all(&paths.temp_images)?;
    let removed = clear_stale_pages(&paths.temp_images)?;
    let scans = list_raw_scans(folder, &config.raw_extension)?;

    progress.on_step_start(&format!("Cutting {}", paths.barcode));
    progress.on_debug(&format!(
        "{} raw scans, {} stale pages removed",
        scans.len(),
        removed
    ));

    let normalizer = GeometryNormalizer::new(
        NormalizeOptions::builder()
            .square_size(config.temp_image_size)
            .build(),
    );
    let total = scans.len();
    let done = AtomicUsize::new(0);
    let pool = worker_pool(config)?;

    let results: Vec<Option<Vec<(String, FrameCoords)>>> = pool.install(|| {
        scans
            .par_iter()
            .map(|path| {
                let frames = cut_scan(session, &normalizer, &paths, path, &retry);
                progress.on_step_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
                frames
            })
            .collect()
    });

    let mut coords = CoordMap::new();
    let mut dropped = 0;
    for result in results {
        match result {
            Some(frames) => {
                for (basename, frame) in frames {
                    coords.insert(basename, frame);
                }
            }
            None => dropped += 1,
        }
    }

    let coord_map = paths.coord_map();
    coords.save(&coord_map, &retry)?;

    let report = CutReport {
        barcode: paths.barcode.clone(),
        scans: total,
        pages: coords.len(),
        dropped,
        coord_map,
    };
    progress.on_step_complete(
        "Cutting",
        &format!("{} pages from {} scans ({} dropped)", report.pages, total, dropped),
    );
    Ok(report)
}

// ============================================================
// Inspection
// ============================================================

/// Tile and classify one saved page
fn classify_page(
    classifier: &PatchClassifier,
    path: &Path,
    grid: u32,
    retry: &RetryPolicy,
) -> Result<Vec<DefectRecord>> {
    let image = GeometryNormalizer::load_scan(path, retry)?;
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let scan_id = ScanId::parse(&basename)?;
    let side = PageSide::from_basename(&basename).unwrap_or(PageSide::Left);

    let patches: Vec<Patch> = geometry::tile_image(&image, grid)?
        .into_iter()
        .map(|(pixels, position, cell)| Patch {
            pixels,
            grid: cell,
            position,
            scan_id: scan_id.clone(),
            side,
            page_basename: basename.clone(),
        })
        .collect();
    Ok(classifier.classify(patches)?)
}

/// Classify every normalized page of the book in `folder`, then confirm and
/// write collages and the defect map.
///
/// The preset and model are loaded first; failing to load either aborts
/// before any page is read.
pub fn inspect_folder(
    session: &PipelineSession,
    folder: &Path,
    progress: &dyn ProgressCallback,
) -> Result<InspectReport> {
    let _inspecting = session
        .begin_inspection()
        .ok_or(PipelineError::AlreadyInspecting)?;
    let config = session.config();
    let paths = book_paths(config, folder)?;
    let (classifier, confirmer) = session.load_artifacts()?;

    let pages = list_pages(&paths.temp_images)?;
    if pages.is_empty() {
        return Err(PipelineError::NoPages(paths.temp_images.clone()));
    }

    let barcode = paths.barcode.clone();
    let retry = config.retry_policy();
    let aggregator = ResultAggregator::new(
        paths,
        AggregatorOptions::from_config(config),
        Arc::clone(session.telemetry()),
    );

    progress.on_step_start(&format!("Classifying {}", barcode));
    let total = pages.len();
    let done = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let candidates = AtomicUsize::new(0);
    let pool = worker_pool(config)?;

    pool.install(|| {
        pages.par_iter().for_each(|page| {
            match classify_page(&classifier, page, config.grid_size, &retry) {
                Ok(records) => {
                    let buffered = aggregator.add_all(records);
                    candidates.fetch_add(buffered, Ordering::Relaxed);
                    debug!("{}: {} candidates", page.display(), buffered);
                }
                Err(e) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    session.record_failed_item(&format!("Classify {}", page.display()), &e);
                }
            }
            progress.on_step_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
        })
    });

    let candidates = candidates.into_inner();
    progress.on_step_complete(
        "Classifying",
        &format!("{} pages, {} candidates", total, candidates),
    );

    progress.on_step_start(&format!("Confirming {}", barcode));
    let finish = aggregator.finish(&confirmer)?;
    progress.on_step_complete(
        "Confirming",
        &format!("{} defects confirmed", finish.total_confirmed()),
    );

    Ok(InspectReport {
        barcode,
        pages: total,
        failed_pages: failed.into_inner(),
        candidates,
        finish,
    })
}
