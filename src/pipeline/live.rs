//! Live inspection pipeline
//!
//! Three worker threads connected by channels:
//!
//! ```text
//! scans → [normalize + tile] → pages → [classify] → defects → [confirm] → results
//! ```
//!
//! Every worker blocks on its input queue, handles one message at a time and
//! forwards [`StageMessage::Stop`] downstream when it sees it. A failing item
//! is logged and counted in the session; the worker keeps looping. Results are
//! drained without blocking by [`LivePipeline::poll`].

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::messages::{DefectBatch, HalfPage, PageBatch, ScanReport, StageMessage};
use super::session::{PipelineSession, SessionStats};
use super::types::{PipelineError, Result};
use super::watcher::{FolderWatcher, WatcherHandle};
use crate::classifier::{ClassifierError, PatchClassifier};
use crate::config::BookPaths;
use crate::confirm::BlurConfirmer;
use crate::geometry::{self, GeometryNormalizer, NormalizeOptions, Page, PageSide, Scan};

/// Receives one report per processed scan
pub trait ResultSink {
    fn on_result(&mut self, report: ScanReport);
}

impl<F> ResultSink for F
where
    F: FnMut(ScanReport),
{
    fn on_result(&mut self, report: ScanReport) {
        self(report)
    }
}

// ============================================================
// Stages
// ============================================================

/// Blocking receive loop shared by all stages.
///
/// Returns on `Stop`, a closed queue or an aborted session. A panic while
/// handling one item is counted as a failed item.
fn stage_loop<F>(name: &str, session: &PipelineSession, rx: &Receiver<StageMessage>, mut handle: F)
where
    F: FnMut(StageMessage),
{
    while let Ok(message) = rx.recv() {
        if session.is_aborted() {
            debug!("{} stage aborted", name);
            return;
        }
        if let StageMessage::Stop = message {
            debug!("{} stage stopping", name);
            return;
        }
        if panic::catch_unwind(AssertUnwindSafe(|| handle(message))).is_err() {
            session.record_failed_item(&format!("{} stage item", name), &"worker panicked");
        }
    }
}

/// Normalizes raw scans, writes the pages and tiles them
struct NormalizeStage {
    session: Arc<PipelineSession>,
    paths: BookPaths,
    normalizer: GeometryNormalizer,
}

impl NormalizeStage {
    fn run(self, rx: Receiver<StageMessage>, tx: Sender<StageMessage>) {
        stage_loop("normalize", &self.session, &rx, |message| match message {
            StageMessage::Scan(scan) => match self.process(&scan) {
                Ok(batch) => {
                    let _ = tx.send(StageMessage::PageBatch(batch));
                }
                Err(e) => self.session.record_dropped_scan(scan.id.as_str(), &e),
            },
            other => warn!("normalize stage ignored a {}", other.kind()),
        });
        let _ = tx.send(StageMessage::Stop);
    }

    fn process(&self, scan: &Scan) -> geometry::Result<PageBatch> {
        let retry = self.session.config().retry_policy();
        let (left, right) = self.normalizer.normalize_file(scan, &retry)?;
        Ok(PageBatch {
            scan_id: scan.id.clone(),
            halves: [self.half(left)?, self.half(right)?],
        })
    }

    fn half(&self, page: Page) -> geometry::Result<HalfPage> {
        let config = self.session.config();
        let path = self.paths.temp_images.join(&page.basename);
        if let Err(e) = config.retry_policy().save_image(&page.pixels, &path) {
            self.session
                .record_failed_item(&format!("Write {}", path.display()), &e);
        }
        let patches = geometry::tile(&page, config.grid_size)?;
        Ok(HalfPage {
            side: page.side,
            geometry: page.geometry,
            path,
            patches,
        })
    }
}

/// Classifies both halves and merges them into spread coordinates
struct ClassifyStage {
    session: Arc<PipelineSession>,
    classifier: Arc<PatchClassifier>,
}

impl ClassifyStage {
    fn run(self, rx: Receiver<StageMessage>, tx: Sender<StageMessage>) {
        stage_loop("classify", &self.session, &rx, |message| match message {
            StageMessage::PageBatch(batch) => {
                let scan = batch.scan_id.clone();
                match self.process(batch) {
                    Ok(defects) => {
                        let _ = tx.send(StageMessage::DefectBatch(defects));
                    }
                    Err(e) => self
                        .session
                        .record_failed_item(&format!("Classify scan {}", scan), &e),
                }
            }
            other => warn!("classify stage ignored a {}", other.kind()),
        });
        let _ = tx.send(StageMessage::Stop);
    }

    /// The right half moves by one page width and one grid width so both
    /// halves share a coordinate space.
    fn process(&self, batch: PageBatch) -> std::result::Result<DefectBatch, ClassifierError> {
        let config = self.session.config();
        let page_paths = batch.page_paths();
        let geometries = batch.geometries();

        let mut records = Vec::new();
        for half in batch.halves {
            let classified = self.classifier.classify(half.patches)?;
            match half.side {
                PageSide::Left => records.extend(classified),
                PageSide::Right => records.extend(
                    classified
                        .into_iter()
                        .map(|r| r.shifted_right(config.temp_image_size, config.grid_size)),
                ),
            }
        }

        Ok(DefectBatch {
            scan_id: batch.scan_id,
            records,
            page_paths,
            geometries,
        })
    }
}

/// Runs the confirmation model and publishes reports
struct ConfirmStage {
    session: Arc<PipelineSession>,
    confirmer: BlurConfirmer,
}

impl ConfirmStage {
    fn run(self, rx: Receiver<StageMessage>, results: Sender<ScanReport>) {
        let config = self.session.config();
        stage_loop("confirm", &self.session, &rx, |message| match message {
            StageMessage::DefectBatch(batch) => {
                let candidates = batch.records.len();
                match self.confirmer.confirm(batch.records) {
                    Ok(defects) => {
                        debug!(
                            "Scan {}: {} of {} records confirmed",
                            batch.scan_id,
                            defects.len(),
                            candidates
                        );
                        self.session.record_processed();
                        let _ = results.send(ScanReport {
                            scan_id: batch.scan_id,
                            defects,
                            page_paths: batch.page_paths,
                            geometries: batch.geometries,
                            page_size: config.temp_image_size,
                            grid_size: config.grid_size,
                        });
                    }
                    Err(e) => self
                        .session
                        .record_failed_item(&format!("Confirm scan {}", batch.scan_id), &e),
                }
            }
            other => warn!("confirm stage ignored a {}", other.kind()),
        });
    }
}

// ============================================================
// Pipeline
// ============================================================

struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
}

fn spawn_worker<F>(name: &'static str, body: F) -> Result<Worker>
where
    F: FnOnce() + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| PipelineError::Spawn {
            name: name.to_string(),
            source,
        })?;
    Ok(Worker { name, handle })
}

/// Wait until the thread finishes or the deadline passes
fn wait_for(handle: &JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    true
}

/// Streaming inspection of one book folder
pub struct LivePipeline {
    session: Arc<PipelineSession>,
    paths: BookPaths,
    scan_tx: Sender<StageMessage>,
    page_tx: Sender<StageMessage>,
    defect_tx: Sender<StageMessage>,
    results_rx: Receiver<ScanReport>,
    workers: Vec<Worker>,
    watcher: Option<WatcherHandle>,
    stopped: bool,
}

impl std::fmt::Debug for LivePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivePipeline")
            .field("barcode", &self.paths.barcode)
            .field("workers", &self.workers.iter().map(|w| w.name).collect::<Vec<_>>())
            .field("watching", &self.watcher.is_some())
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl LivePipeline {
    /// Load the preset and confirmation model, then start the workers.
    ///
    /// Artifact load failures are returned before any worker starts.
    pub fn start(session: Arc<PipelineSession>, barcode: &str) -> Result<Self> {
        let (classifier, confirmer) = session.load_artifacts()?;
        Self::with_components(session, barcode, classifier, confirmer)
    }

    /// Start the workers with already loaded artifacts
    pub fn with_components(
        session: Arc<PipelineSession>,
        barcode: &str,
        classifier: PatchClassifier,
        confirmer: BlurConfirmer,
    ) -> Result<Self> {
        let config = session.config();
        let paths = config.book_paths(barcode);
        config.retry_policy().create_dir_all(&paths.temp_images)?;

        let (scan_tx, scan_rx) = mpsc::channel();
        let (page_tx, page_rx) = mpsc::channel();
        let (defect_tx, defect_rx) = mpsc::channel();
        let (results_tx, results_rx) = mpsc::channel();

        let normalize = NormalizeStage {
            session: Arc::clone(&session),
            paths: paths.clone(),
            normalizer: GeometryNormalizer::new(
                NormalizeOptions::builder()
                    .square_size(config.temp_image_size)
                    .build(),
            ),
        };
        let classify = ClassifyStage {
            session: Arc::clone(&session),
            classifier: Arc::new(classifier),
        };
        let confirm = ConfirmStage {
            session: Arc::clone(&session),
            confirmer,
        };

        let mut workers = Vec::with_capacity(3);
        let tx = page_tx.clone();
        workers.push(spawn_worker("normalize", move || normalize.run(scan_rx, tx))?);
        let tx = defect_tx.clone();
        workers.push(spawn_worker("classify", move || classify.run(page_rx, tx))?);
        workers.push(spawn_worker("confirm", move || confirm.run(defect_rx, results_tx))?);

        session
            .telemetry()
            .info(&format!("Live pipeline started for {}", paths.barcode));

        Ok(Self {
            session,
            paths,
            scan_tx,
            page_tx,
            defect_tx,
            results_rx,
            workers,
            watcher: None,
            stopped: false,
        })
    }

    pub fn session(&self) -> &Arc<PipelineSession> {
        &self.session
    }

    pub fn paths(&self) -> &BookPaths {
        &self.paths
    }

    /// Queue one raw scan
    pub fn add_scan(&self, path: &Path) -> Result<()> {
        let scan = Scan::from_path(path)?;
        self.scan_tx
            .send(StageMessage::Scan(scan))
            .map_err(|_| PipelineError::Stopped)
    }

    /// Feed new scans that appear in `folder` into the pipeline.
    ///
    /// Scans already in the folder are skipped.
    pub fn watch(&mut self, folder: &Path) -> Result<()> {
        if !folder.is_dir() {
            return Err(PipelineError::FolderNotFound(folder.to_path_buf()));
        }
        let config = self.session.config();
        let watcher = FolderWatcher::new(
            folder,
            &config.raw_extension,
            Duration::from_millis(config.settle_delay_ms),
        );
        let tx = self.scan_tx.clone();
        let session = Arc::clone(&self.session);
        let handle = watcher.spawn(Duration::from_millis(config.watch_poll_ms), move |path| {
            match Scan::from_path(&path) {
                Ok(scan) => {
                    debug!("New scan {}", path.display());
                    let _ = tx.send(StageMessage::Scan(scan));
                }
                Err(e) => session.record_dropped_scan(&path.display().to_string(), &e),
            }
        })?;
        self.watcher = Some(handle);
        Ok(())
    }

    /// Hand every finished report to `sink` without blocking
    pub fn poll<S: ResultSink + ?Sized>(&self, sink: &mut S) -> usize {
        let mut delivered = 0;
        while let Ok(report) = self.results_rx.try_recv() {
            sink.on_result(report);
            delivered += 1;
        }
        delivered
    }

    /// Poll on the configured interval while `keep_running` holds
    pub fn supervise<S, F>(&self, sink: &mut S, keep_running: F) -> usize
    where
        S: ResultSink + ?Sized,
        F: Fn() -> bool,
    {
        let interval = Duration::from_millis(self.session.config().results_poll_ms);
        let mut delivered = 0;
        while keep_running() {
            delivered += self.poll(sink);
            thread::sleep(interval);
        }
        delivered + self.poll(sink)
    }

    /// Stop the watcher and all workers.
    ///
    /// Sends `Stop` down the chain and waits up to `stop_timeout_ms` per
    /// worker. A worker that misses its deadline is detached: the session is
    /// aborted so it drops its in-flight work, and `Stop` is sent straight to
    /// the next queue.
    pub fn stop(&mut self) -> SessionStats {
        if self.stopped {
            return self.session.stats();
        }
        self.stopped = true;

        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }

        let _ = self.scan_tx.send(StageMessage::Stop);
        let timeout = Duration::from_millis(self.session.config().stop_timeout_ms);
        let downstream = [Some(&self.page_tx), Some(&self.defect_tx), None];
        let workers = std::mem::take(&mut self.workers);

        for (worker, next) in workers.into_iter().zip(downstream) {
            if !wait_for(&worker.handle, timeout) {
                self.session.abort();
                self.session.telemetry().warn(&format!(
                    "Worker '{}' missed the {:?} stop deadline, detaching it",
                    worker.name, timeout
                ));
                if let Some(next) = next {
                    let _ = next.send(StageMessage::Stop);
                }
                continue;
            }
            if worker.handle.join().is_err() {
                self.session
                    .telemetry()
                    .error(&format!("Worker '{}' panicked", worker.name));
            }
        }

        let stats = self.session.stats();
        self.session.telemetry().info(&format!(
            "Live pipeline stopped for {}: {} processed, {} dropped, {} failed",
            self.paths.barcode, stats.processed_scans, stats.dropped_scans, stats.failed_items
        ));
        stats
    }
}

impl Drop for LivePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::PatchClassifier;
    use crate::config::Config;
    use crate::geometry::{GridCell, PageGeometry, Patch, PixelPoint, ScanId};
    use crate::logging::MemoryTelemetry;
    use crate::test_support::{patch_with, sample_bundle, MeanThresholdModel};
    use image::{GrayImage, Luma};
    use std::path::PathBuf;

    fn session(root: &Path) -> Arc<PipelineSession> {
        let config = Config {
            root_dir: root.to_path_buf(),
            temp_image_size: 100,
            grid_size: 4,
            retry_attempts: 1,
            retry_delay_ms: 0,
            stop_timeout_ms: 2000,
            results_poll_ms: 10,
            ..Config::default()
        };
        PipelineSession::shared(config, Arc::new(MemoryTelemetry::new()))
    }

    fn pipeline(root: &Path) -> LivePipeline {
        LivePipeline::with_components(
            session(root),
            "B1",
            PatchClassifier::from_bundle(sample_bundle()).unwrap(),
            BlurConfirmer::new(Arc::new(MeanThresholdModel::new(8))),
        )
        .unwrap()
    }

    fn ramp_patch(side: PageSide, x: u32) -> Patch {
        let mut patch = patch_with(GrayImage::from_fn(32, 32, |px, _| Luma([(px * 2) as u8])));
        patch.side = side;
        patch.position = PixelPoint::new(x, 0);
        patch.grid = GridCell::new(x / 25, 0);
        patch
    }

    fn half(side: PageSide, patches: Vec<Patch>) -> HalfPage {
        HalfPage {
            side,
            geometry: PageGeometry::from_corners(PixelPoint::new(0, 0), PixelPoint::new(100, 100), 100),
            path: PathBuf::from(format!("0001_{}.png", side.suffix())),
            patches,
        }
    }

    fn write_spread(path: &Path) {
        let spread = GrayImage::from_fn(200, 100, |x, y| {
            let inside = (10..90).contains(&y) && ((10..90).contains(&x) || (110..190).contains(&x));
            Luma([if inside { 230 } else { 10 }])
        });
        spread.save(path).unwrap();
    }

    fn wait_for_report(pipeline: &LivePipeline) -> Option<ScanReport> {
        let deadline = Instant::now() + Duration::from_secs(20);
        let mut received = None;
        while received.is_none() && Instant::now() < deadline {
            pipeline.poll(&mut |report: ScanReport| received = Some(report));
            thread::sleep(Duration::from_millis(10));
        }
        received
    }

    #[test]
    fn test_right_half_is_shifted_before_merge() {
        let dir = tempfile::tempdir().unwrap();
        let stage = ClassifyStage {
            session: session(dir.path()),
            classifier: Arc::new(PatchClassifier::from_bundle(sample_bundle()).unwrap()),
        };
        let batch = PageBatch {
            scan_id: ScanId::parse("0001").unwrap(),
            halves: [
                half(PageSide::Left, vec![ramp_patch(PageSide::Left, 50)]),
                half(PageSide::Right, vec![ramp_patch(PageSide::Right, 50)]),
            ],
        };

        let merged = stage.process(batch).unwrap();
        assert_eq!(merged.records.len(), 2);
        assert_eq!(merged.records[0].position.x, 50);
        // temp_image_size is 100
        assert_eq!(merged.records[1].position.x, 50 + 100);
        assert_eq!(merged.records[1].grid.col, 2 + 4);
        assert_eq!(merged.page_paths[1], PathBuf::from("0001_right.png"));
    }

    #[test]
    fn test_scan_flows_through_all_stages() {
        let dir = tempfile::tempdir().unwrap();
        let scan = dir.path().join("0001.png");
        write_spread(&scan);

        let mut pipeline = pipeline(dir.path());
        pipeline.add_scan(&scan).unwrap();
        let report = wait_for_report(&pipeline).expect("no report");

        assert_eq!(report.scan_id.as_str(), "0001");
        assert!(report.page_paths.iter().all(|p| p.exists()));
        assert!(report.defects.iter().all(|d| d.label.needs_confirmation()));
        let _ = report.severity();

        let stats = pipeline.stop();
        assert_eq!(stats.processed_scans, 1);
        assert_eq!(stats.dropped_scans, 0);
    }

    #[test]
    fn test_corrupt_scan_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("0002.png");
        std::fs::write(&bad, b"not an image").unwrap();
        let good = dir.path().join("0003.png");
        write_spread(&good);

        let mut pipeline = pipeline(dir.path());
        pipeline.add_scan(&bad).unwrap();
        pipeline.add_scan(&good).unwrap();
        let report = wait_for_report(&pipeline).expect("no report");
        assert_eq!(report.scan_id.as_str(), "0003");

        let stats = pipeline.stop();
        assert_eq!(stats.dropped_scans, 1);
        assert_eq!(stats.processed_scans, 1);
    }

    #[test]
    fn test_invalid_scan_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        assert!(matches!(
            pipeline.add_scan(Path::new("scan.tif")),
            Err(PipelineError::Geometry(_))
        ));
    }

    #[test]
    fn test_stop_is_prompt_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path());
        let started = Instant::now();
        pipeline.stop();
        assert!(started.elapsed() < Duration::from_secs(6));
        assert!(pipeline.workers.is_empty());
        pipeline.stop();
        assert!(matches!(
            pipeline.add_scan(Path::new("0001.tif")),
            Err(PipelineError::Stopped)
        ));
    }

    #[test]
    fn test_start_without_preset_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = LivePipeline::start(session(dir.path()), "B1").unwrap_err();
        assert!(matches!(err, PipelineError::NoPreset));
    }

    #[test]
    fn test_watch_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path());
        assert!(matches!(
            pipeline.watch(&dir.path().join("missing")),
            Err(PipelineError::FolderNotFound(_))
        ));
    }
}
