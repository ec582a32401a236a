//! Result aggregation for one book

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::buffer::{ClassBuffer, SpillStore};
use super::collage::Collage;
use super::defect_map::{DefectMap, DefectRect};
use super::types::{AddOutcome, AggregatorOptions, DefectClass, FinishReport, Result};
use crate::classifier::{DefectRecord, Label};
use crate::config::BookPaths;
use crate::confirm::BlurConfirmer;
use crate::geometry::CoordMap;
use crate::logging::Telemetry;

/// Per-class result of draining memory and spills through confirmation
#[derive(Debug, Default)]
struct ClassOutcome {
    candidates: usize,
    confirmed: Vec<DefectRecord>,
    lost: usize,
}

/// Collects classified records for one book and turns them into collages and
/// a defect map.
///
/// `add` may be called from many threads. Each defect class has its own lock,
/// held across append and spill, so a spill and its clear are atomic with
/// respect to other `add` calls.
pub struct ResultAggregator {
    paths: BookPaths,
    options: AggregatorOptions,
    store: SpillStore,
    buffers: BTreeMap<DefectClass, Mutex<ClassBuffer>>,
    empty: AtomicUsize,
    telemetry: Arc<dyn Telemetry>,
}

impl ResultAggregator {
    pub fn new(paths: BookPaths, options: AggregatorOptions, telemetry: Arc<dyn Telemetry>) -> Self {
        let store = SpillStore::new(paths.temp_files.clone(), options.retry);
        let buffers = DefectClass::ALL
            .iter()
            .map(|&class| (class, Mutex::new(ClassBuffer::new(class, options.spill_threshold))))
            .collect();
        Self {
            paths,
            options,
            store,
            buffers,
            empty: AtomicUsize::new(0),
            telemetry,
        }
    }

    pub fn paths(&self) -> &BookPaths {
        &self.paths
    }

    fn buffer(&self, class: DefectClass) -> MutexGuard<'_, ClassBuffer> {
        // buffers are created for every class in `new`
        let mutex = &self.buffers[&class];
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Route one record by label
    pub fn add(&self, record: DefectRecord) -> Result<AddOutcome> {
        let class = match record.label {
            Label::Sharp => return Ok(AddOutcome::Ignored),
            Label::Empty => {
                self.empty.fetch_add(1, Ordering::Relaxed);
                return Ok(AddOutcome::CountedEmpty);
            }
            label => match DefectClass::for_label(label) {
                Some(class) => class,
                None => return Ok(AddOutcome::Ignored),
            },
        };

        self.buffer(class).push(record, &self.store)?;
        Ok(AddOutcome::Buffered)
    }

    /// Add a batch, logging failures and continuing
    pub fn add_all(&self, records: Vec<DefectRecord>) -> usize {
        let mut buffered = 0;
        for record in records {
            match self.add(record) {
                Ok(AddOutcome::Buffered) => buffered += 1,
                Ok(_) => {}
                Err(e) => self
                    .telemetry
                    .error(&format!("Failed to buffer record for {}: {}", self.paths.barcode, e)),
            }
        }
        buffered
    }

    /// Logical entry count of a class, spilled entries included
    pub fn len(&self, class: DefectClass) -> usize {
        self.buffer(class).len()
    }

    pub fn is_empty(&self) -> bool {
        DefectClass::ALL.iter().all(|&c| self.len(c) == 0)
    }

    pub fn empty_count(&self) -> usize {
        self.empty.load(Ordering::Relaxed)
    }

    /// Confirm every buffered and spilled record of `class`.
    ///
    /// A spill file is only dropped from the manifest after it has been read.
    /// One that cannot be read is logged, left on disk and skipped, so the
    /// remaining batches still reach the collage and defect map.
    fn confirm_class(&self, class: DefectClass, confirmer: &BlurConfirmer) -> Result<ClassOutcome> {
        let mut buffer = self.buffer(class);
        let mut outcome = ClassOutcome::default();

        let mut batch = buffer.drain_memory();
        loop {
            outcome.candidates += batch.len();
            outcome.confirmed.extend(confirmer.confirm(batch)?);

            let Some(handle) = buffer.last_spill().cloned() else {
                break;
            };
            let loaded = self.store.load(&handle);
            buffer.pop_spill();
            batch = match loaded {
                Ok(records) => {
                    self.store.remove(&handle);
                    records
                }
                Err(e) => {
                    self.telemetry.error(&format!(
                        "Skipping unreadable {} spill of {} ({} records): {}",
                        class, self.paths.barcode, handle.len, e
                    ));
                    outcome.lost += handle.len;
                    Vec::new()
                }
            };
        }
        Ok(outcome)
    }

    /// Place each record's patch in original-scan coordinates
    fn remap(&self, records: &[DefectRecord], coords: &CoordMap, map: &mut DefectMap) -> usize {
        let mut unmapped = 0;
        for record in records {
            match coords.geometry(&record.source_page, self.options.temp_image_size) {
                Some(geometry) => {
                    let origin = geometry.to_scan(record.position);
                    let (width, height) =
                        geometry.scale_extent(record.patch.width(), record.patch.height());
                    map.insert(
                        record.scan_id.clone(),
                        DefectRect::new(origin.x, origin.y, width, height),
                    );
                }
                None => {
                    unmapped += 1;
                    debug!("No coordinates for page {}", record.source_page);
                }
            }
        }
        unmapped
    }

    /// Confirm, lay out and write everything collected so far.
    ///
    /// Per class: drain memory, then reload spills newest first until the
    /// manifest is empty, confirming each batch. Confirmed records are sorted
    /// by descending confidence, written as a collage and remapped into the
    /// book's defect map.
    pub fn finish(&self, confirmer: &BlurConfirmer) -> Result<FinishReport> {
        let coords = match CoordMap::load(&self.paths.coord_map(), &self.options.retry) {
            Ok(coords) => coords,
            Err(e) => {
                self.telemetry.warn(&format!(
                    "No coordinate map for {} ({}), defects cannot be remapped",
                    self.paths.barcode, e
                ));
                CoordMap::new()
            }
        };

        let mut report = FinishReport {
            empty_count: self.empty_count(),
            ..FinishReport::default()
        };
        let mut defect_map = DefectMap::new(self.paths.barcode.clone());

        for class in DefectClass::ALL {
            let ClassOutcome {
                candidates,
                mut confirmed,
                lost,
            } = self.confirm_class(class, confirmer)?;
            confirmed.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

            let collage = Collage::build(&confirmed, self.options.grid_size, self.options.patch_size);
            match collage.save(&self.paths.collages, class, &self.options.retry) {
                Ok(path) => report.collages.push(path),
                Err(e) => self
                    .telemetry
                    .error(&format!("Failed to save {} collage for {}: {}", class, self.paths.barcode, e)),
            }

            report.unmapped += self.remap(&confirmed, &coords, &mut defect_map);
            report.candidates.insert(class, candidates);
            report.lost.insert(class, lost);
            report.confirmed.insert(class, confirmed.len());
            info!(
                "{}: {} of {} {} patches confirmed",
                self.paths.barcode,
                confirmed.len(),
                candidates,
                class
            );
        }

        if report.unmapped > 0 {
            warn!(
                "{}: {} confirmed patches had no coordinate map entry",
                self.paths.barcode, report.unmapped
            );
        }

        defect_map.save(&self.paths.defect_map, &self.options.retry)?;
        report.defect_map = Some(self.paths.defect_map.clone());
        Ok(report)
    }
}
