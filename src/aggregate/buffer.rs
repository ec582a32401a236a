//! Bounded per-class buffers with disk spillover

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::types::{AggregateError, DefectClass, Result};
use crate::classifier::DefectRecord;
use crate::retry::{Attempt, RetryPolicy};

/// A batch of records written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpillHandle {
    pub path: PathBuf,
    pub len: usize,
}

/// Writes and reads spill files under one book's temp folder
#[derive(Debug, Clone)]
pub struct SpillStore {
    dir: PathBuf,
    retry: RetryPolicy,
}

impl SpillStore {
    pub fn new(dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            dir: dir.into(),
            retry,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for the `sequence`-th spill of `class`
    pub fn path_for(&self, class: DefectClass, sequence: usize) -> PathBuf {
        self.dir.join(format!("{}_{}.json", class.name(), sequence))
    }

    /// Serialize `records` to disk
    pub fn write(
        &self,
        class: DefectClass,
        sequence: usize,
        records: &[DefectRecord],
    ) -> Result<SpillHandle> {
        self.retry.create_dir_all(&self.dir)?;
        let path = self.path_for(class, sequence);
        let json = serde_json::to_vec(records).map_err(|e| AggregateError::Spill {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        self.retry.run(&format!("write {}", path.display()), || {
            std::fs::write(&path, &json).map_err(|e| Attempt::Transient(AggregateError::IoError(e)))
        })?;
        debug!("Spilled {} {} records to {}", records.len(), class, path.display());
        Ok(SpillHandle {
            path,
            len: records.len(),
        })
    }

    /// Reload a spilled batch, retrying transient read failures
    pub fn load(&self, handle: &SpillHandle) -> Result<Vec<DefectRecord>> {
        let path = &handle.path;
        let bytes = self.retry.run(&format!("read {}", path.display()), || {
            std::fs::read(path).map_err(|e| Attempt::Transient(AggregateError::IoError(e)))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| AggregateError::Spill {
            path: path.clone(),
            reason: e.to_string(),
        })
    }

    /// Delete a consumed spill file
    pub fn remove(&self, handle: &SpillHandle) {
        if let Err(e) = std::fs::remove_file(&handle.path) {
            warn!("Failed to remove spill file {}: {}", handle.path.display(), e);
        }
    }
}

/// Append-only records of one class, partly in memory and partly spilled.
///
/// `len()` always equals the in-memory count plus every spilled batch in the
/// manifest.
#[derive(Debug)]
pub struct ClassBuffer {
    class: DefectClass,
    threshold: usize,
    records: Vec<DefectRecord>,
    manifest: Vec<SpillHandle>,
    spilled: usize,
    spill_sequence: usize,
}

impl ClassBuffer {
    pub fn new(class: DefectClass, threshold: usize) -> Self {
        Self {
            class,
            threshold: threshold.max(1),
            records: Vec::new(),
            manifest: Vec::new(),
            spilled: 0,
            spill_sequence: 0,
        }
    }

    pub fn class(&self) -> DefectClass {
        self.class
    }

    /// Total logical entries
    pub fn len(&self) -> usize {
        self.records.len() + self.spilled
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_memory(&self) -> usize {
        self.records.len()
    }

    pub fn manifest(&self) -> &[SpillHandle] {
        &self.manifest
    }

    /// Append a record, spilling the whole buffer once it reaches the threshold.
    ///
    /// If the spill fails the records stay in memory and the error is returned;
    /// nothing is lost.
    pub fn push(&mut self, record: DefectRecord, store: &SpillStore) -> Result<()> {
        self.records.push(record);
        if self.records.len() >= self.threshold {
            self.spill(store)?;
        }
        Ok(())
    }

    fn spill(&mut self, store: &SpillStore) -> Result<()> {
        let handle = store.write(self.class, self.spill_sequence, &self.records)?;
        self.spill_sequence += 1;
        self.spilled += handle.len;
        self.manifest.push(handle);
        self.records.clear();
        Ok(())
    }

    /// Take the in-memory records
    pub fn drain_memory(&mut self) -> Vec<DefectRecord> {
        std::mem::take(&mut self.records)
    }

    /// Most recent spill, still counted in `len()`
    pub fn last_spill(&self) -> Option<&SpillHandle> {
        self.manifest.last()
    }

    /// Remove the most recent spill handle from the manifest
    pub fn pop_spill(&mut self) -> Option<SpillHandle> {
        let handle = self.manifest.pop()?;
        self.spilled -= handle.len;
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Label;
    use crate::test_support::record_with;

    fn store(dir: &Path) -> SpillStore {
        SpillStore::new(dir.join("temp_files").join("B1"), RetryPolicy::no_retry())
    }

    #[test]
    fn test_spill_at_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut buffer = ClassBuffer::new(DefectClass::Blurry, 3);

        for i in 0..7 {
            buffer
                .push(record_with(Label::Blurry, i as f32, 0), &store)
                .unwrap();
            assert_eq!(buffer.len(), i + 1);
        }
        assert_eq!(buffer.manifest().len(), 2);
        assert_eq!(buffer.in_memory(), 1);
        assert_eq!(buffer.manifest()[0].path, store.path_for(DefectClass::Blurry, 0));
        assert!(buffer.manifest()[1].path.ends_with("blurry_1.json"));
    }

    #[test]
    fn test_pop_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut buffer = ClassBuffer::new(DefectClass::Indeterminate, 2);
        for i in 0..5 {
            buffer
                .push(record_with(Label::Indeterminate, i as f32, 7), &store)
                .unwrap();
        }

        let memory = buffer.drain_memory();
        assert_eq!(memory.len(), 1);
        assert_eq!(buffer.len(), 4);

        let latest = buffer.pop_spill().unwrap();
        let reloaded = store.load(&latest).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[0].confidence, 2.0);
        assert_eq!(buffer.len(), 2);

        store.remove(&latest);
        assert!(!latest.path.exists());
    }

    #[test]
    fn test_failed_spill_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        // a file where the spill directory should be
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();
        let store = SpillStore::new(blocker.join("B1"), RetryPolicy::no_retry());

        let mut buffer = ClassBuffer::new(DefectClass::Blurry, 1);
        assert!(buffer.push(record_with(Label::Blurry, 1.0, 0), &store).is_err());
        assert_eq!(buffer.in_memory(), 1);
        assert_eq!(buffer.len(), 1);
        assert!(buffer.manifest().is_empty());
    }

    #[test]
    fn test_corrupt_spill_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blurry_0.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = SpillStore::new(dir.path(), RetryPolicy::no_retry());
        assert!(matches!(
            store.load(&SpillHandle { path, len: 1 }),
            Err(AggregateError::Spill { .. })
        ));
    }
}
