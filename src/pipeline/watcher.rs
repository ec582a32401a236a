//! Folder polling for new raw scans

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use crate::geometry::SCAN_ID_DIGITS;

/// Raw scans have the configured extension, no `thumb` in the name and a
/// four-digit sequence number prefix
pub fn is_raw_scan(path: &Path, extension: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let matches_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension));
    let numbered = name.len() >= SCAN_ID_DIGITS
        && name.as_bytes()[..SCAN_ID_DIGITS].iter().all(u8::is_ascii_digit);
    matches_ext && numbered && !name.contains("thumb")
}

/// Raw scans directly inside `folder`, sorted by name
pub fn list_raw_scans(folder: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut scans: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_raw_scan(path, extension))
        .collect();
    scans.sort();
    Ok(scans)
}

/// Polls a folder and reports raw scans it has not seen before
#[derive(Debug)]
pub struct FolderWatcher {
    folder: PathBuf,
    extension: String,
    settle_delay: Duration,
    processed: HashSet<PathBuf>,
}

impl FolderWatcher {
    /// Watch `folder`. Scans already present are treated as processed.
    pub fn new(folder: &Path, extension: &str, settle_delay: Duration) -> Self {
        let mut watcher = Self {
            folder: folder.to_path_buf(),
            extension: extension.to_string(),
            settle_delay,
            processed: HashSet::new(),
        };
        for path in watcher.scan_folder() {
            watcher.processed.insert(path);
        }
        debug!(
            "Watching {} ({} existing scans ignored)",
            watcher.folder.display(),
            watcher.processed.len()
        );
        watcher
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    fn scan_folder(&self) -> Vec<PathBuf> {
        match list_raw_scans(&self.folder, &self.extension) {
            Ok(paths) => paths
                .into_iter()
                .map(|p| std::fs::canonicalize(&p).unwrap_or(p))
                .collect(),
            Err(e) => {
                warn!("Cannot list {}: {}", self.folder.display(), e);
                Vec::new()
            }
        }
    }

    /// New scans since the last poll, in name order.
    ///
    /// When something new shows up, waits the settle delay first so the
    /// scanner can finish writing.
    pub fn poll(&mut self) -> Vec<PathBuf> {
        let fresh: Vec<PathBuf> = self
            .scan_folder()
            .into_iter()
            .filter(|p| !self.processed.contains(p))
            .collect();
        if fresh.is_empty() {
            return fresh;
        }
        if !self.settle_delay.is_zero() {
            thread::sleep(self.settle_delay);
        }
        for path in &fresh {
            self.processed.insert(path.clone());
        }
        fresh
    }

    /// Poll on a background thread, calling `on_scan` for every new scan
    pub fn spawn<F>(mut self, interval: Duration, mut on_scan: F) -> std::io::Result<WatcherHandle>
    where
        F: FnMut(PathBuf) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("folder-watcher".to_string())
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    for path in self.poll() {
                        on_scan(path);
                    }
                    thread::sleep(interval);
                }
            })?;
        Ok(WatcherHandle {
            running,
            handle: Some(handle),
        })
    }
}

/// Running watcher thread
#[derive(Debug)]
pub struct WatcherHandle {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Folder watcher thread panicked");
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_is_raw_scan() {
        assert!(is_raw_scan(Path::new("/scans/0001.tif"), "tif"));
        assert!(is_raw_scan(Path::new("0012_a.TIF"), "tif"));
        assert!(!is_raw_scan(Path::new("0001_thumb.tif"), "tif"));
        assert!(!is_raw_scan(Path::new("0001.png"), "tif"));
        assert!(!is_raw_scan(Path::new("scan1.tif"), "tif"));
        assert!(!is_raw_scan(Path::new("12.tif"), "tif"));
    }

    #[test]
    fn test_existing_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "0001.tif");
        let mut watcher = FolderWatcher::new(dir.path(), "tif", Duration::ZERO);
        assert_eq!(watcher.processed_count(), 1);
        assert!(watcher.poll().is_empty());
    }

    #[test]
    fn test_new_files_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = FolderWatcher::new(dir.path(), "tif", Duration::ZERO);
        touch(dir.path(), "0003.tif");
        touch(dir.path(), "0002.tif");
        touch(dir.path(), "0002_thumb.tif");
        touch(dir.path(), "notes.txt");

        let fresh = watcher.poll();
        let names: Vec<_> = fresh
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["0002.tif", "0003.tif"]);
        assert!(watcher.poll().is_empty());
    }

    #[test]
    fn test_spawned_watcher_reports_new_scan() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = FolderWatcher::new(dir.path(), "tif", Duration::ZERO);
        let (tx, rx) = std::sync::mpsc::channel();
        let mut handle = watcher
            .spawn(Duration::from_millis(10), move |path| {
                let _ = tx.send(path);
            })
            .unwrap();

        touch(dir.path(), "0007.tif");
        let path = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(path.ends_with("0007.tif"));
        handle.stop();
    }
}
