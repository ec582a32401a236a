//! Explicit session context shared by every pipeline stage

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::types::{PipelineError, Result};
use crate::classifier::PatchClassifier;
use crate::config::Config;
use crate::confirm::{self, BlurConfirmer, BlurModel};
use crate::logging::Telemetry;

/// Counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Scans that produced a result
    pub processed_scans: usize,
    /// Scans dropped for corrupt or unreadable input
    pub dropped_scans: usize,
    /// Per-item failures logged and skipped inside a stage
    pub failed_items: usize,
}

impl SessionStats {
    /// True when anything was dropped or failed
    pub fn has_failures(&self) -> bool {
        self.dropped_scans > 0 || self.failed_items > 0
    }
}

/// State owned by one inspection session.
///
/// Each stage gets an `Arc` of the session instead of reading module-level
/// flags: configuration snapshot, telemetry sink, failure counters, the
/// "currently inspecting" flag and the abort flag used by forced shutdown.
pub struct PipelineSession {
    config: Config,
    telemetry: Arc<dyn Telemetry>,
    /// Already-loaded confirmation model, used instead of the configured file
    model: Option<Arc<dyn BlurModel>>,
    processed_scans: AtomicUsize,
    dropped_scans: AtomicUsize,
    failed_items: AtomicUsize,
    inspecting: AtomicBool,
    abort: AtomicBool,
}

impl std::fmt::Debug for PipelineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSession")
            .field("root_dir", &self.config.root_dir)
            .field("stats", &self.stats())
            .field("inspecting", &self.is_inspecting())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

impl PipelineSession {
    pub fn new(config: Config, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            config,
            telemetry,
            model: None,
            processed_scans: AtomicUsize::new(0),
            dropped_scans: AtomicUsize::new(0),
            failed_items: AtomicUsize::new(0),
            inspecting: AtomicBool::new(false),
            abort: AtomicBool::new(false),
        }
    }

    /// Shared handle
    pub fn shared(config: Config, telemetry: Arc<dyn Telemetry>) -> Arc<Self> {
        Arc::new(Self::new(config, telemetry))
    }

    /// Confirm with `model` instead of loading `confirm_model` from disk
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn BlurModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn telemetry(&self) -> &Arc<dyn Telemetry> {
        &self.telemetry
    }

    /// Load the configured preset and confirmation model.
    ///
    /// Either failing is fatal to the session and is not retried.
    pub fn load_artifacts(&self) -> Result<(PatchClassifier, BlurConfirmer)> {
        let preset = self.config.preset_path(None).ok_or(PipelineError::NoPreset)?;
        let classifier = PatchClassifier::load(&preset)?;
        let model = match &self.model {
            Some(model) => Arc::clone(model),
            None => {
                let model_path = self.config.confirm_model_path();
                let model = confirm::load_model(&model_path)?;
                self.telemetry
                    .info(&format!("Loaded model {}", model_path.display()));
                model
            }
        };
        self.telemetry
            .info(&format!("Loaded preset {}", preset.display()));
        let confirmer = BlurConfirmer::new(model).with_batch_size(self.config.confirm_batch_size);
        Ok((classifier, confirmer))
    }

    pub fn record_processed(&self) {
        self.processed_scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Count and log a scan that will not appear downstream
    pub fn record_dropped_scan(&self, scan: &str, reason: &dyn std::fmt::Display) {
        self.dropped_scans.fetch_add(1, Ordering::Relaxed);
        self.telemetry
            .error(&format!("Dropped scan {}: {}", scan, reason));
    }

    /// Count and log a failed item; the stage keeps going
    pub fn record_failed_item(&self, what: &str, reason: &dyn std::fmt::Display) {
        self.failed_items.fetch_add(1, Ordering::Relaxed);
        self.telemetry.error(&format!("{} failed: {}", what, reason));
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            processed_scans: self.processed_scans.load(Ordering::Relaxed),
            dropped_scans: self.dropped_scans.load(Ordering::Relaxed),
            failed_items: self.failed_items.load(Ordering::Relaxed),
        }
    }

    pub fn is_inspecting(&self) -> bool {
        self.inspecting.load(Ordering::Acquire)
    }

    /// Claim the inspecting flag. Returns `None` if an inspection already runs.
    pub fn begin_inspection(&self) -> Option<InspectionGuard<'_>> {
        self.inspecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InspectionGuard { session: self })
    }

    /// Ask every stage to drop in-flight work and exit
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }
}

/// Clears the inspecting flag when dropped
#[derive(Debug)]
pub struct InspectionGuard<'a> {
    session: &'a PipelineSession,
}

impl Drop for InspectionGuard<'_> {
    fn drop(&mut self) {
        self.session.inspecting.store(false, Ordering::Release);
    }
}
