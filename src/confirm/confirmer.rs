//! Neural confirmation of blur candidates

use image::imageops::{self, FilterType};
use image::GrayImage;
use std::sync::Arc;
use tracing::debug;

use super::types::{BlurModel, Result, DEFAULT_BATCH_SIZE};
use crate::classifier::DefectRecord;

/// Re-checks blurry and indeterminate records with a convolutional model
#[derive(Clone)]
pub struct BlurConfirmer {
    model: Arc<dyn BlurModel>,
    batch_size: usize,
}

impl std::fmt::Debug for BlurConfirmer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlurConfirmer")
            .field("input_size", &self.model.input_size())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl BlurConfirmer {
    pub fn new(model: Arc<dyn BlurModel>) -> Self {
        Self {
            model,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Patches per inference call
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Resize to the model input and scale to `[0, 1]`
    pub fn preprocess(&self, patch: &GrayImage) -> Vec<f32> {
        let size = self.model.input_size();
        let resized;
        let pixels = if patch.dimensions() == (size, size) {
            patch
        } else {
            resized = imageops::resize(patch, size, size, FilterType::Triangle);
            &resized
        };
        pixels.as_raw().iter().map(|&v| v as f32 / 255.0).collect()
    }

    /// Keep only the records the model also judges blurry.
    ///
    /// Records with labels outside {blurry, indeterminate} are dropped without
    /// inference. The output is always a subset of the input, in input order.
    pub fn confirm(&self, records: Vec<DefectRecord>) -> Result<Vec<DefectRecord>> {
        let candidates: Vec<DefectRecord> = records
            .into_iter()
            .filter(|r| r.label.needs_confirmation())
            .collect();
        let total = candidates.len();

        let mut confirmed = Vec::new();
        let mut pending = candidates.into_iter().peekable();
        while pending.peek().is_some() {
            let chunk: Vec<DefectRecord> = pending.by_ref().take(self.batch_size).collect();
            let inputs: Vec<Vec<f32>> = chunk.iter().map(|r| self.preprocess(&r.patch)).collect();
            let scores = self.model.predict(&inputs)?;
            confirmed.extend(
                chunk
                    .into_iter()
                    .zip(scores)
                    .filter(|(_, s)| s.is_blurry())
                    .map(|(record, _)| record),
            );
        }

        debug!("Confirmed {} of {} blur candidates", confirmed.len(), total);
        Ok(confirmed)
    }
}
