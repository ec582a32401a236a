//! Core types for blur confirmation

use std::path::PathBuf;
use thiserror::Error;

/// Default model input edge length
pub const DEFAULT_INPUT_SIZE: u32 = 200;

/// Default number of patches per inference call
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Confirmation error types
#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("Failed to load confirmation model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("Invalid confirmation model: {0}")]
    InvalidModel(String),

    #[error("Model input has {actual} values, expected {expected}")]
    InputSize { expected: usize, actual: usize },

    #[error("Inference failed: {0}")]
    Inference(String),
}

pub type Result<T> = std::result::Result<T, ConfirmError>;

/// Two-class model output for one patch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurScores {
    pub blurry: f32,
    pub sharp: f32,
}

impl BlurScores {
    pub fn new(blurry: f32, sharp: f32) -> Self {
        Self { blurry, sharp }
    }

    /// Blur wins only when its score is strictly higher
    pub fn is_blurry(&self) -> bool {
        self.blurry > self.sharp
    }
}

/// Inference backend for the confirmation stage.
///
/// Inputs are single-channel `input_size × input_size` images scaled to
/// `[0, 1]`, row-major. Output index 0 is the blurry score, index 1 sharp.
pub trait BlurModel: Send + Sync {
    /// Edge length the model expects
    fn input_size(&self) -> u32;

    /// Score a batch of preprocessed inputs, one result per input
    fn predict(&self, batch: &[Vec<f32>]) -> Result<Vec<BlurScores>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ties_are_not_blurry() {
        assert!(BlurScores::new(0.6, 0.4).is_blurry());
        assert!(!BlurScores::new(0.5, 0.5).is_blurry());
        assert!(!BlurScores::new(0.1, 0.9).is_blurry());
    }
}
