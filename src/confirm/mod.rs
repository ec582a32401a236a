//! Blur confirmation stage
//!
//! The coarse classifier over-reports blur. Records it labels blurry or
//! indeterminate are re-scored by a convolutional network exported to ONNX
//! and run through ONNX Runtime, and only the ones the network also calls
//! blurry survive.

mod confirmer;
mod onnx;
mod types;

pub use confirmer::BlurConfirmer;
pub use onnx::OnnxBlurModel;
pub use types::{
    BlurModel, BlurScores, ConfirmError, Result, DEFAULT_BATCH_SIZE, DEFAULT_INPUT_SIZE,
};

use std::path::Path;
use std::sync::Arc;

/// Load the confirmation network at `path`
pub fn load_model(path: &Path) -> Result<Arc<dyn BlurModel>> {
    Ok(Arc::new(OnnxBlurModel::load(path, DEFAULT_INPUT_SIZE)?))
}
