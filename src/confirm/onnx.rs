//! ONNX Runtime backend for the confirmation model
//!
//! The exported network takes a `[N, size, size, 1]` float tensor and returns
//! `[N, 2]` scores, blurry first.

use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use super::types::{BlurModel, BlurScores, ConfirmError, Result};

/// Threads given to each inference call
const INTRA_THREADS: usize = 2;

/// Confirmation model executed by ONNX Runtime.
///
/// `Session::run` needs `&mut self`, so the session sits behind a mutex to
/// satisfy the shared `&self` trait interface.
pub struct OnnxBlurModel {
    session: Mutex<Session>,
    input_size: u32,
}

impl OnnxBlurModel {
    /// Load an `.onnx` file whose input edge length is `input_size`
    pub fn load(path: &Path, input_size: u32) -> Result<Self> {
        let load_error = |reason: String| ConfirmError::ModelLoad {
            path: path.to_path_buf(),
            reason,
        };
        if input_size == 0 {
            return Err(ConfirmError::InvalidModel("input size is zero".into()));
        }
        if !path.exists() {
            return Err(load_error("file not found".into()));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| load_error(e.to_string()))?
            .with_intra_threads(INTRA_THREADS)
            .map_err(|e: ort::Error<ort::session::builder::SessionBuilder>| load_error(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e: ort::Error| load_error(format!("ONNX load failed: {e}")))?;

        info!("ONNX confirmation model loaded from {}", path.display());

        Ok(Self {
            session: Mutex::new(session),
            input_size,
        })
    }
}

impl BlurModel for OnnxBlurModel {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn predict(&self, batch: &[Vec<f32>]) -> Result<Vec<BlurScores>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let size = self.input_size as usize;
        let per_input = size * size;
        let mut flat = Vec::with_capacity(batch.len() * per_input);
        for input in batch {
            if input.len() != per_input {
                return Err(ConfirmError::InputSize {
                    expected: per_input,
                    actual: input.len(),
                });
            }
            flat.extend_from_slice(input);
        }

        let array = ndarray::Array4::from_shape_vec((batch.len(), size, size, 1), flat)
            .map_err(|e| ConfirmError::Inference(e.to_string()))?;
        let tensor =
            TensorRef::from_array_view(&array).map_err(|e| ConfirmError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ConfirmError::Inference("Session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| ConfirmError::Inference(format!("ONNX inference failed: {e}")))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ConfirmError::Inference(format!("Output extraction: {e}")))?;

        if shape.len() != 2 || shape[0] as usize != batch.len() || shape[1] != 2 {
            return Err(ConfirmError::Inference(format!(
                "Unexpected output shape: {shape:?}, expected [{}, 2]",
                batch.len()
            )));
        }

        Ok(data
            .chunks_exact(2)
            .map(|pair| BlurScores::new(pair[0], pair[1]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // Minimal ONNX graph, protobuf-encoded by hand
    // ============================================================

    fn varint(mut value: u64, out: &mut Vec<u8>) {
        while value >= 0x80 {
            out.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        out.push(value as u8);
    }

    fn int_field(out: &mut Vec<u8>, field: u64, value: u64) {
        varint(field << 3, out);
        varint(value, out);
    }

    fn bytes_field(out: &mut Vec<u8>, field: u64, bytes: &[u8]) {
        varint((field << 3) | 2, out);
        varint(bytes.len() as u64, out);
        out.extend_from_slice(bytes);
    }

    /// Float tensor value info; `None` dims are the symbolic batch axis
    fn value_info(name: &str, dims: &[Option<u64>]) -> Vec<u8> {
        let mut shape = Vec::new();
        for dim in dims {
            let mut d = Vec::new();
            match dim {
                Some(value) => int_field(&mut d, 1, *value),
                None => bytes_field(&mut d, 2, b"N"),
            }
            bytes_field(&mut shape, 1, &d);
        }
        let mut tensor = Vec::new();
        int_field(&mut tensor, 1, 1);
        bytes_field(&mut tensor, 2, &shape);
        let mut ty = Vec::new();
        bytes_field(&mut ty, 1, &tensor);

        let mut info = Vec::new();
        bytes_field(&mut info, 1, name.as_bytes());
        bytes_field(&mut info, 2, &ty);
        info
    }

    fn node(op: &str, inputs: &[&str], output: &str, axis: Option<u64>) -> Vec<u8> {
        let mut node = Vec::new();
        for input in inputs {
            bytes_field(&mut node, 1, input.as_bytes());
        }
        bytes_field(&mut node, 2, output.as_bytes());
        bytes_field(&mut node, 4, op.as_bytes());
        if let Some(axis) = axis {
            let mut attr = Vec::new();
            bytes_field(&mut attr, 1, b"axis");
            int_field(&mut attr, 3, axis);
            int_field(&mut attr, 20, 2);
            bytes_field(&mut node, 5, &attr);
        }
        node
    }

    /// 1×1 network scoring blurry = pixel, sharp = -pixel
    fn pixel_sign_model() -> Vec<u8> {
        let mut graph = Vec::new();
        bytes_field(&mut graph, 1, &node("Flatten", &["input"], "flat", Some(1)));
        bytes_field(&mut graph, 1, &node("Neg", &["flat"], "negated", None));
        bytes_field(
            &mut graph,
            1,
            &node("Concat", &["flat", "negated"], "scores", Some(1)),
        );
        bytes_field(&mut graph, 2, b"pixel_sign");
        bytes_field(&mut graph, 11, &value_info("input", &[None, Some(1), Some(1), Some(1)]));
        bytes_field(&mut graph, 12, &value_info("scores", &[None, Some(2)]));

        let mut opset = Vec::new();
        int_field(&mut opset, 2, 13);

        let mut model = Vec::new();
        int_field(&mut model, 1, 8);
        bytes_field(&mut model, 2, b"page-inspector-tests");
        bytes_field(&mut model, 7, &graph);
        bytes_field(&mut model, 8, &opset);
        model
    }

    fn load_pixel_sign(dir: &Path) -> OnnxBlurModel {
        let path = dir.join("pixel_sign.onnx");
        std::fs::write(&path, pixel_sign_model()).unwrap();
        OnnxBlurModel::load(&path, 1).unwrap()
    }

    #[test]
    fn test_predict_scores_each_input() {
        let dir = tempfile::tempdir().unwrap();
        let model = load_pixel_sign(dir.path());
        assert_eq!(model.input_size(), 1);

        let scores = model.predict(&[vec![0.75], vec![0.0], vec![0.25]]).unwrap();
        assert_eq!(scores.len(), 3);
        assert_eq!(scores[0], BlurScores::new(0.75, -0.75));
        assert!(scores[0].is_blurry());
        // a tie is not blurry
        assert!(!scores[1].is_blurry());
        assert_eq!(scores[2].blurry, 0.25);
    }

    #[test]
    fn test_predict_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let model = load_pixel_sign(dir.path());
        assert!(model.predict(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_predict_wrong_input_length() {
        let dir = tempfile::tempdir().unwrap();
        let model = load_pixel_sign(dir.path());
        assert!(matches!(
            model.predict(&[vec![0.5], vec![0.5; 4]]),
            Err(ConfirmError::InputSize {
                expected: 1,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            OnnxBlurModel::load(&dir.path().join("missing.onnx"), 1),
            Err(ConfirmError::ModelLoad { .. })
        ));

        let path = dir.path().join("pixel_sign.onnx");
        std::fs::write(&path, pixel_sign_model()).unwrap();
        assert!(matches!(
            OnnxBlurModel::load(&path, 0),
            Err(ConfirmError::InvalidModel(_))
        ));
    }
}
