//! Preset bundle
//!
//! A preset is one JSON document holding the three fitted stages of the
//! coarse classifier:
//!
//! ```json
//! {
//!   "labels": ["blurry", "empty", "indeterminate", "sharp"],
//!   "scaler": { "mean": [..5], "scale": [..5] },
//!   "reducer": { "mean": [..5], "components": [[..5], ..] },
//!   "discriminant": { "weights": [[..k], ..], "intercepts": [..] }
//! }
//! ```
//!
//! The discriminant is one-vs-rest: one weight row and intercept per label.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::types::{ClassifierError, Label, Result};
use crate::features::FEATURE_COUNT;

/// Standardization: `(x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    pub fn transform(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| {
                // zero-variance features are centred but left unscaled
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect()
    }
}

/// Linear projection: `components · (x - mean)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reducer {
    pub mean: Vec<f64>,
    pub components: Vec<Vec<f64>>,
}

impl Reducer {
    pub fn transform(&self, scaled: &[f64]) -> Vec<f64> {
        let centred: Vec<f64> = scaled.iter().zip(&self.mean).map(|(x, m)| x - m).collect();
        self.components
            .iter()
            .map(|component| component.iter().zip(&centred).map(|(w, x)| w * x).sum())
            .collect()
    }

    pub fn output_dim(&self) -> usize {
        self.components.len()
    }
}

/// One-vs-rest linear decision functions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discriminant {
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl Discriminant {
    /// Decision margin per label
    pub fn margins(&self, reduced: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| row.iter().zip(reduced).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }
}

/// Fitted scaler, reducer and discriminant loaded from one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetBundle {
    pub labels: Vec<String>,
    pub scaler: Scaler,
    pub reducer: Reducer,
    pub discriminant: Discriminant,
}

impl PresetBundle {
    /// Read and validate a preset file
    pub fn load(path: &Path) -> Result<Self> {
        let load_error = |reason: String| ClassifierError::PresetLoad {
            path: path.to_path_buf(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let bundle: Self = serde_json::from_str(&text).map_err(|e| load_error(e.to_string()))?;
        bundle.validate().map_err(|e| load_error(e.to_string()))?;
        Ok(bundle)
    }

    /// Write as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ClassifierError::InvalidPreset(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ClassifierError::PresetLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Parsed labels in discriminant row order
    pub fn parsed_labels(&self) -> Result<Vec<Label>> {
        self.labels
            .iter()
            .map(|name| {
                Label::from_name(name)
                    .ok_or_else(|| ClassifierError::InvalidPreset(format!("unknown label '{}'", name)))
            })
            .collect()
    }

    /// Check that every stage fits the next one
    pub fn validate(&self) -> Result<()> {
        let labels = self.parsed_labels()?;
        if labels.is_empty() {
            return Err(ClassifierError::InvalidPreset("no labels".into()));
        }

        let expect = |what: &str, actual: usize, expected: usize| {
            if actual == expected {
                Ok(())
            } else {
                Err(ClassifierError::InvalidPreset(format!(
                    "{} has length {}, expected {}",
                    what, actual, expected
                )))
            }
        };

        expect("scaler.mean", self.scaler.mean.len(), FEATURE_COUNT)?;
        expect("scaler.scale", self.scaler.scale.len(), FEATURE_COUNT)?;
        expect("reducer.mean", self.reducer.mean.len(), FEATURE_COUNT)?;

        let dim = self.reducer.output_dim();
        if dim == 0 {
            return Err(ClassifierError::InvalidPreset("reducer has no components".into()));
        }
        for component in &self.reducer.components {
            expect("reducer component", component.len(), FEATURE_COUNT)?;
        }

        expect("discriminant.weights", self.discriminant.weights.len(), labels.len())?;
        expect("discriminant.intercepts", self.discriminant.intercepts.len(), labels.len())?;
        for row in &self.discriminant.weights {
            expect("discriminant weight row", row.len(), dim)?;
        }
        Ok(())
    }
}
