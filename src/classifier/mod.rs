//! Coarse patch classification
//!
//! Each patch is reduced to a [`FeatureVector`](crate::features::FeatureVector),
//! standardized, projected and scored by a one-vs-rest linear discriminant
//! loaded from a preset file. The result is a [`DefectRecord`] carrying the
//! winning [`Label`] and its confidence.

mod classify;
mod preset;
mod types;

pub use classify::PatchClassifier;
pub use preset::{Discriminant, PresetBundle, Reducer, Scaler};
pub use types::{ClassifierError, DefectRecord, Label, Result};
