//! Coarse patch classifier

use std::path::Path;
use tracing::debug;

use super::preset::PresetBundle;
use super::types::{ClassifierError, DefectRecord, Label, Result};
use crate::features::{self, FeatureVector, FEATURE_COUNT};
use crate::geometry::Patch;

/// Scaler → reducer → one-vs-rest discriminant
#[derive(Debug, Clone)]
pub struct PatchClassifier {
    bundle: PresetBundle,
    labels: Vec<Label>,
}

impl PatchClassifier {
    /// Load a preset file
    pub fn load(path: &Path) -> Result<Self> {
        let classifier = Self::from_bundle(PresetBundle::load(path)?)?;
        debug!(
            "Loaded preset {} ({} labels)",
            path.display(),
            classifier.labels.len()
        );
        Ok(classifier)
    }

    /// Wrap an in-memory bundle
    pub fn from_bundle(bundle: PresetBundle) -> Result<Self> {
        bundle.validate()?;
        let labels = bundle.parsed_labels()?;
        Ok(Self { bundle, labels })
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Label and confidence for one descriptor.
    ///
    /// The label is the row with the largest margin; confidence is the largest
    /// absolute margin across all rows.
    pub fn decide(&self, features: &[f64]) -> Result<(Label, f32)> {
        if features.len() != FEATURE_COUNT {
            return Err(ClassifierError::DimensionMismatch {
                expected: FEATURE_COUNT,
                actual: features.len(),
            });
        }

        let scaled = self.bundle.scaler.transform(features);
        let reduced = self.bundle.reducer.transform(&scaled);
        let margins = self.bundle.discriminant.margins(&reduced);

        let (best, _) = margins
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(bi, bm), (i, &m)| {
                if m > bm {
                    (i, m)
                } else {
                    (bi, bm)
                }
            });
        let confidence = margins.iter().fold(0.0f64, |acc, m| acc.max(m.abs()));

        Ok((self.labels[best], confidence as f32))
    }

    /// Classify a batch of patches.
    ///
    /// Any malformed descriptor fails the whole batch.
    pub fn classify(&self, patches: Vec<Patch>) -> Result<Vec<DefectRecord>> {
        let descriptors = features::extract_batch(&patches);
        self.classify_with(patches, &descriptors)
    }

    /// Classify patches whose descriptors were computed elsewhere
    pub fn classify_with(
        &self,
        patches: Vec<Patch>,
        descriptors: &[FeatureVector],
    ) -> Result<Vec<DefectRecord>> {
        if patches.len() != descriptors.len() {
            return Err(ClassifierError::DimensionMismatch {
                expected: patches.len(),
                actual: descriptors.len(),
            });
        }

        let mut records = Vec::with_capacity(patches.len());
        for (patch, descriptor) in patches.into_iter().zip(descriptors) {
            if descriptor.as_slice().iter().any(|v| !v.is_finite()) {
                return Err(ClassifierError::NonFiniteFeature {
                    page: patch.page_basename,
                    grid: patch.grid,
                });
            }
            let (label, confidence) = self.decide(descriptor.as_slice())?;
            records.push(DefectRecord::from_patch(patch, label, confidence));
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{patch_with, sample_bundle};
    use image::{GrayImage, Luma};

    fn classifier() -> PatchClassifier {
        PatchClassifier::from_bundle(sample_bundle()).unwrap()
    }

    #[test]
    fn test_decide_argmax_and_confidence() {
        // span 0, contrast 0: sharp -20, blurry 20, empty 30, indeterminate 0
        let (label, confidence) = classifier().decide(&[0.0; FEATURE_COUNT]).unwrap();
        assert_eq!(label, Label::Empty);
        assert_eq!(confidence, 30.0);
    }

    #[test]
    fn test_decide_confidence_uses_absolute_margin() {
        // span 10, contrast 1: sharp -10, blurry 10, empty -70, indeterminate 0
        let (label, confidence) = classifier().decide(&[0.0, 10.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(label, Label::Blurry);
        assert_eq!(confidence, 70.0);
    }

    #[test]
    fn test_decide_dimension_mismatch() {
        assert!(matches!(
            classifier().decide(&[1.0, 2.0]),
            Err(ClassifierError::DimensionMismatch { expected: 5, actual: 2 })
        ));
    }

    #[test]
    fn test_classify_patches() {
        let flat = patch_with(GrayImage::from_pixel(32, 32, Luma([250])));
        let mut state = 7u32;
        let noise = patch_with(GrayImage::from_fn(32, 32, |_, _| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            Luma([((state >> 16) % 41) as u8])
        }));
        let ramp = patch_with(GrayImage::from_fn(32, 32, |x, _| Luma([(x * 2) as u8])));

        let records = classifier().classify(vec![flat, noise, ramp]).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].label, Label::Empty);
        assert_eq!(records[1].label, Label::Sharp);
        assert_eq!(records[2].label, Label::Blurry);
        assert!(records.iter().all(|r| r.confidence >= 0.0));
    }

    #[test]
    fn test_classify_rejects_non_finite() {
        let patch = patch_with(GrayImage::new(8, 8));
        let mut descriptor = FeatureVector([0.0; FEATURE_COUNT]);
        descriptor.0[2] = f64::NAN;
        assert!(matches!(
            classifier().classify_with(vec![patch], &[descriptor]),
            Err(ClassifierError::NonFiniteFeature { .. })
        ));
    }

    #[test]
    fn test_load_missing_preset() {
        assert!(matches!(
            PatchClassifier::load(Path::new("/nonexistent/preset.json")),
            Err(ClassifierError::PresetLoad { .. })
        ));
    }
}
