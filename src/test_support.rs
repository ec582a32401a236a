//! Fixtures shared by unit tests

use image::{GrayImage, Luma};

use crate::classifier::{DefectRecord, Discriminant, Label, PresetBundle, Reducer, Scaler};
use crate::confirm::{BlurModel, BlurScores, ConfirmError};
use crate::features::FEATURE_COUNT;
use crate::geometry::{GridCell, PageSide, Patch, PixelPoint, ScanId};

/// Identity scaler and reducer over the five features.
///
/// Margins: sharp = span - 20, blurry = 20 - span,
/// empty = 30 - 100 · contrast, indeterminate = 0.
pub fn sample_bundle() -> PresetBundle {
    let identity: Vec<Vec<f64>> = (0..FEATURE_COUNT)
        .map(|i| (0..FEATURE_COUNT).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();
    PresetBundle {
        labels: vec![
            "sharp".into(),
            "blurry".into(),
            "empty".into(),
            "indeterminate".into(),
        ],
        scaler: Scaler {
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        },
        reducer: Reducer {
            mean: vec![0.0; FEATURE_COUNT],
            components: identity,
        },
        discriminant: Discriminant {
            weights: vec![
                vec![0.0, 1.0, 0.0, 0.0, 0.0],
                vec![0.0, -1.0, 0.0, 0.0, 0.0],
                vec![0.0, 0.0, 0.0, 0.0, -100.0],
                vec![0.0; FEATURE_COUNT],
            ],
            intercepts: vec![-20.0, 20.0, 30.0, 0.0],
        },
    }
}

/// Left-page patch of scan 0001 at the origin cell
pub fn patch_with(pixels: GrayImage) -> Patch {
    Patch {
        pixels,
        grid: GridCell::new(0, 0),
        position: PixelPoint::new(0, 0),
        scan_id: ScanId::parse("0001").unwrap(),
        side: PageSide::Left,
        page_basename: "0001_left.png".to_string(),
    }
}

/// 16×16 uniform record
pub fn record_with(label: Label, confidence: f32, value: u8) -> DefectRecord {
    DefectRecord::from_patch(
        patch_with(GrayImage::from_pixel(16, 16, Luma([value]))),
        label,
        confidence,
    )
}

/// Scores dark inputs blurry: blurry = 1 - mean, sharp = mean
#[derive(Debug, Clone, Copy)]
pub struct MeanThresholdModel {
    input_size: u32,
}

impl MeanThresholdModel {
    pub fn new(input_size: u32) -> Self {
        Self { input_size }
    }
}

impl BlurModel for MeanThresholdModel {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn predict(&self, batch: &[Vec<f32>]) -> Result<Vec<BlurScores>, ConfirmError> {
        Ok(batch
            .iter()
            .map(|input| {
                let mean = input.iter().sum::<f32>() / input.len().max(1) as f32;
                BlurScores::new(1.0 - mean, mean)
            })
            .collect())
    }
}

/// Scores every input blurry
#[derive(Debug, Clone, Copy)]
pub struct AlwaysBlurryModel;

impl BlurModel for AlwaysBlurryModel {
    fn input_size(&self) -> u32 {
        2
    }

    fn predict(&self, batch: &[Vec<f32>]) -> Result<Vec<BlurScores>, ConfirmError> {
        Ok(vec![BlurScores::new(1.0, 0.0); batch.len()])
    }
}
