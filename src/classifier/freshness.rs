use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use super::preprocess::{preprocess, Normalization, TensorLayout};
use super::{load_model, ImageModel, MODEL_INPUT_SIZE};

const LAYOUT: TensorLayout = TensorLayout::Nhwc;

/// Scores how rotten a banana looks: near 0 is fresh, near 1 is rotten.
///
/// Only meaningful on frames already classified as the supported species;
/// turning the score into a label is the decision policy's job.
pub struct FreshnessClassifier {
    model: Arc<dyn ImageModel>,
}

impl FreshnessClassifier {
    pub fn new(model: Arc<dyn ImageModel>) -> Self {
        Self { model }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let model = load_model(path, LAYOUT.shape(MODEL_INPUT_SIZE))
            .with_context(|| format!("failed to load freshness model {}", path.display()))?;
        Ok(Self::new(model))
    }

    pub fn score(&self, image: &RgbImage) -> Result<f32> {
        let input = preprocess(image, MODEL_INPUT_SIZE, LAYOUT, Normalization::UnitRange);
        let output = self
            .model
            .infer(&input)
            .context("freshness inference failed")?;
        output
            .first()
            .copied()
            .ok_or_else(|| anyhow!("freshness model produced no output"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::InputTensor;
    use image::Rgb;

    struct EchoRed;

    // Reports the first red value it was given, so tests can see the scaling.
    impl ImageModel for EchoRed {
        fn infer(&self, input: &InputTensor) -> Result<Vec<f32>> {
            assert_eq!(input.shape, [1, 224, 224, 3]);
            Ok(vec![input.data[0]])
        }
    }

    struct Silent;

    impl ImageModel for Silent {
        fn infer(&self, _input: &InputTensor) -> Result<Vec<f32>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn score_uses_unit_range_channels() {
        let classifier = FreshnessClassifier::new(Arc::new(EchoRed));
        let img = RgbImage::from_pixel(224, 224, Rgb([255, 0, 0]));
        let score = classifier.score(&img).unwrap();
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_output_is_an_error() {
        let classifier = FreshnessClassifier::new(Arc::new(Silent));
        let img = RgbImage::from_pixel(4, 4, Rgb([1, 1, 1]));
        assert!(classifier.score(&img).is_err());
    }
}
