use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::RgbImage;

use super::preprocess::{preprocess, Normalization, TensorLayout};
use super::{load_model, ClassificationResult, ImageModel, MODEL_INPUT_SIZE};

pub const UNKNOWN_LABEL: &str = "Unknown";

/// Class names of the bundled 51-way produce model, in output order.
pub const PRODUCE_LABELS: [&str; 51] = [
    "Amaranth",
    "Apple",
    "Banana",
    "Beetroot",
    "Bell pepper",
    "Bitter Gourd",
    "Blueberry",
    "Bottle Gourd",
    "Broccoli",
    "Cabbage",
    "Cantaloupe",
    "Capsicum",
    "Carrot",
    "Cauliflower",
    "Chilli pepper",
    "Coconut",
    "Corn",
    "Cucumber",
    "Dragon_fruit",
    "Eggplant",
    "Fig",
    "Garlic",
    "Ginger",
    "Grapes",
    "Jalepeno",
    "Kiwi",
    "Lemon",
    "Mango",
    "Okra",
    "Onion",
    "Orange",
    "Paprika",
    "Pear",
    "Peas",
    "Pineapple",
    "Pomegranate",
    "Potato",
    "Pumpkin",
    "Raddish",
    "Raspberry",
    "Ridge Gourd",
    "Soy beans",
    "Spinach",
    "Spiny Gourd",
    "Sponge Gourd",
    "Strawberry",
    "Sweetcorn",
    "Sweetpotato",
    "Tomato",
    "Turnip",
    "Watermelon",
];

const LAYOUT: TensorLayout = TensorLayout::Nchw;

/// Maps a frame to one of the known produce labels.
pub struct SpeciesClassifier {
    model: Arc<dyn ImageModel>,
    labels: Vec<String>,
    normalization: Normalization,
}

impl SpeciesClassifier {
    pub fn new(model: Arc<dyn ImageModel>) -> Self {
        Self {
            model,
            labels: PRODUCE_LABELS.iter().map(|s| s.to_string()).collect(),
            normalization: Normalization::imagenet(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let model = load_model(path, LAYOUT.shape(MODEL_INPUT_SIZE))
            .with_context(|| format!("failed to load species model {}", path.display()))?;
        Ok(Self::new(model))
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn classify(&self, image: &RgbImage) -> Result<ClassificationResult> {
        let input = preprocess(image, MODEL_INPUT_SIZE, LAYOUT, self.normalization);
        let logits = self.model.infer(&input).context("species inference failed")?;
        Ok(self.pick_label(&softmax(&logits)))
    }

    fn pick_label(&self, probabilities: &[f32]) -> ClassificationResult {
        let best = probabilities
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| !p.is_nan())
            .fold(None, |best: Option<(usize, f32)>, (idx, p)| match best {
                Some((_, top)) if top >= p => best,
                _ => Some((idx, p)),
            });

        match best {
            Some((idx, confidence)) => ClassificationResult {
                label: self
                    .labels
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                confidence,
            },
            None => ClassificationResult {
                label: UNKNOWN_LABEL.to_string(),
                confidence: 0.0,
            },
        }
    }
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let Some(max) = logits.iter().copied().reduce(f32::max) else {
        return Vec::new();
    };

    let exp: Vec<f64> = logits.iter().map(|v| ((v - max) as f64).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|v| (v / sum) as f32).collect()
}
