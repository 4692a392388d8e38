//! Image classifiers backing a scan.
//!
//! Both classifiers wrap an [`ImageModel`], the seam to whatever runtime
//! executes the bundled weights. Weights are loaded once at construction and
//! never change afterwards, so a classifier is a pure function of its input.

pub mod freshness;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod preprocess;
pub mod species;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use freshness::FreshnessClassifier;
pub use preprocess::{InputTensor, Normalization, TensorLayout};
pub use species::{SpeciesClassifier, UNKNOWN_LABEL};

/// Side length of the square input both bundled models expect.
pub const MODEL_INPUT_SIZE: u32 = 224;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: f32,
}

/// A loaded model that maps one preprocessed image to a flat output vector.
pub trait ImageModel: Send + Sync {
    fn infer(&self, input: &InputTensor) -> Result<Vec<f32>>;
}

/// Loads a model file for the given input shape with the compiled-in runtime.
#[cfg(feature = "onnx")]
pub fn load_model(path: &Path, input_shape: [usize; 4]) -> Result<Arc<dyn ImageModel>> {
    let model = onnx::OnnxModel::load(path, input_shape)?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "onnx"))]
pub fn load_model(path: &Path, _input_shape: [usize; 4]) -> Result<Arc<dyn ImageModel>> {
    anyhow::bail!(
        "cannot load {}: built without an inference runtime (enable the `onnx` feature)",
        path.display()
    )
}
