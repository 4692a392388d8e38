use std::path::Path;

use anyhow::{Context, Result};
use tract_onnx::prelude::*;

use super::{ImageModel, InputTensor};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// An ONNX export optimized for a fixed input shape and run with tract.
pub struct OnnxModel {
    plan: OnnxPlan,
    input_shape: [usize; 4],
}

impl OnnxModel {
    pub fn load(path: &Path, input_shape: [usize; 4]) -> Result<Self> {
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to read ONNX model {}", path.display()))?
            .with_input_fact(0, f32::fact(input_shape).into())
            .context("model does not accept the expected input shape")?
            .into_optimized()
            .context("failed to optimize model")?
            .into_runnable()
            .context("failed to build runnable plan")?;

        log::info!(
            "Loaded ONNX model {} with input {:?}",
            path.display(),
            input_shape
        );

        Ok(Self { plan, input_shape })
    }
}

impl ImageModel for OnnxModel {
    fn infer(&self, input: &InputTensor) -> Result<Vec<f32>> {
        anyhow::ensure!(
            input.shape == self.input_shape,
            "input shape {:?} does not match model shape {:?}",
            input.shape,
            self.input_shape
        );

        let tensor = Tensor::from_shape(&input.shape, &input.data)?;
        let outputs = self.plan.run(tvec!(tensor.into()))?;
        let output = outputs
            .first()
            .context("model returned no outputs")?
            .to_array_view::<f32>()?;

        Ok(output.iter().copied().collect())
    }
}
