//! ONNX segmentation backend.
//!
//! Runs a salient-object network (a U²-Net style export with input
//! `[1, 3, N, N]` and a single-channel `[1, 1, N, N]` first output) with
//! the pure-Rust `tract-onnx` runtime.
//!
//! The run orchestrator reaches backends through [`ModelLoader`], so
//! tests and alternative runtimes can stand in for [`OnnxLoader`].

use std::path::Path;

use morsel_pipeline::{
    Dimensions, InputTensor, PipelineConfig, ScoreMap, SegmentError, Segmenter,
};
use tract_onnx::prelude::*;

use crate::error::RunError;

type Plan = TypedRunnableModel<TypedModel>;

/// Loads a segmentation model from a file.
///
/// Loading happens once per run, after the image and model paths have
/// been validated.
pub trait ModelLoader {
    /// The loaded model.
    type Model: Segmenter;

    /// Load the model at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::ModelLoad`] (or [`RunError::Read`]) when the
    /// artifact cannot be turned into a runnable model.
    fn load(&self, path: &Path, config: &PipelineConfig) -> Result<Self::Model, RunError>;
}

/// [`ModelLoader`] for ONNX files.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxLoader;

impl ModelLoader for OnnxLoader {
    type Model = OnnxSegmenter;

    fn load(&self, path: &Path, config: &PipelineConfig) -> Result<OnnxSegmenter, RunError> {
        OnnxSegmenter::load(path, config.model_input_size)
    }
}

/// A [`Segmenter`] backed by an optimized `tract` plan.
pub struct OnnxSegmenter {
    plan: Plan,
    input: Dimensions,
}

impl OnnxSegmenter {
    /// Parse, type and optimize the ONNX model at `path` for a square
    /// input of `input_size` pixels.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::ModelLoad`] if the file is not a valid ONNX
    /// model or its graph cannot be specialized to `[1, 3, N, N]`.
    pub fn load(path: &Path, input_size: u32) -> Result<Self, RunError> {
        let n = usize::try_from(input_size)
            .map_err(|_| RunError::ModelLoad(format!("input size {input_size} is too large")))?;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact([1, 3, n, n]).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| RunError::ModelLoad(format!("{}: {e:#}", path.display())))?;
        log::info!("loaded segmentation model {} ({n}x{n})", path.display());
        Ok(Self {
            plan,
            input: Dimensions::square(input_size),
        })
    }
}

impl Segmenter for OnnxSegmenter {
    fn input_dimensions(&self) -> Dimensions {
        self.input
    }

    fn forward(&mut self, input: &InputTensor) -> Result<ScoreMap, SegmentError> {
        if input.dimensions() != self.input {
            return Err(SegmentError::InputShape {
                expected: self.input,
                actual: input.dimensions(),
            });
        }
        let tensor = Tensor::from_shape::<f32>(&input.shape(), input.as_slice()).map_err(backend)?;
        let outputs = self.plan.run(tvec!(tensor.into())).map_err(backend)?;
        let first = outputs
            .first()
            .ok_or_else(|| SegmentError::Backend("model produced no outputs".to_owned()))?;
        let view = first.to_array_view::<f32>().map_err(backend)?;
        scores_from_output(view.shape(), view.iter().copied())
    }
}

fn backend(e: TractError) -> SegmentError {
    SegmentError::Backend(format!("{e:#}"))
}

/// Interpret a model output of shape `[.., H, W]` as one score map,
/// taking the first `H x W` plane.
fn scores_from_output(
    shape: &[usize],
    values: impl Iterator<Item = f32>,
) -> Result<ScoreMap, SegmentError> {
    let [.., h, w] = *shape else {
        return Err(SegmentError::Backend(format!(
            "expected an output of rank >= 2, got shape {shape:?}"
        )));
    };
    let dimensions = match (u32::try_from(w), u32::try_from(h)) {
        (Ok(width), Ok(height)) => Dimensions::new(width, height),
        _ => {
            return Err(SegmentError::Backend(format!(
                "output shape {shape:?} is too large"
            )));
        }
    };
    let plane: Vec<f32> = values.take(w.saturating_mul(h)).collect();
    ScoreMap::new(dimensions, plane)
}
