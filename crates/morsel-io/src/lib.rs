//! morsel-io: Filesystem, model loading and run orchestration.
//!
//! Validates input paths, decodes the photograph, loads the ONNX
//! segmentation model, drives `morsel-pipeline` through one request and
//! shapes the JSON response.

pub mod error;
pub mod onnx;
pub mod raster;
pub mod report;
pub mod resource;
pub mod run;

pub use error::{Resource, RunError};
pub use onnx::{ModelLoader, OnnxLoader, OnnxSegmenter};
pub use report::{ErrorReport, MassReport};
pub use run::{Outcome, Request, RunState, StdClock, Traced, run, run_traced};
