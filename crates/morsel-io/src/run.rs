//! One estimation request, end to end.
//!
//! The run moves through [`RunState`]s:
//!
//! ```text
//! Validating -> Segmenting -> AreaComputed -> ScaleComputed -> Estimated
//!      \             \              \               \
//!       `-------------`--------------`---------------`--> Failed(kind)
//! ```
//!
//! Each state is entered as the matching pipeline stage completes, and a
//! failure is recorded as `Failed(kind)` after the last state reached.
//! [`run_traced`] hands back that history alongside the result.
//!
//! Paths are checked before anything is decoded or loaded, so a missing
//! image is reported without ever touching the model. Panics anywhere in
//! the run are caught and reported as internal errors.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use morsel_pipeline::diagnostics::{Clock, DiagnosticsRecorder, PipelineDiagnostics};
use morsel_pipeline::{BinaryMask, Dimensions, ErrorKind, MassResult, Pipeline, PipelineConfig};

use crate::error::{Resource, RunError};
use crate::onnx::ModelLoader;
use crate::{raster, resource};

/// Everything needed to answer one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Photograph of the food, ideally on a plate.
    pub image_path: PathBuf,
    /// Segmentation model artifact.
    pub model_path: PathBuf,
    /// Pipeline tuning, including the density.
    pub config: PipelineConfig,
    /// Where to write the binary mask as a PNG, if anywhere.
    pub mask_out: Option<PathBuf>,
}

impl Request {
    /// A request with the default configuration and no mask output.
    #[must_use]
    pub fn new(image_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            model_path: model_path.into(),
            config: PipelineConfig::default(),
            mask_out: None,
        }
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Checking paths and configuration.
    Validating,
    /// Decoding, loading the model and producing the mask.
    Segmenting,
    /// The foreground pixel count is known.
    AreaComputed,
    /// The pixel-to-centimeter scale is known.
    ScaleComputed,
    /// Terminal success.
    Estimated,
    /// Terminal failure.
    Failed(ErrorKind),
}

impl RunState {
    /// Whether no further transition can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Estimated | Self::Failed(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validating => f.write_str("validating"),
            Self::Segmenting => f.write_str("segmenting"),
            Self::AreaComputed => f.write_str("area computed"),
            Self::ScaleComputed => f.write_str("scale computed"),
            Self::Estimated => f.write_str("estimated"),
            Self::Failed(kind) => write!(f, "failed ({kind:?})"),
        }
    }
}

/// Wall-clock [`Clock`] for the diagnostics collector.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// A successful run.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Full-precision result.
    pub result: MassResult,
    /// Per-stage timing and metrics.
    pub diagnostics: PipelineDiagnostics,
    /// The binary mask the area was counted on.
    pub mask: BinaryMask,
}

/// A finished run and the states it passed through.
#[derive(Debug)]
pub struct Traced {
    /// What [`run`] would have returned.
    pub result: Result<Outcome, RunError>,
    /// Every state entered, in order. The last one is always terminal.
    pub states: Vec<RunState>,
}

impl Traced {
    /// The terminal state.
    #[must_use]
    pub fn final_state(&self) -> Option<RunState> {
        self.states.last().copied()
    }
}

/// Answer `request`, loading the model through `loader`.
///
/// # Errors
///
/// Returns [`RunError::NotFound`] if the image (checked first) or the
/// model path does not exist; in that case `loader` is never called.
/// Returns [`RunError::Pipeline`] for configuration, decoding and
/// segmentation failures (including an empty mask),
/// [`RunError::ModelLoad`] if the model cannot be prepared, and
/// [`RunError::Panicked`] if anything panicked.
pub fn run<L: ModelLoader>(request: &Request, loader: &L) -> Result<Outcome, RunError> {
    run_traced(request, loader).result
}

/// Like [`run`], but also returns every [`RunState`] entered.
///
/// On failure the history ends in [`RunState::Failed`] right after the
/// state the run was in when it failed.
pub fn run_traced<L: ModelLoader>(request: &Request, loader: &L) -> Traced {
    let mut states = Vec::with_capacity(6);
    let caught = panic::catch_unwind(AssertUnwindSafe(|| {
        run_stages(request, loader, &mut states)
    }));
    let result = caught.unwrap_or_else(|payload| Err(RunError::Panicked(panic_message(&*payload))));
    if let Err(ref err) = result {
        let failed = RunState::Failed(err.kind());
        log::debug!("run state: {failed}");
        log::warn!("estimation failed: {err}");
        states.push(failed);
    }
    Traced { result, states }
}

fn run_stages<L: ModelLoader>(
    request: &Request,
    loader: &L,
    states: &mut Vec<RunState>,
) -> Result<Outcome, RunError> {
    let mut enter = |state: RunState| {
        log::debug!("run state: {state}");
        states.push(state);
    };

    enter(RunState::Validating);
    resource::ensure_file(Resource::Image, &request.image_path)?;
    resource::ensure_file(Resource::Model, &request.model_path)?;
    request.config.validate()?;

    enter(RunState::Segmenting);
    let image = raster::load_image(&request.image_path)?;
    let mut model = loader.load(&request.model_path, &request.config)?;

    let clock = StdClock;
    let concurrent = request.config.concurrent_scale_detection;
    let mut recorder = DiagnosticsRecorder::start(&clock, Dimensions::of(&image), concurrent);
    let pending = Pipeline::new(image, request.config.clone());
    let segmented = recorder.try_record(|| {
        if concurrent {
            pending.segment_concurrent(&mut model)
        } else {
            pending.segment(&mut model)
        }
    })?;

    let area_computed = recorder.try_record(|| segmented.measure_area())?;
    enter(RunState::AreaComputed);

    let scaled = recorder.record(|| area_computed.detect_scale());
    enter(RunState::ScaleComputed);

    let estimated = recorder.record(|| scaled.estimate());
    let diagnostics = recorder.finish(&estimated);
    log::info!(
        "area {} px, scale {:.3} px/cm from {:?}",
        estimated.result().pixel_area,
        estimated.result().px_per_cm,
        estimated.result().scale_source,
    );

    if let Some(path) = &request.mask_out {
        raster::write_mask_png(path, estimated.mask())?;
    }

    enter(RunState::Estimated);
    let (result, mask) = estimated.into_parts();
    Ok(Outcome {
        result,
        diagnostics,
        mask,
    })
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}
