//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process`] which runs the entire pipeline in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use morsel_pipeline::{Pipeline, PipelineConfig, PipelineError, RgbImage, Segmenter};
//! # fn run(image: RgbImage, model: &mut impl Segmenter) -> Result<(), PipelineError> {
//! let estimated = Pipeline::new(image, PipelineConfig::default())
//!     .segment(model)?
//!     .measure_area()?
//!     .detect_scale()
//!     .estimate();
//!
//! let result = estimated.into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for fallible stages), carrying the source image and the
//! binary mask along. The caller can inspect the current stage's output
//! via accessor methods at any point.
//!
//! # Concurrency
//!
//! Plate detection only needs the source image, so it can overlap with
//! the model forward pass. [`Pending::segment_concurrent`] runs it on a
//! scoped worker thread and hands the result through to
//! [`AreaComputed::detect_scale`], which then returns immediately. Both
//! orders produce identical results.

use crate::diagnostics::StageMetrics;
use crate::mask::{self, BinaryMask};
use crate::mass::{self, MassEstimate};
use crate::plate::{self, PlateDetection};
use crate::segment::{InputTensor, Segmenter};
use crate::types::{
    Dimensions, MassResult, PipelineConfig, PipelineError, RgbImage, ScaleEstimate, ScaleSource,
};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// The source image and config are stored but not yet touched. Call
/// [`segment`](Self::segment) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .segment() to continue"]
pub struct Pending {
    config: PipelineConfig,
    image: RgbImage,
}

impl Pending {
    /// The source photograph.
    #[must_use]
    pub const fn image(&self) -> &RgbImage {
        &self.image
    }

    /// The configuration this pipeline runs with.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate the config, run `segmenter` and normalize its scores into
    /// a mask the size of the source image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the config is rejected,
    /// [`PipelineError::EmptyInput`] if the image has no pixels, and
    /// [`PipelineError::Segmentation`] if the backend fails.
    pub fn segment<S: Segmenter + ?Sized>(self, segmenter: &mut S) -> Result<Segmented, PipelineError> {
        self.check()?;
        let segmentation = run_segmenter(&self.image, &self.config, segmenter)?;
        Ok(self.into_segmented(segmentation, None))
    }

    /// Like [`segment`](Self::segment), but detects the reference plate
    /// on a worker thread while the segmenter runs on this one.
    ///
    /// # Errors
    ///
    /// Same as [`segment`](Self::segment), plus
    /// [`PipelineError::WorkerPanicked`] if plate detection panics.
    pub fn segment_concurrent<S: Segmenter + ?Sized>(
        self,
        segmenter: &mut S,
    ) -> Result<Segmented, PipelineError> {
        self.check()?;
        let (segmentation, detection) = std::thread::scope(|scope| {
            let worker = scope.spawn(|| plate::detect(&self.image, &self.config));
            let segmentation = run_segmenter(&self.image, &self.config, segmenter);
            (segmentation, worker.join())
        });
        let detection = detection.map_err(|_| PipelineError::WorkerPanicked("plate detection"))?;
        Ok(self.into_segmented(segmentation?, Some(detection)))
    }

    fn check(&self) -> Result<(), PipelineError> {
        self.config.validate()?;
        if Dimensions::of(&self.image).is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        Ok(())
    }

    fn into_segmented(self, segmentation: Segmentation, plate: Option<PlateDetection>) -> Segmented {
        Segmented {
            config: self.config,
            image: self.image,
            segmentation,
            plate,
        }
    }
}

/// What the segmentation stage produced, minus the raw scores.
struct Segmentation {
    input_dimensions: Dimensions,
    score_dimensions: Dimensions,
    score_range: (f32, f32),
    mask: BinaryMask,
}

fn run_segmenter<S: Segmenter + ?Sized>(
    image: &RgbImage,
    config: &PipelineConfig,
    segmenter: &mut S,
) -> Result<Segmentation, PipelineError> {
    let input_dimensions = segmenter.input_dimensions();
    let tensor = InputTensor::from_image(image, input_dimensions, config.input_filter);
    let scores = segmenter.forward(&tensor)?;
    let score_range = scores.range();
    log::debug!(
        "segmenter: {}x{} input, {}x{} scores in [{}, {}]",
        input_dimensions.width,
        input_dimensions.height,
        scores.dimensions().width,
        scores.dimensions().height,
        score_range.0,
        score_range.1
    );
    let mask = mask::normalize(
        &scores,
        Dimensions::of(image),
        config.mask_threshold,
        config.mask_filter,
    );
    Ok(Segmentation {
        input_dimensions,
        score_dimensions: scores.dimensions(),
        score_range,
        mask,
    })
}

// ───────────────────────── Stage 1: Segmented ────────────────────────

/// Pipeline state after segmentation and mask normalization.
///
/// Call [`measure_area`](Self::measure_area) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .measure_area() to continue"]
pub struct Segmented {
    config: PipelineConfig,
    image: RgbImage,
    segmentation: Segmentation,
    plate: Option<PlateDetection>,
}

impl Segmented {
    /// The binary mask, sized to the source image.
    #[must_use]
    pub const fn mask(&self) -> &BinaryMask {
        &self.segmentation.mask
    }

    /// Dimensions of the tensor handed to the segmenter.
    #[must_use]
    pub const fn input_dimensions(&self) -> Dimensions {
        self.segmentation.input_dimensions
    }

    /// Dimensions of the score map the segmenter returned.
    #[must_use]
    pub const fn score_dimensions(&self) -> Dimensions {
        self.segmentation.score_dimensions
    }

    /// Smallest and largest raw score.
    #[must_use]
    pub const fn score_range(&self) -> (f32, f32) {
        self.segmentation.score_range
    }

    /// Count foreground pixels and advance to the [`AreaComputed`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptySegmentation`] if the mask has no
    /// foreground pixels.
    pub fn measure_area(self) -> Result<AreaComputed, PipelineError> {
        let pixel_area = crate::area::pixel_area(&self.segmentation.mask);
        log::debug!("area: {pixel_area} foreground pixels");
        if pixel_area == 0 {
            return Err(PipelineError::EmptySegmentation);
        }
        Ok(AreaComputed {
            config: self.config,
            image: self.image,
            mask: self.segmentation.mask,
            pixel_area,
            plate: self.plate,
        })
    }
}

// ───────────────────────── Stage 2: AreaComputed ─────────────────────

/// Pipeline state after measuring the foreground area.
///
/// The area is known to be non-zero. Call
/// [`detect_scale`](Self::detect_scale) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .detect_scale() to continue"]
pub struct AreaComputed {
    config: PipelineConfig,
    image: RgbImage,
    mask: BinaryMask,
    pixel_area: u64,
    plate: Option<PlateDetection>,
}

impl AreaComputed {
    /// The binary mask.
    #[must_use]
    pub const fn mask(&self) -> &BinaryMask {
        &self.mask
    }

    /// Number of foreground pixels. Always `> 0`.
    #[must_use]
    pub const fn pixel_area(&self) -> u64 {
        self.pixel_area
    }

    /// Detect the reference plate on the unmasked source image and
    /// advance to the [`ScaleComputed`] stage.
    ///
    /// When the plate was already detected concurrently with
    /// segmentation, that result is reused.
    pub fn detect_scale(self) -> ScaleComputed {
        let detection = match self.plate {
            Some(detection) => detection,
            None => plate::detect(&self.image, &self.config),
        };
        ScaleComputed {
            config: self.config,
            mask: self.mask,
            pixel_area: self.pixel_area,
            scale: detection.scale,
            plate: Some(detection),
        }
    }

    /// Advance to the [`ScaleComputed`] stage with a scale obtained
    /// elsewhere, skipping plate detection.
    pub fn with_scale(self, scale: ScaleEstimate) -> ScaleComputed {
        ScaleComputed {
            config: self.config,
            mask: self.mask,
            pixel_area: self.pixel_area,
            scale,
            plate: None,
        }
    }
}

// ───────────────────────── Stage 3: ScaleComputed ────────────────────

/// Pipeline state once the pixel-to-centimeter scale is known.
///
/// Call [`estimate`](Self::estimate) to advance to the final stage.
#[must_use = "pipeline stages are consumed by advancing; call .estimate() to continue"]
pub struct ScaleComputed {
    config: PipelineConfig,
    mask: BinaryMask,
    pixel_area: u64,
    scale: ScaleEstimate,
    plate: Option<PlateDetection>,
}

impl ScaleComputed {
    /// The pixel-to-centimeter scale.
    #[must_use]
    pub const fn scale(&self) -> &ScaleEstimate {
        &self.scale
    }

    /// The plate detection that produced the scale, or `None` if the
    /// scale was supplied through [`AreaComputed::with_scale`].
    #[must_use]
    pub const fn plate_detection(&self) -> Option<&PlateDetection> {
        self.plate.as_ref()
    }

    /// Convert the pixel area to cm² and grams and advance to the
    /// [`Estimated`] stage.
    pub fn estimate(self) -> Estimated {
        let density = self.config.density;
        let estimate = mass::estimate(self.pixel_area, &self.scale, density);
        log::debug!(
            "estimate: {:.3} cm², {:.3} g at {density} g/cm²",
            estimate.area_cm2,
            estimate.grams
        );
        Estimated {
            mask: self.mask,
            result: MassResult {
                pixel_area: self.pixel_area,
                reference_diameter_px: self.scale.reference_diameter_px(),
                px_per_cm: self.scale.px_per_cm(),
                scale_source: self.scale.source(),
                area_cm2: estimate.area_cm2,
                estimated_grams: estimate.grams,
                density_used: density,
            },
            estimate,
        }
    }
}

// ───────────────────────── Stage 4: Estimated ────────────────────────

/// Pipeline state after the final stage.
///
/// Call [`into_result`](Self::into_result) to take the [`MassResult`].
#[must_use = "call .into_result() to take the estimate"]
pub struct Estimated {
    mask: BinaryMask,
    estimate: MassEstimate,
    result: MassResult,
}

impl Estimated {
    /// The binary mask the area was measured on.
    #[must_use]
    pub const fn mask(&self) -> &BinaryMask {
        &self.mask
    }

    /// The full-precision area and mass.
    #[must_use]
    pub const fn estimate(&self) -> &MassEstimate {
        &self.estimate
    }

    /// The full breakdown.
    #[must_use]
    pub const fn result(&self) -> &MassResult {
        &self.result
    }

    /// Consume the pipeline and return the [`MassResult`].
    #[must_use]
    pub fn into_result(self) -> MassResult {
        self.result
    }

    /// Consume the pipeline and return the result together with the mask.
    #[must_use]
    pub fn into_parts(self) -> (MassResult, BinaryMask) {
        (self.result, self.mask)
    }
}

// ───────────────────────── PipelineStage trait ───────────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 5;

/// Trait implemented by every pipeline stage, giving uniform access to
/// its name, position and metrics.
pub trait PipelineStage {
    /// Human-readable name of this stage (e.g. `"segment"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for [`Pending`] through `4`
    /// for [`Estimated`]).
    const INDEX: usize;

    /// Stage-specific metrics for diagnostics.
    ///
    /// Returns `None` for the initial [`Pending`] stage which has not yet
    /// performed any processing.
    fn metrics(&self) -> Option<StageMetrics>;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }
}

impl PipelineStage for Segmented {
    const NAME: &str = "segment";
    const INDEX: usize = 1;

    fn metrics(&self) -> Option<StageMetrics> {
        let (score_min, score_max) = self.score_range();
        Some(StageMetrics::Segmentation {
            input_width: self.input_dimensions().width,
            input_height: self.input_dimensions().height,
            score_width: self.score_dimensions().width,
            score_height: self.score_dimensions().height,
            score_min,
            score_max,
        })
    }
}

impl PipelineStage for AreaComputed {
    const NAME: &str = "area";
    const INDEX: usize = 2;

    fn metrics(&self) -> Option<StageMetrics> {
        let total = self.mask.dimensions().pixel_count();
        #[allow(clippy::cast_precision_loss)]
        let foreground_fraction = if total > 0 {
            self.pixel_area as f64 / total as f64
        } else {
            0.0
        };
        Some(StageMetrics::Area {
            pixel_area: self.pixel_area,
            total_pixel_count: total,
            foreground_fraction,
        })
    }
}

impl PipelineStage for ScaleComputed {
    const NAME: &str = "scale";
    const INDEX: usize = 3;

    fn metrics(&self) -> Option<StageMetrics> {
        let source = match self.scale.source() {
            ScaleSource::Plate { .. } => "plate",
            ScaleSource::FrameWidth => "frame width",
        };
        Some(StageMetrics::Scale {
            source: source.to_owned(),
            circle_count: self.plate.as_ref().map(|p| p.circle_count),
            edge_pixel_count: self.plate.as_ref().map(|p| p.edge_pixel_count),
            reference_diameter_px: self.scale.reference_diameter_px(),
            px_per_cm: self.scale.px_per_cm(),
        })
    }
}

impl PipelineStage for Estimated {
    const NAME: &str = "estimate";
    const INDEX: usize = 4;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Estimate {
            area_cm2: self.estimate.area_cm2,
            grams: self.estimate.grams,
            density: self.result.density_used,
        })
    }
}

// ───────────────────────── Pipeline entry point ──────────────────────

/// Entry point for the typed, incremental pipeline API.
///
/// ```rust
/// # use morsel_pipeline::{Pipeline, PipelineConfig, RgbImage};
/// let pending = Pipeline::new(RgbImage::new(4, 4), PipelineConfig::default());
/// assert_eq!(pending.image().width(), 4);
/// ```
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from a decoded image and config.
    ///
    /// No processing is performed; the image and config are simply
    /// stored. Call [`.segment()`](Pending::segment) to begin.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image: RgbImage, config: PipelineConfig) -> Pending {
        Pending { config, image }
    }
}
