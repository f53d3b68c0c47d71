//! Shared types for the morsel estimation pipeline.

use serde::{Deserialize, Serialize};

use crate::resample::ResampleFilter;
use crate::segment::SegmentError;

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can hand the decoded
/// source photograph to the pipeline without depending on `image`
/// directly.
pub use image::RgbImage;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Square dimensions with the given side length.
    #[must_use]
    pub const fn square(side: u32) -> Self {
        Self {
            width: side,
            height: side,
        }
    }

    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of<I: image::GenericImageView>(image: &I) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns `true` if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Tuning parameters for the circular Hough transform used to find the
/// reference plate.
///
/// The defaults assume a near-filling, roughly centered plate in a
/// photograph of modest resolution. They are not adapted to the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoughParams {
    /// Inverse ratio of accumulator resolution to image resolution.
    /// `2.0` means the accumulator has half the width and height of
    /// the image. Must be at least `1.0`.
    pub resolution_ratio: f64,

    /// Minimum distance in pixels between the centers of two accepted
    /// circles.
    pub min_center_distance: f64,

    /// Upper threshold of the edge detector. The lower threshold is half
    /// of this value.
    pub edge_threshold: f32,

    /// Minimum number of votes a center needs in the accumulator, and the
    /// minimum number of edge pixels supporting the chosen radius.
    pub accumulator_threshold: u32,

    /// Smallest radius searched, in pixels.
    pub min_radius: u32,

    /// Largest radius searched, in pixels. Radii beyond the image
    /// diagonal are never considered.
    pub max_radius: u32,

    /// Fraction of a circle's in-frame circumference that must carry
    /// edge pixels for the circle to be accepted. In `(0, 1]`.
    pub min_rim_coverage: f64,
}

impl HoughParams {
    /// Default accumulator resolution ratio.
    pub const DEFAULT_RESOLUTION_RATIO: f64 = 1.2;
    /// Default minimum center distance in pixels.
    pub const DEFAULT_MIN_CENTER_DISTANCE: f64 = 100.0;
    /// Default upper edge threshold.
    pub const DEFAULT_EDGE_THRESHOLD: f32 = 50.0;
    /// Default accumulator threshold.
    pub const DEFAULT_ACCUMULATOR_THRESHOLD: u32 = 30;
    /// Default minimum radius in pixels.
    pub const DEFAULT_MIN_RADIUS: u32 = 100;
    /// Default maximum radius in pixels.
    pub const DEFAULT_MAX_RADIUS: u32 = 1000;
    /// Default minimum rim coverage.
    pub const DEFAULT_MIN_RIM_COVERAGE: f64 = 0.3;

    fn validate(&self) -> Result<(), PipelineError> {
        if !(self.resolution_ratio.is_finite() && self.resolution_ratio >= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "hough resolution_ratio must be a finite value >= 1.0, got {}",
                self.resolution_ratio
            )));
        }
        if !(self.min_center_distance.is_finite() && self.min_center_distance > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "hough min_center_distance must be positive, got {}",
                self.min_center_distance
            )));
        }
        if !(self.edge_threshold.is_finite() && self.edge_threshold >= crate::edge::MIN_THRESHOLD)
        {
            return Err(PipelineError::InvalidConfig(format!(
                "hough edge_threshold must be at least {}, got {}",
                crate::edge::MIN_THRESHOLD,
                self.edge_threshold
            )));
        }
        if self.accumulator_threshold == 0 {
            return Err(PipelineError::InvalidConfig(
                "hough accumulator_threshold must be at least 1".to_owned(),
            ));
        }
        if self.min_radius == 0 {
            return Err(PipelineError::InvalidConfig(
                "hough min_radius must be at least 1 pixel".to_owned(),
            ));
        }
        if self.max_radius < self.min_radius {
            return Err(PipelineError::InvalidConfig(format!(
                "hough max_radius ({}) must not be below min_radius ({})",
                self.max_radius, self.min_radius
            )));
        }
        if !(self.min_rim_coverage > 0.0 && self.min_rim_coverage <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "hough min_rim_coverage must be in (0, 1], got {}",
                self.min_rim_coverage
            )));
        }
        Ok(())
    }
}

impl Default for HoughParams {
    fn default() -> Self {
        Self {
            resolution_ratio: Self::DEFAULT_RESOLUTION_RATIO,
            min_center_distance: Self::DEFAULT_MIN_CENTER_DISTANCE,
            edge_threshold: Self::DEFAULT_EDGE_THRESHOLD,
            accumulator_threshold: Self::DEFAULT_ACCUMULATOR_THRESHOLD,
            min_radius: Self::DEFAULT_MIN_RADIUS,
            max_radius: Self::DEFAULT_MAX_RADIUS,
            min_rim_coverage: Self::DEFAULT_MIN_RIM_COVERAGE,
        }
    }
}

/// Configuration for the estimation pipeline.
///
/// Every default is exposed as an associated `DEFAULT_*` constant so the
/// command surface and tests can refer to them without constructing a
/// config. Call [`validate`](Self::validate) before running stages; the
/// top-level entry points do so automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Side length of the square tensor fed to the segmentation model.
    pub model_input_size: u32,

    /// Filter used to resize the source image to the model input size.
    pub input_filter: ResampleFilter,

    /// Filter used to resize the normalized score map back to the source
    /// image size. Must be a continuous filter for a smooth mask edge;
    /// [`ResampleFilter::Nearest`] is rejected by
    /// [`validate`](Self::validate).
    pub mask_filter: ResampleFilter,

    /// Normalized scores strictly above this value are foreground.
    pub mask_threshold: f32,

    /// Gaussian blur sigma applied before plate detection. `1.4`
    /// corresponds to a 7x7 kernel.
    pub blur_sigma: f32,

    /// Circular Hough transform tuning.
    pub hough: HoughParams,

    /// Assumed real-world diameter of the reference plate, in cm.
    pub plate_diameter_cm: f64,

    /// Assumed real-world width of the whole frame, in cm. Used only when
    /// no plate is found.
    pub frame_width_cm: f64,

    /// Mass per unit area in g/cm².
    pub density: f64,

    /// Run plate detection on a worker thread while segmentation runs on
    /// the calling thread.
    pub concurrent_scale_detection: bool,
}

impl PipelineConfig {
    /// Default model input size (U²-Net style saliency models use 320).
    pub const DEFAULT_MODEL_INPUT_SIZE: u32 = 320;
    /// Default filter for the model input resize.
    pub const DEFAULT_INPUT_FILTER: ResampleFilter = ResampleFilter::CatmullRom;
    /// Default filter for the score map resize.
    pub const DEFAULT_MASK_FILTER: ResampleFilter = ResampleFilter::Triangle;
    /// Default foreground threshold.
    pub const DEFAULT_MASK_THRESHOLD: f32 = 0.5;
    /// Default blur sigma.
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.4;
    /// Default plate diameter in cm.
    pub const DEFAULT_PLATE_DIAMETER_CM: f64 = 25.0;
    /// Default frame width in cm.
    pub const DEFAULT_FRAME_WIDTH_CM: f64 = 30.0;
    /// Default density: a rough average for food, in g/cm².
    pub const DEFAULT_DENSITY: f64 = 0.3;

    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.model_input_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "model_input_size must be at least 1".to_owned(),
            ));
        }
        if self.mask_filter == ResampleFilter::Nearest {
            return Err(PipelineError::InvalidConfig(
                "mask_filter must interpolate; nearest-neighbor is not allowed".to_owned(),
            ));
        }
        if !(self.mask_threshold.is_finite() && (0.0..1.0).contains(&self.mask_threshold)) {
            return Err(PipelineError::InvalidConfig(format!(
                "mask_threshold must be in [0, 1), got {}",
                self.mask_threshold
            )));
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "blur_sigma must be a finite non-negative value, got {}",
                self.blur_sigma
            )));
        }
        self.hough.validate()?;
        for (name, value) in [
            ("plate_diameter_cm", self.plate_diameter_cm),
            ("frame_width_cm", self.frame_width_cm),
            ("density", self.density),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be a finite positive value, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_input_size: Self::DEFAULT_MODEL_INPUT_SIZE,
            input_filter: Self::DEFAULT_INPUT_FILTER,
            mask_filter: Self::DEFAULT_MASK_FILTER,
            mask_threshold: Self::DEFAULT_MASK_THRESHOLD,
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            hough: HoughParams::default(),
            plate_diameter_cm: Self::DEFAULT_PLATE_DIAMETER_CM,
            frame_width_cm: Self::DEFAULT_FRAME_WIDTH_CM,
            density: Self::DEFAULT_DENSITY,
            concurrent_scale_detection: false,
        }
    }
}

/// Where a [`ScaleEstimate`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScaleSource {
    /// A circular plate was detected.
    Plate {
        /// Plate center in image coordinates.
        center: Point,
        /// Detected radius in pixels, before rounding.
        radius: f64,
    },
    /// No plate was found; the frame width was used instead.
    FrameWidth,
}

/// Pixel-to-centimeter scale derived from a reference object.
///
/// `px_per_cm` is strictly positive for every value that can be
/// constructed, so dividing by it is always defined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleEstimate {
    px_per_cm: f64,
    reference_diameter_px: u32,
    source: ScaleSource,
}

impl ScaleEstimate {
    /// Build a scale from a reference object of `reference_diameter_px`
    /// pixels that is known to measure `real_cm` centimeters.
    ///
    /// Returns `None` for a zero-size reference or a non-positive
    /// real-world size.
    #[must_use]
    pub fn from_reference(reference_diameter_px: u32, real_cm: f64, source: ScaleSource) -> Option<Self> {
        if reference_diameter_px == 0 || !(real_cm.is_finite() && real_cm > 0.0) {
            return None;
        }
        Some(Self {
            px_per_cm: f64::from(reference_diameter_px) / real_cm,
            reference_diameter_px,
            source,
        })
    }

    /// Construct from values the caller has already checked to be
    /// positive.
    pub(crate) fn from_positive_parts(
        px_per_cm: f64,
        reference_diameter_px: u32,
        source: ScaleSource,
    ) -> Self {
        debug_assert!(px_per_cm > 0.0 && reference_diameter_px > 0);
        Self {
            px_per_cm,
            reference_diameter_px,
            source,
        }
    }

    /// Pixels per centimeter. Always `> 0`.
    #[must_use]
    pub const fn px_per_cm(&self) -> f64 {
        self.px_per_cm
    }

    /// Diameter of the reference object in pixels. Always `> 0`.
    #[must_use]
    pub const fn reference_diameter_px(&self) -> u32 {
        self.reference_diameter_px
    }

    /// Which reference produced this scale.
    #[must_use]
    pub const fn source(&self) -> ScaleSource {
        self.source
    }
}

/// Full breakdown of one estimation run.
///
/// Every intermediate numeric artifact is kept so each stage can be
/// audited; the estimate is never reported as a bare number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MassResult {
    /// Number of foreground pixels in the mask.
    pub pixel_area: u64,
    /// Diameter in pixels of the reference used for the scale.
    pub reference_diameter_px: u32,
    /// Pixels per centimeter.
    pub px_per_cm: f64,
    /// Which reference produced the scale.
    pub scale_source: ScaleSource,
    /// Foreground area in cm², full precision.
    pub area_cm2: f64,
    /// Estimated mass in grams, full precision.
    pub estimated_grams: f64,
    /// Density the estimate was computed with, in g/cm².
    pub density_used: f64,
}

/// Coarse classification of a failure, used by callers to pick a
/// response without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The image or the model artifact does not exist.
    NotFound,
    /// The mask had zero foreground pixels.
    EmptySegmentation,
    /// The configuration was rejected before any stage ran.
    InvalidConfig,
    /// Any other fault.
    Internal,
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image has no pixels.
    #[error("input image is empty")]
    EmptyInput,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The segmentation backend failed or produced unusable output.
    #[error("segmentation model failed: {0}")]
    Segmentation(#[from] SegmentError),

    /// Thresholding left no foreground pixels.
    #[error("Segmentation failed: no food detected.")]
    EmptySegmentation,

    /// A worker thread panicked.
    #[error("{0} worker panicked")]
    WorkerPanicked(&'static str),
}

impl PipelineError {
    /// The kind of failure this error represents.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptySegmentation => ErrorKind::EmptySegmentation,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::ImageDecode(_)
            | Self::EmptyInput
            | Self::Segmentation(_)
            | Self::WorkerPanicked(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Point tests ---

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    // --- Dimensions tests ---

    #[test]
    fn dimensions_pixel_count_does_not_overflow() {
        let d = Dimensions::new(u32::MAX, 2);
        assert_eq!(d.pixel_count(), u64::from(u32::MAX) * 2);
    }

    #[test]
    fn dimensions_empty() {
        assert!(Dimensions::new(0, 5).is_empty());
        assert!(Dimensions::new(5, 0).is_empty());
        assert!(!Dimensions::square(1).is_empty());
    }

    // --- PipelineConfig tests ---

    #[test]
    fn default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn default_constants_match_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.model_input_size, 320);
        assert!((config.mask_threshold - 0.5).abs() < f32::EPSILON);
        assert!((config.plate_diameter_cm - 25.0).abs() < f64::EPSILON);
        assert!((config.frame_width_cm - 30.0).abs() < f64::EPSILON);
        assert!((config.density - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.hough.min_radius, 100);
        assert_eq!(config.hough.max_radius, 1000);
        assert!(!config.concurrent_scale_detection);
    }

    #[test]
    fn non_positive_density_rejected() {
        for density in [0.0, -0.3, f64::NAN, f64::INFINITY] {
            let config = PipelineConfig {
                density,
                ..PipelineConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfig, "density={density}");
        }
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let config = PipelineConfig {
            mask_threshold: 1.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn inverted_radius_window_rejected() {
        let config = PipelineConfig {
            hough: HoughParams {
                min_radius: 200,
                max_radius: 100,
                ..HoughParams::default()
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn nearest_mask_filter_rejected() {
        let config = PipelineConfig {
            mask_filter: ResampleFilter::Nearest,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        // The model input resize may still use it.
        let config = PipelineConfig {
            input_filter: ResampleFilter::Nearest,
            ..PipelineConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn rim_coverage_out_of_range_rejected() {
        for min_rim_coverage in [0.0, -0.1, 1.5, f64::NAN] {
            let config = PipelineConfig {
                hough: HoughParams {
                    min_rim_coverage,
                    ..HoughParams::default()
                },
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err(), "coverage={min_rim_coverage}");
        }
    }

    #[test]
    fn zero_min_radius_rejected() {
        let config = PipelineConfig {
            hough: HoughParams {
                min_radius: 0,
                ..HoughParams::default()
            },
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"density": 0.5, "hough": {"min_radius": 50}}"#).unwrap();
        assert!((config.density - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.hough.min_radius, 50);
        assert_eq!(config.hough.max_radius, HoughParams::DEFAULT_MAX_RADIUS);
        assert_eq!(config.model_input_size, PipelineConfig::DEFAULT_MODEL_INPUT_SIZE);
    }

    #[test]
    fn config_json_round_trip() {
        let config = PipelineConfig {
            density: 0.42,
            concurrent_scale_detection: true,
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    // --- ScaleEstimate tests ---

    #[test]
    fn scale_from_plate_diameter() {
        let scale = ScaleEstimate::from_reference(300, 25.0, ScaleSource::FrameWidth).unwrap();
        assert!((scale.px_per_cm() - 12.0).abs() < 1e-12);
        assert_eq!(scale.reference_diameter_px(), 300);
    }

    #[test]
    fn zero_size_reference_rejected() {
        assert!(ScaleEstimate::from_reference(0, 25.0, ScaleSource::FrameWidth).is_none());
        assert!(ScaleEstimate::from_reference(10, 0.0, ScaleSource::FrameWidth).is_none());
        assert!(ScaleEstimate::from_reference(10, f64::NAN, ScaleSource::FrameWidth).is_none());
    }

    // --- PipelineError tests ---

    #[test]
    fn error_kinds() {
        assert_eq!(
            PipelineError::EmptySegmentation.kind(),
            ErrorKind::EmptySegmentation
        );
        assert_eq!(PipelineError::EmptyInput.kind(), ErrorKind::Internal);
        assert_eq!(
            PipelineError::WorkerPanicked("plate detection").kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            PipelineError::Segmentation(SegmentError::NonFiniteScore).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn empty_segmentation_message() {
        assert_eq!(
            PipelineError::EmptySegmentation.to_string(),
            "Segmentation failed: no food detected."
        );
    }
}
