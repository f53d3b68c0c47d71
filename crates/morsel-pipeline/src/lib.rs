//! morsel-pipeline: Pure mask-to-mass estimation pipeline (sans-IO).
//!
//! Estimates the mass of a food portion from one photograph through:
//! segmentation -> mask normalization -> pixel area -> plate scale ->
//! area and mass.
//!
//! This crate has **no I/O dependencies** -- it operates on decoded
//! in-memory images and a caller-supplied [`Segmenter`], and returns
//! structured data. Filesystem access and model loading live in
//! `morsel-io`.

pub mod area;
pub mod blur;
pub mod diagnostics;
pub mod edge;
pub mod grayscale;
pub mod hough;
pub mod mask;
pub mod mass;
pub mod pipeline;
pub mod plate;
pub mod resample;
pub mod segment;
pub mod types;

pub use mask::BinaryMask;
pub use mass::MassEstimate;
pub use pipeline::{Estimated, Pipeline};
pub use resample::ResampleFilter;
pub use segment::{InputTensor, ScoreMap, SegmentError, Segmenter};
pub use types::{
    Dimensions, ErrorKind, GrayImage, HoughParams, MassResult, PipelineConfig, PipelineError,
    Point, RgbImage, ScaleEstimate, ScaleSource,
};

/// Run the full estimation pipeline.
///
/// Takes a decoded photograph, a segmentation backend and a
/// configuration, and produces a [`MassResult`] carrying every
/// intermediate number (pixel area, reference diameter, scale, area and
/// mass) at full precision.
///
/// # Pipeline steps
///
/// 1. Validate the configuration
/// 2. Run the segmenter and normalize its scores into a binary mask
///    sized to the photograph
/// 3. Count foreground pixels; zero is an error, not a zero-gram result
/// 4. Detect the reference plate (or fall back to the frame width) for
///    the pixel-to-centimeter scale
/// 5. Convert to cm² and grams
///
/// Step 4 runs on a worker thread during step 2 when
/// `config.concurrent_scale_detection` is set.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the config is rejected,
/// [`PipelineError::EmptyInput`] if the image has no pixels,
/// [`PipelineError::Segmentation`] if the backend fails, and
/// [`PipelineError::EmptySegmentation`] if the mask has no foreground.
pub fn process<S: Segmenter + ?Sized>(
    image: RgbImage,
    segmenter: &mut S,
    config: &PipelineConfig,
) -> Result<MassResult, PipelineError> {
    Ok(process_staged(image, segmenter, config)?.into_result())
}

/// Run the full pipeline and return the final stage, which keeps the
/// binary mask alongside the [`MassResult`].
///
/// # Errors
///
/// Same as [`process`].
pub fn process_staged<S: Segmenter + ?Sized>(
    image: RgbImage,
    segmenter: &mut S,
    config: &PipelineConfig,
) -> Result<Estimated, PipelineError> {
    let pending = Pipeline::new(image, config.clone());
    let segmented = if config.concurrent_scale_detection {
        pending.segment_concurrent(segmenter)?
    } else {
        pending.segment(segmenter)?
    };
    Ok(segmented.measure_area()?.detect_scale().estimate())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Segmenter whose score map marks a fixed rectangle as food.
    struct Rectangle {
        size: Dimensions,
        x: std::ops::Range<u32>,
        y: std::ops::Range<u32>,
    }

    impl Segmenter for Rectangle {
        fn input_dimensions(&self) -> Dimensions {
            self.size
        }

        fn forward(&mut self, _input: &InputTensor) -> Result<ScoreMap, SegmentError> {
            ScoreMap::from_fn(self.size, |x, y| {
                if self.x.contains(&x) && self.y.contains(&y) {
                    0.9
                } else {
                    0.1
                }
            })
        }
    }

    /// Bright plate of `radius` centered on a dark table.
    fn plate_photo(width: u32, height: u32, radius: f64) -> RgbImage {
        let center = Point::new(f64::from(width) / 2.0, f64::from(height) / 2.0);
        RgbImage::from_fn(width, height, |x, y| {
            let d = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5).distance(center);
            if d <= radius {
                image::Rgb([235, 235, 230])
            } else {
                image::Rgb([60, 45, 35])
            }
        })
    }

    #[test]
    fn fallback_scale_end_to_end() {
        let mut model = Rectangle {
            size: Dimensions::new(400, 300),
            x: 100..200,
            y: 100..150,
        };
        let image = RgbImage::from_pixel(400, 300, image::Rgb([120, 110, 100]));
        let result = process(image, &mut model, &PipelineConfig::default()).unwrap();
        assert_eq!(result.pixel_area, 5000);
        assert_eq!(result.scale_source, ScaleSource::FrameWidth);
        assert!((result.px_per_cm - 400.0 / 30.0).abs() < 1e-9);
        assert!((result.area_cm2 - 28.125).abs() < 1e-9);
        assert!((result.estimated_grams - 8.4375).abs() < 1e-9);
    }

    #[test]
    fn plate_scale_end_to_end() {
        // 120x60 food rectangle = 7200 px inside a radius-150 plate.
        let mut model = Rectangle {
            size: Dimensions::new(400, 400),
            x: 140..260,
            y: 170..230,
        };
        let result = process(plate_photo(400, 400, 150.0), &mut model, &PipelineConfig::default())
            .unwrap();
        assert_eq!(result.pixel_area, 7200);
        assert!(matches!(result.scale_source, ScaleSource::Plate { .. }));
        assert!((result.px_per_cm - 12.0).abs() <= 0.2, "{}", result.px_per_cm);
        assert!((result.area_cm2 - 50.0).abs() <= 2.0, "{}", result.area_cm2);
        assert!((result.estimated_grams - 15.0).abs() <= 0.6);
    }

    #[test]
    fn empty_mask_is_an_error() {
        let mut model = Rectangle {
            size: Dimensions::square(32),
            x: 0..0,
            y: 0..0,
        };
        let image = RgbImage::from_pixel(40, 30, image::Rgb([0, 0, 0]));
        let err = process(image, &mut model, &PipelineConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptySegmentation);
        assert_eq!(err.to_string(), "Segmentation failed: no food detected.");
    }

    #[test]
    fn density_override_scales_result() {
        let image = RgbImage::from_pixel(400, 300, image::Rgb([120, 110, 100]));
        let run = |density| {
            let mut model = Rectangle {
                size: Dimensions::new(400, 300),
                x: 100..200,
                y: 100..150,
            };
            let config = PipelineConfig {
                density,
                ..PipelineConfig::default()
            };
            process(image.clone(), &mut model, &config).unwrap()
        };
        let base = run(0.3);
        let heavy = run(0.9);
        assert!((heavy.estimated_grams - 3.0 * base.estimated_grams).abs() < 1e-9);
        assert!((heavy.density_used - 0.9).abs() < f64::EPSILON);
        assert_eq!(heavy.pixel_area, base.pixel_area);
    }

    #[test]
    fn concurrent_flag_gives_same_result() {
        let image = plate_photo(400, 400, 150.0);
        let run = |concurrent_scale_detection| {
            let mut model = Rectangle {
                size: Dimensions::square(40),
                x: 10..30,
                y: 10..30,
            };
            let config = PipelineConfig {
                concurrent_scale_detection,
                ..PipelineConfig::default()
            };
            process(image.clone(), &mut model, &config).unwrap()
        };
        assert_eq!(run(true), run(false));
    }

    #[test]
    fn staged_result_keeps_mask() {
        let mut model = Rectangle {
            size: Dimensions::new(40, 30),
            x: 0..20,
            y: 0..30,
        };
        let image = RgbImage::from_pixel(40, 30, image::Rgb([0, 0, 0]));
        let estimated = process_staged(image, &mut model, &PipelineConfig::default()).unwrap();
        assert_eq!(estimated.mask().dimensions(), Dimensions::new(40, 30));
        assert!(estimated.mask().is_foreground(0, 0));
        assert!(!estimated.mask().is_foreground(39, 0));
        assert_eq!(estimated.result().pixel_area, 600);
    }
}
