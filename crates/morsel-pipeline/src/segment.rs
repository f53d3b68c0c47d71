//! Segmentation model boundary.
//!
//! The network that scores pixels as food or background is opaque to
//! the pipeline. This module defines the [`Segmenter`] trait it is
//! reached through, the [`InputTensor`] handed to it and the
//! [`ScoreMap`] it returns.
//!
//! # Strategy pattern
//!
//! Any backend (an ONNX runtime, a remote service, a fixed test map)
//! can be plugged in without touching mask normalization or any
//! downstream stage.

use image::Luma;

use crate::resample::{self, ResampleFilter, ScoreImage};
use crate::types::{Dimensions, RgbImage};

/// Errors raised at the segmentation boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SegmentError {
    /// The backend itself failed (inference error, bad model file, ...).
    #[error("{0}")]
    Backend(String),

    /// The input tensor does not match what the backend expects.
    #[error("input tensor is {actual:?}, model expects {expected:?}")]
    InputShape {
        /// Dimensions the model was built for.
        expected: Dimensions,
        /// Dimensions that were supplied.
        actual: Dimensions,
    },

    /// The score buffer length does not match the stated dimensions.
    #[error("score map of {dimensions:?} needs {expected} values, got {actual}")]
    OutputShape {
        /// Stated dimensions of the score map.
        dimensions: Dimensions,
        /// Number of values those dimensions require.
        expected: u64,
        /// Number of values actually produced.
        actual: usize,
    },

    /// The score map is empty or contains NaN or infinite values.
    #[error("score map contains no finite scores")]
    NonFiniteScore,
}

/// Model input: one RGB image in NCHW layout (`[1, 3, H, W]`), scaled
/// to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    dimensions: Dimensions,
    data: Vec<f32>,
}

impl InputTensor {
    /// Resize `image` to `size` and lay it out channel-first with every
    /// sample divided by 255.
    ///
    /// No mean/std normalization is applied.
    #[must_use]
    pub fn from_image(image: &RgbImage, size: Dimensions, filter: ResampleFilter) -> Self {
        let resized = resample::resize_rgb(image, size, filter);
        let plane = usize::try_from(size.pixel_count()).unwrap_or(usize::MAX);
        let mut data = vec![0.0_f32; plane.saturating_mul(3)];
        for (i, pixel) in resized.pixels().enumerate() {
            for (c, &sample) in pixel.0.iter().enumerate() {
                data[c * plane + i] = f32::from(sample) / 255.0;
            }
        }
        Self {
            dimensions: size,
            data,
        }
    }

    /// Spatial dimensions (`W`, `H`).
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Tensor shape as `[N, C, H, W]`.
    #[must_use]
    pub fn shape(&self) -> [usize; 4] {
        [
            1,
            3,
            self.dimensions.height as usize,
            self.dimensions.width as usize,
        ]
    }

    /// Flat NCHW sample buffer.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Raw per-pixel foreground scores produced by a [`Segmenter`].
///
/// Values are unnormalized and the resolution is whatever the model
/// produces, independent of the source image. Every value is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMap {
    scores: ScoreImage,
}

impl ScoreMap {
    /// Wrap a row-major buffer of `dimensions.width * dimensions.height`
    /// scores.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::OutputShape`] when the buffer length does
    /// not match the dimensions, and [`SegmentError::NonFiniteScore`]
    /// when the map is empty or any value is NaN or infinite.
    pub fn new(dimensions: Dimensions, values: Vec<f32>) -> Result<Self, SegmentError> {
        let actual = values.len();
        let shape_error = || SegmentError::OutputShape {
            dimensions,
            expected: dimensions.pixel_count(),
            actual,
        };
        if u64::try_from(actual).ok() != Some(dimensions.pixel_count()) {
            return Err(shape_error());
        }
        if dimensions.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return Err(SegmentError::NonFiniteScore);
        }
        let scores = ScoreImage::from_raw(dimensions.width, dimensions.height, values)
            .ok_or_else(shape_error)?;
        Ok(Self { scores })
    }

    /// Build a score map by evaluating `f` at every pixel.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::NonFiniteScore`] if `f` yields a NaN or
    /// infinite value or the dimensions are empty.
    pub fn from_fn(
        dimensions: Dimensions,
        mut f: impl FnMut(u32, u32) -> f32,
    ) -> Result<Self, SegmentError> {
        let scores = ScoreImage::from_fn(dimensions.width, dimensions.height, |x, y| Luma([f(x, y)]));
        Self::new(dimensions, scores.into_raw())
    }

    /// Resolution of the score map.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.scores)
    }

    /// Smallest and largest score.
    #[must_use]
    pub fn range(&self) -> (f32, f32) {
        self.scores
            .as_raw()
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// Borrow the underlying raster.
    #[must_use]
    pub const fn as_image(&self) -> &ScoreImage {
        &self.scores
    }
}

/// A segmentation backend: image tensor in, raw score map out.
///
/// Implementations must be deterministic for identical weights and
/// input. They need to be reusable for sequential calls; thread safety
/// is only required if an implementation chooses to offer it.
pub trait Segmenter {
    /// Spatial size the model expects its input tensor to have.
    fn input_dimensions(&self) -> Dimensions;

    /// Run the model on one input tensor.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError`] if inference fails or the model output
    /// cannot be interpreted as a 2-D score map.
    fn forward(&mut self, input: &InputTensor) -> Result<ScoreMap, SegmentError>;
}

impl<S: Segmenter + ?Sized> Segmenter for &mut S {
    fn input_dimensions(&self) -> Dimensions {
        (**self).input_dimensions()
    }

    fn forward(&mut self, input: &InputTensor) -> Result<ScoreMap, SegmentError> {
        (**self).forward(input)
    }
}

impl<S: Segmenter + ?Sized> Segmenter for Box<S> {
    fn input_dimensions(&self) -> Dimensions {
        (**self).input_dimensions()
    }

    fn forward(&mut self, input: &InputTensor) -> Result<ScoreMap, SegmentError> {
        (**self).forward(input)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tensor_layout_is_channel_first() {
        // 2x1 image: left pixel pure red, right pixel pure blue.
        let img = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 255])
            }
        });
        let tensor = InputTensor::from_image(&img, Dimensions::new(2, 1), ResampleFilter::Nearest);
        assert_eq!(tensor.shape(), [1, 3, 1, 2]);
        // R plane, G plane, B plane.
        assert_eq!(tensor.as_slice(), &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn tensor_resized_to_model_size() {
        let img = RgbImage::from_pixel(400, 300, image::Rgb([51, 102, 204]));
        let tensor =
            InputTensor::from_image(&img, Dimensions::square(320), ResampleFilter::CatmullRom);
        assert_eq!(tensor.dimensions(), Dimensions::square(320));
        assert_eq!(tensor.as_slice().len(), 3 * 320 * 320);
        assert!((tensor.as_slice()[0] - 0.2).abs() < 0.01);
    }

    #[test]
    fn score_map_rejects_length_mismatch() {
        let result = ScoreMap::new(Dimensions::new(2, 2), vec![0.0; 3]);
        assert!(matches!(result, Err(SegmentError::OutputShape { .. })));
    }

    #[test]
    fn score_map_rejects_non_finite() {
        let result = ScoreMap::new(Dimensions::new(2, 1), vec![0.0, f32::NAN]);
        assert_eq!(result, Err(SegmentError::NonFiniteScore));
        let result = ScoreMap::new(Dimensions::new(2, 1), vec![f32::INFINITY, 0.0]);
        assert_eq!(result, Err(SegmentError::NonFiniteScore));
    }

    #[test]
    fn score_map_rejects_empty() {
        let result = ScoreMap::new(Dimensions::new(0, 0), vec![]);
        assert_eq!(result, Err(SegmentError::NonFiniteScore));
    }

    #[test]
    fn score_map_range() {
        let map = ScoreMap::new(Dimensions::new(3, 1), vec![-2.0, 5.0, 1.0]).unwrap();
        assert_eq!(map.range(), (-2.0, 5.0));
    }

    #[test]
    fn boxed_segmenter_delegates() {
        struct Fixed;
        impl Segmenter for Fixed {
            fn input_dimensions(&self) -> Dimensions {
                Dimensions::square(4)
            }
            fn forward(&mut self, _input: &InputTensor) -> Result<ScoreMap, SegmentError> {
                ScoreMap::from_fn(Dimensions::square(4), |_, _| 1.0)
            }
        }

        let mut boxed: Box<dyn Segmenter> = Box::new(Fixed);
        assert_eq!(boxed.input_dimensions(), Dimensions::square(4));
        let input = InputTensor::from_image(
            &RgbImage::new(4, 4),
            boxed.input_dimensions(),
            ResampleFilter::Nearest,
        );
        let map = boxed.forward(&input).unwrap();
        assert_eq!(map.dimensions(), Dimensions::square(4));
    }
}
