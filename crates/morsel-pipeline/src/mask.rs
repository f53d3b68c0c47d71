//! Binary foreground mask: normalize, resample and threshold a score map.
//!
//! Turns the model's raw scores into a mask that lines up pixel-for-pixel
//! with the source photograph:
//!
//! ```text
//! v' = (v - min) / (max - min)        min-max normalize to [0, 1]
//! resize v' to the source image size  continuous interpolation
//! mask = v' > threshold               fixed cut, 0.5 by default
//! ```
//!
//! A constant score map (`max == min`) carries no information and
//! normalizes to all zeros instead of dividing by zero.

use image::Luma;

use crate::resample::{self, ResampleFilter, ScoreImage};
use crate::segment::ScoreMap;
use crate::types::{Dimensions, GrayImage};

/// Foreground mask with every element exactly `0` or `1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    bits: GrayImage,
}

impl BinaryMask {
    /// A mask with no foreground pixels.
    #[must_use]
    pub fn empty(dimensions: Dimensions) -> Self {
        Self {
            bits: GrayImage::new(dimensions.width, dimensions.height),
        }
    }

    /// Build a mask by evaluating `f` at every pixel.
    #[must_use]
    pub fn from_fn(dimensions: Dimensions, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        Self {
            bits: GrayImage::from_fn(dimensions.width, dimensions.height, |x, y| {
                Luma([u8::from(f(x, y))])
            }),
        }
    }

    /// Mask dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.bits)
    }

    /// Whether the pixel at `(x, y)` is foreground.
    ///
    /// Out-of-bounds coordinates are background.
    #[must_use]
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.bits.get_pixel_checked(x, y).is_some_and(|p| p.0[0] == 1)
    }

    /// The raw `0`/`1` samples in row-major order.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.bits.as_raw()
    }

    /// Render as a viewable grayscale image: foreground `255`,
    /// background `0`.
    #[must_use]
    pub fn to_luma8(&self) -> GrayImage {
        GrayImage::from_fn(self.bits.width(), self.bits.height(), |x, y| {
            Luma([self.bits.get_pixel(x, y).0[0] * 255])
        })
    }
}

/// Normalize, resample and threshold `scores` into a mask of `target`
/// dimensions.
///
/// Pure: the result depends only on the arguments.
#[must_use = "returns the binary mask"]
pub fn normalize(
    scores: &ScoreMap,
    target: Dimensions,
    threshold: f32,
    filter: ResampleFilter,
) -> BinaryMask {
    let Some(normalized) = min_max_normalize(scores) else {
        log::warn!("score map is constant; mask is empty");
        return BinaryMask::empty(target);
    };
    let resized = resample::resize_scores(&normalized, target, filter);
    BinaryMask::from_fn(target, |x, y| resized.get_pixel(x, y).0[0] > threshold)
}

/// Scale scores into `[0, 1]`. Returns `None` for a constant map.
fn min_max_normalize(scores: &ScoreMap) -> Option<ScoreImage> {
    let (min, max) = scores.range();
    let span = max - min;
    if !(span > 0.0 && span.is_finite()) {
        return None;
    }
    let raw = scores.as_image();
    Some(ScoreImage::from_fn(raw.width(), raw.height(), |x, y| {
        Luma([((raw.get_pixel(x, y).0[0] - min) / span).clamp(0.0, 1.0)])
    }))
}
