//! Resampling between the source resolution and the model resolution.
//!
//! The segmentation model works at a fixed square resolution that has no
//! relation to the photograph's aspect ratio. Two resizes bridge the gap:
//! the source image is shrunk (or stretched) to the model input size, and
//! the model's score map is stretched back to the source size so the mask
//! lines up pixel-for-pixel with the photograph.

use std::fmt;

use image::{ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, RgbImage};

/// Single-channel floating-point raster used for score maps.
pub type ScoreImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Resampling filter used when resizing.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts. Produces a stair-step
    /// mask edge when upsampling scores.
    Nearest,
    /// Bilinear interpolation.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom).
    CatmullRom,
    /// Gaussian: smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResampleFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Resize a color image to exactly `target`, ignoring aspect ratio.
#[must_use]
pub fn resize_rgb(image: &RgbImage, target: Dimensions, filter: ResampleFilter) -> RgbImage {
    if Dimensions::of(image) == target {
        return image.clone();
    }
    image::imageops::resize(image, target.width, target.height, filter.to_image_filter())
}

/// Resize a score raster to exactly `target`, ignoring aspect ratio.
///
/// The `image` crate clamps `f32` samples to `[0, 1]` while filtering,
/// so callers should normalize into that range first.
#[must_use]
pub fn resize_scores(scores: &ScoreImage, target: Dimensions, filter: ResampleFilter) -> ScoreImage {
    if Dimensions::of(scores) == target {
        return scores.clone();
    }
    image::imageops::resize(scores, target.width, target.height, filter.to_image_filter())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_triangle() {
        assert_eq!(ResampleFilter::default(), ResampleFilter::Triangle);
    }

    #[test]
    fn rgb_resize_ignores_aspect_ratio() {
        let img = RgbImage::from_pixel(400, 300, image::Rgb([10, 20, 30]));
        let resized = resize_rgb(&img, Dimensions::square(320), ResampleFilter::CatmullRom);
        assert_eq!(Dimensions::of(&resized), Dimensions::square(320));
    }

    #[test]
    fn same_size_is_identity() {
        let scores = ScoreImage::from_fn(4, 3, |x, y| Luma([f32::from(u8::try_from(x + y).unwrap()) / 10.0]));
        let resized = resize_scores(&scores, Dimensions::new(4, 3), ResampleFilter::Triangle);
        assert_eq!(scores, resized);
    }

    #[test]
    fn upsampled_scores_stay_in_unit_range() {
        let scores = ScoreImage::from_fn(8, 8, |x, _| Luma([if x < 4 { 0.0 } else { 1.0 }]));
        let resized = resize_scores(&scores, Dimensions::new(40, 30), ResampleFilter::Triangle);
        assert_eq!(Dimensions::of(&resized), Dimensions::new(40, 30));
        for p in resized.pixels() {
            assert!((0.0..=1.0).contains(&p.0[0]), "out of range: {}", p.0[0]);
        }
    }

    #[test]
    fn bilinear_upsampling_is_continuous() {
        // A hard 0 -> 1 step should pick up intermediate values across
        // the boundary when upsampled with a continuous filter.
        let scores = ScoreImage::from_fn(4, 1, |x, _| Luma([if x < 2 { 0.0 } else { 1.0 }]));
        let resized = resize_scores(&scores, Dimensions::new(16, 1), ResampleFilter::Triangle);
        let intermediate = resized
            .pixels()
            .filter(|p| p.0[0] > 0.01 && p.0[0] < 0.99)
            .count();
        assert!(intermediate > 0, "expected a smooth transition");
    }
}
