//! Gaussian blur for noise reduction before plate detection.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`]. Smoothing suppresses
//! texture on the food and tablecloth that would otherwise cast stray
//! votes in the circle accumulator.

use image::GrayImage;

/// Apply Gaussian blur to a grayscale image.
///
/// A sigma of `1.4` matches a 7x7 kernel. Non-positive sigma values
/// return the image unchanged, since `imageproc`'s underlying function
/// panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    imageproc::filter::gaussian_blur_f32(image, sigma)
}
