//! Image decoding and grayscale conversion.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces the RGB
//! photograph the pipeline works on. Plate detection then needs a
//! single-channel view of the same photograph.

use image::GrayImage;

use crate::types::{PipelineError, RgbImage};

/// Decode raw image bytes into an 8-bit RGB image.
///
/// Alpha is discarded and other color types are converted.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty or decodes
/// to a zero-size image.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(PipelineError::EmptyInput);
    }
    Ok(rgb)
}

/// Rec.601 luma weights in 14-bit fixed point (0.299, 0.587, 0.114).
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// Convert to grayscale with Rec.601 luma weights, rounding to nearest.
///
/// Not `image::imageops::grayscale`, which weights by Rec.709.
#[must_use = "returns the grayscale image"]
pub fn to_gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let luma = (u32::from(r) * LUMA_R
            + u32::from(g) * LUMA_G
            + u32::from(b) * LUMA_B
            + (1 << (LUMA_SHIFT - 1)))
            >> LUMA_SHIFT;
        image::Luma([u8::try_from(luma).unwrap_or(u8::MAX)])
    })
}
