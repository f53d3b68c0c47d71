//! Raster image loading and mask encoding.
//!
//! Decodes the photograph from disk into the pipeline's `RgbImage` and
//! encodes a `BinaryMask` as an 8-bit grayscale PNG (foreground 255,
//! background 0).

use std::path::Path;

use image::ImageEncoder;
use morsel_pipeline::{BinaryMask, GrayImage, RgbImage};

use crate::error::{Resource, RunError};
use crate::resource;

/// Read and decode the photograph at `path`.
///
/// # Errors
///
/// Returns [`RunError::NotFound`] or [`RunError::Read`] if the file
/// cannot be read, and [`RunError::Pipeline`] if the bytes are not a
/// supported image (PNG, JPEG, BMP, WebP) or decode to zero pixels.
pub fn load_image(path: &Path) -> Result<RgbImage, RunError> {
    let bytes = resource::read(Resource::Image, path)?;
    let image = morsel_pipeline::grayscale::decode_rgb(&bytes)?;
    log::debug!(
        "decoded {} ({} bytes) to {}x{}",
        path.display(),
        bytes.len(),
        image.width(),
        image.height()
    );
    Ok(image)
}

/// Encode a `GrayImage` as PNG bytes.
///
/// # Errors
///
/// Returns the encoder's error if PNG encoding fails.
pub fn encode_gray_png(image: &GrayImage) -> Result<Vec<u8>, image::ImageError> {
    let mut png_bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::L8,
    )?;
    Ok(png_bytes)
}

/// Write `mask` to `path` as a PNG.
///
/// # Errors
///
/// Returns [`RunError::MaskWrite`] if encoding or writing fails.
pub fn write_mask_png(path: &Path, mask: &BinaryMask) -> Result<(), RunError> {
    let mask_write = |source| RunError::MaskWrite {
        path: path.to_path_buf(),
        source,
    };
    let png = encode_gray_png(&mask.to_luma8()).map_err(mask_write)?;
    std::fs::write(path, &png).map_err(|e| mask_write(image::ImageError::IoError(e)))?;
    log::info!("mask written to {} ({} bytes)", path.display(), png.len());
    Ok(())
}
