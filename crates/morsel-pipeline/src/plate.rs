//! Pixel-to-centimeter scale from a reference plate.
//!
//! The photograph is converted to grayscale, blurred, and searched for
//! circles. The largest circle found is taken to be a plate of known
//! diameter. When no circle is found the image width is assumed to span
//! a fixed real-world width instead, so this stage always produces a
//! usable scale.

use crate::blur;
use crate::grayscale;
use crate::hough::{self, Circle};
use crate::types::{PipelineConfig, RgbImage, ScaleEstimate, ScaleSource};

/// Outcome of plate detection, with the evidence used to reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateDetection {
    /// The derived scale.
    pub scale: ScaleEstimate,
    /// Number of circles the Hough transform accepted.
    pub circle_count: usize,
    /// Number of edge pixels in the blurred grayscale image.
    pub edge_pixel_count: u64,
}

/// Detect the reference plate and derive the image scale.
///
/// Never fails: the frame-width fallback applies whenever no plate is
/// found. The returned `px_per_cm` is always strictly positive.
///
/// `config` is assumed to have been validated.
#[must_use = "returns the scale estimate"]
pub fn detect_scale(image: &RgbImage, config: &PipelineConfig) -> ScaleEstimate {
    detect(image, config).scale
}

/// Like [`detect_scale`], but also reports how many circles and edge
/// pixels were seen.
#[must_use = "returns the plate detection"]
pub fn detect(image: &RgbImage, config: &PipelineConfig) -> PlateDetection {
    let gray = grayscale::to_gray(image);
    let blurred = blur::gaussian_blur(&gray, config.blur_sigma);
    let hough = hough::detect(&blurred, &config.hough);

    let scale = largest(&hough.circles)
        .and_then(|plate| {
            let diameter = plate_diameter_px(plate.radius);
            let scale = ScaleEstimate::from_reference(
                diameter,
                config.plate_diameter_cm,
                ScaleSource::Plate {
                    center: plate.center,
                    radius: plate.radius,
                },
            )?;
            log::info!(
                "plate found at ({:.0}, {:.0}), diameter {diameter}px, {:.2} px/cm",
                plate.center.x,
                plate.center.y,
                scale.px_per_cm()
            );
            Some(scale)
        })
        .unwrap_or_else(|| frame_width_scale(image.width(), config.frame_width_cm));

    PlateDetection {
        scale,
        circle_count: hough.circles.len(),
        edge_pixel_count: hough.edge_pixel_count,
    }
}

/// Scale assuming the full image width spans `frame_width_cm`.
///
/// A zero-width image is treated as one pixel wide so the result stays
/// positive.
#[must_use]
pub fn frame_width_scale(width: u32, frame_width_cm: f64) -> ScaleEstimate {
    let width = width.max(1);
    let real_cm = if frame_width_cm.is_finite() && frame_width_cm > 0.0 {
        frame_width_cm
    } else {
        PipelineConfig::DEFAULT_FRAME_WIDTH_CM
    };
    log::info!("no plate found; assuming {width}px spans {real_cm} cm");
    ScaleEstimate::from_positive_parts(f64::from(width) / real_cm, width, ScaleSource::FrameWidth)
}

/// The circle with the largest radius. Earlier circles win ties.
fn largest(circles: &[Circle]) -> Option<&Circle> {
    circles.iter().fold(None, |best: Option<&Circle>, c| match best {
        Some(b) if b.radius >= c.radius => Some(b),
        _ => Some(c),
    })
}

/// Diameter in whole pixels: twice the radius rounded to the nearest
/// integer.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn plate_diameter_px(radius: f64) -> u32 {
    let r = radius.round().clamp(0.0, f64::from(u32::MAX / 2));
    (r as u32) * 2
}
