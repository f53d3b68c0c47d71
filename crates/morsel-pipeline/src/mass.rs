//! Pixel area to physical area to mass.
//!
//! ```text
//! area_cm2 = pixel_area / px_per_cm²
//! grams    = area_cm2 * density
//! ```
//!
//! Values are kept at full precision; rounding is a presentation concern.

use serde::Serialize;

use crate::types::ScaleEstimate;

/// Physical area and mass derived from a pixel count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MassEstimate {
    /// Area in cm².
    pub area_cm2: f64,
    /// Mass in grams.
    pub grams: f64,
}

/// Convert `pixel_area` to cm² using `scale`, then to grams using
/// `density` (g/cm²).
///
/// `density` is assumed to be finite and positive; the pipeline config
/// rejects anything else before this stage runs.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate(pixel_area: u64, scale: &ScaleEstimate, density: f64) -> MassEstimate {
    let ppc = scale.px_per_cm();
    debug_assert!(ppc > 0.0, "scale must be positive");
    // Divided twice: 5000 px at 400/30 px/cm is exactly 28.125 cm².
    let area_cm2 = pixel_area as f64 / ppc / ppc;
    MassEstimate {
        area_cm2,
        grams: area_cm2 * density,
    }
}
