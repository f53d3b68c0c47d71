//! JSON response shapes.
//!
//! A run answers with exactly one of these objects: [`MassReport`] on
//! success, [`ErrorReport`] on failure. Never both.

use morsel_pipeline::MassResult;
use serde::{Deserialize, Serialize};

use crate::error::RunError;

/// Successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassReport {
    /// Foreground pixel count.
    pub segmented_area_pixels: u64,
    /// Diameter in pixels of the reference used for the scale (the plate,
    /// or the frame width when no plate was found).
    pub plate_diameter_px: u32,
    /// Food area in cm², rounded to two decimals.
    pub area_cm2: f64,
    /// Estimated mass in grams, rounded to two decimals.
    pub estimated_grams: f64,
    /// Density the estimate was computed with, in g/cm².
    pub used_density: f64,
}

impl From<&MassResult> for MassReport {
    fn from(result: &MassResult) -> Self {
        Self {
            segmented_area_pixels: result.pixel_area,
            plate_diameter_px: result.reference_diameter_px,
            area_cm2: round2(result.area_cm2),
            estimated_grams: round2(result.estimated_grams),
            used_density: result.density_used,
        }
    }
}

/// Failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Human-readable description of what went wrong.
    pub error: String,
}

impl ErrorReport {
    /// Wrap any message.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl From<&RunError> for ErrorReport {
    fn from(err: &RunError) -> Self {
        Self::new(err.to_string())
    }
}

/// Round to two decimal places, halves away from zero.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use morsel_pipeline::{PipelineError, ScaleSource};

    use super::*;

    fn fallback_result() -> MassResult {
        MassResult {
            pixel_area: 5000,
            reference_diameter_px: 400,
            px_per_cm: 400.0 / 30.0,
            scale_source: ScaleSource::FrameWidth,
            area_cm2: 28.125,
            estimated_grams: 8.4375,
            density_used: 0.3,
        }
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert!((round2(8.4375) - 8.44).abs() < 1e-12);
        assert!((round2(28.125) - 28.13).abs() < 1e-12);
        assert!((round2(15.0) - 15.0).abs() < 1e-12);
        assert!((round2(0.004) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn report_has_exactly_the_response_fields() {
        let json = serde_json::to_value(MassReport::from(&fallback_result())).unwrap();
        let object = json.as_object().unwrap();
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "area_cm2",
                "estimated_grams",
                "plate_diameter_px",
                "segmented_area_pixels",
                "used_density"
            ]
        );
        assert_eq!(json["segmented_area_pixels"], 5000);
        assert_eq!(json["plate_diameter_px"], 400);
        assert_eq!(json["estimated_grams"], 8.44);
        assert_eq!(json["used_density"], 0.3);
    }

    #[test]
    fn error_report_shape() {
        let err = RunError::from(PipelineError::EmptySegmentation);
        let json = serde_json::to_string(&ErrorReport::from(&err)).unwrap();
        assert_eq!(json, r#"{"error":"Segmentation failed: no food detected."}"#);
    }
}
