//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! threshold tuning and checking how a run arrived at its estimate.
//! [`process_with_diagnostics`] collects them alongside the pipeline
//! result.
//!
//! Duration measurements use [`std::time::Duration`]. Timestamps come
//! from a caller-supplied [`Clock`] so the core never reads the system
//! time itself.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{Estimated, Pipeline, PipelineStage};
use crate::segment::Segmenter;
use crate::types::{Dimensions, PipelineConfig, PipelineError, RgbImage};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of monotonic timestamps.
///
/// The binary implements this with `std::time::Instant`; tests use a
/// fake that advances by a fixed step.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics collected from a single pipeline run.
///
/// Each field captures metrics for one logical stage of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: model forward pass and mask normalization.
    pub segmentation: StageDiagnostics,
    /// Stage 2: foreground pixel count.
    pub area: StageDiagnostics,
    /// Stage 3: plate detection and scale.
    pub scale: StageDiagnostics,
    /// Stage 4: area and mass conversion.
    pub estimate: StageDiagnostics,
    /// Whether plate detection ran concurrently with segmentation. When
    /// it did, its time is part of the segmentation stage.
    pub concurrent_scale_detection: bool,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: Option<StageMetrics>,
}

/// Stage-specific metrics that vary by pipeline stage.
///
/// Each variant captures the counts and sizes meaningful for that
/// particular processing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Segmentation metrics.
    Segmentation {
        /// Model input width in pixels.
        input_width: u32,
        /// Model input height in pixels.
        input_height: u32,
        /// Score map width in pixels.
        score_width: u32,
        /// Score map height in pixels.
        score_height: u32,
        /// Smallest raw score.
        score_min: f32,
        /// Largest raw score.
        score_max: f32,
    },
    /// Area metrics.
    Area {
        /// Number of foreground pixels.
        pixel_area: u64,
        /// Total pixel count of the mask.
        total_pixel_count: u64,
        /// `pixel_area / total_pixel_count`.
        foreground_fraction: f64,
    },
    /// Scale metrics.
    Scale {
        /// `"plate"` or `"frame width"`.
        source: String,
        /// Circles accepted by the Hough transform, if detection ran.
        circle_count: Option<usize>,
        /// Edge pixels that voted, if detection ran.
        edge_pixel_count: Option<u64>,
        /// Diameter of the reference in pixels.
        reference_diameter_px: u32,
        /// Pixels per centimeter.
        px_per_cm: f64,
    },
    /// Mass estimate metrics.
    Estimate {
        /// Area in cm².
        area_cm2: f64,
        /// Mass in grams.
        grams: f64,
        /// Density used, g/cm².
        density: f64,
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Foreground pixel count.
    pub pixel_area: u64,
    /// Final estimate in grams.
    pub estimated_grams: f64,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        if self.concurrent_scale_detection {
            lines.push("Plate detection overlapped segmentation".to_owned());
        }
        lines.push(String::new());

        // Per-stage breakdown.
        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        let stages = [
            ("Segmentation", &self.segmentation),
            ("Area", &self.area),
            ("Scale", &self.scale),
            ("Estimate", &self.estimate),
        ];

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = diag
                .metrics
                .as_ref()
                .map_or_else(|| "-".to_owned(), format_metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Foreground pixels: {}  |  Estimate: {:.2} g",
            self.summary.pixel_area, self.summary.estimated_grams,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Segmentation {
            input_width,
            input_height,
            score_width,
            score_height,
            score_min,
            score_max,
        } => format!(
            "{input_width}x{input_height} -> {score_width}x{score_height} scores in [{score_min:.3}, {score_max:.3}]",
        ),
        StageMetrics::Area {
            pixel_area,
            foreground_fraction,
            ..
        } => format!(
            "{pixel_area} px ({:.1}% of frame)",
            foreground_fraction * 100.0
        ),
        StageMetrics::Scale {
            source,
            circle_count,
            edge_pixel_count,
            reference_diameter_px,
            px_per_cm,
        } => {
            let evidence = match (circle_count, edge_pixel_count) {
                (Some(circles), Some(edges)) => format!(" circles={circles} edges={edges}"),
                _ => String::new(),
            };
            format!("{source} d={reference_diameter_px}px {px_per_cm:.2} px/cm{evidence}")
        }
        StageMetrics::Estimate {
            area_cm2,
            grams,
            density,
        } => format!("{area_cm2:.2} cm² x {density} g/cm² = {grams:.2} g"),
    }
}

/// Collects [`StageDiagnostics`] while the caller advances the pipeline
/// one stage at a time.
///
/// Each stage transition is wrapped in [`record`](Self::record) or
/// [`try_record`](Self::try_record); the stage type decides which slot
/// the timing lands in. [`finish`](Self::finish) assembles the report
/// once the pipeline reaches [`Estimated`].
pub struct DiagnosticsRecorder<'c, C: Clock> {
    clock: &'c C,
    run_start: C::Instant,
    dimensions: Dimensions,
    concurrent: bool,
    segmentation: StageDiagnostics,
    area: StageDiagnostics,
    scale: StageDiagnostics,
    estimate: StageDiagnostics,
}

impl<'c, C: Clock> DiagnosticsRecorder<'c, C> {
    /// Start timing a run over an image of `dimensions`.
    #[must_use]
    pub fn start(clock: &'c C, dimensions: Dimensions, concurrent: bool) -> Self {
        Self {
            run_start: clock.now(),
            clock,
            dimensions,
            concurrent,
            segmentation: StageDiagnostics::default(),
            area: StageDiagnostics::default(),
            scale: StageDiagnostics::default(),
            estimate: StageDiagnostics::default(),
        }
    }

    /// Time an infallible stage transition.
    pub fn record<T: PipelineStage>(&mut self, advance: impl FnOnce() -> T) -> T {
        let start = self.clock.now();
        let next = advance();
        self.store(&next, self.clock.elapsed(&start));
        next
    }

    /// Time a fallible stage transition. Nothing is stored on error.
    ///
    /// # Errors
    ///
    /// Returns whatever `advance` returns.
    pub fn try_record<T: PipelineStage>(
        &mut self,
        advance: impl FnOnce() -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        let start = self.clock.now();
        let next = advance()?;
        self.store(&next, self.clock.elapsed(&start));
        Ok(next)
    }

    fn store<T: PipelineStage>(&mut self, stage: &T, duration: Duration) {
        log::debug!("stage {} took {:.3}ms", T::NAME, duration_ms(duration));
        let slot = match T::INDEX {
            1 => &mut self.segmentation,
            2 => &mut self.area,
            3 => &mut self.scale,
            4 => &mut self.estimate,
            _ => return,
        };
        *slot = StageDiagnostics {
            duration,
            metrics: stage.metrics(),
        };
    }

    /// Assemble the diagnostics for a completed run.
    #[must_use]
    pub fn finish(self, estimated: &Estimated) -> PipelineDiagnostics {
        let summary = PipelineSummary {
            image_width: self.dimensions.width,
            image_height: self.dimensions.height,
            pixel_count: self.dimensions.pixel_count(),
            pixel_area: estimated.result().pixel_area,
            estimated_grams: estimated.result().estimated_grams,
        };
        PipelineDiagnostics {
            total_duration: self.clock.elapsed(&self.run_start),
            segmentation: self.segmentation,
            area: self.area,
            scale: self.scale,
            estimate: self.estimate,
            concurrent_scale_detection: self.concurrent,
            summary,
        }
    }
}

/// Run the full pipeline, timing every stage with `clock`.
///
/// Behaves exactly like [`crate::process`] (including the concurrent
/// path when `config.concurrent_scale_detection` is set) but also
/// returns the final stage, so the caller keeps the mask, and the
/// collected diagnostics.
///
/// # Errors
///
/// Same as [`crate::process`].
pub fn process_with_diagnostics<S, C>(
    image: RgbImage,
    segmenter: &mut S,
    config: &PipelineConfig,
    clock: &C,
) -> Result<(Estimated, PipelineDiagnostics), PipelineError>
where
    S: Segmenter + ?Sized,
    C: Clock,
{
    let concurrent = config.concurrent_scale_detection;
    let mut recorder = DiagnosticsRecorder::start(clock, Dimensions::of(&image), concurrent);

    let pending = Pipeline::new(image, config.clone());
    let segmented = recorder.try_record(|| {
        if concurrent {
            pending.segment_concurrent(segmenter)
        } else {
            pending.segment(segmenter)
        }
    })?;
    let area_computed = recorder.try_record(|| segmented.measure_area())?;
    let scaled = recorder.record(|| area_computed.detect_scale());
    let estimated = recorder.record(|| scaled.estimate());

    let diagnostics = recorder.finish(&estimated);
    Ok((estimated, diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::segment::{InputTensor, ScoreMap, SegmentError};

    /// Clock that advances one millisecond per reading.
    struct StepClock {
        ticks: Cell<u64>,
    }

    impl Clock for StepClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.ticks.get();
            self.ticks.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    /// Left half of the frame is food.
    struct LeftHalf;

    impl Segmenter for LeftHalf {
        fn input_dimensions(&self) -> Dimensions {
            Dimensions::square(32)
        }

        fn forward(&mut self, _input: &InputTensor) -> Result<ScoreMap, SegmentError> {
            ScoreMap::from_fn(Dimensions::square(32), |x, _| if x < 16 { 1.0 } else { 0.0 })
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        let ms = duration_ms(d);
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn diagnostics_cover_every_stage() {
        let clock = StepClock {
            ticks: Cell::new(0),
        };
        let image = RgbImage::from_pixel(64, 48, image::Rgb([90, 90, 90]));
        let (estimated, diag) =
            process_with_diagnostics(image, &mut LeftHalf, &PipelineConfig::default(), &clock)
                .unwrap();

        assert_eq!(diag.summary.image_width, 64);
        assert_eq!(diag.summary.pixel_count, 64 * 48);
        assert_eq!(diag.summary.pixel_area, estimated.result().pixel_area);
        assert!(diag.segmentation.metrics.is_some());
        assert!(matches!(
            diag.scale.metrics,
            Some(StageMetrics::Scale {
                circle_count: Some(0),
                ..
            })
        ));
        assert!(diag.total_duration >= diag.segmentation.duration + diag.estimate.duration);
        assert!(!diag.concurrent_scale_detection);
    }

    #[test]
    fn diagnostics_propagate_errors() {
        struct Blank;
        impl Segmenter for Blank {
            fn input_dimensions(&self) -> Dimensions {
                Dimensions::square(8)
            }
            fn forward(&mut self, _input: &InputTensor) -> Result<ScoreMap, SegmentError> {
                ScoreMap::from_fn(Dimensions::square(8), |_, _| 0.25)
            }
        }
        let clock = StepClock {
            ticks: Cell::new(0),
        };
        let image = RgbImage::from_pixel(16, 16, image::Rgb([0, 0, 0]));
        let result = process_with_diagnostics(image, &mut Blank, &PipelineConfig::default(), &clock);
        assert!(matches!(result, Err(PipelineError::EmptySegmentation)));
    }

    #[test]
    fn recorder_fills_slots_by_stage() {
        let clock = StepClock {
            ticks: Cell::new(0),
        };
        let image = RgbImage::from_pixel(64, 48, image::Rgb([90, 90, 90]));
        let mut recorder = DiagnosticsRecorder::start(&clock, Dimensions::of(&image), false);

        let pending = Pipeline::new(image, PipelineConfig::default());
        let segmented = recorder.try_record(|| pending.segment(&mut LeftHalf)).unwrap();
        let area = recorder.try_record(|| segmented.measure_area()).unwrap();
        // The stages never read the clock, so each one spans a single tick.
        let scaled = recorder.record(|| area.detect_scale());
        let estimated = recorder.record(|| scaled.estimate());
        let diag = recorder.finish(&estimated);

        assert!(matches!(diag.area.metrics, Some(StageMetrics::Area { .. })));
        assert!(diag.estimate.metrics.is_some());
        assert_eq!(diag.estimate.duration, Duration::from_millis(1));
        assert_eq!(diag.summary.pixel_area, estimated.result().pixel_area);
        assert_eq!(diag.total_duration, Duration::from_millis(9));
    }

    #[test]
    fn report_produces_nonempty_string() {
        let diag = PipelineDiagnostics {
            segmentation: StageDiagnostics {
                duration: Duration::from_millis(80),
                metrics: Some(StageMetrics::Segmentation {
                    input_width: 320,
                    input_height: 320,
                    score_width: 320,
                    score_height: 320,
                    score_min: -3.5,
                    score_max: 6.25,
                }),
            },
            area: StageDiagnostics {
                duration: Duration::from_millis(1),
                metrics: Some(StageMetrics::Area {
                    pixel_area: 7200,
                    total_pixel_count: 120_000,
                    foreground_fraction: 0.06,
                }),
            },
            scale: StageDiagnostics {
                duration: Duration::from_millis(30),
                metrics: Some(StageMetrics::Scale {
                    source: "plate".to_owned(),
                    circle_count: Some(2),
                    edge_pixel_count: Some(1800),
                    reference_diameter_px: 300,
                    px_per_cm: 12.0,
                }),
            },
            estimate: StageDiagnostics {
                duration: Duration::from_millis(0),
                metrics: Some(StageMetrics::Estimate {
                    area_cm2: 50.0,
                    grams: 15.0,
                    density: 0.3,
                }),
            },
            concurrent_scale_detection: false,
            total_duration: Duration::from_millis(111),
            summary: PipelineSummary {
                image_width: 400,
                image_height: 300,
                pixel_count: 120_000,
                pixel_area: 7200,
                estimated_grams: 15.0,
            },
        };

        let report = diag.report();
        assert!(report.contains("Pipeline Diagnostics Report"));
        assert!(report.contains("Segmentation"));
        assert!(report.contains("plate d=300px 12.00 px/cm circles=2"));
        assert!(report.contains("15.00 g"));
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let stage = StageDiagnostics {
            duration: Duration::from_millis(1500),
            metrics: None,
        };
        let json = serde_json::to_value(&stage).unwrap();
        assert!((json["duration"].as_f64().unwrap() - 1.5).abs() < 1e-12);
        let back: StageDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(1500));
    }
}
