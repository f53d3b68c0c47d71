//! morsel: estimate the mass of a food portion from one photograph.
//!
//! Segments the food with an ONNX saliency model, measures its pixel
//! area, derives a pixel-to-centimeter scale from the plate (or the frame
//! width when no plate is visible) and converts the area to grams with a
//! density coefficient.
//!
//! stdout carries exactly one JSON object: the estimate, or
//! `{"error": "..."}`. Logs and the optional diagnostics table go to
//! stderr.
//!
//! # Usage
//!
//! ```text
//! morsel [OPTIONS] <IMAGE_PATH> <MODEL_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind as ClapErrorKind;
use morsel_io::{ErrorReport, MassReport, OnnxLoader, Outcome, Request, RunError};
use morsel_pipeline::PipelineConfig;

/// Estimate the mass of a food portion in grams from a single photograph.
///
/// Prints a JSON object with the segmented pixel area, the reference
/// diameter in pixels, the area in cm², the estimated grams and the
/// density used.
#[derive(Parser)]
#[command(name = "morsel", version)]
struct Cli {
    /// Path to the photograph (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Path to the ONNX segmentation model.
    model_path: PathBuf,

    /// Density in g/cm² used to convert area to mass.
    #[arg(long)]
    density: Option<f64>,

    /// Full pipeline config as a JSON string.
    ///
    /// Fields left out take their defaults. `--density` and
    /// `--concurrent` still apply on top of it.
    #[arg(long)]
    config_json: Option<String>,

    /// Write the binary food mask to this PNG file.
    #[arg(long)]
    mask_out: Option<PathBuf>,

    /// Detect the plate on a worker thread while segmentation runs.
    #[arg(long)]
    concurrent: bool,

    /// Print per-stage timing and metrics to stderr.
    #[arg(long)]
    diagnostics: bool,

    /// Log debug output to stderr (`RUST_LOG` takes precedence).
    #[arg(short, long)]
    verbose: bool,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// `--config-json` replaces the defaults wholesale; the individual flags
/// are then applied over whichever base was chosen.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    let mut config = match cli.config_json {
        Some(ref json) => serde_json::from_str(json)
            .map_err(|e| format!("Error parsing --config-json: {e}"))?,
        None => PipelineConfig::default(),
    };
    if let Some(density) = cli.density {
        config.density = density;
    }
    if cli.concurrent {
        config.concurrent_scale_detection = true;
    }
    Ok(config)
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

/// Render the single stdout line for a finished run.
fn render(result: &Result<Outcome, RunError>) -> Result<String, serde_json::Error> {
    match result {
        Ok(outcome) => serde_json::to_string(&MassReport::from(&outcome.result)),
        Err(err) => serde_json::to_string(&ErrorReport::from(err)),
    }
}

/// Print `{"error": message}` and fail.
fn fail(message: impl Into<String>) -> ExitCode {
    match serde_json::to_string(&ErrorReport::new(message)) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing response: {e}"),
    }
    ExitCode::FAILURE
}

/// First line of a clap error, without the `error: ` prefix.
fn usage_error_message(rendered: &str) -> String {
    let line = rendered.lines().next().unwrap_or_default();
    line.strip_prefix("error: ").unwrap_or(line).to_owned()
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion) => {
            if let Err(io) = e.print() {
                eprintln!("{io}");
            }
            return ExitCode::SUCCESS;
        }
        Err(e) => return fail(usage_error_message(&e.to_string())),
    };

    init_logging(cli.verbose);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => return fail(msg),
    };

    let request = Request {
        image_path: cli.image_path,
        model_path: cli.model_path,
        config,
        mask_out: cli.mask_out,
    };
    log::debug!("request: {request:?}");

    let result = morsel_io::run(&request, &OnnxLoader);

    if cli.diagnostics
        && let Ok(ref outcome) = result
    {
        eprintln!("{}", outcome.diagnostics.report());
    }

    match render(&result) {
        Ok(json) => println!("{json}"),
        Err(e) => return fail(format!("Error serializing response: {e}")),
    }

    if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
