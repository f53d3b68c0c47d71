//! Errors raised while running one estimation request.

use std::fmt;
use std::path::PathBuf;

use morsel_pipeline::{ErrorKind, PipelineError};

/// Which input a [`RunError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// The photograph.
    Image,
    /// The segmentation model artifact.
    Model,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("Image"),
            Self::Model => f.write_str("Model"),
        }
    }
}

/// Errors that can end a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The image or model path does not name an existing file.
    #[error("{resource} file not found: {}", path.display())]
    NotFound {
        /// Which input was missing.
        resource: Resource,
        /// The path as given.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// The path as given.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The model artifact could not be parsed or prepared for inference.
    #[error("failed to load segmentation model: {0}")]
    ModelLoad(String),

    /// Writing the mask image failed.
    #[error("failed to write mask to {}: {source}", path.display())]
    MaskWrite {
        /// Destination path.
        path: PathBuf,
        /// Underlying encoder or I/O error.
        #[source]
        source: image::ImageError,
    },

    /// A pipeline stage failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Something panicked during the run.
    #[error("internal error: {0}")]
    Panicked(String),
}

impl RunError {
    /// The kind of failure this error represents.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Pipeline(e) => e.kind(),
            Self::Read { .. } | Self::ModelLoad(_) | Self::MaskWrite { .. } | Self::Panicked(_) => {
                ErrorKind::Internal
            }
        }
    }
}
