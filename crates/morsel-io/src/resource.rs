//! Input validation before any expensive work starts.

use std::io;
use std::path::Path;

use crate::error::{Resource, RunError};

/// Check that `path` names an existing regular file.
///
/// Only metadata is read; the file is not opened.
///
/// # Errors
///
/// Returns [`RunError::NotFound`] if nothing exists at `path` or it is
/// not a regular file (e.g. a directory), and [`RunError::Read`] for any
/// other metadata failure such as a permission error.
pub fn ensure_file(resource: Resource, path: &Path) -> Result<(), RunError> {
    let not_found = || RunError::NotFound {
        resource,
        path: path.to_path_buf(),
    };
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(not_found()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found()),
        Err(source) => Err(RunError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Read the whole file at `path`.
///
/// # Errors
///
/// Returns [`RunError::NotFound`] if the file vanished since it was
/// validated, and [`RunError::Read`] for other I/O errors.
pub fn read(resource: Resource, path: &Path) -> Result<Vec<u8>, RunError> {
    std::fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            RunError::NotFound {
                resource,
                path: path.to_path_buf(),
            }
        } else {
            RunError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}
