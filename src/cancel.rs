// src/cancel.rs

//! The cancellation protocol: a single marker file as the rendezvous between
//! the `cancel` CLI invocation (single writer) and the scheduler (single
//! reader polling between task boundaries and during task monitoring).

use std::fs::{self, File};

use crate::errors::PlanRunnerError;
use crate::paths::RunPaths;

/// Create the cancellation marker. Idempotent: creating it twice is not an
/// error.
pub fn request_cancel(paths: &RunPaths) -> Result<(), PlanRunnerError> {
    fs::create_dir_all(&paths.root)?;
    match File::create(paths.cancel_marker()) {
        Ok(_) => Ok(()),
        Err(e) => Err(PlanRunnerError::Io(e)),
    }
}

/// Cheap existence check; the scheduler polls this between task boundaries.
pub fn is_cancel_requested(paths: &RunPaths) -> bool {
    paths.cancel_marker().exists()
}

/// Remove the marker so that a `resume` explicitly supersedes a previous
/// cancellation rather than immediately re-canceling.
pub fn clear_cancel(paths: &RunPaths) -> Result<(), PlanRunnerError> {
    match fs::remove_file(paths.cancel_marker()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PlanRunnerError::Io(e)),
    }
}
