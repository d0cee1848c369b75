// src/state/store.rs

//! Atomic load/save of the run-state document.

use std::fs::{self, File};
use std::path::Path;

use tracing::debug;

use crate::errors::PlanRunnerError;
use crate::paths::RunPaths;
use crate::state::model::RunState;

/// Load `state.json` from the run directory.
///
/// Tolerant of missing timestamps (older schema versions could omit them);
/// rejects unknown status strings, which `serde` already enforces since
/// [`crate::state::model::TaskStatus`]/[`crate::state::model::RunStatus`]
/// are plain enums with no catch-all variant.
pub fn load(paths: &RunPaths) -> Result<RunState, PlanRunnerError> {
    let contents = fs::read_to_string(paths.state_file()).map_err(|e| {
        PlanRunnerError::State(format!("reading {:?}: {e}", paths.state_file()))
    })?;

    serde_json::from_str(&contents)
        .map_err(|e| PlanRunnerError::State(format!("parsing state.json: {e}")))
}

/// Persist `state` to the run directory atomically: serialize to
/// `state.json.tmp`, fsync best-effort, then rename over `state.json`.
///
/// The rename is atomic on the same filesystem, so a reader never observes a
/// partially-written document; readers without the run lock may still race
/// with a save and see the previous version, which is an accepted
/// eventually-consistent view (§5).
pub fn save(paths: &RunPaths, state: &RunState) -> Result<(), PlanRunnerError> {
    fs::create_dir_all(&paths.root)?;

    let tmp_path = paths.state_tmp_file();
    let json = serde_json::to_string_pretty(state)?;

    {
        let mut file = File::create(&tmp_path)?;
        use std::io::Write;
        file.write_all(json.as_bytes())?;
        // Best-effort durability; a failed fsync should not abort the save,
        // since the rename below is still atomic with respect to readers.
        let _ = file.sync_all();
    }

    fs::rename(&tmp_path, paths.state_file())?;
    debug!(run_id = %state.run_id, "state saved");

    Ok(())
}

/// Whether a state file already exists for this run directory.
pub fn exists(paths: &RunPaths) -> bool {
    Path::new(&paths.state_file()).exists()
}
