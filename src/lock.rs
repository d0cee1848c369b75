// src/lock.rs

//! Per-run exclusive lock with stale-lock recovery.
//!
//! The lock is a plain exclusive-create of `.lock` inside the run directory:
//! no flock/fcntl primitives, so the contract holds across platforms and
//! even across filesystems that don't support advisory locks.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::errors::PlanRunnerError;
use crate::paths::RunPaths;

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60 * 60);

/// Held for the lifetime of a mutating command (`run`, `resume`, `cancel`).
/// Dropping it releases the lock.
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquire the run lock, reclaiming a stale one if its `.lock` file's
    /// mtime is older than `stale_after`. Fatal (returns `Err`) if another
    /// live writer holds it.
    pub fn acquire(paths: &RunPaths, stale_after: Duration) -> Result<Self, PlanRunnerError> {
        fs::create_dir_all(&paths.root)?;
        let lock_path = paths.lock_file();

        match try_create(&lock_path) {
            Ok(()) => {
                debug!(path = ?lock_path, "acquired run lock");
                return Ok(Self { path: lock_path });
            }
            Err(e) if e.kind() != std::io::ErrorKind::AlreadyExists => {
                return Err(PlanRunnerError::Lock(format!(
                    "creating lock file {lock_path:?}: {e}"
                )));
            }
            Err(_) => {}
        }

        if is_stale(&lock_path, stale_after) {
            warn!(path = ?lock_path, "reclaiming stale run lock");
            // Best-effort atomic reclaim: remove the abandoned file, then
            // exclusive-recreate. A concurrent reclaimer racing here will
            // simply fail create_new and report "another process holds the
            // run", which is the conservative, correct outcome.
            let _ = fs::remove_file(&lock_path);
            try_create(&lock_path).map_err(|e| {
                PlanRunnerError::Lock(format!(
                    "another process holds the run (lost race reclaiming stale lock at {lock_path:?}: {e})"
                ))
            })?;
            return Ok(Self { path: lock_path });
        }

        Err(PlanRunnerError::Lock(format!(
            "another process holds the run: lock file {lock_path:?} exists and is not stale"
        )))
    }

    /// Attempt acquisition for a short while with backoff, for read-only
    /// commands (`status`, `logs`) that must never block indefinitely and
    /// never mutate. Returns `None` if still unable to acquire; callers fall
    /// back to a best-effort, possibly-stale read without the lock.
    pub fn try_acquire_best_effort(paths: &RunPaths, attempts: u32, backoff: Duration) -> Option<Self> {
        for attempt in 0..attempts {
            match Self::acquire(paths, DEFAULT_STALE_AFTER) {
                Ok(lock) => return Some(lock),
                Err(_) if attempt + 1 < attempts => thread::sleep(backoff),
                Err(_) => return None,
            }
        }
        None
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = ?self.path, error = %e, "failed to remove run lock on release");
            }
        }
    }
}

fn try_create(path: &Path) -> std::io::Result<()> {
    File::options().write(true).create_new(true).open(path)?;
    Ok(())
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return true;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age > stale_after,
        Err(_) => false,
    }
}
