// src/exec/executor.rs

//! Pluggable task-executor abstraction.
//!
//! The scheduler talks to a `TaskExecutor` instead of spawning processes
//! directly. Production code uses [`RealTaskExecutor`] (`supervisor.rs`);
//! tests use a fake from `planrunner-test-utils` that never touches the
//! filesystem or spawns a child.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::watch;

use crate::errors::Result;
use crate::paths::RunPaths;
use crate::plan::TaskSpec;

/// Outcome of a single attempt at running a task's command.
#[derive(Debug, Clone, Default)]
pub struct AttemptOutcome {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub canceled: bool,
    /// Relative (to the run directory) artifact paths collected this attempt.
    pub artifact_paths: Vec<String>,
}

impl AttemptOutcome {
    /// SUCCESS iff `exit_code == 0` and neither timed out nor canceled.
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.canceled
    }
}

/// Everything a single attempt needs, gathered by the scheduler so the
/// executor itself stays free of DAG/state concerns.
pub struct AttemptContext<'a> {
    pub task: &'a TaskSpec,
    pub run_paths: &'a RunPaths,
    /// 0-based index of this attempt.
    pub attempt_idx: usize,
    pub max_attempts: u32,
    pub default_workdir: &'a Path,
    /// Resolved `artifacts_dir` from the plan (relative to the run workdir
    /// unless absolute), if configured.
    pub artifacts_dir: Option<&'a Path>,
    /// Flips to `true` when the scheduler observes a cancellation request;
    /// the executor selects on this alongside the child's exit.
    pub cancel_rx: watch::Receiver<bool>,
}

/// Abstraction over "run one attempt of a task's command".
pub trait TaskExecutor: Send + Sync {
    fn run_attempt<'a>(
        &'a self,
        ctx: AttemptContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<AttemptOutcome>> + Send + 'a>>;
}

/// Resolve a task's effective cwd: the task's own `cwd` if set, joined onto
/// the run's default workdir if relative; otherwise the default workdir
/// itself.
pub fn resolve_cwd(task: &TaskSpec, default_workdir: &Path) -> PathBuf {
    match &task.cwd {
        Some(cwd) => {
            let p = Path::new(cwd);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                default_workdir.join(p)
            }
        }
        None => default_workdir.to_path_buf(),
    }
}
