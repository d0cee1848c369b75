// src/state/model.rs

//! The persisted run-state document: schema, status enums, invariants.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Success,
    Failed,
    Skipped,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failed | RunStatus::Canceled
        )
    }
}

/// Why a task was skipped; `None` if it wasn't.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    DependencyFailed(String),
    PreviousRunInterrupted,
    RunCanceled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DependencyFailed(id) => write!(f, "dependency_failed:{id}"),
            SkipReason::PreviousRunInterrupted => write!(f, "previous_run_interrupted"),
            SkipReason::RunCanceled => write!(f, "run_canceled"),
        }
    }
}

/// Dynamic per-task state, persisted as part of [`RunState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub status: TaskStatus,
    #[serde(default)]
    pub attempts: u32,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub duration_sec: Option<f64>,
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub canceled: bool,
    pub skip_reason: Option<SkipReason>,
    pub stdout_path: Option<String>,
    pub stderr_path: Option<String>,
    #[serde(default)]
    pub artifact_paths: Vec<String>,
}

impl TaskState {
    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            attempts: 0,
            started_at: None,
            ended_at: None,
            duration_sec: None,
            exit_code: None,
            timed_out: false,
            canceled: false,
            skip_reason: None,
            stdout_path: None,
            stderr_path: None,
            artifact_paths: Vec::new(),
        }
    }
}

/// The persisted document reflecting the progress of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub status: RunStatus,
    pub goal: String,
    pub plan_relpath: String,
    pub home: String,
    pub workdir: String,
    pub max_parallel: usize,
    pub fail_fast: bool,
    pub tasks: BTreeMap<String, TaskState>,
}

impl RunState {
    /// §3 invariant 4: run is SUCCESS iff every task is SUCCESS.
    pub fn all_tasks_success(&self) -> bool {
        !self.tasks.is_empty()
            && self
                .tasks
                .values()
                .all(|t| t.status == TaskStatus::Success)
    }

    pub fn any_running(&self) -> bool {
        self.tasks.values().any(|t| t.status == TaskStatus::Running)
    }

    pub fn all_terminal(&self) -> bool {
        self.tasks.values().all(|t| t.status.is_terminal())
    }
}
