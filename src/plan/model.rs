// src/plan/model.rs

//! Plan schema as read from YAML, plus the validated in-memory representation.

use std::collections::BTreeMap;

use serde::Deserialize;

/// `cmd` may be written as a raw shell-like string or as an explicit argv list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawCmd {
    String(String),
    Argv(Vec<String>),
}

/// `[tasks[].env]` overlay: plain string-to-string map.
pub type EnvMap = BTreeMap<String, String>;

/// One task as written in the plan file, before normalization.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTaskSpec {
    pub id: String,
    pub cmd: RawCmd,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: Option<EnvMap>,
    #[serde(default)]
    pub timeout_sec: Option<f64>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub retry_backoff_sec: Option<Vec<f64>>,
    #[serde(default)]
    pub outputs: Option<Vec<String>>,
}

/// The plan document as written in YAML, before normalization/validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPlanSpec {
    pub goal: String,
    #[serde(default)]
    pub artifacts_dir: Option<String>,
    pub tasks: Vec<RawTaskSpec>,
}

/// A fully normalized, validated task: argv is always an explicit list and
/// every field has its effective value resolved (retries default to 0, etc).
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub id: String,
    pub argv: Vec<String>,
    pub depends_on: Vec<String>,
    pub cwd: Option<String>,
    pub env: EnvMap,
    pub timeout_sec: Option<f64>,
    pub retries: u32,
    pub retry_backoff_sec: Vec<f64>,
    pub outputs: Vec<String>,
}

impl TaskSpec {
    /// Delay before attempt `attempt_idx + 2` (0-based index of the attempt
    /// that just failed), per the `retry_backoff_sec` element-repeats-last rule.
    pub fn backoff_for(&self, attempt_idx: usize) -> f64 {
        if self.retry_backoff_sec.is_empty() {
            return 0.0;
        }
        let idx = attempt_idx.min(self.retry_backoff_sec.len() - 1);
        self.retry_backoff_sec[idx]
    }

    pub fn max_attempts(&self) -> u32 {
        1 + self.retries
    }
}

/// A fully normalized, validated plan.
#[derive(Debug, Clone)]
pub struct PlanSpec {
    pub goal: String,
    pub artifacts_dir: Option<String>,
    pub tasks: Vec<TaskSpec>,
}

impl PlanSpec {
    pub fn task(&self, id: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.id.eq_ignore_ascii_case(id))
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.id.as_str())
    }
}
