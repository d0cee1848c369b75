// src/plan/validate.rs

//! Structural validation and normalization of a raw plan into a [`PlanSpec`].
//!
//! Acyclicity is **not** checked here; that is the DAG builder's job
//! (`crate::dag::DagGraph::build`), since it needs the full adjacency anyway.

use std::collections::{BTreeMap, HashSet};

use crate::errors::PlanRunnerError;
use crate::plan::model::{RawCmd, RawPlanSpec, TaskSpec, PlanSpec};

pub fn validate_and_normalize(raw: RawPlanSpec) -> Result<PlanSpec, PlanRunnerError> {
    if raw.tasks.is_empty() {
        return Err(plan_err("plan must contain at least one task"));
    }

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut tasks = Vec::with_capacity(raw.tasks.len());

    for raw_task in &raw.tasks {
        validate_id(&raw_task.id)?;

        let key = raw_task.id.to_lowercase();
        if !seen_ids.insert(key) {
            return Err(plan_err(format!(
                "duplicate task id '{}' (ids are case-insensitively unique)",
                raw_task.id
            )));
        }
    }

    let canonical_ids: BTreeMap<String, String> = raw
        .tasks
        .iter()
        .map(|t| (t.id.to_lowercase(), t.id.clone()))
        .collect();

    for raw_task in &raw.tasks {
        let mut canonical_deps = Vec::with_capacity(raw_task.depends_on.len());
        for dep in &raw_task.depends_on {
            if dep.eq_ignore_ascii_case(&raw_task.id) {
                return Err(plan_err(format!(
                    "task '{}' cannot depend on itself",
                    raw_task.id
                )));
            }
            match canonical_ids.get(&dep.to_lowercase()) {
                Some(canonical) => canonical_deps.push(canonical.clone()),
                None => {
                    return Err(plan_err(format!(
                        "task '{}' depends_on unknown task '{}'",
                        raw_task.id, dep
                    )))
                }
            }
        }

        let argv = normalize_cmd(&raw_task.cmd, &raw_task.id)?;

        let env = validate_env(raw_task.env.clone().unwrap_or_default(), &raw_task.id)?;

        let timeout_sec = match raw_task.timeout_sec {
            Some(t) if t.is_finite() && t > 0.0 => Some(t),
            Some(t) => {
                return Err(plan_err(format!(
                    "task '{}' timeout_sec must be a positive finite number, got {t}",
                    raw_task.id
                )))
            }
            None => None,
        };

        let retries = raw_task.retries.unwrap_or(0);

        let retry_backoff_sec = raw_task.retry_backoff_sec.clone().unwrap_or_default();
        for (idx, b) in retry_backoff_sec.iter().enumerate() {
            if !b.is_finite() || *b < 0.0 {
                return Err(plan_err(format!(
                    "task '{}' retry_backoff_sec[{idx}] must be a non-negative finite number, got {b}",
                    raw_task.id
                )));
            }
        }

        let outputs = raw_task.outputs.clone().unwrap_or_default();

        tasks.push(TaskSpec {
            id: raw_task.id.clone(),
            argv,
            depends_on: canonical_deps,
            cwd: raw_task.cwd.clone(),
            env,
            timeout_sec,
            retries,
            retry_backoff_sec,
            outputs,
        });
    }

    Ok(PlanSpec {
        goal: raw.goal,
        artifacts_dir: raw.artifacts_dir,
        tasks,
    })
}

fn validate_id(id: &str) -> Result<(), PlanRunnerError> {
    if id.is_empty() || id.len() > 128 {
        return Err(plan_err(format!(
            "task id '{id}' must be 1..128 characters"
        )));
    }

    let mut chars = id.chars();
    let first = chars.next().expect("non-empty checked above");
    if !first.is_ascii_alphanumeric() {
        return Err(plan_err(format!(
            "task id '{id}' must begin with an alphanumeric character"
        )));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(plan_err(format!(
            "task id '{id}' may only contain [A-Za-z0-9._-]"
        )));
    }

    Ok(())
}

fn validate_env(env: BTreeMap<String, String>, task_id: &str) -> Result<BTreeMap<String, String>, PlanRunnerError> {
    for key in env.keys() {
        if key.is_empty() {
            return Err(plan_err(format!(
                "task '{task_id}' has an empty env key"
            )));
        }
        if key.contains('=') {
            return Err(plan_err(format!(
                "task '{task_id}' env key '{key}' must not contain '='"
            )));
        }
    }
    Ok(env)
}

fn normalize_cmd(cmd: &RawCmd, task_id: &str) -> Result<Vec<String>, PlanRunnerError> {
    let argv = match cmd {
        RawCmd::String(s) => shell_words::split(s).map_err(|e| {
            plan_err(format!("task '{task_id}' cmd could not be shell-split: {e}"))
        })?,
        RawCmd::Argv(v) => v.clone(),
    };

    if argv.is_empty() {
        return Err(plan_err(format!(
            "task '{task_id}' cmd resolves to an empty argv"
        )));
    }

    Ok(argv)
}

fn plan_err(msg: impl Into<String>) -> PlanRunnerError {
    PlanRunnerError::Plan(msg.into())
}
