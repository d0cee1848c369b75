// src/report.rs

//! Markdown report renderer: the "external collaborator" that turns a final
//! [`RunState`] into `report/final_report.md`. Has no back-channel into the
//! scheduler; it only reads the same public `RunState` the core produces.

use std::fmt::Write as _;
use std::fs;

use crate::errors::Result;
use crate::paths::RunPaths;
use crate::state::{RunState, TaskStatus};

pub fn write(paths: &RunPaths, state: &RunState) -> Result<()> {
    fs::create_dir_all(paths.report_dir())?;
    let markdown = render(state);
    fs::write(paths.final_report(), markdown)?;
    Ok(())
}

fn render(state: &RunState) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Run report: {}", state.run_id);
    let _ = writeln!(out);
    let _ = writeln!(out, "**Goal:** {}", state.goal);
    let _ = writeln!(out, "**Status:** {:?}", state.status);
    let _ = writeln!(out, "**Created:** {}", state.created_at);
    let _ = writeln!(out, "**Updated:** {}", state.updated_at);
    let _ = writeln!(out);

    let _ = writeln!(out, "| Task | Status | Attempts | Duration (s) | Exit code | Note |");
    let _ = writeln!(out, "|------|--------|----------|---------------|-----------|------|");

    for (id, task) in &state.tasks {
        let duration = task
            .duration_sec
            .map(|d| format!("{d:.2}"))
            .unwrap_or_else(|| "-".to_string());
        let exit_code = task
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let note = note_for(task.status, task.skip_reason.as_ref(), task.timed_out);

        let _ = writeln!(
            out,
            "| {id} | {status:?} | {attempts} | {duration} | {exit_code} | {note} |",
            status = task.status,
            attempts = task.attempts,
        );
    }

    let success_count = state
        .tasks
        .values()
        .filter(|t| t.status == TaskStatus::Success)
        .count();
    let _ = writeln!(out);
    let _ = writeln!(out, "{success_count} / {} tasks succeeded.", state.tasks.len());

    out
}

fn note_for(
    status: TaskStatus,
    skip_reason: Option<&crate::state::SkipReason>,
    timed_out: bool,
) -> String {
    if let Some(reason) = skip_reason {
        return reason.to_string();
    }
    if timed_out {
        return "timed out".to_string();
    }
    match status {
        TaskStatus::Canceled => "canceled".to_string(),
        _ => "-".to_string(),
    }
}
