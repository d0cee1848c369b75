// src/scheduler/core.rs

//! Pure, synchronous scheduler state machine.
//!
//! No I/O, no tokio: given the current task map and one event (an attempt
//! finished, a cancellation was observed), this decides every state
//! transition in §4.H and returns the list of [`Command`]s the async shell
//! in `engine.rs` must carry out. Exhaustively unit-testable without a
//! runtime.

use std::collections::BTreeMap;

use chrono::Local;

use crate::dag::DagGraph;
use crate::plan::PlanSpec;
use crate::state::{RunStatus, SkipReason, TaskState, TaskStatus};

/// The outcome of one attempt, as reported by the supervisor.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub canceled: bool,
    pub artifact_paths: Vec<String>,
    pub duration_sec: f64,
}

/// Events the async shell feeds into the core.
#[derive(Debug, Clone)]
pub enum Event {
    AttemptFinished {
        id: String,
        attempt_idx: usize,
        outcome: AttemptReport,
    },
    CancelObserved,
}

/// What the async shell must do as a result of a core transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Run one attempt of a task: attempt 0 for a fresh dispatch, or a
    /// higher index for a retry, in which case `delay_sec` is the backoff
    /// to sleep before invoking the supervisor.
    RunAttempt {
        id: String,
        attempt_idx: usize,
        delay_sec: f64,
    },
    /// Persist the current state to disk.
    Persist,
    /// Send the cancellation signal to every in-flight supervisor.
    BroadcastCancel,
    /// No task is PENDING/READY/RUNNING: the run is over.
    Finish,
}

pub struct SchedulerCore {
    plan: PlanSpec,
    dag: DagGraph,
    order: Vec<String>,
    max_parallel: usize,
    fail_fast: bool,
    first_failed: Option<String>,
    cancel_seen: bool,
}

impl SchedulerCore {
    pub fn new(plan: PlanSpec, dag: DagGraph, max_parallel: usize, fail_fast: bool) -> Self {
        let order = plan.task_ids().map(str::to_string).collect();
        Self {
            plan,
            dag,
            order,
            max_parallel: max_parallel.max(1),
            fail_fast,
            first_failed: None,
            cancel_seen: false,
        }
    }

    /// A fresh run: every plan task starts PENDING.
    pub fn fresh_tasks(plan: &PlanSpec) -> BTreeMap<String, TaskState> {
        plan.task_ids()
            .map(|id| (id.to_string(), TaskState::pending()))
            .collect()
    }

    /// Apply §4.H.1/§4.H.6 resume rules in place, before the first `start`.
    pub fn apply_resume(&mut self, tasks: &mut BTreeMap<String, TaskState>, failed_only: bool) {
        let now = now_iso();
        for t in tasks.values_mut() {
            if t.status == TaskStatus::Running {
                t.status = TaskStatus::Failed;
                t.skip_reason = Some(SkipReason::PreviousRunInterrupted);
                t.ended_at = Some(now.clone());
            }
        }

        let mut reset: std::collections::HashSet<String> = tasks
            .iter()
            .filter(|(_, t)| t.status == TaskStatus::Failed)
            .map(|(id, _)| id.clone())
            .collect();

        if failed_only {
            let mut changed = true;
            while changed {
                changed = false;
                for id in &self.order {
                    if reset.contains(id) {
                        continue;
                    }
                    let is_blocked_skip = tasks.get(id).map(|t| t.status) == Some(TaskStatus::Skipped)
                        && self.dag.dependencies_of(id).iter().any(|d| reset.contains(d));
                    if is_blocked_skip {
                        reset.insert(id.clone());
                        changed = true;
                    }
                }
            }
        } else {
            reset = tasks
                .iter()
                .filter(|(_, t)| t.status != TaskStatus::Success)
                .map(|(id, _)| id.clone())
                .collect();
        }

        for id in reset {
            if let Some(t) = tasks.get_mut(&id) {
                *t = TaskState::pending();
            }
        }

        self.first_failed = None;
        self.cancel_seen = false;
    }

    /// Kick off the run: evaluate readiness and dispatch whatever can start
    /// immediately. Call once before entering the shell's event loop.
    pub fn start(&mut self, tasks: &mut BTreeMap<String, TaskState>) -> Vec<Command> {
        let mut commands = self.admit(tasks);
        commands.push(Command::Persist);
        if self.all_terminal(tasks) {
            commands.push(Command::Finish);
        }
        commands
    }

    /// Feed one event into the core, returning the resulting commands.
    pub fn step(&mut self, tasks: &mut BTreeMap<String, TaskState>, event: Event) -> Vec<Command> {
        let mut commands = match event {
            Event::CancelObserved => self.handle_cancel(tasks),
            Event::AttemptFinished {
                id,
                attempt_idx,
                outcome,
            } => self.handle_attempt_finished(tasks, &id, attempt_idx, outcome),
        };
        commands.extend(self.admit(tasks));
        commands.push(Command::Persist);
        if self.all_terminal(tasks) {
            commands.push(Command::Finish);
        }
        commands
    }

    /// The run's final status, valid once [`Self::all_terminal`] holds.
    pub fn final_run_status(&self, tasks: &BTreeMap<String, TaskState>) -> RunStatus {
        if self.cancel_seen {
            RunStatus::Canceled
        } else if tasks.values().all(|t| t.status == TaskStatus::Success) {
            RunStatus::Success
        } else {
            RunStatus::Failed
        }
    }

    pub fn all_terminal(&self, tasks: &BTreeMap<String, TaskState>) -> bool {
        tasks.values().all(|t| t.status.is_terminal())
    }

    fn handle_cancel(&mut self, tasks: &mut BTreeMap<String, TaskState>) -> Vec<Command> {
        if self.cancel_seen {
            return Vec::new();
        }
        self.cancel_seen = true;
        let now = now_iso();
        for id in &self.order {
            if let Some(t) = tasks.get_mut(id) {
                if matches!(t.status, TaskStatus::Pending | TaskStatus::Ready) {
                    t.status = TaskStatus::Canceled;
                    t.skip_reason = Some(SkipReason::RunCanceled);
                    t.ended_at = Some(now.clone());
                }
            }
        }
        vec![Command::BroadcastCancel]
    }

    fn handle_attempt_finished(
        &mut self,
        tasks: &mut BTreeMap<String, TaskState>,
        id: &str,
        attempt_idx: usize,
        outcome: AttemptReport,
    ) -> Vec<Command> {
        let now = now_iso();
        let success = outcome.exit_code == Some(0) && !outcome.timed_out && !outcome.canceled;

        if let Some(t) = tasks.get_mut(id) {
            t.attempts = (attempt_idx + 1) as u32;
            t.exit_code = outcome.exit_code;
            t.timed_out = outcome.timed_out;
            t.canceled = outcome.canceled;
            t.duration_sec = Some(t.duration_sec.unwrap_or(0.0) + outcome.duration_sec);
            if t.stdout_path.is_none() {
                t.stdout_path = Some(format!("logs/{id}.out.log"));
                t.stderr_path = Some(format!("logs/{id}.err.log"));
            }
            if !outcome.artifact_paths.is_empty() {
                t.artifact_paths = outcome.artifact_paths;
            }
        }

        if outcome.canceled {
            if let Some(t) = tasks.get_mut(id) {
                t.status = TaskStatus::Canceled;
                t.skip_reason = Some(SkipReason::RunCanceled);
                t.ended_at = Some(now);
            }
            return Vec::new();
        }

        if success {
            if let Some(t) = tasks.get_mut(id) {
                t.status = TaskStatus::Success;
                t.ended_at = Some(now);
            }
            return Vec::new();
        }

        let spec = self
            .plan
            .task(id)
            .expect("task id came from this plan's own task map");
        if (attempt_idx as u32 + 1) < spec.max_attempts() {
            let delay = spec.backoff_for(attempt_idx);
            return vec![Command::RunAttempt {
                id: id.to_string(),
                attempt_idx: attempt_idx + 1,
                delay_sec: delay,
            }];
        }

        if let Some(t) = tasks.get_mut(id) {
            t.status = TaskStatus::Failed;
            t.ended_at = Some(now);
        }
        if self.fail_fast && self.first_failed.is_none() {
            self.first_failed = Some(id.to_string());
        }
        Vec::new()
    }

    fn admit(&mut self, tasks: &mut BTreeMap<String, TaskState>) -> Vec<Command> {
        self.evaluate_readiness(tasks);
        let commands = self.dispatch_ready(tasks);
        // Tasks that just got skipped by fail-fast can free nothing further,
        // but a second pass is cheap insurance against ordering artifacts.
        self.evaluate_readiness(tasks);
        commands
    }

    /// PENDING tasks whose deps are all terminal become READY (all SUCCESS)
    /// or SKIPPED (some dependency not SUCCESS). Runs to a fixpoint since one
    /// skip can immediately satisfy (terminally) the next task's deps.
    fn evaluate_readiness(&mut self, tasks: &mut BTreeMap<String, TaskState>) {
        let now = now_iso();
        let mut changed = true;
        while changed {
            changed = false;
            for id in &self.order {
                if tasks.get(id).map(|t| t.status) != Some(TaskStatus::Pending) {
                    continue;
                }
                let deps = self.dag.dependencies_of(id).to_vec();
                let statuses: Vec<(String, TaskStatus)> = deps
                    .into_iter()
                    .map(|d| {
                        let s = tasks.get(&d).map(|t| t.status).unwrap_or(TaskStatus::Success);
                        (d, s)
                    })
                    .collect();
                if !statuses.iter().all(|(_, s)| s.is_terminal()) {
                    continue;
                }
                let bad = statuses.into_iter().find(|(_, s)| *s != TaskStatus::Success);
                let t = tasks.get_mut(id).expect("id came from self.order");
                if let Some((bad_id, _)) = bad {
                    t.status = TaskStatus::Skipped;
                    t.skip_reason = Some(SkipReason::DependencyFailed(bad_id));
                    t.ended_at = Some(now.clone());
                } else {
                    t.status = TaskStatus::Ready;
                }
                changed = true;
            }
        }
    }

    /// Dispatch READY tasks up to the parallelism bound, FIFO by plan order.
    /// If fail-fast has tripped, READY tasks are skipped instead of run.
    fn dispatch_ready(&mut self, tasks: &mut BTreeMap<String, TaskState>) -> Vec<Command> {
        let running = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .count();
        let mut capacity = self.max_parallel.saturating_sub(running);
        let fail_fast_blocked = self.fail_fast && self.first_failed.is_some();
        let now = now_iso();
        let mut out = Vec::new();

        for id in &self.order {
            if tasks.get(id).map(|t| t.status) != Some(TaskStatus::Ready) {
                continue;
            }

            if fail_fast_blocked {
                let reason = self.first_failed.clone().unwrap_or_default();
                let t = tasks.get_mut(id).expect("id came from self.order");
                t.status = TaskStatus::Skipped;
                t.skip_reason = Some(SkipReason::DependencyFailed(reason));
                t.ended_at = Some(now.clone());
                continue;
            }

            if capacity == 0 {
                continue;
            }

            let t = tasks.get_mut(id).expect("id came from self.order");
            t.status = TaskStatus::Running;
            t.started_at = Some(now.clone());
            t.attempts = 1;
            out.push(Command::RunAttempt {
                id: id.clone(),
                attempt_idx: 0,
                delay_sec: 0.0,
            });
            capacity -= 1;
        }

        out
    }
}

fn now_iso() -> String {
    Local::now().to_rfc3339()
}
