use std::collections::HashSet;

use planrunner::dag::DagGraph;
use planrunner::scheduler::{core::Event, Command, SchedulerCore};
use planrunner_test_utils::{PlanSpecBuilder, TaskSpecBuilder};
use proptest::prelude::*;

/// Strategy generating a valid DAG: task `i` may only depend on tasks `0..i`,
/// so the resulting plan is acyclic by construction.
fn dag_plan_strategy(max_tasks: usize) -> impl Strategy<Value = (planrunner::plan::PlanSpec, Vec<bool>)> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        let deps_strat = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        );
        let fail_strat = proptest::collection::vec(any::<bool>(), num_tasks);

        (deps_strat, fail_strat).prop_map(move |(raw_deps, fails)| {
            let mut builder = PlanSpecBuilder::new("prop");
            for (i, potential_deps) in raw_deps.into_iter().enumerate() {
                let name = format!("t{i}");
                let mut task = TaskSpecBuilder::new(&name, &["true"]);
                let mut valid: HashSet<usize> = HashSet::new();
                for dep_idx in potential_deps {
                    if i > 0 {
                        valid.insert(dep_idx % i);
                    }
                }
                for dep_idx in valid {
                    task = task.depends_on(&format!("t{dep_idx}"));
                }
                builder = builder.with_task(task.build());
            }
            (builder.build(), fails)
        })
    })
}

proptest! {
    #[test]
    fn scheduler_always_reaches_a_terminal_state(
        (plan, fails) in dag_plan_strategy(8),
    ) {
        let dag = DagGraph::build(&plan).expect("generated plans are acyclic");
        let mut core = SchedulerCore::new(plan.clone(), dag, 3, true);
        let mut tasks = SchedulerCore::fresh_tasks(&plan);

        let mut commands = core.start(&mut tasks);
        let mut steps = 0usize;
        let max_steps = 10_000usize;

        loop {
            let mut run_attempts = Vec::new();
            let mut finished = false;
            for cmd in &commands {
                match cmd {
                    Command::RunAttempt { id, attempt_idx, .. } => {
                        run_attempts.push((id.clone(), *attempt_idx));
                    }
                    Command::Finish => finished = true,
                    _ => {}
                }
            }

            if finished {
                break;
            }

            if run_attempts.is_empty() {
                // No in-flight work and not finished: only valid if the core
                // is simply waiting on a terminal state it already reached.
                prop_assert!(core.all_terminal(&tasks), "scheduler stalled with no work in flight");
                break;
            }

            commands = Vec::new();
            for (id, attempt_idx) in run_attempts {
                let idx: usize = plan.task_ids().position(|t| t == id).unwrap_or(0);
                let should_fail = fails.get(idx).copied().unwrap_or(false);
                let outcome = planrunner::scheduler::AttemptReport {
                    exit_code: Some(if should_fail { 1 } else { 0 }),
                    timed_out: false,
                    canceled: false,
                    artifact_paths: Vec::new(),
                    duration_sec: 0.0,
                };
                commands.extend(core.step(&mut tasks, Event::AttemptFinished { id, attempt_idx, outcome }));
            }

            steps += 1;
            prop_assert!(steps < max_steps, "scheduler did not converge within {} steps", max_steps);
        }

        prop_assert!(tasks.values().all(|t| t.status.is_terminal()));
    }
}
