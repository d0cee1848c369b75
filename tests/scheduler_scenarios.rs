use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use planrunner::cancel;
use planrunner::dag::DagGraph;
use planrunner::paths::RunPaths;
use planrunner::plan::PlanSpec;
use planrunner::scheduler::{Engine, SchedulerCore, StartMode};
use planrunner::state::{RunState, RunStatus, SkipReason, TaskState, TaskStatus};
use planrunner_test_utils::fake_executor::{FakeExecutor, ScriptedAttempt};
use planrunner_test_utils::{PlanSpecBuilder, TaskSpecBuilder};

fn fresh_run_state(plan: &PlanSpec, max_parallel: usize, fail_fast: bool) -> RunState {
    RunState {
        run_id: "test-run".to_string(),
        created_at: "2026-01-01T00:00:00+00:00".to_string(),
        updated_at: "2026-01-01T00:00:00+00:00".to_string(),
        status: RunStatus::Running,
        goal: plan.goal.clone(),
        plan_relpath: "plan.yaml".to_string(),
        home: ".planrunner".to_string(),
        workdir: ".".to_string(),
        max_parallel,
        fail_fast,
        tasks: SchedulerCore::fresh_tasks(plan),
    }
}

async fn run_with(
    plan: PlanSpec,
    max_parallel: usize,
    fail_fast: bool,
    executor: Arc<FakeExecutor>,
    paths: &RunPaths,
) -> RunState {
    let dag = DagGraph::build(&plan).unwrap();
    let run_state = fresh_run_state(&plan, max_parallel, fail_fast);
    let engine = Engine::new(
        plan,
        dag,
        run_state,
        StartMode::Fresh,
        paths.clone(),
        executor,
        std::env::temp_dir(),
        None,
    );
    tokio::time::timeout(Duration::from_secs(5), engine.run())
        .await
        .expect("run must terminate within 5s")
        .expect("run must not error")
}

#[tokio::test]
async fn linear_success() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path(), "run1");

    let plan = PlanSpecBuilder::new("linear")
        .with_task(TaskSpecBuilder::new("a", &["true"]).build())
        .with_task(TaskSpecBuilder::new("b", &["true"]).depends_on("a").build())
        .with_task(TaskSpecBuilder::new("c", &["true"]).depends_on("b").build())
        .build();

    let executor = Arc::new(FakeExecutor::new());
    let state = run_with(plan, 4, true, executor, &paths).await;

    assert_eq!(state.status, RunStatus::Success);
    for id in ["a", "b", "c"] {
        assert_eq!(state.tasks[id].status, TaskStatus::Success);
    }
}

#[tokio::test]
async fn skip_propagation_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path(), "run2");

    let plan = PlanSpecBuilder::new("skip")
        .with_task(TaskSpecBuilder::new("a", &["false"]).build())
        .with_task(TaskSpecBuilder::new("b", &["true"]).depends_on("a").build())
        .with_task(TaskSpecBuilder::new("c", &["true"]).depends_on("b").build())
        .build();

    let executor = Arc::new(FakeExecutor::new());
    executor.script("a", vec![ScriptedAttempt::Fail(1)]);
    let state = run_with(plan, 4, true, executor, &paths).await;

    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.tasks["a"].status, TaskStatus::Failed);
    assert_eq!(state.tasks["b"].status, TaskStatus::Skipped);
    assert_eq!(
        state.tasks["b"].skip_reason,
        Some(SkipReason::DependencyFailed("a".to_string()))
    );
    assert_eq!(state.tasks["c"].status, TaskStatus::Skipped);
}

#[tokio::test]
async fn retry_recovers_after_transient_failures() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path(), "run3");

    let plan = PlanSpecBuilder::new("retry")
        .with_task(
            TaskSpecBuilder::new("a", &["true"])
                .retries(2)
                .retry_backoff_sec(&[0.0, 0.0])
                .build(),
        )
        .build();

    let executor = Arc::new(FakeExecutor::new());
    executor.script(
        "a",
        vec![
            ScriptedAttempt::Fail(1),
            ScriptedAttempt::Fail(1),
            ScriptedAttempt::Succeed,
        ],
    );
    let state = run_with(plan, 4, true, executor.clone(), &paths).await;

    assert_eq!(state.status, RunStatus::Success);
    assert_eq!(state.tasks["a"].attempts, 3);
    assert_eq!(executor.executed().len(), 3);
}

#[tokio::test]
async fn timeout_marks_task_failed_without_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path(), "run4");

    let plan = PlanSpecBuilder::new("timeout")
        .with_task(TaskSpecBuilder::new("a", &["sleep", "10"]).build())
        .build();

    let executor = Arc::new(FakeExecutor::new());
    executor.script("a", vec![ScriptedAttempt::TimeOut]);
    let state = run_with(plan, 4, true, executor, &paths).await;

    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.tasks["a"].status, TaskStatus::Failed);
    assert!(state.tasks["a"].timed_out);
    assert_eq!(state.tasks["a"].exit_code, None);
}

#[tokio::test]
async fn mid_run_cancel_stops_downstream_work() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path(), "run5");

    let plan = PlanSpecBuilder::new("cancel")
        .with_task(TaskSpecBuilder::new("a", &["sleep", "30"]).build())
        .with_task(TaskSpecBuilder::new("b", &["true"]).depends_on("a").build())
        .build();

    let executor = Arc::new(FakeExecutor::new());
    executor.script("a", vec![ScriptedAttempt::Sleep(Duration::from_secs(30))]);

    let dag = DagGraph::build(&plan).unwrap();
    let run_state = fresh_run_state(&plan, 4, true);
    let engine = Engine::new(
        plan,
        dag,
        run_state,
        StartMode::Fresh,
        paths.clone(),
        executor,
        std::env::temp_dir(),
        None,
    );

    let run_fut = engine.run();
    tokio::pin!(run_fut);

    // Give the scheduler a moment to dispatch `a`, then request cancellation.
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel::request_cancel(&paths).unwrap();

    let state = tokio::time::timeout(Duration::from_secs(5), run_fut)
        .await
        .expect("run must observe cancellation within 5s")
        .expect("run must not error");

    assert_eq!(state.status, RunStatus::Canceled);
    assert_eq!(state.tasks["a"].status, TaskStatus::Canceled);
    assert_eq!(state.tasks["b"].status, TaskStatus::Canceled);
    assert_eq!(state.tasks["b"].skip_reason, Some(SkipReason::RunCanceled));
}

#[tokio::test]
async fn resume_reruns_only_the_interrupted_task() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path(), "run6");
    std::fs::create_dir_all(&paths.root).unwrap();

    let plan = PlanSpecBuilder::new("resume")
        .with_task(TaskSpecBuilder::new("a", &["true"]).build())
        .with_task(TaskSpecBuilder::new("b", &["true"]).depends_on("a").build())
        .build();

    // Simulate a process kill while `b` was RUNNING: `a` already SUCCESS.
    let mut tasks: BTreeMap<String, TaskState> = BTreeMap::new();
    let mut a = TaskState::pending();
    a.status = TaskStatus::Success;
    a.ended_at = Some("2026-01-01T00:00:01+00:00".to_string());
    tasks.insert("a".to_string(), a);
    let mut b = TaskState::pending();
    b.status = TaskStatus::Running;
    b.started_at = Some("2026-01-01T00:00:01+00:00".to_string());
    b.attempts = 1;
    tasks.insert("b".to_string(), b);

    let run_state = RunState {
        run_id: "run6".to_string(),
        created_at: "2026-01-01T00:00:00+00:00".to_string(),
        updated_at: "2026-01-01T00:00:01+00:00".to_string(),
        status: RunStatus::Running,
        goal: plan.goal.clone(),
        plan_relpath: "plan.yaml".to_string(),
        home: ".planrunner".to_string(),
        workdir: ".".to_string(),
        max_parallel: 4,
        fail_fast: true,
        tasks,
    };

    let dag = DagGraph::build(&plan).unwrap();
    let executor = Arc::new(FakeExecutor::new());
    let engine = Engine::new(
        plan,
        dag,
        run_state,
        StartMode::Resume { failed_only: false },
        paths.clone(),
        executor.clone(),
        std::env::temp_dir(),
        None,
    );

    let state = tokio::time::timeout(Duration::from_secs(5), engine.run())
        .await
        .expect("resume must terminate within 5s")
        .expect("resume must not error");

    assert_eq!(state.status, RunStatus::Success);
    assert_eq!(state.tasks["a"].status, TaskStatus::Success);
    assert_eq!(state.tasks["b"].status, TaskStatus::Success);

    let executed = executor.executed();
    assert!(executed.iter().any(|(id, _)| id == "b"));
    assert!(!executed.iter().any(|(id, _)| id == "a"));
}
