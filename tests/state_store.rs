use std::collections::BTreeMap;

use planrunner::paths::RunPaths;
use planrunner::state::{self, RunState, RunStatus, TaskState};

fn sample_state(run_id: &str) -> RunState {
    let mut tasks = BTreeMap::new();
    tasks.insert("a".to_string(), TaskState::pending());
    RunState {
        run_id: run_id.to_string(),
        created_at: "2026-01-01T00:00:00+00:00".to_string(),
        updated_at: "2026-01-01T00:00:00+00:00".to_string(),
        status: RunStatus::Running,
        goal: "demo".to_string(),
        plan_relpath: "plan.yaml".to_string(),
        home: ".planrunner".to_string(),
        workdir: ".".to_string(),
        max_parallel: 4,
        fail_fast: true,
        tasks,
    }
}

#[test]
fn round_trips_through_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path(), "run1");
    std::fs::create_dir_all(&paths.root).unwrap();

    let original = sample_state("run1");
    state::save(&paths, &original).expect("save should succeed");

    let loaded = state::load(&paths).expect("load should succeed");
    assert_eq!(loaded.run_id, original.run_id);
    assert_eq!(loaded.status, RunStatus::Running);
    assert_eq!(loaded.tasks.len(), 1);
}

#[test]
fn save_is_atomic_and_never_leaves_a_half_written_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path(), "run2");
    std::fs::create_dir_all(&paths.root).unwrap();

    for i in 0..5 {
        let mut s = sample_state("run2");
        s.updated_at = format!("2026-01-01T00:00:0{i}+00:00");
        state::save(&paths, &s).unwrap();
    }

    assert!(!paths.state_tmp_file().exists());
    let loaded = state::load(&paths).unwrap();
    assert_eq!(loaded.updated_at, "2026-01-01T00:00:04+00:00");
}

#[test]
fn exists_reflects_whether_state_has_been_written() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path(), "run3");
    assert!(!state::exists(&paths));

    std::fs::create_dir_all(&paths.root).unwrap();
    state::save(&paths, &sample_state("run3")).unwrap();
    assert!(state::exists(&paths));
}
