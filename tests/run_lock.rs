use std::time::{Duration, SystemTime};

use planrunner::lock::RunLock;
use planrunner::paths::RunPaths;

#[test]
fn acquire_then_drop_releases_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path(), "run1");

    let lock = RunLock::acquire(&paths, Duration::from_secs(3600)).expect("first acquire");
    assert!(paths.lock_file().exists());
    drop(lock);
    assert!(!paths.lock_file().exists());
}

#[test]
fn a_second_acquire_fails_while_the_first_is_held() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path(), "run2");

    let _lock = RunLock::acquire(&paths, Duration::from_secs(3600)).unwrap();
    let err = RunLock::acquire(&paths, Duration::from_secs(3600)).unwrap_err();
    assert!(format!("{err}").contains("another process"));
}

#[test]
fn a_stale_lock_is_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path(), "run3");

    std::fs::create_dir_all(&paths.root).unwrap();
    let file = std::fs::File::create(paths.lock_file()).unwrap();

    let ancient = SystemTime::UNIX_EPOCH + Duration::from_secs(1);
    file.set_modified(ancient).unwrap();
    drop(file);

    let lock = RunLock::acquire(&paths, Duration::from_secs(1)).expect("stale lock reclaimed");
    drop(lock);
}

#[test]
fn try_acquire_best_effort_gives_up_without_blocking_forever() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::new(dir.path(), "run4");

    let _held = RunLock::acquire(&paths, Duration::from_secs(3600)).unwrap();
    let attempt = RunLock::try_acquire_best_effort(&paths, 2, Duration::from_millis(10));
    assert!(attempt.is_none());
}
