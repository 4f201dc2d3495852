//! Unit tests for the per-mission PID file.

use std::fs;

use agent_missions::process::{read_pid, PidFile};
use agent_missions::AppError;

#[test]
fn create_then_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mission").join("wrapper.pid");

    let guard = PidFile::create(&path, 4242).expect("create");
    assert_eq!(guard.path(), path.as_path());
    assert_eq!(read_pid(&path).expect("read"), Some(4242));
}

#[test]
fn dropping_the_guard_removes_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("wrapper.pid");

    {
        let _guard = PidFile::create(&path, 1).expect("create");
        assert!(path.exists());
    }

    assert!(!path.exists());
    assert_eq!(read_pid(&path).expect("read"), None);
}

#[test]
fn drop_tolerates_an_already_removed_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("wrapper.pid");

    let guard = PidFile::create(&path, 1).expect("create");
    fs::remove_file(&path).expect("remove");
    drop(guard);
}

#[test]
fn malformed_pid_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("wrapper.pid");
    fs::write(&path, "not-a-pid").expect("write");

    assert!(matches!(read_pid(&path), Err(AppError::Io(_))));
}

#[test]
fn surrounding_whitespace_is_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("wrapper.pid");
    fs::write(&path, "  77\n\n").expect("write");

    assert_eq!(read_pid(&path).expect("read"), Some(77));
}
