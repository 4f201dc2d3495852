//! Unit tests for the idle/busy state file watcher.
//!
//! Validates:
//! - A burst of changes collapses into one wake-up carrying the final level
//! - A `busy` overwritten within the debounce window is still latched
//! - Idle-only traffic never sets the latch

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agent_missions::supervisor::idle_watcher::{read_activity, write_activity, IdleWatcher};
use agent_missions::supervisor::state::Activity;

const DEBOUNCE: Duration = Duration::from_millis(400);

async fn next_wake(rx: &mut mpsc::Receiver<()>) {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("watcher woke the loop")
        .expect("channel open");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn short_busy_turn_is_latched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state_file = dir.path().join("state");
    write_activity(&state_file, Activity::Idle).expect("seed");

    let (tx, mut rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let watcher = IdleWatcher::spawn(&state_file, DEBOUNCE, tx, cancel.clone()).expect("watch");
    tokio::time::sleep(Duration::from_millis(100)).await;

    write_activity(&state_file, Activity::Busy).expect("busy");
    tokio::time::sleep(Duration::from_millis(50)).await;
    write_activity(&state_file, Activity::Idle).expect("idle");

    next_wake(&mut rx).await;
    assert_eq!(read_activity(&state_file), Some(Activity::Idle));
    assert!(watcher.take_busy_seen());
    assert!(!watcher.take_busy_seen(), "taking clears the latch");

    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_writes_leave_latch_clear() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state_file = dir.path().join("state");
    write_activity(&state_file, Activity::Idle).expect("seed");

    let (tx, mut rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let watcher = IdleWatcher::spawn(&state_file, DEBOUNCE, tx, cancel.clone()).expect("watch");
    tokio::time::sleep(Duration::from_millis(100)).await;

    write_activity(&state_file, Activity::Idle).expect("idle");

    next_wake(&mut rx).await;
    assert!(!watcher.take_busy_seen());

    cancel.cancel();
}
