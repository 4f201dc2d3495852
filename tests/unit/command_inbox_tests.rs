//! Unit tests for the supervisor's restart mailbox.
//!
//! Validates:
//! - Hard requests dominate graceful ones regardless of arrival order
//! - A burst of submissions produces a single wake-up
//! - `take` drains the slot

use agent_missions::supervisor::control::CommandInbox;
use agent_missions::supervisor::state::{RestartCommand, RestartMode};

#[test]
fn hard_after_graceful_wins() {
    let (inbox, _rx) = CommandInbox::new();
    inbox.submit(RestartCommand::graceful("soft"));
    inbox.submit(RestartCommand::hard("stuck"));

    let taken = inbox.take().expect("slot filled");
    assert_eq!(taken.mode, RestartMode::Hard);
    assert_eq!(taken.reason, "stuck");
}

#[test]
fn graceful_after_hard_is_absorbed() {
    let (inbox, _rx) = CommandInbox::new();
    inbox.submit(RestartCommand::hard("stuck"));
    inbox.submit(RestartCommand::graceful("soft"));

    let taken = inbox.take().expect("slot filled");
    assert_eq!(taken.mode, RestartMode::Hard);
    assert_eq!(taken.reason, "stuck");
}

#[test]
fn take_empties_the_slot() {
    let (inbox, _rx) = CommandInbox::new();
    assert!(inbox.take().is_none());

    inbox.submit(RestartCommand::graceful("once"));
    assert!(inbox.take().is_some());
    assert!(inbox.take().is_none());
}

#[tokio::test]
async fn burst_collapses_into_one_wakeup() {
    let (inbox, mut rx) = CommandInbox::new();
    for n in 0..10 {
        inbox.submit(RestartCommand::graceful(format!("request {n}")));
    }

    assert_eq!(rx.recv().await, Some(()));
    assert!(rx.try_recv().is_err(), "only one wake-up queued");

    let taken = inbox.take().expect("slot filled");
    assert_eq!(taken.reason, "request 0");
}

#[tokio::test]
async fn submit_never_blocks_without_a_reader() {
    let (inbox, rx) = CommandInbox::new();
    drop(rx);
    inbox.submit(RestartCommand::hard("orphaned"));
    assert_eq!(inbox.take().map(|c| c.mode), Some(RestartMode::Hard));
}
