//! Unit tests for command endpoint request routing.
//!
//! Validates:
//! - Restart requests land in the inbox, defaulting to graceful
//! - Invalid modes and unknown commands get structured errors
//! - Status reports the latest published snapshot

use agent_missions::ipc::server::dispatch_command;
use agent_missions::ipc::{CommandRequest, CommandResponse};
use agent_missions::supervisor::control::{CommandInbox, ControlHandle, SupervisorStatus};
use agent_missions::supervisor::state::{RestartMode, WrapperState};
use tokio::sync::watch;

fn control() -> (ControlHandle, watch::Sender<SupervisorStatus>) {
    let (inbox, _rx) = CommandInbox::new();
    let (tx, status) = watch::channel(SupervisorStatus::default());
    (ControlHandle { inbox, status }, tx)
}

#[test]
fn restart_without_mode_is_graceful() {
    let (control, _tx) = control();
    let request = CommandRequest {
        command: "restart".into(),
        ..CommandRequest::default()
    };

    assert_eq!(dispatch_command(&request, &control), CommandResponse::ok());
    let queued = control.inbox.take().expect("queued");
    assert_eq!(queued.mode, RestartMode::Graceful);
    assert!(!queued.reason.is_empty());
}

#[test]
fn hard_restart_carries_reason() {
    let (control, _tx) = control();
    let response = dispatch_command(&CommandRequest::restart("hard", "wedged"), &control);

    assert!(response.is_ok());
    let queued = control.inbox.take().expect("queued");
    assert_eq!(queued.mode, RestartMode::Hard);
    assert_eq!(queued.reason, "wedged");
}

#[test]
fn invalid_mode_is_rejected() {
    let (control, _tx) = control();
    let response = dispatch_command(&CommandRequest::restart("gentle", "x"), &control);

    assert_eq!(response.status, "error");
    assert_eq!(response.error.as_deref(), Some("invalid mode: gentle"));
    assert!(control.inbox.take().is_none());
}

#[test]
fn unknown_command_is_rejected() {
    let (control, _tx) = control();
    let request = CommandRequest {
        command: "reboot".into(),
        ..CommandRequest::default()
    };

    let response = dispatch_command(&request, &control);
    assert_eq!(response.error.as_deref(), Some("unknown command: reboot"));
}

#[test]
fn repeated_restarts_all_succeed_and_merge() {
    let (control, _tx) = control();
    for mode in ["graceful", "hard", "graceful"] {
        assert!(dispatch_command(&CommandRequest::restart(mode, mode), &control).is_ok());
    }
    assert_eq!(control.inbox.take().map(|c| c.mode), Some(RestartMode::Hard));
}

#[test]
fn status_reports_published_snapshot() {
    let (control, tx) = control();
    tx.send_replace(SupervisorStatus {
        state: WrapperState::RestartPending,
        conversation: true,
        agent_pid: Some(4242),
        restarts: 2,
    });

    let response = dispatch_command(&CommandRequest::status(), &control);
    assert!(response.is_ok());
    assert_eq!(response.state, Some(WrapperState::RestartPending));
    assert_eq!(response.conversation, Some(true));
    assert_eq!(response.agent_pid, Some(4242));
    assert_eq!(response.restarts, Some(2));
}

#[test]
fn responses_serialise_compactly() {
    let json = serde_json::to_string(&CommandResponse::ok()).expect("serialise");
    assert_eq!(json, r#"{"status":"ok"}"#);

    let json = serde_json::to_string(&CommandResponse::with_status(SupervisorStatus::default()))
        .expect("serialise");
    assert_eq!(
        json,
        r#"{"status":"ok","state":"running","conversation":false,"restarts":0}"#
    );
}
