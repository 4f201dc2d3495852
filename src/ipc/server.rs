//! Per-mission command endpoint.
//!
//! Listens on a local socket named after the mission using the
//! `interprocess` crate. Accepts line-delimited JSON requests and answers
//! each with exactly one JSON line. Malformed or unknown requests get a
//! structured error; nothing a client sends can stop the listener.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "restart", "mode": "graceful", "reason": "config changed"}
//! {"command": "restart", "mode": "hard", "reason": "wedged"}
//! {"command": "status"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"status": "ok"}
//! {"status": "ok", "state": "running", "conversation": true, "agent_pid": 4242, "restarts": 0}
//! {"status": "error", "error": "unknown command: reboot"}
//! ```

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::protocol::{CommandRequest, CommandResponse};
use crate::supervisor::control::ControlHandle;
use crate::supervisor::state::{RestartCommand, RestartMode};
use crate::{AppError, Result};

/// Local socket name for a mission's command endpoint.
#[must_use]
pub fn endpoint_name(mission_id: &str) -> String {
    format!("agent-missions-{mission_id}")
}

/// Spawn the command listener task for one mission.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_command_server(
    mission_id: &str,
    control: ControlHandle,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = endpoint_name(mission_id);

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "command endpoint listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("command_server", name = %name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("command endpoint shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                tokio::spawn(handle_connection(stream, control.clone()));
                            }
                            Err(err) => {
                                warn!(%err, "ipc accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Serve sequential request/response exchanges on one connection.
async fn handle_connection(stream: interprocess::local_socket::tokio::Stream, control: ControlHandle) {
    let span = info_span!("ipc_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match serde_json::from_str::<CommandRequest>(trimmed) {
                        Ok(request) => dispatch_command(&request, &control),
                        Err(err) => CommandResponse::error(format!("invalid json: {err}")),
                    };

                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"status":"error","error":"serialization failed"}"#.to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }

        debug!("ipc connection closed");
    }
    .instrument(span)
    .await;
}

/// Route a request to its handler.
pub fn dispatch_command(request: &CommandRequest, control: &ControlHandle) -> CommandResponse {
    let span = info_span!("ipc_command", command = %request.command);
    let _guard = span.enter();

    match request.command.as_str() {
        "restart" => handle_restart(request, control),
        "status" => handle_status(control),
        other => CommandResponse::error(format!("unknown command: {other}")),
    }
}

/// Queue a restart. Weaker or repeated requests merge into the pending one.
fn handle_restart(request: &CommandRequest, control: &ControlHandle) -> CommandResponse {
    let mode = match request.mode.as_deref() {
        None => RestartMode::Graceful,
        Some(raw) => match RestartMode::parse(raw) {
            Some(mode) => mode,
            None => return CommandResponse::error(format!("invalid mode: {raw}")),
        },
    };
    let reason = request
        .reason
        .clone()
        .unwrap_or_else(|| "requested via command endpoint".to_owned());

    info!(mode = mode.as_str(), %reason, "restart requested");
    control.inbox.submit(RestartCommand { mode, reason });
    CommandResponse::ok()
}

fn handle_status(control: &ControlHandle) -> CommandResponse {
    let status = *control.status.borrow();
    CommandResponse::with_status(status)
}
