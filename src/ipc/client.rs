//! Blocking client for a mission's command endpoint.

use std::io::{BufRead, BufReader, Write};

use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

use super::protocol::{CommandRequest, CommandResponse};
use super::server::endpoint_name;
use crate::{AppError, Result};

/// Connect to the mission's endpoint, send one request and read the response.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the endpoint is unreachable or answers with
/// something that is not a response line.
pub fn send_request(mission_id: &str, request: &CommandRequest) -> Result<CommandResponse> {
    let name = endpoint_name(mission_id);
    let ns_name = name
        .as_str()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;
    let mut stream = Stream::connect(ns_name)
        .map_err(|err| AppError::Ipc(format!("failed to connect to '{name}': {err}")))?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream
        .write_all(request_line.as_bytes())
        .and_then(|()| stream.flush())
        .map_err(|err| AppError::Ipc(format!("failed to send request: {err}")))?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|err| AppError::Ipc(format!("failed to read response: {err}")))?;

    Ok(serde_json::from_str(response_line.trim())?)
}
