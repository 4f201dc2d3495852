#![forbid(unsafe_code)]

//! `agent-missions-ctl`: local client for a mission's command endpoint.
//!
//! Sends one JSON request to the supervisor of the given mission and prints
//! the response.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use agent_missions::ipc::client::send_request;
use agent_missions::ipc::server::endpoint_name;
use agent_missions::ipc::{CommandRequest, CommandResponse};

#[derive(Debug, Parser)]
#[command(
    name = "agent-missions-ctl",
    about = "Control a running mission supervisor",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Restart the mission's agent.
    Restart {
        /// Mission ID.
        mission_id: String,
        /// Kill immediately and start a fresh conversation.
        #[arg(long)]
        hard: bool,
        /// Reason recorded in the mission journal.
        #[arg(long, default_value = "requested from ctl")]
        reason: String,
    },

    /// Show the supervisor's restart state.
    Status {
        /// Mission ID.
        mission_id: String,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let (mission_id, request) = match args.command {
        Command::Restart {
            mission_id,
            hard,
            reason,
        } => {
            let mode = if hard { "hard" } else { "graceful" };
            (mission_id, CommandRequest::restart(mode, reason))
        }
        Command::Status { mission_id } => (mission_id, CommandRequest::status()),
    };

    match send_request(&mission_id, &request) {
        Ok(response) if response.is_ok() => {
            print_response(&response);
            ExitCode::SUCCESS
        }
        Ok(response) => {
            eprintln!(
                "Error: {}",
                response.error.as_deref().unwrap_or("unknown error")
            );
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Failed to reach mission supervisor: {err}");
            eprintln!(
                "Is mission {mission_id} running (endpoint '{}')?",
                endpoint_name(&mission_id)
            );
            ExitCode::FAILURE
        }
    }
}

fn print_response(response: &CommandResponse) {
    match response.state {
        Some(state) => {
            println!("state:        {state}");
            println!(
                "conversation: {}",
                if response.conversation.unwrap_or(false) { "yes" } else { "no" }
            );
            println!(
                "agent pid:    {}",
                response
                    .agent_pid
                    .map_or_else(|| "-".to_owned(), |pid| pid.to_string())
            );
            println!("restarts:     {}", response.restarts.unwrap_or(0));
        }
        None => println!("OK"),
    }
}
