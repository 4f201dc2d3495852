//! Local command endpoint, one per supervised mission.
//!
//! Provides a Unix domain socket (abstract namespace on Linux) server that
//! carries restart requests into the supervisor's event loop, plus the
//! blocking client used by `agent-missions-ctl`.

pub mod client;
pub mod protocol;
pub mod server;

pub use protocol::{CommandRequest, CommandResponse};
