//! OS process primitives shared by the supervisor and the scheduler.

pub mod pid_file;
pub mod probe;

pub use pid_file::{read_pid, PidFile};
pub use probe::{is_alive, send_signal, ProcessProbe, ProcessSignal, SignalProbe};
