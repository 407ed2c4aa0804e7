//! Supervision of a running target process.
//!
//! - [`log_watch`]: bounded wait for the process to create its log file.
//! - [`tail`]: follows that log, relays it, and detects stuck shutdowns.
//! - [`signals`]: single-shot interrupt/terminate/kill-request handling.

pub mod log_watch;
pub mod signals;
pub mod tail;

pub use log_watch::LogWatch;
pub use signals::{KillRequest, Received, SignalGuard, SignalSupervisor};
pub use tail::{TailSupervisor, SHUTDOWN_MARKER};
