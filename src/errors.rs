//! Error types shared across the launcher.

use std::fmt::{Display, Formatter};

/// Shared launcher result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Launcher error enumeration covering all failure modes of a run.
///
/// Fatal kinds (`Config`, `Initialization`, `InvalidLauncherConfig`,
/// `ProcessStart`, `ProcessRuntime`) abort the run and surface to `main`.
/// The remaining kinds are logged where they occur and never cross their
/// component boundary.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Sandbox (Wine prefix) bring-up or helper component install failure.
    Initialization(String),
    /// Configured wrapping launcher could not be resolved.
    InvalidLauncherConfig(String),
    /// The target process did not create its log file in time.
    LogNotFound(String),
    /// Presence reporting connection or update failure.
    Presence(String),
    /// Performance-mode registration failure.
    PerformanceMode(String),
    /// The target process (or a helper) could not be started.
    ProcessStart(String),
    /// The target process exited with a failure status.
    ProcessRuntime(String),
    /// Persisted launcher state could not be read or written.
    State(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Initialization(msg) => write!(f, "init: {msg}"),
            Self::InvalidLauncherConfig(msg) => write!(f, "bad launcher: {msg}"),
            Self::LogNotFound(msg) => write!(f, "log not found: {msg}"),
            Self::Presence(msg) => write!(f, "presence: {msg}"),
            Self::PerformanceMode(msg) => write!(f, "gamemode: {msg}"),
            Self::ProcessStart(msg) => write!(f, "start: {msg}"),
            Self::ProcessRuntime(msg) => write!(f, "process: {msg}"),
            Self::State(msg) => write!(f, "state: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl AppError {
    /// Prefix the message with `context`, keeping the error kind.
    #[must_use]
    pub fn context(self, context: impl Display) -> Self {
        let wrap = |msg: String| format!("{context}: {msg}");
        match self {
            Self::Config(msg) => Self::Config(wrap(msg)),
            Self::Initialization(msg) => Self::Initialization(wrap(msg)),
            Self::InvalidLauncherConfig(msg) => Self::InvalidLauncherConfig(wrap(msg)),
            Self::LogNotFound(msg) => Self::LogNotFound(wrap(msg)),
            Self::Presence(msg) => Self::Presence(wrap(msg)),
            Self::PerformanceMode(msg) => Self::PerformanceMode(wrap(msg)),
            Self::ProcessStart(msg) => Self::ProcessStart(wrap(msg)),
            Self::ProcessRuntime(msg) => Self::ProcessRuntime(wrap(msg)),
            Self::State(msg) => Self::State(wrap(msg)),
            Self::Io(msg) => Self::Io(wrap(msg)),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::State(format!("invalid state: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
