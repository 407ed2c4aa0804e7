//! Performance-mode registration through the `GameMode` desktop portal.
//!
//! The call goes over the session bus using the `gdbus` tool, so no D-Bus
//! library is linked in. Hosts without the portal reply with an
//! "unknown object/service" error, which is reported as
//! [`Registration::Unavailable`] rather than a failure.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::{AppError, Result};

const PORTAL_DEST: &str = "org.freedesktop.portal.Desktop";
const PORTAL_PATH: &str = "/org/freedesktop/portal/desktop";
const REGISTER_METHOD: &str = "org.freedesktop.portal.GameMode.RegisterGame";
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// D-Bus error names meaning the portal (or its `GameMode` part) is absent.
const UNAVAILABLE_ERRORS: &[&str] = &[
    "org.freedesktop.DBus.Error.ServiceUnknown",
    "org.freedesktop.DBus.Error.UnknownObject",
    "org.freedesktop.DBus.Error.UnknownInterface",
    "org.freedesktop.DBus.Error.UnknownMethod",
];

/// Outcome of a registration attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The process now runs in performance mode.
    Registered,
    /// The host has no performance-mode service; nothing was done.
    Unavailable,
}

/// Requests elevated scheduling for a process.
pub trait PerformanceMode: Send + Sync {
    /// Register `pid` with the performance-mode service.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PerformanceMode` if the service rejected the call
    /// or could not be reached for a reason other than being absent.
    fn register_process(&self, pid: u32)
        -> Pin<Box<dyn Future<Output = Result<Registration>> + Send + '_>>;
}

/// `GameMode` registration via `gdbus call --session`.
#[derive(Debug, Clone, Default)]
pub struct GameModePortal;

impl PerformanceMode for GameModePortal {
    fn register_process(
        &self,
        pid: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Registration>> + Send + '_>> {
        Box::pin(async move {
            let mut cmd = Command::new("gdbus");
            cmd.args([
                "call",
                "--session",
                "--dest",
                PORTAL_DEST,
                "--object-path",
                PORTAL_PATH,
                "--method",
                REGISTER_METHOD,
            ])
            .arg(pid.to_string())
            .kill_on_drop(true);

            let output = match tokio::time::timeout(CALL_TIMEOUT, cmd.output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!("gdbus not installed, skipping gamemode");
                    return Ok(Registration::Unavailable);
                }
                Ok(Err(err)) => {
                    return Err(AppError::PerformanceMode(format!("run gdbus: {err}")));
                }
                Err(_elapsed) => {
                    return Err(AppError::PerformanceMode(format!(
                        "gdbus call timed out after {CALL_TIMEOUT:?}"
                    )));
                }
            };

            if output.status.success() {
                return Ok(Registration::Registered);
            }

            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_unavailable(&stderr) {
                return Ok(Registration::Unavailable);
            }
            Err(AppError::PerformanceMode(format!(
                "RegisterGame failed ({}): {}",
                output.status,
                stderr.trim()
            )))
        })
    }
}

/// Whether a D-Bus error message means the service simply is not there.
#[must_use]
pub fn is_unavailable(stderr: &str) -> bool {
    UNAVAILABLE_ERRORS.iter().any(|name| stderr.contains(name))
}
