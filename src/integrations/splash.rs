//! Progress and failure reporting to the user.
//!
//! There is no splash window; progress goes to the log and fatal errors are
//! shown with `zenity` when the launcher runs without a terminal (for
//! example from a desktop entry or a browser protocol handler).

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::process::Command;
use tracing::{debug, error, info};

/// Progress UI the orchestrator reports to.
pub trait Splash: Send + Sync {
    /// Headline of the current step.
    fn set_message(&self, message: &str);

    /// Secondary line under the headline.
    fn set_description(&self, description: &str);

    /// The target is up; stop showing progress.
    fn close(&self);

    /// Show a blocking error dialog.
    fn show_fatal_dialog<'a>(&'a self, text: &'a str)
        -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Log-backed progress reporting with a `zenity` failure dialog.
#[derive(Debug, Default)]
pub struct DialogSplash {
    enabled: bool,
    closed: AtomicBool,
    log_path: Mutex<Option<PathBuf>>,
}

impl DialogSplash {
    /// Reporter that shows dialogs only when `enabled`.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            closed: AtomicBool::new(false),
            log_path: Mutex::new(None),
        }
    }

    /// Launcher log file mentioned in failure dialogs.
    pub fn set_log_path(&self, path: PathBuf) {
        *self.log_path.lock().unwrap_or_else(PoisonError::into_inner) = Some(path);
    }

    /// Whether [`Splash::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Splash for DialogSplash {
    fn set_message(&self, message: &str) {
        if !self.is_closed() {
            info!(message, "progress");
        }
    }

    fn set_description(&self, description: &str) {
        if !self.is_closed() {
            debug!(description, "progress description");
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("progress closed");
        }
    }

    fn show_fatal_dialog<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if !self.enabled {
                return;
            }
            let log_path = self
                .log_path
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            let body = match log_path {
                Some(path) => format!("{text}\n\nLog: {}", path.display()),
                None => text.to_owned(),
            };
            let status = Command::new("zenity")
                .args(["--error", "--no-wrap", "--title", "Cellar", "--text"])
                .arg(&body)
                .status()
                .await;
            if let Err(err) = status {
                error!(%err, "could not show failure dialog");
            }
        })
    }
}
