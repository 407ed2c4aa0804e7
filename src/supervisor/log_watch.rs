//! Log discovery watcher.
//!
//! Waits for the first file created in a directory using the `notify`
//! crate. Subscribing and waiting are separate steps so the caller can
//! subscribe before starting the process that writes the file; a file
//! created between the two steps is still reported.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Number of live [`LogWatch`] subscriptions in this process.
static ACTIVE_WATCHES: AtomicUsize = AtomicUsize::new(0);

/// Live directory subscriptions, for diagnostics and leak checks.
#[must_use]
pub fn active_watches() -> usize {
    ACTIVE_WATCHES.load(Ordering::SeqCst)
}

/// An established watch on a log directory.
///
/// Dropping the value tears the OS subscription down. [`LogWatch::wait`]
/// consumes it, so every outcome of a wait releases the subscription.
pub struct LogWatch {
    dir: PathBuf,
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl LogWatch {
    /// Create `dir` if needed and start watching it for new files.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LogNotFound` if the directory cannot be created or
    /// the watcher cannot be set up.
    pub fn subscribe(dir: &Path) -> Result<Self> {
        // notify refuses to watch a path that does not exist yet.
        fs::create_dir_all(dir).map_err(|err| {
            AppError::LogNotFound(format!("create log dir {}: {err}", dir.display()))
        })?;

        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| {
                // The receiver is gone once the wait finished; nothing to do.
                let _ = tx.send(result);
            },
        )
        .map_err(|err| AppError::LogNotFound(format!("create log watcher: {err}")))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|err| {
                AppError::LogNotFound(format!("watch log dir {}: {err}", dir.display()))
            })?;

        ACTIVE_WATCHES.fetch_add(1, Ordering::SeqCst);
        debug!(dir = %dir.display(), "log directory subscribed");

        Ok(Self {
            dir: dir.to_path_buf(),
            _watcher: watcher,
            events,
        })
    }

    /// Directory being watched.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Wait up to `timeout` for the first file created in the directory.
    ///
    /// Watcher errors are logged and do not end the wait.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LogNotFound` on timeout or if the watcher stops
    /// delivering events.
    pub async fn wait(mut self, timeout: Duration) -> Result<PathBuf> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => {
                    return Err(AppError::LogNotFound(format!(
                        "no log file created in {} after {timeout:?}",
                        self.dir.display()
                    )));
                }
                event = self.events.recv() => match event {
                    Some(Ok(event)) => {
                        if let Some(path) = created_path(&event) {
                            info!(path = %path.display(), "found log file");
                            return Ok(path);
                        }
                    }
                    Some(Err(err)) => {
                        warn!(%err, "log watcher error");
                    }
                    None => {
                        return Err(AppError::LogNotFound("log watcher stopped".into()));
                    }
                },
            }
        }
    }
}

impl Drop for LogWatch {
    fn drop(&mut self) {
        ACTIVE_WATCHES.fetch_sub(1, Ordering::SeqCst);
        debug!(dir = %self.dir.display(), "log directory unsubscribed");
    }
}

/// Subscribe to `dir` and wait for the first created file.
///
/// # Errors
///
/// See [`LogWatch::subscribe`] and [`LogWatch::wait`].
pub async fn discover(dir: &Path, timeout: Duration) -> Result<PathBuf> {
    LogWatch::subscribe(dir)?.wait(timeout).await
}

fn created_path(event: &Event) -> Option<PathBuf> {
    if matches!(event.kind, EventKind::Create(_)) {
        event.paths.first().cloned()
    } else {
        None
    }
}
