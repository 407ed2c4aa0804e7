//! Work that happens once the target process is up.
//!
//! Waits for the process's log file, then closes the progress UI, registers
//! performance mode, and tails the log until the process is gone. Nothing
//! here can fail the run: a missing log file only skips these steps.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::integrations::{PerformanceMode, Presence, Registration, Splash};
use crate::supervisor::{tail, KillRequest, LogWatch, TailSupervisor};

/// Everything the post-start task needs, moved in at spawn time.
pub(crate) struct PostStart {
    /// Fires with the PID once the process has been spawned.
    pub started: oneshot::Receiver<u32>,
    /// Log directory subscription made before the spawn.
    pub watch: Option<LogWatch>,
    pub log_timeout: Duration,
    pub die_timeout: Duration,
    pub splash: Arc<dyn Splash>,
    /// Set when performance mode is enabled for this binary.
    pub performance: Option<Arc<dyn PerformanceMode>>,
    /// Set when presence reporting connected for this run.
    pub presence: Option<Arc<dyn Presence>>,
    pub kill_tx: mpsc::Sender<KillRequest>,
    pub sink: Box<dyn Write + Send>,
    /// Cancelled once the process has exited.
    pub stop: CancellationToken,
}

impl PostStart {
    /// Run to completion. Returns the discovered log file, if any.
    pub(crate) async fn run(self) -> Option<PathBuf> {
        let Ok(pid) = self.started.await else {
            debug!("process never started, skipping post-start work");
            return None;
        };
        let watch = self.watch?;

        let found = tokio::select! {
            found = watch.wait(self.log_timeout) => found,
            () = self.stop.cancelled() => {
                debug!("process exited before creating its log file");
                return None;
            }
        };

        let path = match found {
            Ok(path) => path,
            Err(err) => {
                // Without the log there is no proof of life; leave the
                // process alone but skip everything that depends on it.
                error!(%err, "failed to find log file");
                return None;
            }
        };

        self.splash.close();

        if let Some(performance) = &self.performance {
            match performance.register_process(pid).await {
                Ok(Registration::Registered) => info!(pid, "registered with gamemode"),
                Ok(Registration::Unavailable) => debug!("gamemode not available on this host"),
                Err(err) => error!(%err, "failed to register with gamemode"),
            }
        }

        let lines = tail::follow(path.clone(), self.stop.clone());
        let mut supervisor = TailSupervisor::new(self.sink, self.kill_tx, self.die_timeout);
        if let Some(presence) = self.presence {
            supervisor = supervisor.with_presence(presence);
        }
        supervisor.run(lines).await;

        Some(path)
    }
}
