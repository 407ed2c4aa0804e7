//! Signal supervisor.
//!
//! The target keeps running when the launcher is interrupted, so the
//! launcher has to hold SIGINT/SIGTERM itself and kill the target on the
//! user's behalf. Internal kill requests (from the tail supervisor) use the
//! same intake through an `mpsc` channel instead of self-signalling.
//!
//! Handling is single-shot. After the first signal or request, or once the
//! guard is released on natural exit, interception ends: a later SIGINT or
//! SIGTERM is not reported and terminates the launcher immediately with
//! the status the default disposition would produce.

use std::fmt::{Display, Formatter};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::signal::unix::{signal as unix_signal, Signal as SignalStream, SignalKind};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::models::ExitCell;
use crate::{AppError, Result};

/// Programmatic request to kill the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillRequest {
    /// The process logged its shutdown but did not exit within the grace
    /// period.
    StuckShutdown,
}

/// What ended supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// SIGINT.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// An internal kill request.
    Kill(KillRequest),
}

impl Display for Received {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interrupt => f.write_str("interrupt"),
            Self::Terminate => f.write_str("terminated"),
            Self::Kill(KillRequest::StuckShutdown) => f.write_str("kill request (stuck shutdown)"),
        }
    }
}

/// Installed, not yet consumed, signal intake.
///
/// Create it with [`SignalSupervisor::install`] before spawning the
/// process so a signal arriving right after the spawn is not lost.
pub struct SignalSupervisor {
    interrupt: SignalStream,
    terminate: SignalStream,
    kill_tx: mpsc::Sender<KillRequest>,
    kill_rx: mpsc::Receiver<KillRequest>,
}

impl SignalSupervisor {
    /// Register SIGINT and SIGTERM handlers and open the kill-request
    /// channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if a signal handler cannot be registered.
    pub fn install() -> Result<Self> {
        let interrupt = unix_signal(SignalKind::interrupt())
            .map_err(|err| AppError::Io(format!("register SIGINT handler: {err}")))?;
        let terminate = unix_signal(SignalKind::terminate())
            .map_err(|err| AppError::Io(format!("register SIGTERM handler: {err}")))?;
        // Only the first request matters.
        let (kill_tx, kill_rx) = mpsc::channel(1);
        Ok(Self {
            interrupt,
            terminate,
            kill_tx,
            kill_rx,
        })
    }

    /// Sender for internal kill requests.
    #[must_use]
    pub fn kill_sender(&self) -> mpsc::Sender<KillRequest> {
        self.kill_tx.clone()
    }

    /// Give up intake without supervising anything, for when the process
    /// never started.
    ///
    /// SIGINT/SIGTERM then exit with the default status.
    pub fn abandon(self) {
        let Self {
            interrupt,
            terminate,
            ..
        } = self;
        debug!("signal intake abandoned before supervision");
        tokio::spawn(passthrough(interrupt, terminate));
    }

    /// Start supervising the process `pid`.
    ///
    /// On the first signal or kill request the process is killed if `exit`
    /// still records it as running. The returned guard releases
    /// interception when dropped or released.
    #[must_use]
    pub fn supervise(self, pid: u32, exit: ExitCell) -> SignalGuard {
        let Self {
            mut interrupt,
            mut terminate,
            kill_tx,
            mut kill_rx,
        } = self;
        // Requests can only come from senders handed out earlier.
        drop(kill_tx);

        let (release_tx, release_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let received = tokio::select! {
                _ = interrupt.recv() => Some(Received::Interrupt),
                _ = terminate.recv() => Some(Received::Terminate),
                Some(request) = kill_rx.recv() => Some(Received::Kill(request)),
                _ = release_rx => None,
            };

            // Stop accepting kill requests before anything else.
            drop(kill_rx);

            if let Some(received) = received {
                warn!(signal = %received, "received signal");
                if exit.mark_killed() {
                    warn!(pid, "killing process");
                    kill_process(pid);
                } else {
                    debug!(pid, state = ?exit.get(), "process not running, nothing to kill");
                }
            }

            tokio::spawn(passthrough(interrupt, terminate));
            received
        });

        SignalGuard {
            release: Some(release_tx),
            handle,
        }
    }
}

/// Handle on an active signal supervisor.
pub struct SignalGuard {
    release: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Option<Received>>,
}

impl SignalGuard {
    /// Stop intercepting signals without acting on any.
    ///
    /// Has no effect if a signal was already handled.
    pub fn release(&mut self) {
        if let Some(tx) = self.release.take() {
            let _ = tx.send(());
        }
    }

    /// Release interception and return what, if anything, was handled.
    pub async fn finish(mut self) -> Option<Received> {
        self.release();
        self.wait().await
    }

    /// Wait for the supervisor to handle a signal or be released.
    pub async fn wait(self) -> Option<Received> {
        match self.handle.await {
            Ok(received) => received,
            Err(err) => {
                error!(%err, "signal supervisor task failed");
                None
            }
        }
    }
}

/// Send SIGKILL to `pid`. Failures, including an already-dead process, are
/// logged only.
fn kill_process(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        error!(pid, "pid out of range, cannot kill");
        return;
    };
    match signal::kill(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => {}
        Err(nix::errno::Errno::ESRCH) => debug!(pid, "process already gone"),
        Err(err) => error!(pid, %err, "failed to kill process"),
    }
}

/// After interception ends, make SIGINT/SIGTERM behave like the default
/// disposition: exit at once with `128 + signo`, without logging.
async fn passthrough(mut interrupt: SignalStream, mut terminate: SignalStream) {
    let signo = tokio::select! {
        _ = interrupt.recv() => Signal::SIGINT,
        _ = terminate.recv() => Signal::SIGTERM,
    };
    std::process::exit(128 + signo as i32);
}
