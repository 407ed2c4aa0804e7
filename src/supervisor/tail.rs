//! Tail supervisor: follows the target's log file.
//!
//! [`follow`] turns a growing file into a stream of lines. The
//! [`TailSupervisor`] consumes that stream, relays every line to a sink,
//! forwards it to presence reporting, and arms a delayed kill request when
//! the shutdown marker shows up. The target sometimes hangs after logging
//! its shutdown; the kill request makes sure it goes away.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::signals::KillRequest;
use crate::integrations::presence::Presence;

/// Substring the target logs once it starts shutting down.
pub const SHUTDOWN_MARKER: &str = "[FLog::SingleSurfaceApp] shutDown:";

/// How long to sleep at end-of-file before checking for new content.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Buffered lines between the reader task and the supervisor.
const LINE_BUFFER: usize = 256;

/// Lines queued for presence reporting before new ones are dropped.
const PRESENCE_BUFFER: usize = 64;

/// How long the end of the stream waits for queued presence updates.
const PRESENCE_DRAIN: Duration = Duration::from_secs(2);

/// Follow `path` from its beginning, yielding complete lines.
///
/// The stream ends when the file disappears, on a read error, or once
/// `stop` is cancelled and everything written so far has been delivered.
/// A trailing line without a newline is held back until it is completed,
/// or delivered as is when the stream ends.
#[must_use]
pub fn follow(path: PathBuf, stop: CancellationToken) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);

    tokio::spawn(async move {
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(err) => {
                error!(%err, path = %path.display(), "could not open log file for tailing");
                return;
            }
        };

        let mut reader = BufReader::new(file);
        let mut pending: Vec<u8> = Vec::new();

        loop {
            match reader.read_until(b'\n', &mut pending).await {
                Ok(0) => {
                    if stop.is_cancelled() {
                        debug!(path = %path.display(), "tail stopped");
                        flush_partial(&tx, &mut pending).await;
                        break;
                    }
                    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                        info!(path = %path.display(), "log file removed, tail finished");
                        flush_partial(&tx, &mut pending).await;
                        break;
                    }
                    tokio::select! {
                        () = stop.cancelled() => {}
                        () = tokio::time::sleep(POLL_INTERVAL) => {}
                    }
                }
                Ok(_) => {
                    if pending.last() != Some(&b'\n') {
                        // Partial line at end of file; keep reading into it.
                        continue;
                    }
                    if tx.send(take_line(&mut pending)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, path = %path.display(), "log file read failed");
                    break;
                }
            }
        }
    });

    rx
}

fn take_line(pending: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(pending)
        .trim_end_matches(['\n', '\r'])
        .to_owned();
    pending.clear();
    line
}

/// Deliver an unterminated last line once no more data will follow.
async fn flush_partial(tx: &mpsc::Sender<String>, pending: &mut Vec<u8>) {
    if pending.is_empty() {
        return;
    }
    // The receiver may already be gone; the line is lost with it.
    let _ = tx.send(take_line(pending)).await;
}

/// Per-line processing of the followed log.
pub struct TailSupervisor {
    sink: Box<dyn Write + Send>,
    kill_tx: mpsc::Sender<KillRequest>,
    die_timeout: Duration,
    presence: Option<Arc<dyn Presence>>,
    armed: Arc<AtomicBool>,
}

impl TailSupervisor {
    /// Relay lines into `sink` and send kill requests on `kill_tx`
    /// `die_timeout` after the shutdown marker.
    #[must_use]
    pub fn new(
        sink: Box<dyn Write + Send>,
        kill_tx: mpsc::Sender<KillRequest>,
        die_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            kill_tx,
            die_timeout,
            presence: None,
            armed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Also forward every line to presence reporting.
    #[must_use]
    pub fn with_presence(mut self, presence: Arc<dyn Presence>) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Whether a delayed kill request is currently pending.
    #[must_use]
    pub fn kill_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Consume `lines` until the stream ends. Returns the number of lines
    /// processed.
    ///
    /// Presence updates run on their own task, so a slow presence service
    /// never delays marker detection. Lines arriving while its queue is
    /// full are not reported to presence.
    pub async fn run(mut self, mut lines: mpsc::Receiver<String>) -> u64 {
        let mut forwarder = self.presence.take().map(spawn_presence_forwarder);

        let mut count = 0u64;
        while let Some(line) = lines.recv().await {
            self.handle_line(&line, forwarder.as_ref().map(|(tx, _)| tx));
            count += 1;
        }
        debug!(lines = count, "log stream exhausted");

        if let Some((tx, mut handle)) = forwarder.take() {
            drop(tx);
            if tokio::time::timeout(PRESENCE_DRAIN, &mut handle).await.is_err() {
                warn!("presence updates still pending, abandoning them");
                handle.abort();
            }
        }
        count
    }

    fn handle_line(&mut self, line: &str, presence: Option<&mpsc::Sender<String>>) {
        if let Err(err) = writeln!(self.sink, "{line}") {
            debug!(%err, "log sink write failed");
        }

        if line.contains(SHUTDOWN_MARKER) {
            self.arm_kill_timer();
        }

        if let Some(tx) = presence {
            if let Err(err) = tx.try_send(line.to_owned()) {
                debug!(%err, "presence queue unavailable, line not reported");
            }
        }
    }

    /// Arm the delayed kill request unless one is already pending.
    fn arm_kill_timer(&self) -> bool {
        if self
            .armed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("shutdown marker seen again, kill request already pending");
            return false;
        }

        info!(grace = ?self.die_timeout, "shutdown marker seen, arming kill request");
        let armed = Arc::clone(&self.armed);
        let kill_tx = self.kill_tx.clone();
        let grace = self.die_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            warn!("shutdown grace period elapsed, requesting kill");
            if let Err(err) = kill_tx.try_send(KillRequest::StuckShutdown) {
                debug!(%err, "kill request not delivered");
            }
            armed.store(false, Ordering::SeqCst);
        });

        true
    }
}

fn spawn_presence_forwarder(
    presence: Arc<dyn Presence>,
) -> (mpsc::Sender<String>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<String>(PRESENCE_BUFFER);
    let handle = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let Err(err) = presence.handle_log_line(&line).await {
                error!(%err, "presence log handling failed");
            }
        }
    });
    (tx, handle)
}
