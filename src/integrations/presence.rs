//! Presence reporting over the Discord IPC socket.
//!
//! Activity is derived from the target's log: joining a server sets a
//! "playing" activity with a link to the place, leaving clears it.
//!
//! Frames on the socket are `opcode: u32 LE`, `length: u32 LE`, then
//! `length` bytes of JSON.

use std::env;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{AppError, Result};

/// Discord application the activity is attributed to.
pub const DISCORD_APP_ID: &str = "1159891020956323923";

const OP_HANDSHAKE: u32 = 0;
const OP_FRAME: u32 = 1;
const OP_CLOSE: u32 = 2;

/// Upper bound on a reply frame, to avoid allocating for garbage lengths.
const MAX_FRAME: u32 = 64 * 1024;

/// Default bound on one request/reply exchange with the Discord client.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

const LEAVE_MARKERS: &[&str] = &[
    "[FLog::Network] Time to disconnect replication data:",
    "[FLog::SingleSurfaceApp] leaveUGCGameInternal",
];

/// Reports what the target is doing to an external presence service.
pub trait Presence: Send + Sync {
    /// Connect to the service.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Presence` if the service is unreachable.
    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Disconnect; safe to call when not connected.
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Update presence from one log line of the target.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Presence` if an update could not be sent.
    fn handle_log_line<'a>(
        &'a self,
        line: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Activity change derived from a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityEvent {
    /// Joined a server of `place_id`.
    Joined {
        /// Server instance identifier.
        job_id: String,
        /// Place (game) identifier.
        place_id: String,
    },
    /// Left the current server.
    Left,
}

fn join_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"! Joining game '([0-9a-fA-F-]+)' place ([0-9]+) at")
            .unwrap_or_else(|err| unreachable!("join pattern is valid: {err}"))
    })
}

/// Classify a log line, if it changes the activity.
#[must_use]
pub fn parse_activity(line: &str) -> Option<ActivityEvent> {
    if let Some(caps) = join_pattern().captures(line) {
        return Some(ActivityEvent::Joined {
            job_id: caps[1].to_owned(),
            place_id: caps[2].to_owned(),
        });
    }
    if LEAVE_MARKERS.iter().any(|marker| line.contains(marker)) {
        return Some(ActivityEvent::Left);
    }
    None
}

/// Build the `SET_ACTIVITY` arguments for an event.
#[must_use]
pub fn activity_payload(event: &ActivityEvent, pid: u32, started: i64) -> Value {
    match event {
        ActivityEvent::Joined { place_id, .. } => json!({
            "pid": pid,
            "activity": {
                "details": "Playing",
                "timestamps": { "start": started },
                "buttons": [{
                    "label": "See game page",
                    "url": format!("https://www.roblox.com/games/{place_id}"),
                }],
            },
        }),
        ActivityEvent::Left => json!({ "pid": pid }),
    }
}

/// Discord rich presence client.
pub struct DiscordPresence {
    app_id: String,
    socket_dir: Option<PathBuf>,
    reply_timeout: Duration,
    stream: Mutex<Option<UnixStream>>,
    nonce: AtomicU64,
}

impl Default for DiscordPresence {
    fn default() -> Self {
        Self::new(DISCORD_APP_ID)
    }
}

impl DiscordPresence {
    /// Client reporting as application `app_id`.
    #[must_use]
    pub fn new(app_id: &str) -> Self {
        Self {
            app_id: app_id.to_owned(),
            socket_dir: None,
            reply_timeout: REPLY_TIMEOUT,
            stream: Mutex::new(None),
            nonce: AtomicU64::new(0),
        }
    }

    /// Look for the IPC sockets in `dir` only.
    #[must_use]
    pub fn with_socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = Some(dir.into());
        self
    }

    /// Give up on a request that gets no reply within `timeout`.
    ///
    /// A timed-out exchange drops the connection, so later updates fail
    /// fast instead of waiting again.
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Candidate IPC socket paths in the order Discord clients try them.
    fn socket_candidates(&self) -> Vec<PathBuf> {
        let base = self.socket_dir.clone().unwrap_or_else(|| {
            ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
                .iter()
                .find_map(|var| env::var_os(var).filter(|v| !v.is_empty()))
                .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        });
        (0..10)
            .map(|i| base.join(format!("discord-ipc-{i}")))
            .collect()
    }

    async fn send_command(&self, args: Value) -> Result<()> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(AppError::Presence("not connected".into()));
        };
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let payload = json!({
            "cmd": "SET_ACTIVITY",
            "args": args,
            "nonce": nonce.to_string(),
        });
        let (op, reply) = match exchange(stream, OP_FRAME, &payload, self.reply_timeout).await {
            Ok(frame) => frame,
            Err(err) => {
                *guard = None;
                return Err(err);
            }
        };
        if op == OP_CLOSE {
            *guard = None;
            return Err(AppError::Presence(format!("connection closed: {reply}")));
        }
        if reply.get("evt").and_then(Value::as_str) == Some("ERROR") {
            return Err(AppError::Presence(format!("SET_ACTIVITY rejected: {reply}")));
        }
        Ok(())
    }
}

impl Presence for DiscordPresence {
    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut last_err = None;
            for path in self.socket_candidates() {
                match UnixStream::connect(&path).await {
                    Ok(mut stream) => {
                        let hello = json!({ "v": 1, "client_id": self.app_id });
                        let (op, reply) =
                            exchange(&mut stream, OP_HANDSHAKE, &hello, self.reply_timeout)
                                .await?;
                        if op == OP_CLOSE {
                            return Err(AppError::Presence(format!(
                                "handshake rejected: {reply}"
                            )));
                        }
                        info!(socket = %path.display(), "connected to discord");
                        *self.stream.lock().await = Some(stream);
                        return Ok(());
                    }
                    Err(err) => last_err = Some(err),
                }
            }
            Err(AppError::Presence(format!(
                "no discord ipc socket: {}",
                last_err.map_or_else(|| "none found".to_owned(), |err| err.to_string())
            )))
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Some(mut stream) = self.stream.lock().await.take() {
                let empty = json!({});
                let goodbye = write_frame(&mut stream, OP_CLOSE, &empty);
                match tokio::time::timeout(self.reply_timeout, goodbye).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => debug!(%err, "discord close frame failed"),
                    Err(_elapsed) => debug!("discord close frame timed out"),
                }
                if let Err(err) = stream.shutdown().await {
                    debug!(%err, "discord socket shutdown failed");
                }
                debug!("discord connection closed");
            }
        })
    }

    fn handle_log_line<'a>(
        &'a self,
        line: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let Some(event) = parse_activity(line) else {
                return Ok(());
            };
            debug!(?event, "presence activity changed");
            let args = activity_payload(&event, std::process::id(), Utc::now().timestamp());
            self.send_command(args).await
        })
    }
}

/// Write one frame and read the reply, bounded by `timeout`.
async fn exchange(
    stream: &mut UnixStream,
    op: u32,
    payload: &Value,
    timeout: Duration,
) -> Result<(u32, Value)> {
    let round_trip = async {
        write_frame(stream, op, payload).await?;
        read_frame(stream).await
    };
    tokio::time::timeout(timeout, round_trip)
        .await
        .map_err(|_| AppError::Presence(format!("no reply from discord within {timeout:?}")))?
}

async fn write_frame(stream: &mut UnixStream, op: u32, payload: &Value) -> Result<()> {
    let body = serde_json::to_vec(payload)
        .map_err(|err| AppError::Presence(format!("encode frame: {err}")))?;
    let len = u32::try_from(body.len())
        .map_err(|_| AppError::Presence("frame too large".into()))?;
    let mut frame = Vec::with_capacity(body.len() + 8);
    frame.extend_from_slice(&op.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    stream
        .write_all(&frame)
        .await
        .map_err(|err| AppError::Presence(format!("write frame: {err}")))
}

async fn read_frame(stream: &mut UnixStream) -> Result<(u32, Value)> {
    let mut header = [0u8; 8];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|err| AppError::Presence(format!("read frame header: {err}")))?;
    let op = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if len > MAX_FRAME {
        return Err(AppError::Presence(format!("frame of {len} bytes too large")));
    }
    let mut body = vec![0u8; len as usize];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|err| AppError::Presence(format!("read frame body: {err}")))?;
    let value = serde_json::from_slice(&body)
        .map_err(|err| AppError::Presence(format!("decode frame: {err}")))?;
    Ok((op, value))
}
