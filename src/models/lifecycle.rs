//! Lifecycle states of a single launch and their recorded history.

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

/// States a launch moves through, in order.
///
/// `WebViewInstalled` is only visited on a first run. A run ends in either
/// `Exited` or `Killed` before `Terminal`; runs that fail before the process
/// starts go straight to `Terminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing has happened yet.
    Uninitialized,
    /// Checking for, and possibly performing, first-run setup.
    Initializing,
    /// The helper web-view component was installed on this run.
    WebViewInstalled,
    /// The sandbox is usable.
    Ready,
    /// Side integrations are being brought up and the command built.
    Starting,
    /// The target process has been spawned.
    Running,
    /// The target process exited on its own.
    Exited,
    /// The target process was killed by the launcher.
    Killed,
    /// Side integrations have been torn down.
    Terminal,
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::WebViewInstalled => "webview_installed",
            Self::Ready => "ready",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Killed => "killed",
            Self::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

/// Append-only record of the states a launch has entered.
///
/// Cloning shares the underlying history, so the post-start task and the
/// orchestrator write into the same record.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    history: Arc<Mutex<Vec<LifecycleState>>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Start a history in [`LifecycleState::Uninitialized`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: Arc::new(Mutex::new(vec![LifecycleState::Uninitialized])),
        }
    }

    /// Enter `state` and log the transition.
    pub fn enter(&self, state: LifecycleState) {
        let mut guard = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let from = guard.last().copied().unwrap_or(LifecycleState::Uninitialized);
        guard.push(state);
        info!(%from, to = %state, "lifecycle transition");
    }

    /// Most recently entered state.
    #[must_use]
    pub fn current(&self) -> LifecycleState {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
            .unwrap_or(LifecycleState::Uninitialized)
    }

    /// Snapshot of every state entered so far.
    #[must_use]
    pub fn history(&self) -> Vec<LifecycleState> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether `state` was entered at any point.
    #[must_use]
    pub fn visited(&self, state: LifecycleState) -> bool {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&state)
    }
}
