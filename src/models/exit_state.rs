//! Exit-state cell shared between the primary wait and the signal supervisor.
//!
//! The cell replaces ad-hoc reads of the child's status from several tasks
//! with a single atomic state machine. Only two transitions leave
//! [`ExitState::Running`]: the primary wait records [`ExitState::Exited`]
//! and the signal supervisor records [`ExitState::Killed`]. Whichever
//! compare-and-set lands first wins; the loser observes the winner's state.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Observable state of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// The command has not been spawned yet.
    NotStarted,
    /// The process is alive as far as the launcher knows.
    Running,
    /// The primary wait observed the process exit on its own.
    Exited,
    /// The signal supervisor issued a kill.
    Killed,
}

impl ExitState {
    fn as_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Running => 1,
            Self::Exited => 2,
            Self::Killed => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Exited,
            3 => Self::Killed,
            _ => Self::NotStarted,
        }
    }
}

/// Shared, clonable handle to the exit state of one supervised process.
#[derive(Debug, Clone)]
pub struct ExitCell {
    state: Arc<AtomicU8>,
}

impl Default for ExitCell {
    fn default() -> Self {
        Self::new()
    }
}

impl ExitCell {
    /// Create a cell in the [`ExitState::NotStarted`] state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(ExitState::NotStarted.as_u8())),
        }
    }

    /// Current state.
    #[must_use]
    pub fn get(&self) -> ExitState {
        ExitState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Record that the process was spawned. Returns `false` if the cell
    /// already left `NotStarted`.
    pub fn mark_running(&self) -> bool {
        self.transition(ExitState::NotStarted, ExitState::Running)
    }

    /// Record a natural exit. Returns `false` if a kill was recorded first.
    pub fn mark_exited(&self) -> bool {
        self.transition(ExitState::Running, ExitState::Exited)
    }

    /// Record a kill. Returns `false` if the process is not running, in
    /// which case the caller must not signal the PID.
    pub fn mark_killed(&self) -> bool {
        self.transition(ExitState::Running, ExitState::Killed)
    }

    fn transition(&self, from: ExitState, to: ExitState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
