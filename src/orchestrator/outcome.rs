//! Classification of how the target process ended.

use crate::models::ExitState;
use crate::{AppError, Result};

/// Successful ways for a run to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The process exited on its own with status 0.
    Exited,
    /// The process was killed, by us or by a signal.
    Killed,
}

/// Decide the outcome of a run from the exit code and the exit cell.
///
/// `code` is `None` when the process was terminated by a signal. A kill
/// recorded by the signal supervisor always wins over the exit code, since
/// the process may report any status while dying.
///
/// # Errors
///
/// Returns `AppError::ProcessRuntime` for a non-zero exit that was not a
/// kill.
pub fn classify(code: Option<i32>, state: ExitState) -> Result<Outcome> {
    if state == ExitState::Killed {
        return Ok(Outcome::Killed);
    }
    match code {
        None => Ok(Outcome::Killed),
        Some(0) => Ok(Outcome::Exited),
        Some(code) => Err(AppError::ProcessRuntime(format!(
            "process exited with code {code}"
        ))),
    }
}
