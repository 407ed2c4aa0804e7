//! Persisted launcher state between runs.
//!
//! Stored as a small JSON document. Only what a later run needs is kept:
//! the installed deployment version and the channel it was installed from.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::BinaryType;
use crate::{AppError, Result};

/// Persisted facts about one binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BinaryState {
    /// Installed deployment version (directory name under `versions/`).
    #[serde(default)]
    pub version: Option<String>,
    /// Channel the installed deployment came from.
    #[serde(default)]
    pub channel: Option<String>,
}

/// Whole state document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct State {
    /// Player state.
    #[serde(default)]
    pub player: BinaryState,
    /// Studio state.
    #[serde(default)]
    pub studio: BinaryState,
}

impl State {
    /// Load state from `path`; a missing file is an empty state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if the file exists but cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no state file, starting empty");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(AppError::State(format!(
                    "read {}: {err}",
                    path.display()
                )))
            }
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write state to `path` atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if serialization or any write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| AppError::State(format!("create {}: {err}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|err| AppError::State(format!("write {}: {err}", tmp.display())))?;
        fs::rename(&tmp, path)
            .map_err(|err| AppError::State(format!("rename {}: {err}", path.display())))
    }

    /// State for the given binary.
    #[must_use]
    pub fn binary(&self, bt: BinaryType) -> &BinaryState {
        match bt {
            BinaryType::Player => &self.player,
            BinaryType::Studio => &self.studio,
        }
    }

    /// Mutable state for the given binary.
    pub fn binary_mut(&mut self, bt: BinaryType) -> &mut BinaryState {
        match bt {
            BinaryType::Player => &mut self.player,
            BinaryType::Studio => &mut self.studio,
        }
    }
}
