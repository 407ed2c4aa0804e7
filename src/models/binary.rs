//! Target binary variant: which Roblox application a run launches.
//!
//! `BinaryType` is the positional CLI value of `cellar run`. It selects the
//! per-binary configuration table, the Wine prefix directory, and the
//! first-run initialization strategy.

use std::fmt::{Display, Formatter};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Roblox application variant supervised by a run.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryType {
    /// The game client.
    Player,
    /// The game editor.
    Studio,
}

impl BinaryType {
    /// Process name used in logs and the single-instance helper.
    #[must_use]
    pub fn binary_name(self) -> &'static str {
        match self {
            Self::Player => "RobloxPlayer",
            Self::Studio => "RobloxStudio",
        }
    }

    /// Windows executable file name inside a deployment directory.
    #[must_use]
    pub fn executable(self) -> &'static str {
        match self {
            Self::Player => "RobloxPlayerBeta.exe",
            Self::Studio => "RobloxStudioBeta.exe",
        }
    }

    /// Lower-case directory name used for the prefix and log files.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Studio => "studio",
        }
    }

    /// Whether only one instance may run at a time without the
    /// single-instance helper.
    #[must_use]
    pub fn requires_exclusivity(self) -> bool {
        matches!(self, Self::Player)
    }
}

impl Display for BinaryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Player => f.write_str("Player"),
            Self::Studio => f.write_str("Studio"),
        }
    }
}
