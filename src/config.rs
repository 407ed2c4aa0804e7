//! Global configuration parsing, validation, and launcher resolution.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::models::BinaryType;
use crate::{AppError, Result};

/// Splash / progress window behaviour.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SplashConfig {
    /// Whether progress and failure dialogs are shown at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SplashConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Timeouts (seconds) bounding the supervision of a run.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// How long the target process has to create its log file.
    #[serde(default = "default_log_seconds")]
    pub log_seconds: u64,
    /// Grace period between the shutdown marker and the forced kill.
    #[serde(default = "default_die_seconds")]
    pub die_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            log_seconds: default_log_seconds(),
            die_seconds: default_die_seconds(),
        }
    }
}

impl TimeoutConfig {
    /// Log discovery timeout as a [`Duration`].
    #[must_use]
    pub fn log_timeout(&self) -> Duration {
        Duration::from_secs(self.log_seconds)
    }

    /// Shutdown grace period as a [`Duration`].
    #[must_use]
    pub fn die_timeout(&self) -> Duration {
        Duration::from_secs(self.die_seconds)
    }
}

fn default_true() -> bool {
    true
}

fn default_log_seconds() -> u64 {
    6
}

fn default_die_seconds() -> u64 {
    3
}

/// Per-binary settings (`[player]` and `[studio]` tables).
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BinaryConfig {
    /// Deployment channel; empty means the default channel.
    #[serde(default)]
    pub channel: String,
    /// Wrapping launcher command line, e.g. `gamemoderun` or `prime-run`.
    #[serde(default)]
    pub launcher: String,
    /// Wine installation root; `None` uses `wine` from `PATH`.
    #[serde(default)]
    pub wine_root: Option<PathBuf>,
    /// Report activity to Discord.
    #[serde(default)]
    pub presence: bool,
    /// Register the process with the `GameMode` portal.
    #[serde(default)]
    pub game_mode: bool,
    /// Extra environment passed to the Wine command only.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl BinaryConfig {
    /// Resolve the executable of the configured wrapping launcher.
    ///
    /// The first whitespace-separated token of `launcher` is used. Tokens
    /// containing a `/` are taken as paths; anything else is looked up in
    /// `PATH`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidLauncherConfig` if the launcher is empty
    /// or does not name an existing file.
    pub fn launcher_path(&self) -> Result<PathBuf> {
        let first = self
            .launcher
            .split_whitespace()
            .next()
            .ok_or_else(|| AppError::InvalidLauncherConfig("launcher is empty".into()))?;

        if first.contains('/') {
            let path = PathBuf::from(first);
            return if path.is_file() {
                Ok(path)
            } else {
                Err(AppError::InvalidLauncherConfig(format!(
                    "{first} does not exist"
                )))
            };
        }

        find_in_path(first).ok_or_else(|| {
            AppError::InvalidLauncherConfig(format!("{first} not found in PATH"))
        })
    }
}

/// Look up an executable name in the directories of `PATH`.
fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Global configuration parsed from `cellar.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Allow several Player instances by running the single-instance helper.
    #[serde(default)]
    pub multiple_instances: bool,
    /// Always run first-run initialization, even on an existing prefix.
    #[serde(default)]
    pub force_init: bool,
    /// Installer executed inside the prefix to provide the web-view component.
    #[serde(default)]
    pub webview_installer: Option<PathBuf>,
    /// Windows helper that holds the singleton mutex for the Player.
    #[serde(default)]
    pub mutexer_path: Option<PathBuf>,
    /// Splash and dialog behaviour.
    #[serde(default)]
    pub splash: SplashConfig,
    /// Supervision timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Player settings.
    #[serde(default)]
    pub player: BinaryConfig,
    /// Studio settings.
    #[serde(default)]
    pub studio: BinaryConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Settings table for the given binary.
    #[must_use]
    pub fn binary(&self, bt: BinaryType) -> &BinaryConfig {
        match bt {
            BinaryType::Player => &self.player,
            BinaryType::Studio => &self.studio,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.timeouts.log_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.log_seconds must be greater than zero".into(),
            ));
        }

        for (bt, bcfg) in [
            (BinaryType::Player, &self.player),
            (BinaryType::Studio, &self.studio),
        ] {
            if let Some(root) = &bcfg.wine_root {
                if !root.is_absolute() {
                    return Err(AppError::Config(format!(
                        "{bt} wine_root must be an absolute path"
                    )));
                }
            }
        }

        Ok(())
    }
}
