//! Well-known directories used by the launcher.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::BinaryType;
use crate::{AppError, Result};

const APP_DIR: &str = "cellar";

/// Directory layout rooted at the launcher's data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirs {
    /// Root data directory (`$XDG_DATA_HOME/cellar`).
    pub data: PathBuf,
    /// Configuration directory (`$XDG_CONFIG_HOME/cellar`).
    pub config: PathBuf,
}

impl Dirs {
    /// Derive the layout from `XDG_DATA_HOME`, `XDG_CONFIG_HOME` and `HOME`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither the XDG variable nor `HOME`
    /// is set.
    pub fn from_env() -> Result<Self> {
        let data = xdg_dir("XDG_DATA_HOME", &[".local", "share"])?;
        let config = xdg_dir("XDG_CONFIG_HOME", &[".config"])?;
        Ok(Self {
            data: data.join(APP_DIR),
            config: config.join(APP_DIR),
        })
    }

    /// Layout with both data and configuration under `root`.
    #[must_use]
    pub fn rooted(root: &Path) -> Self {
        Self {
            data: root.join("data"),
            config: root.join("config"),
        }
    }

    /// Directory holding one Wine prefix per binary.
    #[must_use]
    pub fn prefixes(&self) -> PathBuf {
        self.data.join("prefixes")
    }

    /// Prefix directory for `bt`.
    #[must_use]
    pub fn prefix(&self, bt: BinaryType) -> PathBuf {
        self.prefixes().join(bt.dir_name())
    }

    /// Installed deployments, one directory per version.
    #[must_use]
    pub fn versions(&self) -> PathBuf {
        self.data.join("versions")
    }

    /// Launcher log files.
    #[must_use]
    pub fn logs(&self) -> PathBuf {
        self.data.join("logs")
    }

    /// Persisted launcher state file.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.data.join("state.json")
    }

    /// Default configuration file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("cellar.toml")
    }

    /// Create `dir` and its parents.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be created.
    pub fn ensure(dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .map_err(|err| AppError::Io(format!("create {}: {err}", dir.display())))
    }
}

fn xdg_dir(var: &str, home_fallback: &[&str]) -> Result<PathBuf> {
    if let Some(dir) = env::var_os(var).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Config(format!("neither {var} nor HOME is set")))?;
    Ok(home_fallback
        .iter()
        .fold(PathBuf::from(home), |path, part| path.join(part)))
}
