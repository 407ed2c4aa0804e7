//! Sandbox environment abstraction.
//!
//! The orchestrator only needs a handful of operations from the Wine
//! prefix; they are collected in the [`Sandbox`] trait so tests can swap
//! in a prefix that runs plain shell commands.

pub mod prefix;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::launcher::LaunchCommand;
use crate::Result;

pub use prefix::WinePrefix;

/// Path inside the sandbox whose presence proves first-run setup happened.
pub const FIRST_RUN_MARKER: &[&str] = &["drive_c", "windows"];

/// Result of the web-view install step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperComponent {
    /// The installer ran and succeeded.
    Installed,
    /// No installer is configured; nothing was installed.
    NotConfigured,
}

/// Operations the launcher performs on the sandbox environment.
pub trait Sandbox: Send + Sync {
    /// Root directory of the sandbox.
    fn dir(&self) -> &Path;

    /// Whether the sandbox shows evidence of prior setup.
    fn is_initialized(&self) -> bool {
        FIRST_RUN_MARKER
            .iter()
            .fold(self.dir().to_path_buf(), |path, part| path.join(part))
            .exists()
    }

    /// Create and populate the sandbox.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Initialization` if setup fails.
    fn initialize(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Set the display DPI. Creates the sandbox as a side effect if needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Initialization` if the setting cannot be applied.
    fn set_display_scaling(&self, dpi: u32)
        -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Install the web-view helper component the target needs, reporting
    /// whether anything was installed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Initialization` if a configured installer is
    /// missing or fails.
    fn install_helper_component(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<HelperComponent>> + Send + '_>>;

    /// The Windows user's `AppData` directory inside the sandbox.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be determined.
    fn app_data_dir(&self) -> Result<PathBuf>;

    /// Command running the Windows executable `program` inside the sandbox.
    fn wine_command(&self, program: &Path, args: &[String]) -> LaunchCommand;
}
