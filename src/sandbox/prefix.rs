//! Wine prefix implementation of [`Sandbox`].

use std::env;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use tracing::{info, warn};

use super::{HelperComponent, Sandbox};
use crate::launcher::LaunchCommand;
use crate::{AppError, Result};

const DESKTOP_KEY: &str = r"HKEY_CURRENT_USER\Control Panel\Desktop";

/// A Wine prefix directory plus the Wine installation that drives it.
#[derive(Debug, Clone)]
pub struct WinePrefix {
    dir: PathBuf,
    wine_root: Option<PathBuf>,
    webview_installer: Option<PathBuf>,
}

impl WinePrefix {
    /// Describe a prefix at `dir`. Nothing is created on disk.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `wine_root` is set but has no
    /// `bin/wine`.
    pub fn new(
        dir: PathBuf,
        wine_root: Option<PathBuf>,
        webview_installer: Option<PathBuf>,
    ) -> Result<Self> {
        if let Some(root) = &wine_root {
            let wine = root.join("bin").join("wine");
            if !wine.is_file() {
                return Err(AppError::Config(format!(
                    "wine root {} has no bin/wine",
                    root.display()
                )));
            }
        }
        Ok(Self {
            dir,
            wine_root,
            webview_installer,
        })
    }

    /// Path (or bare name) of a Wine tool such as `wine` or `wineboot`.
    fn tool(&self, name: &str) -> PathBuf {
        match &self.wine_root {
            Some(root) => root.join("bin").join(name),
            None => PathBuf::from(name),
        }
    }

    /// Base command for a Wine tool with the prefix environment applied.
    ///
    /// With a Wine root, `WINE` names its `wine` and its `bin` directory is
    /// put first on `PATH` so helper tools resolve to the same build.
    fn tool_command(&self, name: &str) -> LaunchCommand {
        let mut cmd = LaunchCommand::new(self.tool(name)).env("WINEPREFIX", &self.dir);
        if let Some(root) = &self.wine_root {
            cmd = cmd.env("WINE", self.tool("wine"));
            let inherited = env::var_os("PATH").unwrap_or_default();
            let dirs = std::iter::once(root.join("bin")).chain(env::split_paths(&inherited));
            match env::join_paths(dirs) {
                Ok(path) => cmd = cmd.env("PATH", path),
                Err(err) => warn!(%err, "wine root cannot be added to PATH"),
            }
        }
        cmd
    }

    async fn run(&self, what: &str, cmd: LaunchCommand) -> Result<()> {
        info!(%cmd, "running {what}");
        let status = cmd
            .to_command()
            .stdout(Stdio::null())
            .status()
            .await
            .map_err(|err| AppError::Initialization(format!("{what}: {err}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(AppError::Initialization(format!("{what}: {status}")))
        }
    }
}

impl Sandbox for WinePrefix {
    fn dir(&self) -> &Path {
        &self.dir
    }

    fn initialize(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            fs::create_dir_all(&self.dir).map_err(|err| {
                AppError::Initialization(format!("create {}: {err}", self.dir.display()))
            })?;
            self.run("wineboot", self.tool_command("wineboot").arg("-i"))
                .await
        })
    }

    fn set_display_scaling(
        &self,
        dpi: u32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let dpi = dpi.to_string();
            let cmd = self.tool_command("wine").args([
                "reg",
                "add",
                DESKTOP_KEY,
                "/v",
                "LogPixels",
                "/t",
                "REG_DWORD",
                "/d",
                dpi.as_str(),
                "/f",
            ]);
            self.run("set dpi", cmd).await
        })
    }

    fn install_helper_component(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<HelperComponent>> + Send + '_>> {
        Box::pin(async move {
            let Some(installer) = &self.webview_installer else {
                warn!("no webview installer configured, skipping webview install");
                return Ok(HelperComponent::NotConfigured);
            };
            if !installer.is_file() {
                return Err(AppError::Initialization(format!(
                    "webview installer {} does not exist",
                    installer.display()
                )));
            }
            let cmd = self
                .wine_command(installer, &["/silent".to_owned(), "/install".to_owned()]);
            self.run("webview installer", cmd).await?;
            Ok(HelperComponent::Installed)
        })
    }

    fn app_data_dir(&self) -> Result<PathBuf> {
        let users = self.dir.join("drive_c").join("users");

        if let Some(user) = env::var_os("USER").filter(|u| !u.is_empty()) {
            let candidate = users.join(user);
            if candidate.is_dir() {
                return Ok(candidate.join("AppData"));
            }
        }

        // Fall back to the only non-public profile in the prefix.
        let entries = fs::read_dir(&users)
            .map_err(|err| AppError::Io(format!("read {}: {err}", users.display())))?;
        entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .find(|path| path.is_dir() && path.file_name().is_some_and(|n| n != "Public"))
            .map(|profile| profile.join("AppData"))
            .ok_or_else(|| AppError::Io(format!("no user profile in {}", users.display())))
    }

    fn wine_command(&self, program: &Path, args: &[String]) -> LaunchCommand {
        self.tool_command("wine").arg(program).args(args)
    }
}
