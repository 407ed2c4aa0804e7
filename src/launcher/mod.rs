//! Process launcher: builds the command that starts the sandboxed binary.
//!
//! Everything here is pure construction. The environment the Wine process
//! needs is carried on [`LaunchCommand`] instead of being written into the
//! launcher's own process environment.

pub mod protocol;

use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::{AppError, Result};

/// Studio protocol invocations are passed to the executable behind this flag.
const STUDIO_PROTOCOL: &str = "roblox-studio:1";
const PROTOCOL_STRING_FLAG: &str = "-protocolString";

/// A fully described command, ready to be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments passed to `program`.
    pub args: Vec<OsString>,
    /// Environment added on top of the inherited one.
    pub env: Vec<(OsString, OsString)>,
    /// Working directory, if any.
    pub current_dir: Option<PathBuf>,
}

impl LaunchCommand {
    /// Command running `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set one environment variable. Later values for the same key win.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Look up the last value set for `key`.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&OsString> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Wrap this command in an external launcher.
    ///
    /// `tokens` are placed before the current program and its arguments,
    /// and `launcher` becomes the executable. The first token is therefore
    /// the launcher's own argv[0]-style name and is kept as given.
    #[must_use]
    pub fn wrapped(mut self, launcher: &Path, tokens: &[&str]) -> Self {
        let mut args: Vec<OsString> = tokens
            .iter()
            .skip(1)
            .map(|t| OsString::from(*t))
            .collect();
        args.push(self.program.into_os_string());
        args.append(&mut self.args);
        self.program = launcher.to_path_buf();
        self.args = args;
        self
    }

    /// Convert into a spawnable `tokio` command.
    ///
    /// Stdio is inherited; the child is killed if the handle is dropped.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Display for LaunchCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Rewrite Studio protocol invocations into `-protocolString <uri>`.
///
/// Any other argument list is returned unchanged.
#[must_use]
pub fn rewrite_protocol_args(args: &[String]) -> Vec<String> {
    if args.join(" ").starts_with(STUDIO_PROTOCOL) {
        vec![PROTOCOL_STRING_FLAG.to_owned(), args[0].clone()]
    } else {
        args.to_vec()
    }
}

/// Apply the configured wrapping launcher to `base`.
///
/// An empty (or whitespace-only) `launcher` leaves `base` untouched and
/// never calls `resolve`. Otherwise `resolve` must produce the launcher's
/// executable path.
///
/// # Errors
///
/// Returns `AppError::InvalidLauncherConfig` when `resolve` fails; no
/// command is produced in that case.
pub fn build_command<F>(base: LaunchCommand, launcher: &str, resolve: F) -> Result<LaunchCommand>
where
    F: FnOnce() -> Result<PathBuf>,
{
    let tokens: Vec<&str> = launcher.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(base);
    }

    let path = resolve().map_err(|err| match err {
        AppError::InvalidLauncherConfig(msg) => AppError::InvalidLauncherConfig(msg),
        other => AppError::InvalidLauncherConfig(other.to_string()),
    })?;

    Ok(base.wrapped(&path, &tokens))
}
