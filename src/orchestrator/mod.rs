//! Launch lifecycle orchestrator.
//!
//! Sequences one launch of a binary:
//!
//! 1. **Init**: first-run sandbox setup and web-view install.
//! 2. **Channel**: optional protocol-URI channel override.
//! 3. **Execute**: side integrations, command construction, spawn, and
//!    supervision until the process is gone.
//! 4. **Teardown**: side integrations are closed on every path.
//!
//! The orchestrator owns the child handle and is the only place that
//! decides whether the process exited or was killed.

mod outcome;
mod post_start;

pub use outcome::{classify, Outcome};

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{BinaryConfig, GlobalConfig};
use crate::dirs::Dirs;
use crate::integrations::{
    DialogSplash, DiscordPresence, GameModePortal, PerformanceMode, Presence, Splash,
};
use crate::launcher::{self, protocol, LaunchCommand};
use crate::models::{BinaryType, ExitCell, Lifecycle, LifecycleState};
use crate::sandbox::{HelperComponent, Sandbox, WinePrefix};
use crate::state::State;
use crate::supervisor::{LogWatch, SignalSupervisor};
use crate::{cpu, AppError, Result};

use post_start::PostStart;

/// Studio accepts every DPI except Wine's default of 96; setting it also
/// creates the prefix.
const STUDIO_DPI: u32 = 97;

/// Environment that lets Proton-style runtimes apply the game's fixes.
const GAME_ID: (&str, &str) = ("GAMEID", "ulwgl-roblox");

/// How long teardown waits for the post-start task after the process exit.
const POST_START_GRACE: Duration = Duration::from_secs(5);

/// Log directory of the target, relative to the sandbox's `AppData`.
const LOG_DIR: &[&str] = &["Local", "Roblox", "logs"];

/// External collaborators of a launch.
#[derive(Clone)]
pub struct Collaborators {
    /// Sandbox the binary runs in.
    pub sandbox: Arc<dyn Sandbox>,
    /// Progress and failure UI.
    pub splash: Arc<dyn Splash>,
    /// Presence reporting.
    pub presence: Arc<dyn Presence>,
    /// Performance-mode registration.
    pub performance: Arc<dyn PerformanceMode>,
}

impl Collaborators {
    /// Production collaborators for `bt`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configured Wine root is unusable.
    pub fn for_binary(
        bt: BinaryType,
        config: &GlobalConfig,
        dirs: &Dirs,
        splash: Arc<DialogSplash>,
    ) -> Result<Self> {
        let prefix = WinePrefix::new(
            dirs.prefix(bt),
            config.binary(bt).wine_root.clone(),
            config.webview_installer.clone(),
        )?;
        Ok(Self {
            sandbox: Arc::new(prefix),
            splash,
            presence: Arc::new(DiscordPresence::default()),
            performance: Arc::new(GameModePortal),
        })
    }
}

/// One launch of one binary.
pub struct Orchestrator {
    bt: BinaryType,
    config: BinaryConfig,
    force_init: bool,
    multiple_instances: bool,
    mutexer_path: Option<PathBuf>,
    log_timeout: Duration,
    die_timeout: Duration,
    dirs: Dirs,
    state: State,
    collab: Collaborators,
    lifecycle: Lifecycle,
    exit: ExitCell,
    presence_connected: bool,
    sink: Option<Box<dyn Write + Send>>,
}

impl Orchestrator {
    /// Prepare a launch of `bt`, loading persisted state from `dirs`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if the state file is unreadable.
    pub fn new(
        bt: BinaryType,
        config: &GlobalConfig,
        dirs: Dirs,
        collab: Collaborators,
    ) -> Result<Self> {
        let state = State::load(&dirs.state_file()).map_err(|err| err.context("load state"))?;
        Ok(Self {
            bt,
            config: config.binary(bt).clone(),
            force_init: config.force_init,
            multiple_instances: config.multiple_instances,
            mutexer_path: config.mutexer_path.clone(),
            log_timeout: config.timeouts.log_timeout(),
            die_timeout: config.timeouts.die_timeout(),
            dirs,
            state,
            collab,
            lifecycle: Lifecycle::new(),
            exit: ExitCell::new(),
            presence_connected: false,
            sink: None,
        })
    }

    /// Run first-run initialization even if the sandbox looks set up.
    #[must_use]
    pub fn with_force_init(mut self, force: bool) -> Self {
        self.force_init |= force;
        self
    }

    /// Override the log discovery timeout and the shutdown grace period.
    #[must_use]
    pub fn with_timeouts(mut self, log_timeout: Duration, die_timeout: Duration) -> Self {
        self.log_timeout = log_timeout;
        self.die_timeout = die_timeout;
        self
    }

    /// Relay the target's log lines into `sink` instead of stderr.
    #[must_use]
    pub fn with_log_sink(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Lifecycle history of this launch.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Exit state of the supervised process.
    #[must_use]
    pub fn exit_cell(&self) -> &ExitCell {
        &self.exit
    }

    /// Effective per-binary configuration, including per-run changes.
    #[must_use]
    pub fn config(&self) -> &BinaryConfig {
        &self.config
    }

    /// Full launch: init, channel override, execute, teardown.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; recoverable failures are only logged.
    pub async fn run(&mut self, args: &[String]) -> Result<Outcome> {
        let result = self.run_inner(args).await;
        self.teardown().await;
        result
    }

    async fn run_inner(&mut self, args: &[String]) -> Result<Outcome> {
        let bt = self.bt;
        self.init()
            .instrument(info_span!("init", binary = %bt))
            .await
            .map_err(|err| err.context(format!("init {bt}")))?;

        if protocol::is_protocol_invocation(args) {
            protocol::apply_channel_override(&args[0], &mut self.config.channel);
        }

        self.collab.splash.set_description(self.channel_name());
        self.remember_channel();

        self.execute(args)
            .instrument(info_span!("execute", binary = %bt))
            .await
            .map_err(|err| err.context(format!("failed to run {bt}")))
    }

    /// Check for the first-run marker and set the sandbox up if needed.
    ///
    /// Returns whether first-run initialization was performed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Initialization` if sandbox setup or the web-view
    /// install fails.
    pub async fn init(&mut self) -> Result<bool> {
        self.lifecycle.enter(LifecycleState::Initializing);
        let sandbox = Arc::clone(&self.collab.sandbox);
        let first_run = !sandbox.is_initialized();

        if first_run && !cpu::has_avx() {
            warn!("CPU does not support AVX, the binary will most likely fail to run");
        }

        if !(first_run || self.force_init) {
            self.lifecycle.enter(LifecycleState::Ready);
            return Ok(false);
        }

        info!(dir = %sandbox.dir().display(), "initializing wineprefix");
        self.collab.splash.set_message("Initializing wineprefix");

        match self.bt {
            BinaryType::Player => sandbox.initialize().await,
            BinaryType::Studio => sandbox.set_display_scaling(STUDIO_DPI).await,
        }
        .map_err(|err| err.context(format!("failed to init {} prefix", self.bt)))?;

        self.collab.splash.set_message("Installing WebView");
        let webview = sandbox
            .install_helper_component()
            .await
            .map_err(|err| err.context("failed to install webview"))?;
        if webview == HelperComponent::Installed {
            self.lifecycle.enter(LifecycleState::WebViewInstalled);
        }

        self.lifecycle.enter(LifecycleState::Ready);
        Ok(true)
    }

    /// Build the command that starts the binary with `args`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessStart` if no deployment is installed, or
    /// `AppError::InvalidLauncherConfig` if the wrapping launcher cannot be
    /// resolved.
    pub fn command(&self, args: &[String]) -> Result<LaunchCommand> {
        let args = launcher::rewrite_protocol_args(args);
        let exe = self.deployment_dir()?.join(self.bt.executable());

        let mut base = self
            .collab
            .sandbox
            .wine_command(&exe, &args)
            .env(GAME_ID.0, GAME_ID.1);
        let mut env: Vec<_> = self.config.env.iter().collect();
        env.sort();
        for (key, value) in env {
            base = base.env(key, value);
        }

        launcher::build_command(base, &self.config.launcher, || self.config.launcher_path())
    }

    async fn execute(&mut self, args: &[String]) -> Result<Outcome> {
        self.lifecycle.enter(LifecycleState::Starting);

        if self.config.presence {
            self.connect_presence().await;
        }

        if self.multiple_instances && self.bt.requires_exclusivity() {
            self.start_mutexer()?;
        }

        let cmd = self
            .command(args)
            .map_err(|err| err.context(format!("{} command", self.bt)))?;

        // Subscribe before the spawn so the log file creation is not missed.
        let watch = self.subscribe_logs();
        let signals = SignalSupervisor::install()?;

        let (started_tx, started_rx) = oneshot::channel();
        let stop = CancellationToken::new();
        let post_start = PostStart {
            started: started_rx,
            watch,
            log_timeout: self.log_timeout,
            die_timeout: self.die_timeout,
            splash: Arc::clone(&self.collab.splash),
            performance: self
                .config
                .game_mode
                .then(|| Arc::clone(&self.collab.performance)),
            presence: self
                .config
                .presence
                .then(|| Arc::clone(&self.collab.presence)),
            kill_tx: signals.kill_sender(),
            sink: self
                .sink
                .take()
                .unwrap_or_else(|| Box::new(std::io::stderr())),
            stop: stop.clone(),
        };
        let mut post_start = tokio::spawn(post_start.run().instrument(info_span!("post_start")));

        info!(name = self.bt.binary_name(), %cmd, "running binary");
        self.collab
            .splash
            .set_message(&format!("Launching {}", self.bt));

        let (mut child, pid) = match spawn_tracked(&cmd) {
            Ok(spawned) => spawned,
            Err(err) => {
                signals.abandon();
                return Err(err);
            }
        };

        self.exit.mark_running();
        self.lifecycle.enter(LifecycleState::Running);
        let guard = signals.supervise(pid, self.exit.clone());
        let _ = started_tx.send(pid);

        let status = child.wait().await;
        self.exit.mark_exited();
        // Natural exit or not, interception ends here.
        if let Some(received) = guard.finish().await {
            debug!(signal = %received, "supervision ended by signal");
        }
        stop.cancel();

        if tokio::time::timeout(POST_START_GRACE, &mut post_start)
            .await
            .is_err()
        {
            warn!("post-start work did not finish after exit, abandoning it");
            post_start.abort();
        }

        let status = status.map_err(|err| AppError::ProcessRuntime(format!("wait: {err}")))?;
        let outcome = classify(status.code(), self.exit.get())?;
        match outcome {
            Outcome::Killed => {
                warn!(pid, "{} was killed", self.bt);
                self.lifecycle.enter(LifecycleState::Killed);
            }
            Outcome::Exited => {
                info!(pid, "{} exited", self.bt);
                self.lifecycle.enter(LifecycleState::Exited);
            }
        }
        Ok(outcome)
    }

    async fn connect_presence(&mut self) {
        match self.collab.presence.connect().await {
            Ok(()) => self.presence_connected = true,
            Err(err) => {
                error!(%err, "could not connect to presence, disabling for this run");
                self.config.presence = false;
            }
        }
    }

    fn subscribe_logs(&self) -> Option<LogWatch> {
        let dir = match self.log_dir() {
            Ok(dir) => dir,
            Err(err) => {
                error!(%err, "could not locate log directory");
                return None;
            }
        };
        match LogWatch::subscribe(&dir) {
            Ok(watch) => Some(watch),
            Err(err) => {
                error!(%err, "log discovery unavailable");
                None
            }
        }
    }

    /// Start the helper that holds the single-instance mutex.
    fn start_mutexer(&self) -> Result<()> {
        let Some(path) = &self.mutexer_path else {
            warn!("multiple_instances is set but no mutexer_path is configured");
            return Ok(());
        };

        info!("running single-instance helper");
        let mut child = self
            .collab
            .sandbox
            .wine_command(path, &[])
            .to_command()
            .spawn()
            .map_err(|err| AppError::ProcessStart(format!("start mutexer: {err}")))?;

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!("single-instance helper exited"),
                Ok(status) => error!(%status, "single-instance helper returned too early"),
                Err(err) => error!(%err, "single-instance helper wait failed"),
            }
        });
        Ok(())
    }

    async fn teardown(&mut self) {
        if self.presence_connected {
            self.collab.presence.close().await;
            self.presence_connected = false;
        }
        self.lifecycle.enter(LifecycleState::Terminal);
    }

    fn log_dir(&self) -> Result<PathBuf> {
        let app_data = self.collab.sandbox.app_data_dir()?;
        Ok(LOG_DIR.iter().fold(app_data, |path, part| path.join(part)))
    }

    fn deployment_dir(&self) -> Result<PathBuf> {
        let version = self.state.binary(self.bt).version.as_deref().ok_or_else(|| {
            AppError::ProcessStart(format!("{} is not installed", self.bt))
        })?;
        Ok(self.dirs.versions().join(version))
    }

    fn channel_name(&self) -> &str {
        if self.config.channel.is_empty() {
            "LIVE"
        } else {
            &self.config.channel
        }
    }

    /// Record the channel used for this run in the persisted state.
    fn remember_channel(&mut self) {
        let channel = self.config.channel.clone();
        let entry = self.state.binary_mut(self.bt);
        if entry.channel.as_deref() == Some(channel.as_str()) {
            return;
        }
        if let Some(previous) = &entry.channel {
            info!(previous, channel, "deployment channel changed");
        }
        entry.channel = Some(channel);
        if let Err(err) = self.state.save(&self.dirs.state_file()) {
            warn!(%err, "failed to save state");
        }
    }
}

/// Spawn `cmd` and return the child with its pid.
fn spawn_tracked(cmd: &LaunchCommand) -> Result<(tokio::process::Child, u32)> {
    let child = cmd
        .to_command()
        .spawn()
        .map_err(|err| AppError::ProcessStart(format!("{}: {err}", cmd.program.display())))?;
    let pid = child
        .id()
        .ok_or_else(|| AppError::ProcessStart("process exited before it was tracked".into()))?;
    Ok((child, pid))
}
