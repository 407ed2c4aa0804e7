#![forbid(unsafe_code)]

//! `cellar` launcher binary.
//!
//! Parses the command line, sets up logging to stderr and a per-run log
//! file, and hands the launch to the orchestrator. Fatal errors end with
//! exit status 1 and, when no terminal is attached, a failure dialog.

use std::fs::File;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use cellar::dirs::Dirs;
use cellar::integrations::{DialogSplash, Splash};
use cellar::models::BinaryType;
use cellar::orchestrator::{Collaborators, Orchestrator};
use cellar::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "cellar", about = "Roblox launcher for Wine", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format on stderr (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Re-run first-run initialization of the wineprefix.
    #[arg(long)]
    first_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Launch a binary, passing any remaining arguments to it.
    Run {
        /// Which binary to launch.
        #[arg(value_enum)]
        binary: BinaryType,

        /// Arguments or a protocol URI for the binary.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let Command::Run { binary, args } = &cli.command;

    let dirs = match Dirs::from_env() {
        Ok(dirs) => dirs,
        Err(err) => {
            eprintln!("cellar: {err}");
            return ExitCode::FAILURE;
        }
    };

    let log_path = match init_tracing(cli.log_format, &dirs.logs(), *binary) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("cellar: {err}");
            return ExitCode::FAILURE;
        }
    };
    info!(path = %log_path.display(), "logging to file");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(launch(&cli, &dirs, *binary, args, log_path))
}

async fn launch(
    cli: &Cli,
    dirs: &Dirs,
    binary: BinaryType,
    args: &[String],
    log_path: PathBuf,
) -> ExitCode {
    let config_path = cli.config.clone().unwrap_or_else(|| dirs.config_file());
    let config = match GlobalConfig::load_from_path(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "configuration failed");
            return ExitCode::FAILURE;
        }
    };

    let splash = Arc::new(DialogSplash::new(config.splash.enabled));
    splash.set_log_path(log_path);

    match run(binary, &config, dirs, Arc::clone(&splash), cli.first_run, args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "launch failed");
            if config.splash.enabled && !std::io::stderr().is_terminal() {
                splash.set_message("Oops!");
                splash
                    .show_fatal_dialog(&format!("Cellar experienced an error:\n{err}"))
                    .await;
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(
    binary: BinaryType,
    config: &GlobalConfig,
    dirs: &Dirs,
    splash: Arc<DialogSplash>,
    first_run: bool,
    args: &[String],
) -> Result<()> {
    let collab = Collaborators::for_binary(binary, config, dirs, splash)?;
    let mut orchestrator =
        Orchestrator::new(binary, config, dirs.clone(), collab)?.with_force_init(first_run);
    let outcome = orchestrator.run(args).await?;
    info!(?outcome, "launch finished");
    Ok(())
}

/// Log to stderr and to `<logs>/<binary>-<timestamp>.log`.
fn init_tracing(log_format: LogFormat, logs: &Path, binary: BinaryType) -> Result<PathBuf> {
    Dirs::ensure(logs)?;
    let stamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%:z");
    let path = logs.join(format!("{}-{stamp}.log", binary.dir_name()));
    let file = File::create(&path)
        .map_err(|err| AppError::Io(format!("create log file {}: {err}", path.display())))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer: Box<dyn Layer<Registry> + Send + Sync> = match log_format {
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };
    let file_layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(env_filter)
        .try_init()
        .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?;

    Ok(path)
}
