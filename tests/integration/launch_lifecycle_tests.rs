//! End-to-end launch tests against a fake sandbox that runs shell scripts.
//!
//! Validates:
//! - First run performs sandbox setup and the web-view install before the
//!   process starts; later runs skip both. Without an installer the
//!   web-view state is never entered
//! - A stuck shutdown is detected from the log and ends in a kill
//! - Presence failures disable presence without failing the run
//! - Launcher and exit-status failures surface as errors after teardown

use std::time::Duration;

use cellar::models::{BinaryType, ExitState, LifecycleState};
use cellar::orchestrator::{Orchestrator, Outcome};
use cellar::state::State;
use cellar::supervisor::SHUTDOWN_MARKER;
use cellar::{AppError, GlobalConfig};

use super::test_helpers::{calls_of, FakePresence, FakeSandbox, Harness, SharedBuf};

fn orchestrator(harness: &Harness, bt: BinaryType, config: &GlobalConfig) -> Orchestrator {
    Orchestrator::new(bt, config, harness.dirs.clone(), harness.collaborators())
        .unwrap()
        .with_timeouts(Duration::from_secs(3), Duration::from_millis(100))
}

fn stuck_shutdown_script() -> String {
    format!(
        "mkdir -p \"$LOGDIR\"\n\
         printf '%s\\n' 'first line' '! Joining game' '{SHUTDOWN_MARKER} 0' > \"$LOGDIR/player.log\"\n\
         exec sleep 30\n"
    )
}

#[tokio::test]
async fn first_run_initializes_before_running() {
    let harness = Harness::new(BinaryType::Player, "exit 0");
    let config = GlobalConfig::default();

    let mut orch = orchestrator(&harness, BinaryType::Player, &config);
    assert_eq!(orch.run(&[]).await.unwrap(), Outcome::Exited);

    let calls = calls_of(&harness.sandbox.calls);
    assert_eq!(calls.len(), 3, "{calls:?}");
    assert_eq!(calls[0], "initialize");
    assert_eq!(calls[1], "install_helper_component");
    assert!(calls[2].starts_with("wine_command RobloxPlayerBeta.exe"));

    assert_eq!(
        orch.lifecycle().history(),
        vec![
            LifecycleState::Uninitialized,
            LifecycleState::Initializing,
            LifecycleState::WebViewInstalled,
            LifecycleState::Ready,
            LifecycleState::Starting,
            LifecycleState::Running,
            LifecycleState::Exited,
            LifecycleState::Terminal,
        ]
    );
    assert_eq!(orch.exit_cell().get(), ExitState::Exited);
}

#[tokio::test]
async fn first_run_without_webview_installer_skips_webview_state() {
    let harness =
        Harness::new(BinaryType::Player, "exit 0").with_sandbox(FakeSandbox::without_helper);
    let config = GlobalConfig::default();

    let mut orch = orchestrator(&harness, BinaryType::Player, &config);
    assert_eq!(orch.run(&[]).await.unwrap(), Outcome::Exited);

    let calls = calls_of(&harness.sandbox.calls);
    assert_eq!(calls[1], "install_helper_component");
    assert!(!orch.lifecycle().visited(LifecycleState::WebViewInstalled));
    assert_eq!(
        orch.lifecycle().history(),
        vec![
            LifecycleState::Uninitialized,
            LifecycleState::Initializing,
            LifecycleState::Ready,
            LifecycleState::Starting,
            LifecycleState::Running,
            LifecycleState::Exited,
            LifecycleState::Terminal,
        ]
    );
}

#[tokio::test]
async fn second_run_skips_initialization() {
    let harness = Harness::new(BinaryType::Player, "exit 0");
    let config = GlobalConfig::default();

    orchestrator(&harness, BinaryType::Player, &config)
        .run(&[])
        .await
        .unwrap();
    harness.sandbox.calls.lock().unwrap().clear();

    let mut orch = orchestrator(&harness, BinaryType::Player, &config);
    assert_eq!(orch.run(&[]).await.unwrap(), Outcome::Exited);

    let calls = calls_of(&harness.sandbox.calls);
    assert_eq!(calls.len(), 1, "{calls:?}");
    assert!(calls[0].starts_with("wine_command"));
    assert!(!orch.lifecycle().visited(LifecycleState::WebViewInstalled));
    assert!(orch.lifecycle().visited(LifecycleState::Ready));
}

#[tokio::test]
async fn forced_init_reinitializes_existing_sandbox() {
    let harness = Harness::new(BinaryType::Player, "exit 0");
    let config = GlobalConfig::default();

    orchestrator(&harness, BinaryType::Player, &config)
        .run(&[])
        .await
        .unwrap();
    harness.sandbox.calls.lock().unwrap().clear();

    let mut orch = orchestrator(&harness, BinaryType::Player, &config).with_force_init(true);
    orch.run(&[]).await.unwrap();

    let calls = calls_of(&harness.sandbox.calls);
    assert_eq!(calls[0], "initialize");
    assert!(orch.lifecycle().visited(LifecycleState::WebViewInstalled));
}

#[tokio::test]
async fn studio_first_run_sets_display_scaling() {
    let harness = Harness::new(BinaryType::Studio, "exit 0");
    let config = GlobalConfig::default();

    let mut orch = orchestrator(&harness, BinaryType::Studio, &config);
    orch.run(&[]).await.unwrap();

    let calls = calls_of(&harness.sandbox.calls);
    assert_eq!(calls[0], "set_display_scaling 97");
    assert_eq!(calls[1], "install_helper_component");
}

#[tokio::test]
async fn studio_protocol_uri_becomes_protocol_string() {
    let harness = Harness::new(BinaryType::Studio, "exit 0");
    let config = GlobalConfig::default();
    let uri = "roblox-studio:1+launchmode:edit".to_owned();

    let mut orch = orchestrator(&harness, BinaryType::Studio, &config);
    orch.run(&[uri.clone()]).await.unwrap();

    let calls = calls_of(&harness.sandbox.calls);
    let command = calls.last().unwrap();
    assert_eq!(
        command,
        &format!("wine_command RobloxStudioBeta.exe -protocolString {uri}")
    );
}

#[tokio::test]
async fn stuck_shutdown_is_killed() {
    let harness = Harness::new(BinaryType::Player, &stuck_shutdown_script());
    let mut config = GlobalConfig::default();
    config.player.presence = true;
    config.player.game_mode = true;
    let sink = SharedBuf::default();

    let mut orch =
        orchestrator(&harness, BinaryType::Player, &config).with_log_sink(Box::new(sink.clone()));
    let outcome = tokio::time::timeout(Duration::from_secs(20), orch.run(&[]))
        .await
        .expect("stuck process was not killed")
        .unwrap();

    assert_eq!(outcome, Outcome::Killed);
    assert_eq!(orch.exit_cell().get(), ExitState::Killed);
    assert!(orch.lifecycle().visited(LifecycleState::Killed));
    assert!(!orch.lifecycle().visited(LifecycleState::Exited));
    assert_eq!(orch.lifecycle().current(), LifecycleState::Terminal);

    let relayed = sink.contents();
    assert!(relayed.contains("first line"), "{relayed}");
    assert!(relayed.contains(SHUTDOWN_MARKER), "{relayed}");

    assert!(harness
        .splash
        .closed
        .load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(harness.performance.registered.lock().unwrap().len(), 1);
    assert_eq!(harness.presence.lines.lock().unwrap().len(), 3);
    assert_eq!(
        harness
            .presence
            .closes
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn presence_failure_disables_presence_for_the_run() {
    let presence = FakePresence {
        fail_connect: true,
        ..FakePresence::default()
    };
    let harness = Harness::with_presence(BinaryType::Player, "exit 0", presence);
    let mut config = GlobalConfig::default();
    config.player.presence = true;

    let mut orch = orchestrator(&harness, BinaryType::Player, &config);
    assert_eq!(orch.run(&[]).await.unwrap(), Outcome::Exited);

    assert!(!orch.config().presence);
    assert!(orch.lifecycle().visited(LifecycleState::Running));
    let connects = harness
        .presence
        .connects
        .load(std::sync::atomic::Ordering::SeqCst);
    let closes = harness
        .presence
        .closes
        .load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!((connects, closes), (1, 0));
}

#[tokio::test]
async fn missing_log_file_is_not_fatal() {
    let harness = Harness::new(BinaryType::Player, "sleep 1; exit 0");
    let config = GlobalConfig::default();

    let mut orch = Orchestrator::new(
        BinaryType::Player,
        &config,
        harness.dirs.clone(),
        harness.collaborators(),
    )
    .unwrap()
    .with_timeouts(Duration::from_millis(200), Duration::from_millis(100));

    assert_eq!(orch.run(&[]).await.unwrap(), Outcome::Exited);
    assert!(!harness
        .splash
        .closed
        .load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn nonzero_exit_is_an_error_after_teardown() {
    let harness = Harness::new(BinaryType::Player, "exit 3");
    let config = GlobalConfig::default();

    let mut orch = orchestrator(&harness, BinaryType::Player, &config);
    let err = orch.run(&[]).await.unwrap_err();

    assert!(matches!(err, AppError::ProcessRuntime(_)), "{err}");
    let message = err.to_string();
    assert!(message.contains("failed to run Player"), "{message}");
    assert!(message.contains("code 3"), "{message}");
    assert_eq!(orch.lifecycle().current(), LifecycleState::Terminal);
    assert!(!orch.lifecycle().visited(LifecycleState::Exited));
}

#[tokio::test]
async fn invalid_launcher_aborts_before_spawn() {
    let harness = Harness::new(BinaryType::Player, "exit 0");
    let mut config = GlobalConfig::default();
    config.player.launcher = "/nonexistent/wrapper --flag".into();

    let mut orch = orchestrator(&harness, BinaryType::Player, &config);
    let err = orch.run(&[]).await.unwrap_err();

    assert!(matches!(err, AppError::InvalidLauncherConfig(_)), "{err}");
    assert!(!orch.lifecycle().visited(LifecycleState::Running));
    assert_eq!(orch.exit_cell().get(), ExitState::NotStarted);
}

#[tokio::test]
async fn unspawnable_program_fails_to_start() {
    let harness = Harness::new(BinaryType::Player, "exit 0")
        .with_sandbox(|sandbox| sandbox.with_program("/nonexistent/wine"));
    let config = GlobalConfig::default();

    let mut orch = orchestrator(&harness, BinaryType::Player, &config);
    let err = orch.run(&[]).await.unwrap_err();

    assert!(matches!(err, AppError::ProcessStart(_)), "{err}");
    assert!(err.to_string().contains("/nonexistent/wine"), "{err}");
    assert!(!orch.lifecycle().visited(LifecycleState::Running));
    assert_eq!(orch.exit_cell().get(), ExitState::NotStarted);
}

#[tokio::test]
async fn uninstalled_binary_fails_to_start() {
    let harness = Harness::new(BinaryType::Player, "exit 0");
    let config = GlobalConfig::default();

    let mut orch = orchestrator(&harness, BinaryType::Studio, &config);
    let err = orch.run(&[]).await.unwrap_err();

    assert!(matches!(err, AppError::ProcessStart(_)), "{err}");
    assert!(err.to_string().contains("Studio is not installed"), "{err}");
}

#[tokio::test]
async fn protocol_channel_override_is_applied_and_remembered() {
    let harness = Harness::new(BinaryType::Player, "exit 0");
    let mut config = GlobalConfig::default();
    config.player.channel = "zlive".into();
    let uri = "roblox-player:1+launchmode:play+channel:zbeta".to_owned();

    let mut orch = orchestrator(&harness, BinaryType::Player, &config);
    orch.run(&[uri.clone()]).await.unwrap();

    assert_eq!(orch.config().channel, "zbeta");
    assert_eq!(
        harness.splash.description.lock().unwrap().as_deref(),
        Some("zbeta")
    );
    let state = State::load(&harness.dirs.state_file()).unwrap();
    assert_eq!(state.player.channel.as_deref(), Some("zbeta"));

    let calls = calls_of(&harness.sandbox.calls);
    assert!(calls.last().unwrap().ends_with(&uri), "{calls:?}");
}

#[tokio::test]
async fn default_channel_is_described_as_live() {
    let harness = Harness::new(BinaryType::Player, "exit 0");
    let config = GlobalConfig::default();

    orchestrator(&harness, BinaryType::Player, &config)
        .run(&[])
        .await
        .unwrap();

    assert_eq!(
        harness.splash.description.lock().unwrap().as_deref(),
        Some("LIVE")
    );
}

#[tokio::test]
async fn mutexer_runs_before_player_when_multiple_instances_allowed() {
    let harness = Harness::new(BinaryType::Player, "exit 0");
    let mut config = GlobalConfig::default();
    config.multiple_instances = true;
    config.mutexer_path = Some("/opt/cellar/mutexer.exe".into());

    let mut orch = orchestrator(&harness, BinaryType::Player, &config);
    orch.run(&[]).await.unwrap();

    let calls: Vec<String> = calls_of(&harness.sandbox.calls)
        .into_iter()
        .filter(|call| call.starts_with("wine_command"))
        .collect();
    assert_eq!(calls.len(), 2, "{calls:?}");
    assert!(calls[0].starts_with("wine_command mutexer.exe"));
    assert!(calls[1].starts_with("wine_command RobloxPlayerBeta.exe"));
}

#[tokio::test]
async fn launch_environment_reaches_the_command() {
    let harness = Harness::new(BinaryType::Player, "exit 0");
    let mut config = GlobalConfig::default();
    config
        .player
        .env
        .insert("DXVK_HUD".into(), "fps".into());

    let orch = orchestrator(&harness, BinaryType::Player, &config);
    let cmd = orch.command(&[]).unwrap();

    assert_eq!(
        cmd.env_value("GAMEID").map(|v| v.to_string_lossy().into_owned()),
        Some("ulwgl-roblox".to_owned())
    );
    assert_eq!(
        cmd.env_value("DXVK_HUD").map(|v| v.to_string_lossy().into_owned()),
        Some("fps".to_owned())
    );
}
