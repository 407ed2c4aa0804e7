//! Unit tests for the signal supervisor's kill-request path.
//!
//! Real SIGINT/SIGTERM delivery is covered by the integration tests in a
//! separate process, since the passthrough would end the test binary.

use std::time::Duration;

use cellar::models::{ExitCell, ExitState};
use cellar::supervisor::{KillRequest, Received, SignalSupervisor};
use tokio::process::Command;

fn long_sleep() -> tokio::process::Child {
    Command::new("sleep")
        .arg("30")
        .kill_on_drop(true)
        .spawn()
        .unwrap()
}

#[tokio::test]
async fn kill_request_kills_running_process() {
    let signals = SignalSupervisor::install().unwrap();
    let kill_tx = signals.kill_sender();
    let mut target = long_sleep();
    let exit = ExitCell::new();
    exit.mark_running();

    let guard = signals.supervise(target.id().unwrap(), exit.clone());
    kill_tx.send(KillRequest::StuckShutdown).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), guard.wait())
        .await
        .unwrap();
    assert_eq!(received, Some(Received::Kill(KillRequest::StuckShutdown)));
    assert_eq!(exit.get(), ExitState::Killed);

    let status = tokio::time::timeout(Duration::from_secs(5), target.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.code(), None);
}

#[tokio::test]
async fn intake_closes_after_first_request() {
    let signals = SignalSupervisor::install().unwrap();
    let kill_tx = signals.kill_sender();
    let mut target = long_sleep();
    let exit = ExitCell::new();
    exit.mark_running();

    let guard = signals.supervise(target.id().unwrap(), exit.clone());
    kill_tx.send(KillRequest::StuckShutdown).await.unwrap();
    guard.wait().await;

    assert!(kill_tx.send(KillRequest::StuckShutdown).await.is_err());
    let _ = target.wait().await;
}

#[tokio::test]
async fn exited_process_is_not_killed() {
    let signals = SignalSupervisor::install().unwrap();
    let kill_tx = signals.kill_sender();
    let mut target = Command::new("true").spawn().unwrap();
    let pid = target.id().unwrap();
    target.wait().await.unwrap();

    let exit = ExitCell::new();
    exit.mark_running();
    exit.mark_exited();

    let guard = signals.supervise(pid, exit.clone());
    kill_tx.send(KillRequest::StuckShutdown).await.unwrap();

    assert_eq!(
        guard.wait().await,
        Some(Received::Kill(KillRequest::StuckShutdown))
    );
    assert_eq!(exit.get(), ExitState::Exited);
}

#[tokio::test]
async fn release_ends_supervision_without_action() {
    let signals = SignalSupervisor::install().unwrap();
    let kill_tx = signals.kill_sender();
    let mut target = long_sleep();
    let exit = ExitCell::new();
    exit.mark_running();

    let guard = signals.supervise(target.id().unwrap(), exit.clone());
    assert_eq!(guard.finish().await, None);
    assert_eq!(exit.get(), ExitState::Running);
    assert!(kill_tx.send(KillRequest::StuckShutdown).await.is_err());

    target.start_kill().unwrap();
    let _ = target.wait().await;
}
