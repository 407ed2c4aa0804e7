//! Unit tests for log following and the tail supervisor.

use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cellar::integrations::Presence;
use cellar::supervisor::tail::follow;
use cellar::supervisor::{KillRequest, TailSupervisor, SHUTDOWN_MARKER};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Presence service that accepts lines and never finishes handling them.
struct HungPresence;

impl Presence for HungPresence {
    fn connect(&self) -> Pin<Box<dyn Future<Output = cellar::Result<()>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }

    fn handle_log_line<'a>(
        &'a self,
        _line: &'a str,
    ) -> Pin<Box<dyn Future<Output = cellar::Result<()>> + Send + 'a>> {
        Box::pin(std::future::pending())
    }
}

fn marker_line(n: u32) -> String {
    format!("2024-01-01T00:00:0{n}Z,1.0,abc,6 {SHUTDOWN_MARKER} {n}")
}

async fn feed(lines: Vec<String>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(lines.len().max(1));
    for line in lines {
        tx.send(line).await.unwrap();
    }
    rx
}

#[tokio::test]
async fn repeated_markers_send_one_kill_request() {
    let (kill_tx, mut kill_rx) = mpsc::channel(8);
    let supervisor = TailSupervisor::new(
        Box::new(std::io::sink()),
        kill_tx,
        Duration::from_millis(100),
    );

    let lines = feed(vec![
        marker_line(1),
        marker_line(2),
        "unrelated".to_owned(),
        marker_line(3),
    ])
    .await;
    assert_eq!(supervisor.run(lines).await, 4);

    let request = tokio::time::timeout(Duration::from_secs(2), kill_rx.recv())
        .await
        .unwrap();
    assert_eq!(request, Some(KillRequest::StuckShutdown));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(kill_rx.try_recv().is_err());
}

#[tokio::test]
async fn no_marker_no_kill_request() {
    let (kill_tx, mut kill_rx) = mpsc::channel(8);
    let supervisor = TailSupervisor::new(
        Box::new(std::io::sink()),
        kill_tx,
        Duration::from_millis(50),
    );
    assert!(!supervisor.kill_armed());

    let lines = feed(vec!["[FLog::Output] hello".to_owned()]).await;
    supervisor.run(lines).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(kill_rx.try_recv().is_err());
}

#[tokio::test]
async fn lines_are_relayed_to_sink() {
    let sink = SharedBuf::default();
    let (kill_tx, _kill_rx) = mpsc::channel(1);
    let supervisor = TailSupervisor::new(Box::new(sink.clone()), kill_tx, Duration::from_secs(5));

    let lines = feed(vec!["first".to_owned(), "second".to_owned()]).await;
    supervisor.run(lines).await;

    assert_eq!(sink.contents(), "first\nsecond\n");
}

#[tokio::test]
async fn follow_delivers_complete_lines_as_they_appear() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("player.log");
    std::fs::write(&path, "one\r\n").unwrap();

    let stop = CancellationToken::new();
    let mut lines = follow(path.clone(), stop.clone());

    let first = tokio::time::timeout(Duration::from_secs(2), lines.recv()).await.unwrap();
    assert_eq!(first.as_deref(), Some("one"));

    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"two\npar").unwrap();
    file.flush().unwrap();

    let second = tokio::time::timeout(Duration::from_secs(2), lines.recv()).await.unwrap();
    assert_eq!(second.as_deref(), Some("two"));

    file.write_all(b"tial\n").unwrap();
    file.flush().unwrap();

    let third = tokio::time::timeout(Duration::from_secs(2), lines.recv()).await.unwrap();
    assert_eq!(third.as_deref(), Some("partial"));

    stop.cancel();
    let end = tokio::time::timeout(Duration::from_secs(2), lines.recv()).await.unwrap();
    assert_eq!(end, None);
}

#[tokio::test]
async fn follow_ends_when_file_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("player.log");
    std::fs::write(&path, "only\n").unwrap();

    let mut lines = follow(path.clone(), CancellationToken::new());
    let first = tokio::time::timeout(Duration::from_secs(2), lines.recv()).await.unwrap();
    assert_eq!(first.as_deref(), Some("only"));

    std::fs::remove_file(&path).unwrap();
    let end = tokio::time::timeout(Duration::from_secs(2), lines.recv()).await.unwrap();
    assert_eq!(end, None);
}

#[tokio::test]
async fn hung_presence_does_not_delay_kill_request() {
    let (kill_tx, mut kill_rx) = mpsc::channel(8);
    let supervisor = TailSupervisor::new(
        Box::new(std::io::sink()),
        kill_tx,
        Duration::from_millis(100),
    )
    .with_presence(Arc::new(HungPresence));

    let (line_tx, lines) = mpsc::channel(8);
    let run = tokio::spawn(supervisor.run(lines));
    line_tx
        .send("[FLog::Output] ! Joining game 'abc' place 1 at 10.0.0.1".to_owned())
        .await
        .unwrap();
    line_tx.send(marker_line(1)).await.unwrap();

    let request = tokio::time::timeout(Duration::from_secs(2), kill_rx.recv())
        .await
        .expect("kill request held up by presence");
    assert_eq!(request, Some(KillRequest::StuckShutdown));

    drop(line_tx);
    let processed = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("tail did not finish after its stream ended")
        .unwrap();
    assert_eq!(processed, 2);
}

#[tokio::test]
async fn unterminated_last_line_is_delivered_on_stop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("player.log");
    std::fs::write(&path, "done\nno newline").unwrap();

    let stop = CancellationToken::new();
    let mut lines = follow(path, stop.clone());

    let first = tokio::time::timeout(Duration::from_secs(2), lines.recv()).await.unwrap();
    assert_eq!(first.as_deref(), Some("done"));

    stop.cancel();
    let last = tokio::time::timeout(Duration::from_secs(2), lines.recv()).await.unwrap();
    assert_eq!(last.as_deref(), Some("no newline"));
    let end = tokio::time::timeout(Duration::from_secs(2), lines.recv()).await.unwrap();
    assert_eq!(end, None);
}
