//! Idle timeout, shutdown and lock record lifecycle

use std::time::{Duration, Instant};

use fastdev::commands::start::start_server;
use fastdev::socket_server::protocol::OK;
use fastdev::{FastdevError, LockRecord, StopReason};

use crate::common::TestProject;

#[tokio::test]
async fn test_idle_server_stops_and_removes_lock() {
    let project = TestProject::new();
    let server = project.start_with_idle(Duration::from_secs(2)).await;
    assert!(project.lock_file().exists());

    let started = Instant::now();
    let reason = server.wait(Duration::from_secs(6)).await;
    assert_eq!(reason, StopReason::IdleTimeout);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(!project.lock_file().exists());
}

#[tokio::test]
async fn test_traffic_resets_idle_timer() {
    let project = TestProject::new();
    project.add_resource("app.js", "x");
    let server = project.start_with_idle(Duration::from_secs(2)).await;

    let mut client = server.connect_script().await;
    let started = Instant::now();
    while started.elapsed() < Duration::from_secs(4) {
        assert_eq!(client.request_text(&["get", "app.js"]).await, Some("x".to_string()));
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert!(project.lock_file().exists());

    // Go quiet; the server should now stop by itself.
    let reason = server.wait(Duration::from_secs(6)).await;
    assert_eq!(reason, StopReason::IdleTimeout);
    assert!(!project.lock_file().exists());
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let project = TestProject::new();
    let server = project.start().await;

    let mut first = server.connect_script().await;
    let mut second = server.connect_script().await;

    // Both requests are in flight before either session can see the stop.
    first.send(&["shutdown"]).await;
    second.send(&["shutdown"]).await;
    assert_eq!(first.recv().await.and_then(|f| f.first_text()), Some(OK.to_string()));
    assert_eq!(second.recv().await.and_then(|f| f.first_text()), Some(OK.to_string()));
    assert!(first.recv().await.is_none());

    let reason = server.wait(Duration::from_secs(5)).await;
    assert_eq!(reason, StopReason::Requested);
    assert!(!project.lock_file().exists());
}

#[tokio::test]
async fn test_immediate_stop_closes_sessions() {
    let project = TestProject::new();
    let server = project.start().await;

    let mut app = server.connect_app().await;
    server.handle.immediate();
    // Immediate stop does not wait for the read poll.
    assert!(tokio::time::timeout(Duration::from_millis(500), app.recv())
        .await
        .expect("session was not closed")
        .is_none());

    assert_eq!(server.wait(Duration::from_secs(5)).await, StopReason::Interrupted);
    assert!(!project.lock_file().exists());
}

/// Larger than any loopback socket buffer, so a peer that stops reading
/// leaves the server's write pending.
const STALL_SIZE: usize = 32 * 1024 * 1024;

#[tokio::test]
async fn test_idle_timeout_with_stalled_reader() {
    let project = TestProject::new();
    project.add_large_resource("big.bin", STALL_SIZE);
    let server = project.start_with_idle(Duration::from_secs(1)).await;

    let mut stalled = server.connect_script().await;
    stalled.send(&["get", "big.bin"]).await;

    // The stuck reply is abandoned after the write timeout.
    let reason = server.wait(Duration::from_secs(10)).await;
    assert_eq!(reason, StopReason::IdleTimeout);
    assert!(!project.lock_file().exists());
    drop(stalled);
}

#[tokio::test]
async fn test_immediate_stop_with_stalled_reader() {
    let project = TestProject::new();
    project.add_large_resource("big.bin", STALL_SIZE);
    let server = project.start().await;

    let mut stalled = server.connect_script().await;
    stalled.send(&["get", "big.bin"]).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    server.handle.immediate();
    assert_eq!(server.wait(Duration::from_secs(2)).await, StopReason::Interrupted);
    assert!(!project.lock_file().exists());
    drop(stalled);
}

#[tokio::test]
async fn test_start_over_silent_port_is_stale() {
    let project = TestProject::new();
    let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

    LockRecord {
        ip: "127.0.0.1".to_string(),
        port: silent.local_addr().unwrap().port(),
        dir: project.path().to_path_buf(),
        app_id: TestProject::APP_ID.to_string(),
        app_guid: TestProject::GUID.to_string(),
    }
    .write_atomic(&project.lock_file())
    .unwrap();

    let err = tokio::time::timeout(Duration::from_secs(12), start_server(&project.context()))
        .await
        .expect("start hung on a silent port")
        .err()
        .unwrap();
    assert!(matches!(err, FastdevError::StaleLock { .. }));
    assert!(project.lock_file().exists());
    drop(silent);
}

#[tokio::test]
async fn test_second_start_is_refused() {
    let project = TestProject::new();
    let server = project.start().await;
    let before = std::fs::read_to_string(project.lock_file()).unwrap();

    let err = start_server(&project.context()).await.err().unwrap();
    match err {
        FastdevError::LockConflict { app_id, port } => {
            assert_eq!(app_id, TestProject::APP_ID);
            assert_eq!(port, server.port);
        }
        other => panic!("expected LockConflict, got {:?}", other),
    }
    assert_eq!(std::fs::read_to_string(project.lock_file()).unwrap(), before);

    server.stop().await;
}

#[tokio::test]
async fn test_stale_lock_is_reported_not_deleted() {
    let project = TestProject::new();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    LockRecord {
        ip: "0.0.0.0".to_string(),
        port,
        dir: project.path().to_path_buf(),
        app_id: TestProject::APP_ID.to_string(),
        app_guid: TestProject::GUID.to_string(),
    }
    .write_atomic(&project.lock_file())
    .unwrap();

    let err = start_server(&project.context()).await.err().unwrap();
    assert!(matches!(err, FastdevError::StaleLock { .. }));
    assert!(err.to_string().contains("Try manually deleting"));
    assert!(project.lock_file().exists());
}

#[tokio::test]
async fn test_lock_record_describes_server() {
    let project = TestProject::new();
    let server = project.start().await;

    let record = LockRecord::read(&project.lock_file()).unwrap().unwrap();
    assert_eq!(record.ip, "127.0.0.1");
    assert_eq!(record.port, server.port);
    assert_eq!(record.dir, project.path());
    assert_eq!(record.app_id, TestProject::APP_ID);
    assert_eq!(record.app_guid, TestProject::GUID);

    server.stop().await;
}
