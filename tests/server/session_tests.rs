//! Handshake, resource serving and app control

use std::time::Duration;

use tokio::io::AsyncWriteExt;

use fastdev::socket_server::protocol::{
    Frame, APP_NOT_CONNECTED, INVALID_HANDSHAKE, NOT_FOUND, OK,
};
use fastdev::socket_server::StatusSnapshot;

use crate::common::TestProject;

#[tokio::test]
async fn test_every_command_requires_handshake() {
    let project = TestProject::new();
    project.add_resource("app.js", "Ti.API.info('hi');");
    let server = project.start().await;

    for parts in [
        vec!["get", "app.js"],
        vec!["status"],
        vec!["kill-app"],
        vec!["restart-app"],
        vec!["shutdown"],
    ] {
        let mut client = server.connect().await;
        assert_eq!(
            client.request_text(&parts).await,
            Some(INVALID_HANDSHAKE.to_string()),
            "{:?} was dispatched before handshake",
            parts
        );
        assert!(client.recv().await.is_none(), "connection stays open after {:?}", parts);
    }

    // The rejected shutdown must not have stopped the server.
    let mut client = server.connect_script().await;
    let status = client.request_text(&["status"]).await.unwrap();
    let status: StatusSnapshot = serde_json::from_str(&status).unwrap();
    assert_eq!(status.request_count, 0);

    assert_eq!(server.stop().await, fastdev::StopReason::Requested);
}

#[tokio::test]
async fn test_invalid_handshake_allows_retry() {
    let project = TestProject::new();
    let server = project.start().await;

    let mut client = server.connect().await;
    assert_eq!(
        client.request_text(&["handshake", "not-the-guid"]).await,
        Some(INVALID_HANDSHAKE.to_string())
    );
    assert_eq!(
        client.request_text(&["handshake"]).await,
        Some(INVALID_HANDSHAKE.to_string())
    );
    assert_eq!(
        client.request_text(&["script-handshake", TestProject::GUID]).await,
        Some(OK.to_string())
    );

    server.stop().await;
}

#[tokio::test]
async fn test_get_serves_exact_bytes() {
    let project = TestProject::new();
    project
        .add_resource("app.js", "var win = Ti.UI.createWindow();\n")
        .add_resource("images/logo.txt", "");
    let server = project.start().await;

    let mut client = server.connect_script().await;
    assert_eq!(
        client.request(&["get", "app.js"]).await,
        Some(Frame::single("var win = Ti.UI.createWindow();\n"))
    );
    // Empty files are served as an empty token, not NOT_FOUND.
    assert_eq!(
        client.request(&["get", "images/logo.txt"]).await,
        Some(Frame::single(""))
    );
    assert_eq!(
        client.request_text(&["get", "missing.js"]).await,
        Some(NOT_FOUND.to_string())
    );
    assert_eq!(
        client.request_text(&["get", "../tiapp.xml"]).await,
        Some(NOT_FOUND.to_string())
    );
    assert_eq!(
        client.request_text(&["get", "images"]).await,
        Some(NOT_FOUND.to_string())
    );

    let status: StatusSnapshot =
        serde_json::from_str(&client.request_text(&["status"]).await.unwrap()).unwrap();
    assert_eq!(status.request_count, 5);

    server.stop().await;
}

#[tokio::test]
async fn test_android_overlay_takes_precedence() {
    let project = TestProject::new();
    project
        .add_resource("app.js", "common")
        .add_resource("android/app.js", "android")
        .add_resource("ui.js", "common ui");
    let server = project.start().await;

    let mut client = server.connect_script().await;
    assert_eq!(client.request_text(&["get", "app.js"]).await, Some("android".to_string()));
    assert_eq!(client.request_text(&["get", "ui.js"]).await, Some("common ui".to_string()));

    server.stop().await;
}

#[tokio::test]
async fn test_kill_app_without_app() {
    let project = TestProject::new();
    let server = project.start().await;

    let mut control = server.connect_script().await;
    assert_eq!(
        control.request_text(&["kill-app"]).await,
        Some(APP_NOT_CONNECTED.to_string())
    );
    assert!(control.recv().await.is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_kill_and_restart_are_forwarded_to_app() {
    let project = TestProject::new();
    let server = project.start().await;

    let mut app = server.connect_app().await;

    let mut control = server.connect_script().await;
    assert_eq!(control.request_text(&["restart-app"]).await, Some(OK.to_string()));
    assert!(control.recv().await.is_none());
    assert_eq!(app.recv().await, Some(Frame::single("restart")));

    let mut control = server.connect_script().await;
    assert_eq!(control.request_text(&["kill-app"]).await, Some(OK.to_string()));
    assert_eq!(app.recv().await, Some(Frame::single("kill")));

    // The app connection keeps working after receiving signals.
    project.add_resource("app.js", "reloaded");
    assert_eq!(app.request_text(&["get", "app.js"]).await, Some("reloaded".to_string()));

    server.stop().await;
}

#[tokio::test]
async fn test_kill_app_with_stalled_app_still_replies() {
    let project = TestProject::new();
    project.add_large_resource("big.bin", 32 * 1024 * 1024);
    let server = project.start().await;

    // The app asks for a large file and stops reading.
    let mut app = server.connect_app().await;
    app.send(&["get", "big.bin"]).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The forward gives up after the app's write timeout.
    let mut control = server.connect_script().await;
    control.send(&["kill-app"]).await;
    let reply = control
        .recv_within(Duration::from_secs(12))
        .await
        .and_then(|f| f.first_text());
    assert!(reply.is_some(), "kill-app got no reply");
    assert_ne!(reply, Some(OK.to_string()));

    drop(app);
    server.stop().await;
}

#[tokio::test]
async fn test_broken_peer_does_not_affect_other_sessions() {
    let project = TestProject::new();
    project.add_resource("app.js", "still here");
    let server = project.start().await;

    let mut client = server.connect_script().await;
    assert_eq!(client.request_text(&["get", "app.js"]).await, Some("still here".to_string()));

    // Announce two tokens, send half of the first, then hang up.
    let mut broken = tokio::net::TcpStream::connect(("127.0.0.1", server.port)).await.unwrap();
    let mut partial = Vec::new();
    partial.extend_from_slice(&2i32.to_be_bytes());
    partial.extend_from_slice(&9i32.to_be_bytes());
    partial.extend_from_slice(b"hands");
    broken.write_all(&partial).await.unwrap();
    drop(broken);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(client.request_text(&["get", "app.js"]).await, Some("still here".to_string()));
    let mut late = server.connect_script().await;
    assert_eq!(late.request_text(&["get", "app.js"]).await, Some("still here".to_string()));

    assert_eq!(server.stop().await, fastdev::StopReason::Requested);
}

#[tokio::test]
async fn test_new_app_handshake_replaces_occupant() {
    let project = TestProject::new();
    let server = project.start().await;

    let mut first = server.connect_app().await;
    let mut second = server.connect_app().await;

    let mut control = server.connect_script().await;
    assert_eq!(control.request_text(&["kill-app"]).await, Some(OK.to_string()));
    assert_eq!(second.recv().await, Some(Frame::single("kill")));

    // The displaced app is not told anything.
    let nothing = tokio::time::timeout(Duration::from_millis(300), first.recv()).await;
    assert!(nothing.is_err());

    server.stop().await;
}

#[tokio::test]
async fn test_app_disconnect_clears_registration() {
    let project = TestProject::new();
    let server = project.start().await;

    let app = server.connect_app().await;
    let mut control = server.connect_script().await;
    let status: StatusSnapshot =
        serde_json::from_str(&control.request_text(&["status"]).await.unwrap()).unwrap();
    assert!(status.app_connected);

    drop(app);
    let mut connected = true;
    for _ in 0..20 {
        let status: StatusSnapshot =
            serde_json::from_str(&control.request_text(&["status"]).await.unwrap()).unwrap();
        connected = status.app_connected;
        if !connected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!connected);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_command_gets_no_reply() {
    let project = TestProject::new();
    project.add_resource("app.js", "ok");
    let server = project.start().await;

    let mut client = server.connect_script().await;
    client.send(&["reload-everything", "now"]).await;
    // The next reply belongs to the next command.
    assert_eq!(client.request_text(&["get", "app.js"]).await, Some("ok".to_string()));

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_gets_do_not_cross_talk() {
    let project = TestProject::new();
    for i in 0..8 {
        project.add_resource(&format!("mod{}.js", i), &format!("module {}", i).repeat(100));
    }
    let server = project.start().await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let mut client = server.connect_script().await;
        tasks.push(tokio::spawn(async move {
            let name = format!("mod{}.js", i);
            let expected = format!("module {}", i).repeat(100);
            for _ in 0..25 {
                assert_eq!(client.request_text(&["get", name.as_str()]).await, Some(expected.clone()));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut client = server.connect_script().await;
    let status: StatusSnapshot =
        serde_json::from_str(&client.request_text(&["status"]).await.unwrap()).unwrap();
    assert_eq!(status.request_count, 200);

    server.stop().await;
}
