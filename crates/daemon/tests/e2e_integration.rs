//! End-to-end integration tests for the HybridStore host.
//!
//! These tests run the real server on an ephemeral port and verify:
//! - Health and pairing routes
//! - Channel authorization at connect time
//! - Directory listing over the channel
//! - Revocation and shutdown closing open channels

use std::net::SocketAddr;
use std::time::Duration;

use daemon::config::Config;
use daemon::orchestrator::{DaemonOrchestrator, OrchestratorState};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Channel = WebSocketStream<MaybeTlsStream<TcpStream>>;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a test configuration with a populated storage root.
fn create_test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("store");
    std::fs::create_dir_all(root.join("photos")).unwrap();
    std::fs::write(root.join("photos/cat.jpg"), vec![0u8; 128]).unwrap();
    std::fs::write(root.join("todo.txt"), "milk").unwrap();

    let mut config = Config::default();
    config.storage.root = root;
    config.server.bind_address = "127.0.0.1:0".parse().unwrap();
    config.server.host_name = Some("e2e-host".to_string());
    (config, temp_dir)
}

async fn start_host() -> (DaemonOrchestrator, SocketAddr, TempDir) {
    let (config, temp_dir) = create_test_config();
    let mut orchestrator = DaemonOrchestrator::new(config).unwrap();
    let addr = orchestrator.start().await.unwrap();
    (orchestrator, addr, temp_dir)
}

async fn pair(client: &reqwest::Client, addr: SocketAddr, device_id: &str) {
    let response = client
        .post(format!("http://{}/pairing/complete", addr))
        .json(&json!({
            "deviceId": device_id,
            "displayName": "Test Phone",
            "clientPublicKeyExport": "client-key"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
}

async fn open_channel(addr: SocketAddr, device_id: &str) -> Channel {
    let (socket, _) = connect_async(format!("ws://{}/channel/{}", addr, device_id))
        .await
        .unwrap();
    socket
}

/// Sends a command and waits for its reply.
async fn request(socket: &mut Channel, frame: Value) -> Value {
    socket.send(Message::Text(frame.to_string())).await.unwrap();
    next_reply(socket).await
}

/// Reads the next reply without sending anything.
async fn next_reply(socket: &mut Channel) -> Value {
    loop {
        let message = tokio::time::timeout(READ_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for reply")
            .expect("channel ended")
            .unwrap();
        match message {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

/// Waits for the server to close the channel and returns the close code.
async fn expect_close(socket: &mut Channel) -> Option<CloseCode> {
    loop {
        let next = tokio::time::timeout(READ_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for close");
        match next {
            Some(Ok(Message::Close(frame))) => return frame.map(|f| f.code),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

async fn session_count(client: &reqwest::Client, addr: SocketAddr) -> usize {
    let sessions: Value = client
        .get(format!("http://{}/sessions", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    sessions.as_array().unwrap().len()
}

async fn wait_for_sessions(client: &reqwest::Client, addr: SocketAddr, expected: usize) {
    for _ in 0..50 {
        if session_count(client, addr).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {} active sessions", expected);
}

// =============================================================================
// HTTP Routes
// =============================================================================

#[tokio::test]
async fn test_status_and_pairing_offer() {
    let (mut orchestrator, addr, _temp_dir) = start_host().await;
    let client = reqwest::Client::new();

    let status: Value = client
        .get(format!("http://{}/status", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "ok");

    let offer: Value = client
        .get(format!("http://{}/pairing/offer", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(offer["hostName"], "e2e-host");
    assert_eq!(offer["fingerprint"], orchestrator.fingerprint());

    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_files_route_lists_storage_root() {
    let (mut orchestrator, addr, _temp_dir) = start_host().await;
    let client = reqwest::Client::new();

    let listing: Value = client
        .get(format!("http://{}/files?path=/photos", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["currentPath"], "/photos");
    assert_eq!(listing["entries"][0]["name"], "cat.jpg");
    assert_eq!(listing["entries"][0]["sizeBytes"], 128);

    let response = client
        .get(format!("http://{}/files?path=../../etc", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);

    orchestrator.stop().await.unwrap();
}

// =============================================================================
// Command Channel
// =============================================================================

#[tokio::test]
async fn test_unpaired_device_is_closed_immediately() {
    let (mut orchestrator, addr, _temp_dir) = start_host().await;
    let client = reqwest::Client::new();

    let mut socket = open_channel(addr, "stranger").await;
    let code = expect_close(&mut socket).await;
    assert_eq!(code, Some(CloseCode::Policy));
    assert_eq!(session_count(&client, addr).await, 0);

    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_paired_device_lists_directories() {
    let (mut orchestrator, addr, _temp_dir) = start_host().await;
    let client = reqwest::Client::new();
    pair(&client, addr, "d1").await;

    let mut socket = open_channel(addr, "d1").await;

    let reply = request(
        &mut socket,
        json!({"action": "list-directory", "payload": {"path": "/"}}),
    )
    .await;
    assert_eq!(reply["action"], "list-directory");
    assert_eq!(reply["status"], "success");
    assert_eq!(reply["data"]["currentPath"], "/");
    let names: Vec<&str> = reply["data"]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["photos", "todo.txt"]);

    // A failed command leaves the channel usable.
    let reply = request(
        &mut socket,
        json!({"action": "list-directory", "payload": {"path": "/does-not-exist"}}),
    )
    .await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["code"], "not_found");

    let reply = request(&mut socket, json!({"action": "teleport", "payload": {}})).await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["code"], "validation_error");

    let reply = request(
        &mut socket,
        json!({"action": "list-directory", "payload": {"path": "/photos"}}),
    )
    .await;
    assert_eq!(reply["status"], "success");
    assert_eq!(reply["data"]["entries"][0]["logicalPath"], "/photos/cat.jpg");

    wait_for_sessions(&client, addr, 1).await;

    socket.close(None).await.unwrap();
    wait_for_sessions(&client, addr, 0).await;

    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_channels_are_served_independently() {
    let (config, temp_dir) = create_test_config();
    let bulk = config.storage.root.join("bulk");
    std::fs::create_dir_all(&bulk).unwrap();
    for i in 0..2000 {
        std::fs::write(bulk.join(format!("file-{:04}.bin", i)), b"x").unwrap();
    }
    let mut orchestrator = DaemonOrchestrator::new(config).unwrap();
    let addr = orchestrator.start().await.unwrap();
    let client = reqwest::Client::new();
    pair(&client, addr, "d1").await;
    pair(&client, addr, "d2").await;

    let mut first = open_channel(addr, "d1").await;
    let mut second = open_channel(addr, "d2").await;

    // Queue a large listing on the first channel without reading its reply.
    let bulk_request = json!({"action": "list-directory", "payload": {"path": "/bulk"}});
    first
        .send(Message::Text(bulk_request.to_string()))
        .await
        .unwrap();

    // The second channel keeps getting its own replies meanwhile.
    let reply = request(&mut second, json!({"action": "ping"})).await;
    assert_eq!(reply["action"], "ping");
    assert_eq!(reply["status"], "success");

    let reply = request(
        &mut second,
        json!({"action": "list-directory", "payload": {"path": "/photos"}}),
    )
    .await;
    assert_eq!(reply["data"]["currentPath"], "/photos");

    let reply = next_reply(&mut first).await;
    assert_eq!(reply["action"], "list-directory");
    assert_eq!(reply["data"]["currentPath"], "/bulk");
    assert_eq!(reply["data"]["entries"].as_array().unwrap().len(), 2000);

    wait_for_sessions(&client, addr, 2).await;

    orchestrator.stop().await.unwrap();
    drop(temp_dir);
}

#[tokio::test]
async fn test_revocation_closes_open_channel() {
    let (mut orchestrator, addr, _temp_dir) = start_host().await;
    let client = reqwest::Client::new();
    pair(&client, addr, "d1").await;

    let mut socket = open_channel(addr, "d1").await;
    let reply = request(&mut socket, json!({"action": "ping"})).await;
    assert_eq!(reply["status"], "success");

    let response = client
        .delete(format!("http://{}/devices/d1", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    assert_eq!(expect_close(&mut socket).await, Some(CloseCode::Policy));
    wait_for_sessions(&client, addr, 0).await;

    // The device can no longer connect.
    let mut socket = open_channel(addr, "d1").await;
    assert_eq!(expect_close(&mut socket).await, Some(CloseCode::Policy));

    let response = client
        .delete(format!("http://{}/devices/d1", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_channels() {
    let (mut orchestrator, addr, _temp_dir) = start_host().await;
    let client = reqwest::Client::new();
    pair(&client, addr, "d1").await;

    let mut socket = open_channel(addr, "d1").await;
    let reply = request(&mut socket, json!({"action": "ping"})).await;
    assert_eq!(reply["status"], "success");

    orchestrator.stop().await.unwrap();
    assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);

    assert_eq!(expect_close(&mut socket).await, Some(CloseCode::Away));
}
