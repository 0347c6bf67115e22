//! Integration tests for the session manager over a real WebSocket.
//!
//! # Purpose
//!
//! These tests wire a [`SessionManager`] to the production [`WsConnector`]
//! and an in-memory store, then talk to a small device simulator listening
//! on a loopback port.  They verify:
//!
//! - The open handshake: the client asks for status as soon as the channel
//!   opens, and the device's answer drives the camera state.
//! - Commands reach the device byte-for-byte.
//! - A device-side close resets both states.
//! - Switching endpoints persists the new host and reconnects.
//! - A UI thread outside the runtime can drive the session.
//!
//! # Device simulator
//!
//! ```text
//! SessionManager ── WsConnector ──ws://127.0.0.1:<port>/ws──▶ simulator
//!        ▲                                                      │
//!        └──────────────── STATUS frames ◀──────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use camlink_client::application::endpoint_store::STORAGE_KEY;
use camlink_client::infrastructure::network::{WsConnector, WsConnectorConfig};
use camlink_client::infrastructure::storage::MemoryStore;
use camlink_client::{
    EndpointChange, EndpointStore, KeyValueStore, SessionManager, SessionSnapshot,
};
use camlink_core::{
    decode_message, encode_command, encode_message, CameraMessage, CommandType,
    ConnectionState, Endpoint,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage, WebSocketStream};

const WAIT: Duration = Duration::from_secs(5);

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Client {
    manager: Arc<SessionManager>,
    store: Arc<MemoryStore>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

/// Builds a manager whose connector targets `port` and whose store already
/// holds `stored_host`, then spawns its event loop.
fn client(port: u16, stored_host: &str) -> Client {
    let store = Arc::new(MemoryStore::with_entries([(STORAGE_KEY, stored_host)]));
    let connector = WsConnector::from_current(connector_config(port)).expect("inside a runtime");
    let (manager, events) = SessionManager::new(
        EndpointStore::new(Arc::clone(&store) as Arc<dyn KeyValueStore>),
        Arc::new(connector),
    );
    let manager = Arc::new(manager);
    {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run(events).await });
    }
    let snapshots = manager.subscribe();
    Client {
        manager,
        store,
        snapshots,
    }
}

fn connector_config(port: u16) -> WsConnectorConfig {
    WsConnectorConfig {
        control_port: port,
        connect_timeout: Duration::from_secs(2),
    }
}

async fn wait_until(
    snapshots: &mut watch::Receiver<SessionSnapshot>,
    what: &str,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) {
    timeout(WAIT, snapshots.wait_for(predicate))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("session manager dropped");
}

async fn accept_device(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("client never connected")
        .expect("accept");
    accept_async(stream).await.expect("websocket handshake")
}

async fn next_binary(device: &mut WebSocketStream<TcpStream>) -> Vec<u8> {
    loop {
        let message = timeout(WAIT, device.next())
            .await
            .expect("no frame from client")
            .expect("stream ended")
            .expect("read error");
        if let WsMessage::Binary(bytes) = message {
            return bytes;
        }
    }
}

async fn send_status(device: &mut WebSocketStream<TcpStream>, camera_connected: bool) {
    let frame = encode_message(&CameraMessage::status(camera_connected));
    device
        .send(WsMessage::Binary(frame))
        .await
        .expect("device send");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_open_queries_status_and_tracks_camera() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut c = client(port, "127.0.0.1");
    c.manager.initialize();

    // Act
    c.manager.connect().expect("endpoint loaded");
    let mut device = accept_device(&listener).await;

    // Assert: the first frame is the status query.
    let first = next_binary(&mut device).await;
    assert_eq!(first, encode_command(CommandType::QueryStatus));
    wait_until(&mut c.snapshots, "control connected", |s| {
        s.control == ConnectionState::Connected
    })
    .await;
    assert_eq!(c.manager.camera_state(), ConnectionState::Disconnected);

    // The device reports the camera attached, then detached.
    send_status(&mut device, true).await;
    wait_until(&mut c.snapshots, "camera connected", |s| {
        s.camera == ConnectionState::Connected
    })
    .await;
    send_status(&mut device, false).await;
    wait_until(&mut c.snapshots, "camera disconnected", |s| {
        s.camera == ConnectionState::Disconnected
    })
    .await;
    assert_eq!(c.manager.control_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_commands_reach_device_byte_exact() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut c = client(port, "127.0.0.1");
    c.manager.initialize();
    c.manager.connect();
    let mut device = accept_device(&listener).await;
    next_binary(&mut device).await;
    wait_until(&mut c.snapshots, "control connected", |s| s.control.is_connected()).await;

    c.manager.send_command(CommandType::Focus);
    c.manager.send_command(CommandType::Capture);

    let focus = next_binary(&mut device).await;
    let capture = next_binary(&mut device).await;
    assert_eq!(
        decode_message(&focus).unwrap(),
        CameraMessage::command(CommandType::Focus)
    );
    assert_eq!(capture, encode_command(CommandType::Capture));
    assert_eq!(capture.last(), Some(&CommandType::CAPTURE));
}

#[tokio::test]
async fn test_device_close_resets_both_states() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut c = client(port, "127.0.0.1");
    c.manager.initialize();
    c.manager.connect();
    let mut device = accept_device(&listener).await;
    next_binary(&mut device).await;
    send_status(&mut device, true).await;
    wait_until(&mut c.snapshots, "camera connected", |s| s.camera.is_connected()).await;

    // Act
    device.close(None).await.expect("device close");

    // Assert
    wait_until(&mut c.snapshots, "both disconnected", |s| {
        s.control == ConnectionState::Disconnected && s.camera == ConnectionState::Disconnected
    })
    .await;

    // A command after the close is dropped without reopening anything.
    c.manager.send_command(CommandType::Capture);
    assert_eq!(c.manager.control_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unknown_frame_from_device_is_ignored() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut c = client(port, "127.0.0.1");
    c.manager.initialize();
    c.manager.connect();
    let mut device = accept_device(&listener).await;
    next_binary(&mut device).await;
    wait_until(&mut c.snapshots, "control connected", |s| s.control.is_connected()).await;

    // A STATUS(true) frame with an unknown message kind, then a valid status.
    let mut unknown = encode_message(&CameraMessage::status(true));
    unknown[25] = 0x7F;
    device.send(WsMessage::Binary(unknown)).await.unwrap();
    device
        .send(WsMessage::Text("hello".to_string()))
        .await
        .unwrap();
    send_status(&mut device, true).await;

    wait_until(&mut c.snapshots, "camera connected", |s| s.camera.is_connected()).await;
    assert_eq!(c.manager.control_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_switching_endpoint_persists_and_reconnects() {
    // Arrange: the stored host does not resolve, so the first attempt fails.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut c = client(port, "camlink-device.invalid");
    let init = c.manager.initialize();
    assert!(init.from_store);
    c.manager.connect();

    // Act
    let new_endpoint = Endpoint::parse(" 127.0.0.1 ").unwrap();
    c.manager.set_endpoint(new_endpoint.clone());
    let mut device = accept_device(&listener).await;

    // Assert
    assert_eq!(next_binary(&mut device).await, encode_command(CommandType::QueryStatus));
    wait_until(&mut c.snapshots, "control connected", |s| s.control.is_connected()).await;
    assert_eq!(
        c.store.get(STORAGE_KEY).unwrap().as_deref(),
        Some("127.0.0.1")
    );
    let snapshot = c.manager.snapshot();
    assert_eq!(snapshot.endpoint, Some(new_endpoint));
    assert_eq!(
        snapshot.stream_url.as_deref(),
        Some("http://127.0.0.1:8080/live.mjpeg")
    );
}

#[tokio::test]
async fn test_shutdown_closes_socket_on_device_side() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut c = client(port, "127.0.0.1");
    c.manager.initialize();
    c.manager.connect();
    let mut device = accept_device(&listener).await;
    next_binary(&mut device).await;
    wait_until(&mut c.snapshots, "control connected", |s| s.control.is_connected()).await;

    c.manager.shutdown();

    let ended = timeout(WAIT, async {
        loop {
            match device.next().await {
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "device never saw the channel close");
}

#[test]
fn test_set_endpoint_from_thread_outside_runtime() {
    // Arrange: the runtime lives on its own; this test thread is not in it.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let listener = rt.block_on(TcpListener::bind("127.0.0.1:0")).unwrap();
    let port = listener.local_addr().unwrap().port();
    let device = rt.spawn(async move {
        let mut device = accept_device(&listener).await;
        let first = next_binary(&mut device).await;
        (device, first)
    });

    let store = Arc::new(MemoryStore::with_entries([(STORAGE_KEY, "camlink-device.invalid")]));
    let connector = WsConnector::new(connector_config(port), rt.handle().clone());
    let (manager, events) = SessionManager::new(
        EndpointStore::new(Arc::clone(&store) as Arc<dyn KeyValueStore>),
        Arc::new(connector),
    );
    let manager = Arc::new(manager);
    {
        let manager = Arc::clone(&manager);
        rt.spawn(async move { manager.run(events).await });
    }
    let mut snapshots = manager.subscribe();
    manager.initialize();

    // Act
    let change = manager.set_endpoint(Endpoint::parse("127.0.0.1").unwrap());

    // Assert
    assert!(matches!(change, EndpointChange::Switched { .. }));
    let (_device, first) = rt
        .block_on(async { timeout(WAIT, device).await })
        .expect("client never reached the device")
        .expect("device task");
    assert_eq!(first, encode_command(CommandType::QueryStatus));
    rt.block_on(wait_until(&mut snapshots, "control connected", |s| {
        s.control.is_connected()
    }));
    assert_eq!(
        store.get(STORAGE_KEY).unwrap().as_deref(),
        Some("127.0.0.1")
    );
    manager.shutdown();
}
