//! Network infrastructure: the WebSocket control channel.
//!
//! Architecture:
//! - [`WsConnector::open`] spawns one Tokio task per transport and returns a
//!   [`WsTransport`] handle immediately.
//! - Tasks are spawned through a [`Handle`] captured when the connector is
//!   built, so `open` may be called from any thread, runtime or not.
//! - The task connects, reports `Opened`, then multiplexes outbound frames
//!   from the handle and inbound messages from the socket with
//!   `tokio::select!`.
//! - Every binary message from the device becomes a `Message` event; text
//!   frames are ignored.  Ping/pong is answered by tungstenite itself.
//! - The task always finishes by reporting `Closed`, whatever the reason.
//!
//! Closing the handle (or dropping it) stops the task, including while the
//! connect handshake is still in flight.

use std::time::Duration;

use camlink_core::domain::endpoint::{CONTROL_PATH, CONTROL_PORT};
use camlink_core::Endpoint;
use futures_util::{SinkExt, StreamExt};
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use crate::application::session::{
    Connector, EventSink, Transport, TransportError, TransportEvent,
};

/// Configuration for the WebSocket connector.
#[derive(Debug, Clone)]
pub struct WsConnectorConfig {
    /// TCP port of the device's control server.
    pub control_port: u16,
    /// Upper bound on TCP connect plus WebSocket handshake.
    pub connect_timeout: Duration,
}

impl Default for WsConnectorConfig {
    fn default() -> Self {
        Self {
            control_port: CONTROL_PORT,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Opens WebSocket transports to the device's control server.
///
/// Transport tasks run on the runtime behind `runtime`, which must outlive
/// the connector.
#[derive(Debug, Clone)]
pub struct WsConnector {
    config: WsConnectorConfig,
    runtime: Handle,
}

impl WsConnector {
    pub fn new(config: WsConnectorConfig, runtime: Handle) -> Self {
        Self { config, runtime }
    }

    /// Builds a connector bound to the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Fails when called outside a Tokio runtime.
    pub fn from_current(config: WsConnectorConfig) -> Result<Self, TryCurrentError> {
        Ok(Self::new(config, Handle::try_current()?))
    }

    /// The control URL for `endpoint` under this connector's port.
    pub fn control_url(&self, endpoint: &Endpoint) -> String {
        format!(
            "ws://{}:{}{CONTROL_PATH}",
            endpoint.host(),
            self.config.control_port
        )
    }
}

impl Connector for WsConnector {
    fn open(&self, endpoint: &Endpoint, events: EventSink) -> Box<dyn Transport> {
        let url = self.control_url(endpoint);
        let (tx, rx) = mpsc::unbounded_channel();
        self.runtime
            .spawn(drive(url, self.config.connect_timeout, rx, events));
        Box::new(WsTransport { outbound: tx })
    }
}

/// Commands from the handle to its task.
#[derive(Debug)]
enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// Handle to one WebSocket transport task.
#[derive(Debug)]
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Transport for WsTransport {
    fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        // The task may already be gone; nothing left to close then.
        let _ = self.outbound.send(Outbound::Close);
    }
}

// ── Transport task ────────────────────────────────────────────────────────────

async fn drive(
    url: String,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: EventSink,
) {
    let id = events.id();
    debug!("{id}: connecting to {url}");

    let connect = time::timeout(connect_timeout, connect_async(url.as_str()));
    let ws = tokio::select! {
        result = connect => match result {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                warn!("{id}: connect to {url} failed: {e}");
                events.emit(TransportEvent::Error(e.to_string()));
                events.emit(TransportEvent::Closed);
                return;
            }
            Err(_) => {
                warn!("{id}: connect to {url} timed out");
                events.emit(TransportEvent::Error(format!(
                    "connect timed out after {connect_timeout:?}"
                )));
                events.emit(TransportEvent::Closed);
                return;
            }
        },
        () = closed_before_open(&mut outbound) => {
            debug!("{id}: closed while connecting");
            events.emit(TransportEvent::Closed);
            return;
        }
    };

    info!("{id}: connected to {url}");
    events.emit(TransportEvent::Opened);

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Frame(bytes)) => {
                    if let Err(e) = sink.send(WsMessage::Binary(bytes)).await {
                        warn!("{id}: write failed: {e}");
                        events.emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    debug!("{id}: closing");
                    if let Err(e) = sink.close().await {
                        debug!("{id}: close handshake failed: {e}");
                    }
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Binary(bytes))) => {
                    events.emit(TransportEvent::Message(bytes));
                }
                Some(Ok(WsMessage::Text(_))) => debug!("{id}: ignoring text frame"),
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!("{id}: device closed the channel: {frame:?}");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("{id}: read failed: {e}");
                    events.emit(TransportEvent::Error(e.to_string()));
                    break;
                }
                None => {
                    debug!("{id}: stream ended");
                    break;
                }
            },
        }
    }

    events.emit(TransportEvent::Closed);
}

/// Resolves once the handle asks to close (or is dropped).  Frames queued
/// before the channel is open are discarded.
async fn closed_before_open(outbound: &mut mpsc::UnboundedReceiver<Outbound>) {
    loop {
        match outbound.recv().await {
            Some(Outbound::Frame(_)) => debug!("discarding frame queued before open"),
            Some(Outbound::Close) | None => return,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::application::endpoint_store::{EndpointStore, STORAGE_KEY};
    use crate::application::session::SessionManager;
    use crate::infrastructure::storage::MemoryStore;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_config_uses_device_control_port() {
        let rt = runtime();
        let connector = WsConnector::new(WsConnectorConfig::default(), rt.handle().clone());
        let endpoint = Endpoint::parse("10.0.0.5").unwrap();

        assert_eq!(connector.control_url(&endpoint), endpoint.control_url());
        assert_eq!(connector.control_url(&endpoint), "ws://10.0.0.5:8888/ws");
    }

    #[test]
    fn test_custom_port_is_used_in_url() {
        let rt = runtime();
        let connector = WsConnector::new(
            WsConnectorConfig {
                control_port: 9000,
                ..WsConnectorConfig::default()
            },
            rt.handle().clone(),
        );
        let endpoint = Endpoint::parse("camera.local").unwrap();

        assert_eq!(connector.control_url(&endpoint), "ws://camera.local:9000/ws");
    }

    #[test]
    fn test_send_after_task_gone_is_closed_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let transport = WsTransport { outbound: tx };

        assert_eq!(transport.send(vec![1, 2, 3]), Err(TransportError::Closed));
        transport.close();
    }

    #[test]
    fn test_from_current_outside_runtime_is_an_error() {
        assert!(WsConnector::from_current(WsConnectorConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_from_current_inside_runtime_succeeds() {
        assert!(WsConnector::from_current(WsConnectorConfig::default()).is_ok());
    }

    #[test]
    fn test_connect_from_plain_thread_reports_failure_through_events() {
        // Arrange: nothing listens on port 1.
        let rt = runtime();
        let connector = WsConnector::new(
            WsConnectorConfig {
                control_port: 1,
                connect_timeout: Duration::from_secs(2),
            },
            rt.handle().clone(),
        );
        let store = MemoryStore::with_entries([(STORAGE_KEY, "127.0.0.1")]);
        let (manager, mut events) =
            SessionManager::new(EndpointStore::new(Arc::new(store)), Arc::new(connector));
        manager.initialize();

        // Act: this thread is not inside the runtime.
        let id = manager.connect().expect("endpoint loaded");

        // Assert
        let closed = rt.block_on(async {
            time::timeout(Duration::from_secs(5), async {
                while let Some(tagged) = events.recv().await {
                    if tagged.event == TransportEvent::Closed {
                        return Some(tagged.id);
                    }
                }
                None
            })
            .await
        });
        assert_eq!(closed, Ok(Some(id)));
    }
}
