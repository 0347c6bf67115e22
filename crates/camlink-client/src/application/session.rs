//! SessionManager: owns the control channel to the camera device.
//!
//! # Responsibilities
//!
//! - Hold the current [`Endpoint`] and persist changes to it.
//! - Own at most one live [`Transport`] at a time, opened through an injected
//!   [`Connector`].
//! - Track two independent [`ConnectionState`]s: the control channel itself,
//!   and the camera presence the device last reported.
//! - Encode UI commands into frames and decode inbound frames into state.
//!
//! # Serialisation and stale events
//!
//! Transport events arrive on a channel, concurrently with UI calls such as
//! [`SessionManager::set_endpoint`] and [`SessionManager::send_command`].
//! Every entry point takes the same mutex, so a teardown can never interleave
//! with a send.
//!
//! Endpoint changes also take a second, outer lock.  The store is read and
//! written under that outer lock alone, so a slow disk delays other endpoint
//! changes but never event handling or sends.
//!
//! Each transport is opened with a fresh [`TransportId`] and every event it
//! emits carries that id.  When the endpoint changes, the old transport is
//! closed and its id stops being the active one; anything it still emits
//! afterwards (a late `Opened`, a `Closed` from the teardown itself) is
//! discarded by [`SessionManager::handle_event`].
//!
//! ```text
//!   UI ──set_endpoint / send_command──┐
//!                                     ▼
//!                          ┌─────────────────────┐   open(id, endpoint, sink)
//!                          │ Mutex<Session>      │ ─────────────────────────▶ Connector
//!                          └─────────────────────┘
//!                                     ▲
//!   Transport task ──TaggedEvent{id}──┘ (run / handle_event)
//! ```
//!
//! # No automatic reconnection
//!
//! When the channel closes, the session stays `Disconnected`.  A caller that
//! wants to retry calls [`SessionManager::connect`] (same endpoint) or
//! [`SessionManager::set_endpoint`] (new endpoint).

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camlink_core::{
    decode_message, encode_command, CameraMessage, CommandType, ConnectionState, Endpoint,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::application::endpoint_store::{EndpointStore, StoreError};

// ── Transport seam ────────────────────────────────────────────────────────────

/// Identity tag of one transport instance.
///
/// Ids are allocated in increasing order per [`SessionManager`] and are never
/// reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(u64);

impl TransportId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport#{}", self.0)
    }
}

/// Lifecycle and data events emitted by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is established and writable.
    Opened,
    /// One complete inbound binary message.
    Message(Vec<u8>),
    /// The channel is gone (remote close, local close, or end of stream).
    Closed,
    /// The channel failed (connect refused, I/O error).
    Error(String),
}

/// A [`TransportEvent`] tagged with the transport that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub id: TransportId,
    pub event: TransportEvent,
}

/// Receiving end of the event channel; drive it with [`SessionManager::run`].
pub type EventReceiver = mpsc::UnboundedReceiver<TaggedEvent>;

/// Handed to a [`Connector`] so the transport can report events.
///
/// The sink tags every event with the transport's id; the transport cannot
/// impersonate another one.
#[derive(Debug, Clone)]
pub struct EventSink {
    id: TransportId,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub fn id(&self) -> TransportId {
        self.id
    }

    /// Delivers `event`.  Returns `false` once the session manager is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                id: self.id,
                event,
            })
            .is_ok()
    }
}

/// Errors from writing to a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,
    #[error("transport write failed: {0}")]
    Write(String),
}

/// Handle to one open (or opening) transport.
///
/// Owned exclusively by the session; dropping it must also close it.
pub trait Transport: Send + Sync {
    /// Queues one binary message.  Fire-and-forget: success only means the
    /// frame was accepted for writing.
    fn send(&self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Starts closing the transport.  Idempotent.
    fn close(&self);
}

/// Factory for transports.
///
/// `open` must not block and must not call back into the session manager
/// synchronously: the manager calls it while holding its lock.  All progress
/// is reported later through `events`.
pub trait Connector: Send + Sync {
    fn open(&self, endpoint: &Endpoint, events: EventSink) -> Box<dyn Transport>;
}

// ── Public state surface ──────────────────────────────────────────────────────

/// Everything the presentation layer needs to render the connection UI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub control: ConnectionState,
    pub camera: ConnectionState,
    pub endpoint: Option<Endpoint>,
    /// MJPEG URL for the current endpoint, if one is known.
    pub stream_url: Option<String>,
}

/// Result of [`SessionManager::initialize`].
#[derive(Debug)]
pub struct Initialized {
    pub endpoint: Endpoint,
    /// `true` when the endpoint came from the store rather than the default.
    pub from_store: bool,
    /// Set when the default endpoint could not be persisted.
    pub persist_error: Option<StoreError>,
}

/// Result of [`SessionManager::set_endpoint`].
#[derive(Debug)]
pub enum EndpointChange {
    /// The endpoint equals the current one; nothing happened.
    Unchanged,
    /// The endpoint was adopted and a new transport opened.
    Switched {
        transport: TransportId,
        /// Set when the new endpoint could not be persisted.
        persist_error: Option<StoreError>,
    },
}

// ── Session state ─────────────────────────────────────────────────────────────

struct ActiveTransport {
    id: TransportId,
    handle: Box<dyn Transport>,
}

struct Session {
    endpoint: Option<Endpoint>,
    control: ConnectionState,
    camera: ConnectionState,
    active: Option<ActiveTransport>,
    next_id: u64,
}

impl Session {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            control: self.control,
            camera: self.camera,
            endpoint: self.endpoint.clone(),
            stream_url: self.endpoint.as_ref().map(Endpoint::stream_url),
        }
    }

    /// The control channel is gone: the camera state loses its source of
    /// truth and is reset with it.
    fn mark_channel_down(&mut self) {
        self.control = ConnectionState::Disconnected;
        self.camera = ConnectionState::Disconnected;
    }

    fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            debug!("closing {}", active.id);
            active.handle.close();
        }
    }

    fn is_active(&self, id: TransportId) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == id)
    }
}

// ── SessionManager ────────────────────────────────────────────────────────────

/// The single owner of the control channel.
///
/// Construct one per process and share it by `Arc`.
pub struct SessionManager {
    store: EndpointStore,
    connector: Arc<dyn Connector>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    // Serialises endpoint changes.  Store I/O runs under this lock only, so
    // transport events are never stuck behind a slow disk.
    endpoint_change: Mutex<()>,
    session: Mutex<Session>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl SessionManager {
    /// Creates a manager in the `Loading` state with no endpoint.
    ///
    /// The returned [`EventReceiver`] carries transport events and must be
    /// driven by [`SessionManager::run`] (or fed to
    /// [`SessionManager::handle_event`] by hand).
    pub fn new(store: EndpointStore, connector: Arc<dyn Connector>) -> (Self, EventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Session {
            endpoint: None,
            control: ConnectionState::Loading,
            camera: ConnectionState::Loading,
            active: None,
            next_id: 1,
        };
        let (snapshot_tx, _) = watch::channel(session.snapshot());
        let manager = Self {
            store,
            connector,
            events_tx,
            endpoint_change: Mutex::new(()),
            session: Mutex::new(session),
            snapshot_tx,
        };
        (manager, events_rx)
    }

    // ── Read surface ──────────────────────────────────────────────────────────

    pub fn control_state(&self) -> ConnectionState {
        self.lock().control
    }

    pub fn camera_state(&self) -> ConnectionState {
        self.lock().camera
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.lock().endpoint.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    /// Returns a receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    // ── Mutators ──────────────────────────────────────────────────────────────

    /// Loads the persisted endpoint, falling back to (and persisting) the
    /// default.
    ///
    /// Leaves both states `Disconnected` and does **not** open a transport;
    /// call [`SessionManager::connect`] for that.
    pub fn initialize(&self) -> Initialized {
        let _change = self.lock_endpoint_change();

        let outcome = match self.store.load() {
            Some(endpoint) => {
                info!("loaded endpoint {endpoint}");
                Initialized {
                    endpoint,
                    from_store: true,
                    persist_error: None,
                }
            }
            None => {
                let endpoint = Endpoint::default();
                info!("no stored endpoint; using default {endpoint}");
                let persist_error = self.store.save(&endpoint).err();
                if let Some(e) = &persist_error {
                    warn!("could not persist default endpoint: {e}");
                }
                Initialized {
                    endpoint,
                    from_store: false,
                    persist_error,
                }
            }
        };

        let mut session = self.lock();
        session.teardown();
        session.endpoint = Some(outcome.endpoint.clone());
        session.mark_channel_down();
        self.publish(&session);
        outcome
    }

    /// Adopts `endpoint`, persists it, and reconnects.
    ///
    /// A no-op when `endpoint` equals the current one.  A persistence failure
    /// is logged and returned but does not stop the switch.
    pub fn set_endpoint(&self, endpoint: Endpoint) -> EndpointChange {
        let _change = self.lock_endpoint_change();
        if self.lock().endpoint.as_ref() == Some(&endpoint) {
            debug!("endpoint {endpoint} unchanged");
            return EndpointChange::Unchanged;
        }

        let persist_error = self.store.save(&endpoint).err();
        if let Some(e) = &persist_error {
            warn!("could not persist endpoint {endpoint}: {e}");
        }

        info!("switching endpoint to {endpoint}");
        let mut session = self.lock();
        session.endpoint = Some(endpoint.clone());
        let transport = self.reopen(&mut session, &endpoint);
        self.publish(&session);

        EndpointChange::Switched {
            transport,
            persist_error,
        }
    }

    /// Opens a fresh transport to the current endpoint, closing any existing
    /// one.
    ///
    /// Returns `None` before [`SessionManager::initialize`] has provided an
    /// endpoint.
    pub fn connect(&self) -> Option<TransportId> {
        let mut session = self.lock();
        let Some(endpoint) = session.endpoint.clone() else {
            warn!("connect requested before an endpoint is known");
            return None;
        };
        let id = self.reopen(&mut session, &endpoint);
        self.publish(&session);
        Some(id)
    }

    /// Encodes `command` and writes it to the open channel.
    ///
    /// Silently dropped (debug log only) when no channel is open.
    pub fn send_command(&self, command: CommandType) {
        let session = self.lock();
        match &session.active {
            Some(active) if session.control.is_connected() => {
                debug!("sending {command} on {}", active.id);
                write_frame(active, encode_command(command));
            }
            _ => debug!("dropping {command}: control channel not open"),
        }
    }

    /// Closes the transport.  Later events from it are ignored.
    pub fn shutdown(&self) {
        let mut session = self.lock();
        session.teardown();
        info!("session shut down");
    }

    // ── Transport events ──────────────────────────────────────────────────────

    /// Consumes transport events until the channel closes.
    pub async fn run(&self, mut events: EventReceiver) {
        while let Some(TaggedEvent { id, event }) = events.recv().await {
            self.handle_event(id, event);
        }
    }

    /// Applies one transport event.  Events from any transport other than the
    /// active one are discarded.
    pub fn handle_event(&self, id: TransportId, event: TransportEvent) {
        let mut session = self.lock();
        if !session.is_active(id) {
            debug!("ignoring {event:?} from superseded {id}");
            return;
        }

        match event {
            TransportEvent::Opened => {
                info!("control channel open ({id})");
                session.control = ConnectionState::Connected;
                if let Some(active) = &session.active {
                    write_frame(active, encode_command(CommandType::QueryStatus));
                }
            }
            TransportEvent::Message(bytes) => match decode_message(&bytes) {
                Ok(CameraMessage::Status(status)) => {
                    debug!("camera connected: {}", status.camera_connected);
                    session.camera = ConnectionState::from_flag(status.camera_connected);
                }
                Ok(other) => debug!("ignoring inbound {:?} frame", other.message_type()),
                Err(e) => debug!("dropping inbound frame on {id}: {e}"),
            },
            TransportEvent::Closed => {
                info!("control channel closed ({id})");
                session.active = None;
                session.mark_channel_down();
            }
            TransportEvent::Error(reason) => {
                warn!("control channel error on {id}: {reason}");
                session.teardown();
                session.mark_channel_down();
            }
        }

        self.publish(&session);
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Taken before the session lock, never while holding it.
    fn lock_endpoint_change(&self) -> MutexGuard<'_, ()> {
        self.endpoint_change.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Closes any current transport and opens a new one to `endpoint`.
    /// Both states read `Disconnected` until the new transport reports open.
    fn reopen(&self, session: &mut Session, endpoint: &Endpoint) -> TransportId {
        session.teardown();
        session.mark_channel_down();

        let id = TransportId(session.next_id);
        session.next_id += 1;
        let sink = EventSink {
            id,
            tx: self.events_tx.clone(),
        };
        let handle = self.connector.open(endpoint, sink);
        info!("opening {id} to {}", endpoint.control_url());
        session.active = Some(ActiveTransport { id, handle });
        id
    }

    fn publish(&self, session: &Session) {
        let next = session.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.lock().teardown();
    }
}

fn write_frame(active: &ActiveTransport, frame: Vec<u8>) {
    if let Err(e) = active.handle.send(frame) {
        warn!("write on {} failed: {e}", active.id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
