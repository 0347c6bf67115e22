//! camlink-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does camlink-client do? (for beginners)
//!
//! The client is the half of CamLink that runs next to a user interface
//! (phone app, desktop panel, headless daemon).  It:
//!
//! 1. Loads the device address the user last entered (or a factory default).
//! 2. Opens a WebSocket control channel to the device.
//! 3. Asks the device whether its camera is attached (`QUERY_STATUS`) and
//!    keeps that answer up to date from the `STATUS` frames it receives.
//! 4. Sends `FOCUS` / `CAPTURE` commands on behalf of the UI.
//! 5. Tears the channel down and reconnects when the user enters a new
//!    address, remembering it for next time.
//!
//! The UI itself is not part of this crate: it reads a [`SessionSnapshot`]
//! and calls [`SessionManager::send_command`] / [`SessionManager::set_endpoint`].

/// Application layer: endpoint persistence contract and the session state machine.
pub mod application;

/// Infrastructure layer: WebSocket transport and on-disk storage.
pub mod infrastructure;

pub use application::endpoint_store::{EndpointStore, KeyValueStore, StoreError};
pub use application::session::{
    Connector, EndpointChange, EventReceiver, EventSink, Initialized, SessionManager,
    SessionSnapshot, TaggedEvent, Transport, TransportError, TransportEvent, TransportId,
};
