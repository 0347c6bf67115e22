//! # camlink-core
//!
//! Shared library for CamLink containing the control-channel protocol codec
//! and the domain types that describe a connection to a camera device.
//!
//! It has zero dependencies on OS APIs, UI frameworks, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! CamLink is a remote control for a network-attached camera.  The device
//! exposes two things on the LAN:
//!
//! - a **control channel** (WebSocket on port 8888) carrying small binary
//!   frames: commands such as `FOCUS` or `CAPTURE` going to the device, and
//!   status reports such as "camera attached" coming back;
//! - a **video stream** (MJPEG over HTTP on port 8080) that a UI renders.
//!
//! This crate (`camlink-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How control frames look on the wire.  Messages are
//!   FlatBuffers tables (schema in `schema/control.fbs`), built and verified
//!   by a small hand-written codec, and decoded back into typed Rust values
//!   on the other end.
//!
//! - **`domain`** – Pure value types: the device [`Endpoint`] and the
//!   [`ConnectionState`] enum used for both the control channel and the
//!   camera presence.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `camlink_core::Endpoint` instead of `camlink_core::domain::endpoint::Endpoint`.
pub use domain::connection::ConnectionState;
pub use domain::endpoint::{Endpoint, EndpointError};
pub use protocol::codec::{decode_message, encode_command, encode_message, DecodeError};
pub use protocol::messages::{CameraMessage, CommandType};
