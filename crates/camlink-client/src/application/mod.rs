//! Application layer for the client.
//!
//! # What lives here?
//!
//! - **`endpoint_store`** – The contract for remembering the device address
//!   across restarts.  It sits on top of a plain key/value capability
//!   ([`endpoint_store::KeyValueStore`]) so any storage backend can be
//!   plugged in.
//!
//! - **`session`** – The [`session::SessionManager`]: the state machine that
//!   owns the one live control channel, reconciles control-channel and camera
//!   connectivity, and turns UI actions into encoded frames.
//!
//! Nothing in this layer touches sockets or files directly; transports and
//! stores are injected through traits.

pub mod endpoint_store;
pub mod session;
