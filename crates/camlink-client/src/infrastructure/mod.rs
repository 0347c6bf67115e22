//! Infrastructure layer for the client.
//!
//! Concrete implementations of the seams defined in the application layer:
//!
//! - **`network`** – [`network::WsConnector`], the WebSocket [`Connector`]
//!   that carries the control channel.
//! - **`storage`** – [`storage::TomlFileStore`], the on-disk
//!   [`KeyValueStore`], plus an in-memory store for hosts that manage
//!   persistence themselves.
//!
//! [`Connector`]: crate::application::session::Connector
//! [`KeyValueStore`]: crate::application::endpoint_store::KeyValueStore

pub mod network;
pub mod storage;
