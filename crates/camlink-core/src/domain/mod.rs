//! Domain value types for CamLink.
//!
//! Pure types with no infrastructure dependencies: they can be compiled and
//! tested anywhere, and every outer layer (session manager, storage, UI)
//! speaks in terms of them.

/// Connectivity states shared by the control channel and the camera.
pub mod connection;

/// The device address and the URLs derived from it.
pub mod endpoint;
