//! Storage infrastructure: key/value persistence backends.
//!
//! - `file_store` keeps values (and client settings) in a TOML file in the
//!   platform config directory.
//! - `memory` keeps values for the life of the process only.

pub mod file_store;
pub mod memory;

pub use file_store::{ClientSettings, TomlFileStore};
pub use memory::MemoryStore;
