//! Protocol module containing message types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_message, encode_command, encode_message, DecodeError};
pub use messages::*;
