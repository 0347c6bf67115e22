//! All CamLink control-channel message types.
//!
//! The schema is shared with the device firmware (see `schema/control.fbs`):
//! every enum value below is a fixed constant of the protocol and must never
//! be renumbered.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Message type codes ────────────────────────────────────────────────────────

/// Envelope discriminant: the `message_type` field of the `Message` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Client → device.  Also the schema default, so it is omitted on the wire.
    Command = 0x00,
    /// Device → client.
    Status = 0x01,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MessageType::Command),
            0x01 => Ok(MessageType::Status),
            _ => Err(()),
        }
    }
}

// ── Command types ─────────────────────────────────────────────────────────────

/// The `ControlType` carried by a `Command` table.
///
/// The set is expected to grow with newer firmware.  Values this build does
/// not know are kept as [`CommandType::Other`] and re-encode to the same
/// integer, so a decode → encode pass never loses information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
    /// Trigger autofocus.
    Focus,
    /// Take a picture.
    Capture,
    /// Ask the device to report camera presence with a STATUS message.
    QueryStatus,
    /// A command value not known to this build.
    Other(u8),
}

impl CommandType {
    /// Wire value of `FOCUS` (the schema default).
    pub const FOCUS: u8 = 0;
    /// Wire value of `CAPTURE`.
    pub const CAPTURE: u8 = 1;
    /// Wire value of `QUERY_STATUS`.
    pub const QUERY_STATUS: u8 = 2;

    /// Every command defined by the current schema.
    pub const KNOWN: [CommandType; 3] = [
        CommandType::Focus,
        CommandType::Capture,
        CommandType::QueryStatus,
    ];

    /// Returns the wire integer for this command.
    pub fn to_u8(self) -> u8 {
        match self {
            CommandType::Focus => Self::FOCUS,
            CommandType::Capture => Self::CAPTURE,
            CommandType::QueryStatus => Self::QUERY_STATUS,
            CommandType::Other(raw) => raw,
        }
    }

    /// Maps a wire integer to a command; never fails.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            Self::FOCUS => CommandType::Focus,
            Self::CAPTURE => CommandType::Capture,
            Self::QUERY_STATUS => CommandType::QueryStatus,
            other => CommandType::Other(other),
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandType::Focus => f.write_str("FOCUS"),
            CommandType::Capture => f.write_str("CAPTURE"),
            CommandType::QueryStatus => f.write_str("QUERY_STATUS"),
            CommandType::Other(raw) => write!(f, "UNKNOWN({raw})"),
        }
    }
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// The `Command` table: an action requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub command_type: CommandType,
}

/// The `Status` table: the device's report of its camera attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// `true` when the device currently has a camera attached and usable.
    pub camera_connected: bool,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// One decoded control-channel `Message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraMessage {
    Command(CommandMessage),
    Status(StatusMessage),
}

impl CameraMessage {
    /// Shorthand for a COMMAND message.
    pub fn command(command_type: CommandType) -> Self {
        CameraMessage::Command(CommandMessage { command_type })
    }

    /// Shorthand for a STATUS message.
    pub fn status(camera_connected: bool) -> Self {
        CameraMessage::Status(StatusMessage { camera_connected })
    }

    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            CameraMessage::Command(_) => MessageType::Command,
            CameraMessage::Status(_) => MessageType::Status,
        }
    }
}
