//! Binary codec for encoding and decoding CamLink control messages.
//!
//! Every WebSocket binary message is one finished FlatBuffers buffer whose
//! root is the `Message` table of `schema/control.fbs`:
//!
//! ```text
//! Message { message_type: MessageType (ubyte, default COMMAND),
//!           command:      Command     (table, slot 1),
//!           status:       Status      (table, slot 2) }
//! Command { type: ControlType (ubyte, default FOCUS) }
//! Status  { camera_connected: bool (default false) }
//! ```
//!
//! # Buffer layout (for beginners)
//!
//! A FlatBuffers buffer is built back to front and read through offsets.
//! All integers are little-endian.
//!
//! - Bytes 0..4 hold a `u32` offset from the start of the buffer to the root
//!   table.
//! - A table starts with an `i32` "soffset"; `table_pos - soffset` is the
//!   position of its **vtable**.
//! - A vtable is a list of `u16`: its own length in bytes, the table's length
//!   in bytes, then one entry per field giving the field's offset inside the
//!   table (0 means "absent, use the schema default").
//! - A field that refers to another table stores a `u32` offset relative to
//!   the field's own position.
//!
//! Fields equal to their default are never written, exactly as the stock
//! FlatBuffers builders do, so a `FOCUS` command carries no `type` byte at all.
//! The encoder below reproduces the stock builder's output byte for byte
//! (64-byte initial buffer, no forced defaults), so frames are identical to
//! those produced by the mobile app.
//!
//! # Decoding
//!
//! The decoder verifies every offset it follows: vtables and tables must lie
//! inside the buffer, and every field must lie inside the size its table
//! declares.  Anything else is [`DecodeError::Malformed`].  A `message_type`
//! value outside the schema is [`DecodeError::UnknownDiscriminant`].

use thiserror::Error;
use tracing::trace;

use crate::protocol::messages::{
    CameraMessage, CommandMessage, CommandType, MessageType, StatusMessage,
};

// ── Layout constants ──────────────────────────────────────────────────────────

const UOFFSET_SIZE: usize = 4;
const SOFFSET_SIZE: usize = 4;
const VOFFSET_SIZE: usize = 2;
const VTABLE_HEADER_SIZE: usize = 2 * VOFFSET_SIZE;
const INITIAL_CAPACITY: usize = 64;

/// Smallest structurally valid buffer: root offset, an empty vtable, and a
/// table holding only its soffset.
pub const MIN_FRAME_SIZE: usize = UOFFSET_SIZE + VTABLE_HEADER_SIZE + SOFFSET_SIZE;

// Field slots, in schema declaration order.
const MESSAGE_FIELDS: usize = 3;
const MESSAGE_TYPE_SLOT: usize = 0;
const MESSAGE_COMMAND_SLOT: usize = 1;
const MESSAGE_STATUS_SLOT: usize = 2;

const COMMAND_FIELDS: usize = 1;
const COMMAND_TYPE_SLOT: usize = 0;

const STATUS_FIELDS: usize = 1;
const STATUS_CAMERA_CONNECTED_SLOT: usize = 0;

/// Errors that can occur while decoding a received frame.
///
/// Both variants are recoverable: the caller drops the frame and keeps the
/// channel open.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The bytes are not a structurally valid `Message` buffer (truncated,
    /// an offset pointing outside the buffer, a field outside its table).
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The buffer is valid but `message_type` names a message kind this build
    /// does not know.
    #[error("unknown message discriminant: 0x{0:02X}")]
    UnknownDiscriminant(u8),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a COMMAND message for `command_type`.
///
/// Deterministic: the same command always yields byte-identical output.
///
/// # Examples
///
/// ```rust
/// use camlink_core::{encode_command, CommandType};
///
/// let bytes = encode_command(CommandType::Capture);
/// assert_eq!(bytes.len(), 36);
/// assert_eq!(bytes[35], 0x01); // ControlType.CAPTURE, last byte of the Command table
/// ```
pub fn encode_command(command_type: CommandType) -> Vec<u8> {
    encode_message(&CameraMessage::command(command_type))
}

/// Encodes any [`CameraMessage`] into a finished buffer.
///
/// There is no error path: every message is two small tables.
pub fn encode_message(msg: &CameraMessage) -> Vec<u8> {
    let mut builder = TableBuilder::new();

    // Children first, then the envelope that points at them.
    let root = match msg {
        CameraMessage::Command(command) => {
            builder.start_table(COMMAND_FIELDS);
            builder.add_u8(COMMAND_TYPE_SLOT, command.command_type.to_u8(), CommandType::FOCUS);
            let child = builder.end_table();

            builder.start_table(MESSAGE_FIELDS);
            builder.add_u8(MESSAGE_TYPE_SLOT, MessageType::Command as u8, MessageType::Command as u8);
            builder.add_table(MESSAGE_COMMAND_SLOT, child);
            builder.end_table()
        }
        CameraMessage::Status(status) => {
            builder.start_table(STATUS_FIELDS);
            builder.add_u8(STATUS_CAMERA_CONNECTED_SLOT, u8::from(status.camera_connected), 0);
            let child = builder.end_table();

            builder.start_table(MESSAGE_FIELDS);
            builder.add_u8(MESSAGE_TYPE_SLOT, MessageType::Status as u8, MessageType::Command as u8);
            builder.add_table(MESSAGE_STATUS_SLOT, child);
            builder.end_table()
        }
    };

    builder.finish(root)
}

/// Decodes exactly one [`CameraMessage`] from `bytes`.
///
/// # Errors
///
/// - [`DecodeError::Malformed`] if `bytes` is shorter than
///   [`MIN_FRAME_SIZE`], any offset leaves the buffer, a field lies outside
///   its table, or the table the message type calls for is missing.
/// - [`DecodeError::UnknownDiscriminant`] if `message_type` is not a known
///   [`MessageType`].
///
/// # Examples
///
/// ```rust
/// use camlink_core::{decode_message, encode_message, CameraMessage};
///
/// let bytes = encode_message(&CameraMessage::status(true));
/// assert_eq!(decode_message(&bytes), Ok(CameraMessage::status(true)));
/// ```
pub fn decode_message(bytes: &[u8]) -> Result<CameraMessage, DecodeError> {
    if bytes.len() < MIN_FRAME_SIZE {
        return Err(DecodeError::Malformed(format!(
            "need at least {MIN_FRAME_SIZE} bytes, got {}",
            bytes.len()
        )));
    }

    let root = read_u32(bytes, 0) as usize;
    let message = Table::at(bytes, root, "Message")?;

    let raw_type = message.read_u8(MESSAGE_TYPE_SLOT, MessageType::Command as u8)?;
    let msg_type =
        MessageType::try_from(raw_type).map_err(|_| DecodeError::UnknownDiscriminant(raw_type))?;

    let (slot, name) = match msg_type {
        MessageType::Command => (MESSAGE_COMMAND_SLOT, "Command"),
        MessageType::Status => (MESSAGE_STATUS_SLOT, "Status"),
    };
    let table = message
        .read_table(slot, name)?
        .ok_or_else(|| malformed(&format!("{msg_type:?} message without a {name} table")))?;

    // A builder finishes every buffer at the end of the first table it wrote.
    let extent = message.end().max(table.end());
    if extent != bytes.len() {
        return Err(malformed(&format!(
            "{} trailing bytes after a {extent}-byte message",
            bytes.len() - extent
        )));
    }

    match msg_type {
        MessageType::Command => decode_command(&table).map(CameraMessage::Command),
        MessageType::Status => decode_status(&table).map(CameraMessage::Status),
    }
}

// ── Table decoding ────────────────────────────────────────────────────────────

fn decode_command(table: &Table<'_>) -> Result<CommandMessage, DecodeError> {
    let raw = table.read_u8(COMMAND_TYPE_SLOT, CommandType::FOCUS)?;
    let command_type = CommandType::from_u8(raw);
    if let CommandType::Other(raw) = command_type {
        trace!(raw, "passing through unknown command value");
    }
    Ok(CommandMessage { command_type })
}

fn decode_status(table: &Table<'_>) -> Result<StatusMessage, DecodeError> {
    let raw = table.read_u8(STATUS_CAMERA_CONNECTED_SLOT, 0)?;
    Ok(StatusMessage {
        camera_connected: raw != 0,
    })
}

/// A bounds-checked view of one table inside a received buffer.
struct Table<'a> {
    buf: &'a [u8],
    pos: usize,
    vtable: usize,
    vtable_len: usize,
    size: usize,
    name: &'static str,
}

impl<'a> Table<'a> {
    fn at(buf: &'a [u8], pos: usize, name: &'static str) -> Result<Self, DecodeError> {
        require_range(buf, pos, SOFFSET_SIZE, name)?;
        let soffset = i64::from(read_i32(buf, pos));
        let vtable = usize::try_from(pos as i64 - soffset)
            .map_err(|_| malformed(&format!("{name}: vtable offset points before the buffer")))?;

        require_range(buf, vtable, VTABLE_HEADER_SIZE, name)?;
        let vtable_len = usize::from(read_u16(buf, vtable));
        let size = usize::from(read_u16(buf, vtable + VOFFSET_SIZE));

        if vtable_len < VTABLE_HEADER_SIZE || vtable_len % VOFFSET_SIZE != 0 {
            return Err(malformed(&format!("{name}: invalid vtable length {vtable_len}")));
        }
        require_range(buf, vtable, vtable_len, name)?;
        if size < SOFFSET_SIZE {
            return Err(malformed(&format!("{name}: invalid table size {size}")));
        }
        require_range(buf, pos, size, name)?;

        Ok(Self {
            buf,
            pos,
            vtable,
            vtable_len,
            size,
            name,
        })
    }

    /// One past the last byte of the table or its vtable.
    fn end(&self) -> usize {
        (self.pos + self.size).max(self.vtable + self.vtable_len)
    }

    /// Absolute position of the field in `slot`, or `None` when absent.
    fn field(&self, slot: usize, width: usize) -> Result<Option<usize>, DecodeError> {
        let entry = VTABLE_HEADER_SIZE + slot * VOFFSET_SIZE;
        if entry + VOFFSET_SIZE > self.vtable_len {
            // Written by an older schema that did not have this field yet.
            return Ok(None);
        }
        let offset = usize::from(read_u16(self.buf, self.vtable + entry));
        if offset == 0 {
            return Ok(None);
        }
        if offset < SOFFSET_SIZE || offset + width > self.size {
            return Err(malformed(&format!(
                "{}: field {slot} at +{offset} overruns the {}-byte table",
                self.name, self.size
            )));
        }
        Ok(Some(self.pos + offset))
    }

    fn read_u8(&self, slot: usize, default: u8) -> Result<u8, DecodeError> {
        Ok(self.field(slot, 1)?.map_or(default, |at| self.buf[at]))
    }

    fn read_table(&self, slot: usize, name: &'static str) -> Result<Option<Table<'a>>, DecodeError> {
        let Some(at) = self.field(slot, UOFFSET_SIZE)? else {
            return Ok(None);
        };
        let target = at
            .checked_add(read_u32(self.buf, at) as usize)
            .ok_or_else(|| malformed(&format!("{name}: offset overflows")))?;
        Table::at(self.buf, target, name).map(Some)
    }
}

// ── Table building ────────────────────────────────────────────────────────────

/// Back-to-front table builder following the stock FlatBuffers algorithm.
///
/// Data lives in `buf[space..]`; positions are tracked as offsets from the
/// end of the buffer, which stay valid when the buffer grows.
struct TableBuilder {
    buf: Vec<u8>,
    space: usize,
    min_align: usize,
    vtable: Vec<usize>,
    object_start: usize,
}

impl TableBuilder {
    fn new() -> Self {
        Self {
            buf: vec![0; INITIAL_CAPACITY],
            space: INITIAL_CAPACITY,
            min_align: 1,
            vtable: Vec::new(),
            object_start: 0,
        }
    }

    /// Bytes written so far, counted from the end of the buffer.
    fn offset(&self) -> usize {
        self.buf.len() - self.space
    }

    fn grow(&mut self) {
        let old_len = self.buf.len();
        let mut grown = vec![0; old_len * 2];
        grown[old_len..].copy_from_slice(&self.buf);
        self.space += old_len;
        self.buf = grown;
    }

    /// Pads so that after writing `additional` bytes, a `size`-byte value is
    /// aligned to `size`.
    fn prep(&mut self, size: usize, additional: usize) {
        self.min_align = self.min_align.max(size);
        let align = (self.offset() + additional).wrapping_neg() & (size - 1);
        while self.space < align + size + additional {
            self.grow();
        }
        self.space -= align;
        self.buf[self.space..self.space + align].fill(0);
    }

    fn put(&mut self, bytes: &[u8]) {
        self.space -= bytes.len();
        self.buf[self.space..self.space + bytes.len()].copy_from_slice(bytes);
    }

    fn push_u8(&mut self, value: u8) {
        self.prep(1, 0);
        self.put(&[value]);
    }

    fn push_u16(&mut self, value: u16) {
        self.prep(2, 0);
        self.put(&value.to_le_bytes());
    }

    fn push_i32(&mut self, value: i32) {
        self.prep(4, 0);
        self.put(&value.to_le_bytes());
    }

    fn push_uoffset(&mut self, target: usize) {
        self.prep(UOFFSET_SIZE, 0);
        let relative = self.offset() - target + UOFFSET_SIZE;
        self.put(&(relative as u32).to_le_bytes());
    }

    fn start_table(&mut self, fields: usize) {
        self.vtable = vec![0; fields];
        self.object_start = self.offset();
    }

    fn add_u8(&mut self, slot: usize, value: u8, default: u8) {
        if value != default {
            self.push_u8(value);
            self.vtable[slot] = self.offset();
        }
    }

    fn add_table(&mut self, slot: usize, table: usize) {
        self.push_uoffset(table);
        self.vtable[slot] = self.offset();
    }

    /// Writes the soffset and the vtable; returns the table's offset.
    ///
    /// A frame holds one child table and the envelope, whose vtables always
    /// differ in length, so vtables are never shared.
    fn end_table(&mut self) -> usize {
        self.push_i32(0);
        let table = self.offset();

        let used = self.vtable.iter().rposition(|&at| at != 0).map_or(0, |i| i + 1);
        for i in (0..used).rev() {
            let at = self.vtable[i];
            self.push_u16(if at == 0 { 0 } else { (table - at) as u16 });
        }
        self.push_u16((table - self.object_start) as u16);
        self.push_u16(((used + 2) * VOFFSET_SIZE) as u16);

        let soffset = (self.offset() - table) as i32;
        let table_pos = self.buf.len() - table;
        self.buf[table_pos..table_pos + SOFFSET_SIZE].copy_from_slice(&soffset.to_le_bytes());
        table
    }

    fn finish(mut self, root: usize) -> Vec<u8> {
        let min_align = self.min_align;
        self.prep(min_align, UOFFSET_SIZE);
        self.push_uoffset(root);
        self.buf.split_off(self.space)
    }
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn malformed(reason: &str) -> DecodeError {
    DecodeError::Malformed(reason.to_string())
}

fn require_range(buf: &[u8], start: usize, len: usize, context: &str) -> Result<(), DecodeError> {
    match start.checked_add(len) {
        Some(end) if end <= buf.len() => Ok(()),
        _ => Err(DecodeError::Malformed(format!(
            "{context}: {len} bytes at {start} exceed the {}-byte frame",
            buf.len()
        ))),
    }
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
