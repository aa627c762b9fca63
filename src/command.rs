//! Command types and frame representation for the SNAC layer.
//!
//! A [`CommandType`] is the `(family, subtype)` pair classifying every frame
//! on the wire. [`SnacFrame`] is the unit exchanged with the transport: the
//! ten-byte SNAC header plus an opaque payload. The engine never interprets
//! payload bytes; decoding them into application commands is the job of
//! factories registered with [`crate::factory::FactoryRegistry`].

use std::any::Any;

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Length of the SNAC header preceding each payload.
pub const SNAC_HEADER_LEN: usize = 10;

/// The `(family, subtype)` pair identifying a command's wire category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommandType {
    /// Service family, e.g. `0x0001` for the generic service.
    pub family: u16,
    /// Command subtype within the family.
    pub subtype: u16,
}

impl CommandType {
    /// Create a new [`CommandType`].
    #[must_use]
    pub const fn new(family: u16, subtype: u16) -> Self { Self { family, subtype } }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}/{:#06x}", self.family, self.subtype)
    }
}

/// Key used when registering or removing a command factory.
///
/// The original wildcard sentinels ("any subtype in a family", "any command
/// at all") are expressed as explicit variants rather than magic values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKey {
    /// Matches exactly one `(family, subtype)` pair.
    Exact(CommandType),
    /// Matches every subtype within one family.
    Family(u16),
    /// Matches any command whatsoever.
    Any,
}

/// Errors produced when parsing a SNAC header from raw bytes.
#[derive(Debug)]
pub enum FrameHeaderError {
    /// Fewer than [`SNAC_HEADER_LEN`] bytes were available.
    Truncated {
        /// Number of bytes actually present.
        available: usize,
    },
}

impl std::fmt::Display for FrameHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { available } => write!(
                f,
                "snac header truncated: {available} of {SNAC_HEADER_LEN} bytes"
            ),
        }
    }
}

impl std::error::Error for FrameHeaderError {}

/// One discrete unit of data exchanged with the transport layer.
///
/// Carries the type header, the correlation id echoed on responses, and an
/// opaque payload. The FLAP framing below this level is out of scope.
#[derive(Clone, Debug)]
pub struct SnacFrame {
    /// Classification of the frame.
    pub command_type: CommandType,
    /// SNAC flag bytes; zero for everything this engine originates.
    pub flags: u16,
    /// Correlation id linking a response to its request. Never zero for
    /// requests originated by this engine.
    pub request_id: u32,
    /// Opaque application payload.
    pub payload: Bytes,
}

impl SnacFrame {
    /// Build a frame with zeroed flags.
    #[must_use]
    pub fn new(command_type: CommandType, request_id: u32, payload: Bytes) -> Self {
        Self {
            command_type,
            flags: 0,
            request_id,
            payload,
        }
    }

    /// Parse a frame from a full SNAC datagram (header plus payload).
    ///
    /// # Errors
    ///
    /// Returns [`FrameHeaderError::Truncated`] if `src` is shorter than the
    /// header.
    pub fn parse(src: &[u8]) -> Result<Self, FrameHeaderError> {
        if src.len() < SNAC_HEADER_LEN {
            return Err(FrameHeaderError::Truncated {
                available: src.len(),
            });
        }
        let mut header = &src[..SNAC_HEADER_LEN];
        let family = header.get_u16();
        let subtype = header.get_u16();
        let flags = header.get_u16();
        let request_id = header.get_u32();
        Ok(Self {
            command_type: CommandType::new(family, subtype),
            flags,
            request_id,
            payload: Bytes::copy_from_slice(&src[SNAC_HEADER_LEN..]),
        })
    }

    /// Append the header and payload to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(SNAC_HEADER_LEN + self.payload.len());
        dst.put_u16(self.command_type.family);
        dst.put_u16(self.command_type.subtype);
        dst.put_u16(self.flags);
        dst.put_u32(self.request_id);
        dst.extend_from_slice(&self.payload);
    }
}

/// An opaque decoded command produced by a factory.
///
/// The engine only ever needs a command's [`CommandType`] for classification;
/// applications downcast via [`SnacCommand::as_any`] to reach concrete fields.
pub trait SnacCommand: Send + Sync + std::fmt::Debug {
    /// Wire category of this command.
    fn command_type(&self) -> CommandType;

    /// Append the command's payload bytes to `dst` for transmission.
    fn encode_payload(&self, dst: &mut BytesMut);

    /// Access the concrete command for application-level downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// A command whose payload is carried as raw bytes.
///
/// Useful for traffic the application builds by hand and as the output of
/// catch-all factories that pass payloads through undecoded.
#[derive(Clone, Debug)]
pub struct RawCommand {
    command_type: CommandType,
    payload: Bytes,
}

impl RawCommand {
    /// Wrap raw payload bytes under the given command type.
    #[must_use]
    pub fn new(command_type: CommandType, payload: Bytes) -> Self {
        Self {
            command_type,
            payload,
        }
    }

    /// The undecoded payload bytes.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }
}

impl SnacCommand for RawCommand {
    fn command_type(&self) -> CommandType { self.command_type }

    fn encode_payload(&self, dst: &mut BytesMut) { dst.extend_from_slice(&self.payload); }

    fn as_any(&self) -> &dyn Any { self }
}
