//! Error types for the protocol layer.
//!
//! Every failure on the receive path is reported as a value, never a
//! panic, so the transport layer can decide what to do with the one
//! connection involved. Two questions matter to that caller:
//!
//! - [`ProtocolError::code`]: a stable numeric code per failure kind.
//! - [`ProtocolError::is_fatal`]: whether the byte stream is now
//!   desynchronized and the connection has to be dropped.

use packetforge_pool::PoolError;
use packetforge_transport::TransportError;

/// No error.
pub const PACKETIO_ERROR_NONE: i32 = 0;
/// Malformed header.
pub const PACKETIO_ERROR_HEADER: i32 = -1;
/// Payload length or payload content is invalid.
pub const PACKETIO_ERROR_DATA: i32 = -2;
/// Checksum did not match.
pub const PACKETIO_ERROR_DATA_CRC: i32 = -3;
/// Decompression failed.
pub const PACKETIO_ERROR_DATA_COMPRESS: i32 = -4;
/// Encryption or decryption failed.
pub const PACKETIO_ERROR_DATA_ENCRYPTION: i32 = -5;
/// Transfer buffer capacity exceeded.
pub const PACKETIO_ERROR_BUFFER_OVERFLOW: i32 = -10;
/// Packet pool has no free slot.
pub const PACKETIO_ERROR_POOL_EXHAUSTED: i32 = -11;
/// Caller-provided output buffer too small.
pub const PACKETIO_ERROR_BUFFER_TOO_SMALL: i32 = -12;
/// Outbound serialization failed.
pub const PACKETIO_ERROR_SERIALIZE: i32 = -20;
/// Handing bytes to the transport failed.
pub const PACKETIO_ERROR_TRANSPORT: i32 = -30;
/// The protocol configuration is unusable.
pub const PACKETIO_ERROR_CONFIG: i32 = -40;

/// Errors that can occur while framing, transforming, or (de)serializing
/// packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The fixed header could not be parsed (unknown option bits,
    /// conflicting checksum algorithms).
    #[error("malformed header: {0}")]
    Header(String),

    /// A frame declares (or an encode would produce) more payload bytes
    /// than the configured maximum packet size.
    #[error("payload of {len} bytes exceeds maximum packet size {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// The checksum carried in the header does not match the payload.
    #[error("checksum mismatch: header {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Decompressing an inbound payload failed.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Encrypting an outbound payload failed (or no key is configured).
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decrypting an inbound payload failed (bad tag, truncated, no key).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Appending would push the transfer buffer past its capacity.
    #[error("transfer buffer overflow: {buffered} buffered + {incoming} incoming > {capacity}")]
    BufferOverflow {
        buffered: usize,
        incoming: usize,
        capacity: usize,
    },

    /// The caller's output buffer cannot hold the encoded frame.
    #[error("output buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    /// No pooled packet is available to decode into.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A JSON payload could not be parsed.
    #[error("json decode failed: {0}")]
    JsonDecode(#[source] serde_json::Error),

    /// A JSON document could not be serialized.
    #[error("json encode failed: {0}")]
    JsonEncode(#[source] serde_json::Error),

    /// A MessagePack payload could not be parsed.
    #[cfg(feature = "msgpack")]
    #[error("msgpack decode failed: {0}")]
    MsgPackDecode(#[source] rmp_serde::decode::Error),

    /// A MessagePack document could not be serialized.
    #[cfg(feature = "msgpack")]
    #[error("msgpack encode failed: {0}")]
    MsgPackEncode(#[source] rmp_serde::encode::Error),

    /// A protobuf payload did not parse as the message registered for
    /// its packet id.
    #[cfg(feature = "protobuf")]
    #[error("protobuf decode failed: {0}")]
    ProtobufDecode(#[source] prost::DecodeError),

    /// A protobuf message could not be encoded.
    #[cfg(feature = "protobuf")]
    #[error("protobuf encode failed: {0}")]
    ProtobufEncode(#[source] prost::EncodeError),

    /// No message type is registered for this packet id.
    #[error("no message registered for packet id {0}")]
    UnknownPacketId(u16),

    /// The payload variant does not belong to this codec.
    #[error("codec `{codec}` cannot encode a {payload} payload")]
    UnsupportedPayload {
        codec: &'static str,
        payload: &'static str,
    },

    /// Handing bytes to the transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The protocol configuration is unusable.
    #[error("invalid protocol configuration: {0}")]
    Config(String),
}

impl ProtocolError {
    /// The numeric packet-I/O error code for this failure.
    pub fn code(&self) -> i32 {
        match self {
            Self::Header(_) => PACKETIO_ERROR_HEADER,
            Self::PayloadTooLarge { .. } | Self::JsonDecode(_) | Self::UnknownPacketId(_) => {
                PACKETIO_ERROR_DATA
            }
            #[cfg(feature = "msgpack")]
            Self::MsgPackDecode(_) => PACKETIO_ERROR_DATA,
            #[cfg(feature = "protobuf")]
            Self::ProtobufDecode(_) => PACKETIO_ERROR_DATA,
            Self::ChecksumMismatch { .. } => PACKETIO_ERROR_DATA_CRC,
            Self::Decompression(_) => PACKETIO_ERROR_DATA_COMPRESS,
            Self::Encryption(_) | Self::Decryption(_) => PACKETIO_ERROR_DATA_ENCRYPTION,
            Self::BufferOverflow { .. } => PACKETIO_ERROR_BUFFER_OVERFLOW,
            Self::Pool(_) => PACKETIO_ERROR_POOL_EXHAUSTED,
            Self::BufferTooSmall { .. } => PACKETIO_ERROR_BUFFER_TOO_SMALL,
            Self::JsonEncode(_) | Self::UnsupportedPayload { .. } => PACKETIO_ERROR_SERIALIZE,
            #[cfg(feature = "msgpack")]
            Self::MsgPackEncode(_) => PACKETIO_ERROR_SERIALIZE,
            #[cfg(feature = "protobuf")]
            Self::ProtobufEncode(_) => PACKETIO_ERROR_SERIALIZE,
            Self::Transport(_) => PACKETIO_ERROR_TRANSPORT,
            Self::Config(_) => PACKETIO_ERROR_CONFIG,
        }
    }

    /// Returns `true` if the inbound byte stream can no longer be
    /// trusted and the connection must be closed.
    ///
    /// Frame-level failures are fatal. Resource failures (buffer full,
    /// pool empty) and outbound failures are not: nothing was consumed
    /// from the stream, so the caller may back off and retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.code(),
            PACKETIO_ERROR_HEADER
                | PACKETIO_ERROR_DATA
                | PACKETIO_ERROR_DATA_CRC
                | PACKETIO_ERROR_DATA_COMPRESS
                | PACKETIO_ERROR_DATA_ENCRYPTION
        ) && !matches!(self, Self::Encryption(_))
    }
}
