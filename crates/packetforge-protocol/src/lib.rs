//! Wire protocol for Packetforge.
//!
//! This crate turns a connection's byte stream into typed packets and
//! back:
//!
//! - **Header & frame** ([`PacketHeader`], [`OptionFlags`], [`FrameCodec`]):
//!   the fixed little-endian envelope and the checksum / compression /
//!   encryption transforms on its payload.
//! - **Transfer buffer** ([`TransferBuffer`]): accumulates raw chunks
//!   and slices complete frames off the front.
//! - **Packets** ([`Payload`], [`BinaryPacket`], [`DocumentPacket`], ...):
//!   what a decoded frame becomes.
//! - **Codecs** ([`PacketCodec`] and one implementation per wire format):
//!   the pluggable strategy tying the pieces together.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → TransferBuffer → FrameCodec → PacketCodec → Payload
//! ```
//!
//! Nothing here knows about connections or threads. The `packetforge`
//! crate wraps a codec in a per-connection adapter and forwards decoded
//! payloads to the dispatch queue.

mod buffer;
mod codec;
mod config;
mod error;
mod frame;
mod header;
mod packet;

pub use buffer::TransferBuffer;
#[cfg(feature = "msgpack")]
pub use codec::MsgPackCodec;
#[cfg(feature = "protobuf")]
pub use codec::ProtobufCodec;
pub use codec::{BinaryCodec, Framing, JsonCodec, PacketCodec};
pub use config::{
    DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_IO_SIZE, DEFAULT_PACKET_SIZE, DEFAULT_POOL_CAPACITY,
    EncryptionKey, MAX_IO_SIZE, MAX_PACKET_SIZE, ProtocolConfig,
};
pub use error::{
    PACKETIO_ERROR_BUFFER_OVERFLOW, PACKETIO_ERROR_BUFFER_TOO_SMALL, PACKETIO_ERROR_CONFIG,
    PACKETIO_ERROR_DATA, PACKETIO_ERROR_DATA_COMPRESS, PACKETIO_ERROR_DATA_CRC,
    PACKETIO_ERROR_DATA_ENCRYPTION, PACKETIO_ERROR_HEADER, PACKETIO_ERROR_NONE,
    PACKETIO_ERROR_POOL_EXHAUSTED, PACKETIO_ERROR_SERIALIZE, PACKETIO_ERROR_TRANSPORT,
    ProtocolError,
};
pub use frame::{
    ENCRYPT_OVERHEAD, FrameCodec, NONCE_SIZE, RawFrame, TAG_SIZE, checksum, max_body_len,
};
pub use header::{
    BASE_HEADER_SIZE, CHECKSUM_SIZE, ChecksumKind, MAX_HEADER_SIZE, OptionFlags, PacketHeader,
};
#[cfg(feature = "protobuf")]
pub use packet::ProtobufPacket;
pub use packet::{BinaryPacket, Document, DocumentPacket, JsonPacket, MsgPackPacket, Payload};
