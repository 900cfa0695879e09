//! Decoded packet bodies, one shape per wire format.
//!
//! A codec turns a frame into a [`Payload`]. The binary and protobuf
//! codecs draw their packets from an [`ObjectPool`](packetforge_pool::ObjectPool);
//! JSON and MessagePack packets are plain heap values holding a
//! [`Document`].

use packetforge_pool::{Pooled, Recycle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::header::OptionFlags;
use crate::ProtocolError;

/// The structured body carried by JSON and MessagePack packets.
pub type Document = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// BinaryPacket
// ---------------------------------------------------------------------------

/// A packet whose payload is raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryPacket {
    pub packet_id: u16,
    /// Transforms the frame arrived with, or should be sent with.
    pub options: OptionFlags,
    pub payload: Vec<u8>,
}

impl BinaryPacket {
    pub fn new(packet_id: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            packet_id,
            options: OptionFlags::empty(),
            payload: payload.into(),
        }
    }
}

impl Recycle for BinaryPacket {
    fn recycle(&mut self) {
        self.packet_id = 0;
        self.options = OptionFlags::empty();
        self.payload.clear();
    }
}

// ---------------------------------------------------------------------------
// DocumentPacket
// ---------------------------------------------------------------------------

/// A packet whose payload is a string-keyed document.
///
/// The same type backs both the JSON and the MessagePack codec; only the
/// bytes on the wire differ.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPacket {
    pub packet_id: u16,
    pub options: OptionFlags,
    pub document: Document,
}

/// A JSON packet.
pub type JsonPacket = DocumentPacket;

/// A MessagePack packet.
pub type MsgPackPacket = DocumentPacket;

impl DocumentPacket {
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            ..Default::default()
        }
    }

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// # Errors
    /// Returns [`ProtocolError::JsonEncode`] if `value` has no JSON-model
    /// representation (e.g. a map with non-string keys).
    pub fn insert<V: Serialize>(&mut self, key: &str, value: V) -> Result<&mut Self, ProtocolError> {
        let value = serde_json::to_value(value).map_err(ProtocolError::JsonEncode)?;
        self.document.insert(key.to_owned(), value);
        Ok(self)
    }

    /// Reads the entry under `key` as a `T`.
    ///
    /// Returns `None` if the key is missing or holds a different shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.document.get(key)?;
        T::deserialize(value).ok()
    }

    /// The raw entry under `key`.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }
}

// ---------------------------------------------------------------------------
// ProtobufPacket
// ---------------------------------------------------------------------------

/// A packet whose payload is an encoded protobuf message.
///
/// The body is kept encoded; the receiving handler knows which message
/// type belongs to the packet id and decodes it with
/// [`message`](Self::message).
#[cfg(feature = "protobuf")]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtobufPacket {
    pub packet_id: u16,
    pub options: OptionFlags,
    pub body: Vec<u8>,
}

#[cfg(feature = "protobuf")]
impl ProtobufPacket {
    /// Builds a packet from a message.
    pub fn from_message<M: prost::Message>(packet_id: u16, message: &M) -> Self {
        let mut packet = Self {
            packet_id,
            ..Default::default()
        };
        packet.set_message(message);
        packet
    }

    /// Decodes the body as `M`.
    pub fn message<M: prost::Message + Default>(&self) -> Result<M, ProtocolError> {
        M::decode(self.body.as_slice()).map_err(ProtocolError::ProtobufDecode)
    }

    /// Replaces the body with the encoding of `message`.
    pub fn set_message<M: prost::Message>(&mut self, message: &M) {
        self.body.clear();
        // Encoding into a Vec only fails on insufficient capacity, which
        // a growable buffer never reports.
        self.body.reserve(message.encoded_len());
        message.encode_raw(&mut self.body);
    }
}

#[cfg(feature = "protobuf")]
impl Recycle for ProtobufPacket {
    fn recycle(&mut self) {
        self.packet_id = 0;
        self.options = OptionFlags::empty();
        self.body.clear();
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// A decoded packet body from any codec.
#[derive(Debug, PartialEq)]
pub enum Payload {
    Binary(Pooled<BinaryPacket>),
    Json(JsonPacket),
    MsgPack(MsgPackPacket),
    #[cfg(feature = "protobuf")]
    Protobuf(Pooled<ProtobufPacket>),
}

impl Payload {
    /// Wraps an outbound binary packet.
    pub fn binary(packet_id: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self::Binary(Pooled::detached(BinaryPacket::new(packet_id, payload)))
    }

    /// Wraps an outbound protobuf message.
    #[cfg(feature = "protobuf")]
    pub fn protobuf<M: prost::Message>(packet_id: u16, message: &M) -> Self {
        Self::Protobuf(Pooled::detached(ProtobufPacket::from_message(
            packet_id, message,
        )))
    }

    pub fn packet_id(&self) -> u16 {
        match self {
            Self::Binary(p) => p.packet_id,
            Self::Json(p) | Self::MsgPack(p) => p.packet_id,
            #[cfg(feature = "protobuf")]
            Self::Protobuf(p) => p.packet_id,
        }
    }

    pub fn options(&self) -> OptionFlags {
        match self {
            Self::Binary(p) => p.options,
            Self::Json(p) | Self::MsgPack(p) => p.options,
            #[cfg(feature = "protobuf")]
            Self::Protobuf(p) => p.options,
        }
    }

    /// Short name of the wire format, for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Binary(_) => "binary",
            Self::Json(_) => "json",
            Self::MsgPack(_) => "msgpack",
            #[cfg(feature = "protobuf")]
            Self::Protobuf(_) => "protobuf",
        }
    }

    /// Returns `true` if this payload occupies a pool slot.
    pub fn is_pooled(&self) -> bool {
        match self {
            Self::Binary(p) => p.is_pooled(),
            Self::Json(_) | Self::MsgPack(_) => false,
            #[cfg(feature = "protobuf")]
            Self::Protobuf(p) => p.is_pooled(),
        }
    }

    /// Gives a pooled body back to its pool; frees anything else.
    pub fn release(self) {
        match self {
            Self::Binary(p) => p.release(),
            Self::Json(_) | Self::MsgPack(_) => {}
            #[cfg(feature = "protobuf")]
            Self::Protobuf(p) => p.release(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packetforge_pool::ObjectPool;

    #[test]
    fn test_binary_recycle_clears_but_keeps_allocation() {
        let mut packet = BinaryPacket::new(9, vec![1u8; 64]);
        packet.options = OptionFlags::empty() | OptionFlags::CHECKSUM;
        packet.recycle();
        assert_eq!(packet.packet_id, 0);
        assert_eq!(packet.options, OptionFlags::empty());
        assert!(packet.payload.is_empty());
        assert!(packet.payload.capacity() >= 64);
    }

    #[test]
    fn test_document_insert_and_get() {
        let mut packet = DocumentPacket::new(42);
        packet.insert("name", "ada").unwrap().insert("score", 7).unwrap();
        assert_eq!(packet.get::<String>("name").as_deref(), Some("ada"));
        assert_eq!(packet.get::<u32>("score"), Some(7));
        assert_eq!(packet.get::<u32>("name"), None);
        assert_eq!(packet.get::<u32>("missing"), None);
    }

    #[test]
    fn test_payload_release_returns_slot() {
        let pool = ObjectPool::new("binary", 1, BinaryPacket::default);
        let mut packet = pool.checkout().unwrap();
        packet.packet_id = 5;
        let payload = Payload::Binary(packet);
        assert!(payload.is_pooled());
        assert_eq!(payload.packet_id(), 5);
        assert_eq!(pool.available(), 0);
        payload.release();
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_detached_payload_is_not_pooled() {
        let payload = Payload::binary(1000, &b"hello"[..]);
        assert!(!payload.is_pooled());
        assert_eq!(payload.kind(), "binary");
    }

    #[cfg(feature = "protobuf")]
    #[test]
    fn test_protobuf_packet_carries_message() {
        #[derive(Clone, PartialEq, prost::Message)]
        struct Move {
            #[prost(uint32, tag = "1")]
            x: u32,
            #[prost(string, tag = "2")]
            who: String,
        }

        let msg = Move {
            x: 3,
            who: "p1".into(),
        };
        let packet = ProtobufPacket::from_message(12, &msg);
        assert_eq!(packet.message::<Move>().unwrap(), msg);
    }
}
