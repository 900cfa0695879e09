//! Protocol Buffers wire format: the payload is one encoded message,
//! whose type is selected by the packet id.

use std::collections::HashMap;
use std::sync::Arc;

use packetforge_pool::ObjectPool;

use super::{Framing, PacketCodec};
use crate::packet::{Payload, ProtobufPacket};
use crate::{ProtocolConfig, ProtocolError};

type Validator = fn(&[u8]) -> Result<(), prost::DecodeError>;

fn validate<M: prost::Message + Default>(bytes: &[u8]) -> Result<(), prost::DecodeError> {
    M::decode(bytes).map(drop)
}

/// Decodes frames into pooled [`ProtobufPacket`]s.
///
/// Every packet id the server accepts must be registered with its
/// message type. An inbound frame with an unregistered id, or whose body
/// does not parse as the registered type, is a data error.
///
/// ```ignore
/// let codec = ProtobufCodec::new(config)
///     .register::<Login>(1)
///     .register::<Move>(2);
/// ```
pub struct ProtobufCodec {
    framing: Framing,
    pool: ObjectPool<ProtobufPacket>,
    registry: Arc<HashMap<u16, Validator>>,
}

impl ProtobufCodec {
    pub fn new(config: ProtocolConfig) -> Self {
        let framing = Framing::new(config);
        let capacity = framing.config().pool_capacity;
        let pool = ObjectPool::new("protobuf", capacity, ProtobufPacket::default);
        Self {
            framing,
            pool,
            registry: Arc::default(),
        }
    }

    /// Associates `packet_id` with message type `M`.
    pub fn register<M: prost::Message + Default>(mut self, packet_id: u16) -> Self {
        Arc::make_mut(&mut self.registry).insert(packet_id, validate::<M>);
        self
    }

    pub fn is_registered(&self, packet_id: u16) -> bool {
        self.registry.contains_key(&packet_id)
    }

    pub fn pool(&self) -> &ObjectPool<ProtobufPacket> {
        &self.pool
    }
}

impl std::fmt::Debug for ProtobufCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.registry.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("ProtobufCodec")
            .field("framing", &self.framing)
            .field("pool", &self.pool)
            .field("registered", &ids)
            .finish()
    }
}

impl PacketCodec for ProtobufCodec {
    fn name(&self) -> &'static str {
        "protobuf"
    }

    fn config(&self) -> &ProtocolConfig {
        self.framing.config()
    }

    fn initialize(&mut self, io_buffer_size: usize, max_packet_size: usize) {
        self.framing.initialize(io_buffer_size, max_packet_size);
    }

    fn add_transferred_data(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.framing.append(data)
    }

    fn remaining_capacity(&self) -> usize {
        self.framing.remaining()
    }

    fn get_packet(&mut self) -> Result<Option<Payload>, ProtocolError> {
        if !self.framing.has_frame()? {
            return Ok(None);
        }
        let mut packet = self.pool.checkout()?;
        let Some((header, data)) = self.framing.next_decoded()? else {
            return Ok(None);
        };
        let validator = self
            .registry
            .get(&header.packet_id)
            .ok_or(ProtocolError::UnknownPacketId(header.packet_id))?;
        validator(&data).map_err(ProtocolError::ProtobufDecode)?;

        packet.packet_id = header.packet_id;
        packet.options = header.options;
        packet.body.extend_from_slice(&data);
        tracing::trace!(
            packet_id = header.packet_id,
            len = packet.body.len(),
            "protobuf packet decoded"
        );
        Ok(Some(Payload::Protobuf(packet)))
    }

    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, ProtocolError> {
        let Payload::Protobuf(packet) = payload else {
            return Err(ProtocolError::UnsupportedPayload {
                codec: self.name(),
                payload: payload.kind(),
            });
        };
        self.framing.encode(packet.packet_id, packet.options, &packet.body)
    }

    fn reset(&mut self) {
        self.framing.reset();
    }

    fn fresh(&self) -> Box<dyn PacketCodec> {
        Box::new(Self {
            framing: self.framing.fresh(),
            pool: self.pool.clone(),
            registry: Arc::clone(&self.registry),
        })
    }
}
