//! The proprietary binary format: the payload is opaque bytes.

use packetforge_pool::ObjectPool;

use super::{Framing, PacketCodec};
use crate::packet::{BinaryPacket, Payload};
use crate::{ProtocolConfig, ProtocolError};

/// Decodes frames into pooled [`BinaryPacket`]s.
///
/// The pool is shared by every instance made with [`fresh`](PacketCodec::fresh),
/// so its capacity bounds the packets in flight across all connections.
#[derive(Debug)]
pub struct BinaryCodec {
    framing: Framing,
    pool: ObjectPool<BinaryPacket>,
}

impl BinaryCodec {
    /// Creates a codec with its own pool of `config.pool_capacity` packets.
    pub fn new(config: ProtocolConfig) -> Self {
        let framing = Framing::new(config);
        let capacity = framing.config().pool_capacity;
        let max = framing.config().max_packet_size;
        let pool = ObjectPool::new("binary", capacity, || BinaryPacket {
            payload: Vec::with_capacity(max),
            ..Default::default()
        });
        Self { framing, pool }
    }

    /// Creates a codec that draws from an existing pool.
    pub fn with_pool(config: ProtocolConfig, pool: ObjectPool<BinaryPacket>) -> Self {
        Self {
            framing: Framing::new(config),
            pool,
        }
    }

    pub fn pool(&self) -> &ObjectPool<BinaryPacket> {
        &self.pool
    }
}

impl PacketCodec for BinaryCodec {
    fn name(&self) -> &'static str {
        "binary"
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
        // Check out before consuming the frame: if the pool is empty the
        // frame stays buffered and the caller can retry later.
        let mut packet = self.pool.checkout()?;
        let Some((header, data)) = self.framing.next_decoded()? else {
            return Ok(None);
        };
        packet.packet_id = header.packet_id;
        packet.options = header.options;
        packet.payload.extend_from_slice(&data);
        tracing::trace!(
            packet_id = header.packet_id,
            len = packet.payload.len(),
            "binary packet decoded"
        );
        Ok(Some(Payload::Binary(packet)))
    }

    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, ProtocolError> {
        match payload {
            Payload::Binary(packet) => {
                self.framing
                    .encode(packet.packet_id, packet.options, &packet.payload)
            }
            other => Err(ProtocolError::UnsupportedPayload {
                codec: self.name(),
                payload: other.kind(),
            }),
        }
    }

    fn reset(&mut self) {
        self.framing.reset();
    }

    fn fresh(&self) -> Box<dyn PacketCodec> {
        Box::new(Self {
            framing: self.framing.fresh(),
            pool: self.pool.clone(),
        })
    }
}
