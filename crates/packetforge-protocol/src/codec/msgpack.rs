//! MessagePack wire format: the payload is a map with string keys.

use super::{Framing, PacketCodec};
use crate::packet::{Document, DocumentPacket, Payload};
use crate::{ProtocolConfig, ProtocolError};

/// Decodes frames into [`DocumentPacket`]s from MessagePack maps.
///
/// Same document model as [`JsonCodec`](super::JsonCodec), smaller on
/// the wire. Not pooled.
#[derive(Debug)]
pub struct MsgPackCodec {
    framing: Framing,
}

impl MsgPackCodec {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            framing: Framing::new(config),
        }
    }
}

impl PacketCodec for MsgPackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
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
        let Some((header, data)) = self.framing.next_decoded()? else {
            return Ok(None);
        };
        let document: Document = rmp_serde::from_slice(&data).map_err(ProtocolError::MsgPackDecode)?;
        tracing::trace!(
            packet_id = header.packet_id,
            keys = document.len(),
            "msgpack packet decoded"
        );
        Ok(Some(Payload::MsgPack(DocumentPacket {
            packet_id: header.packet_id,
            options: header.options,
            document,
        })))
    }

    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, ProtocolError> {
        let Payload::MsgPack(packet) = payload else {
            return Err(ProtocolError::UnsupportedPayload {
                codec: self.name(),
                payload: payload.kind(),
            });
        };
        let body = rmp_serde::to_vec_named(&packet.document).map_err(ProtocolError::MsgPackEncode)?;
        self.framing.encode(packet.packet_id, packet.options, &body)
    }

    fn reset(&mut self) {
        self.framing.reset();
    }

    fn fresh(&self) -> Box<dyn PacketCodec> {
        Box::new(Self {
            framing: self.framing.fresh(),
        })
    }
}
