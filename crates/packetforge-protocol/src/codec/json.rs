//! JSON wire format: the payload is a UTF-8 JSON object.

use super::{Framing, PacketCodec};
use crate::packet::{Document, DocumentPacket, Payload};
use crate::{ProtocolConfig, ProtocolError};

/// Decodes frames into [`DocumentPacket`]s holding a parsed JSON object.
///
/// JSON packets are not pooled; each decode allocates a fresh document.
#[derive(Debug)]
pub struct JsonCodec {
    framing: Framing,
}

impl JsonCodec {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            framing: Framing::new(config),
        }
    }
}

impl PacketCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
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
        let document: Document = serde_json::from_slice(&data).map_err(ProtocolError::JsonDecode)?;
        tracing::trace!(
            packet_id = header.packet_id,
            keys = document.len(),
            "json packet decoded"
        );
        Ok(Some(Payload::Json(DocumentPacket {
            packet_id: header.packet_id,
            options: header.options,
            document,
        })))
    }

    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, ProtocolError> {
        let Payload::Json(packet) = payload else {
            return Err(ProtocolError::UnsupportedPayload {
                codec: self.name(),
                payload: payload.kind(),
            });
        };
        let body = serde_json::to_vec(&packet.document).map_err(ProtocolError::JsonEncode)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::OptionFlags;

    fn login(id: u16) -> Payload {
        let mut packet = DocumentPacket::new(id);
        packet
            .insert("user", "ada")
            .unwrap()
            .insert("level", 12)
            .unwrap()
            .insert("tags", ["a", "b"])
            .unwrap();
        Payload::Json(packet)
    }

    #[test]
    fn test_document_survives_the_wire() {
        let mut codec = JsonCodec::new(ProtocolConfig::default());
        let sent = login(2001);
        let frame = codec.encode(&sent).unwrap();
        codec.add_transferred_data(&frame).unwrap();
        let received = codec.get_packet().unwrap().unwrap();
        assert_eq!(received, sent);
    }

    #[test]
    fn test_payload_is_plain_json() {
        let codec = JsonCodec::new(ProtocolConfig::default());
        let mut packet = DocumentPacket::new(1);
        packet.insert("k", 1).unwrap();
        let frame = codec.encode(&Payload::Json(packet)).unwrap();
        assert_eq!(&frame[8..], br#"{"k":1}"#);
    }

    #[test]
    fn test_non_object_payload_is_a_data_error() {
        let mut codec = JsonCodec::new(ProtocolConfig::default());
        let mut frame = vec![5, 0, 0, 0, 0, 0, 3, 0];
        frame.extend_from_slice(b"[1]");
        codec.add_transferred_data(&frame).unwrap();
        let err = codec.get_packet().unwrap_err();
        assert!(matches!(err, ProtocolError::JsonDecode(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_compressed_documents_roundtrip() {
        let config = ProtocolConfig::default().with_options(OptionFlags::empty() | OptionFlags::COMPRESS);
        let mut codec = JsonCodec::new(config);
        let mut packet = DocumentPacket::new(9);
        packet.insert("blob", "x".repeat(3000)).unwrap();
        let sent = Payload::Json(packet);

        let frame = codec.encode(&sent).unwrap();
        assert!(frame.len() < 3000);
        codec.add_transferred_data(&frame).unwrap();
        let Payload::Json(received) = codec.get_packet().unwrap().unwrap() else {
            panic!("expected a json payload");
        };
        assert!(received.options.contains(OptionFlags::COMPRESS));
        assert_eq!(received.get::<String>("blob").map(|s| s.len()), Some(3000));
    }
}
