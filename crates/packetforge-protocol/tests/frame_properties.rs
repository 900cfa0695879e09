use packetforge_protocol::{
    BinaryCodec, EncryptionKey, OptionFlags, PacketCodec, Payload, ProtocolConfig, ProtocolError,
    TransferBuffer, DEFAULT_PACKET_SIZE,
};
use proptest::prelude::*;

const KEY: [u8; 32] = [0x42; 32];

fn codec() -> BinaryCodec {
    BinaryCodec::new(ProtocolConfig::default().with_key(EncryptionKey::new(KEY)))
}

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..2000),
        // Long runs so the compressor actually kicks in.
        (any::<u8>(), 0usize..3000).prop_map(|(b, n)| vec![b; n]),
    ]
}

/// Payloads of exactly the maximum size and one byte less.
fn limit_payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), DEFAULT_PACKET_SIZE - 1..=DEFAULT_PACKET_SIZE),
        (any::<u8>(), DEFAULT_PACKET_SIZE - 1..=DEFAULT_PACKET_SIZE).prop_map(|(b, n)| vec![b; n]),
    ]
}

fn flags(checksum: bool, digest: bool, compress: bool, encrypt: bool) -> OptionFlags {
    let mut flags = OptionFlags::empty();
    if checksum {
        flags = flags | OptionFlags::CHECKSUM;
        if digest {
            flags = flags | OptionFlags::CHECKSUM_DIGEST;
        }
    }
    if compress {
        flags = flags | OptionFlags::COMPRESS;
    }
    if encrypt {
        flags = flags | OptionFlags::ENCRYPT;
    }
    flags
}

fn flags_strategy() -> impl Strategy<Value = OptionFlags> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>())
        .prop_map(|(checksum, digest, compress, encrypt)| flags(checksum, digest, compress, encrypt))
}

fn every_flag_combination() -> Vec<OptionFlags> {
    (0..16u8)
        .map(|bits| flags(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, bits & 8 != 0))
        .collect()
}

fn outbound(packet_id: u16, options: OptionFlags, payload: &[u8]) -> Payload {
    let mut payload = Payload::binary(packet_id, payload);
    if let Payload::Binary(packet) = &mut payload {
        packet.options = options;
    }
    payload
}

fn decoded_parts(payload: &Payload) -> (u16, Vec<u8>) {
    match payload {
        Payload::Binary(packet) => (packet.packet_id, packet.payload.clone()),
        other => panic!("unexpected {} payload", other.kind()),
    }
}

#[test]
fn test_roundtrip_at_packet_size_limit_for_every_flag_combination() {
    let noise: Vec<u8> = (0..DEFAULT_PACKET_SIZE as u32)
        .map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8)
        .collect();
    for options in every_flag_combination() {
        for len in [DEFAULT_PACKET_SIZE - 1, DEFAULT_PACKET_SIZE] {
            for body in [noise[..len].to_vec(), vec![0x5A; len]] {
                let mut codec = codec();
                let frame = codec
                    .encode(&outbound(7, options, &body))
                    .unwrap_or_else(|e| panic!("encode {options} len {len}: {e}"));
                codec.add_transferred_data(&frame).unwrap();
                let decoded = codec.get_packet().unwrap().unwrap();
                assert_eq!(decoded_parts(&decoded), (7, body), "options {options} len {len}");
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_prop_roundtrip_every_flag_combination(
        packet_id in any::<u16>(),
        options in flags_strategy(),
        body in payload_strategy(),
    ) {
        let mut codec = codec();
        let frame = codec.encode(&outbound(packet_id, options, &body)).unwrap();
        codec.add_transferred_data(&frame).unwrap();
        let decoded = codec.get_packet().unwrap().unwrap();
        prop_assert_eq!(decoded_parts(&decoded), (packet_id, body));
        prop_assert!(codec.get_packet().unwrap().is_none());
    }

    #[test]
    fn test_prop_partial_delivery_matches_single_delivery(
        packet_id in any::<u16>(),
        options in flags_strategy(),
        body in payload_strategy(),
        chunk in 1usize..64,
    ) {
        let sender = codec();
        let frame = sender.encode(&outbound(packet_id, options, &body)).unwrap();

        let mut whole = sender.fresh();
        whole.add_transferred_data(&frame).unwrap();
        let expected = whole.get_packet().unwrap().unwrap();

        let mut pieces = sender.fresh();
        let mut got = None;
        for piece in frame.chunks(chunk) {
            prop_assert!(got.is_none());
            pieces.add_transferred_data(piece).unwrap();
            got = pieces.get_packet().unwrap();
        }
        let got = got.unwrap();
        prop_assert_eq!(decoded_parts(&got), decoded_parts(&expected));
    }

    #[test]
    fn test_prop_roundtrip_at_packet_size_limit(
        options in flags_strategy(),
        body in limit_payload_strategy(),
    ) {
        let mut codec = codec();
        let frame = codec.encode(&outbound(3, options, &body)).unwrap();
        codec.add_transferred_data(&frame).unwrap();
        let decoded = codec.get_packet().unwrap().unwrap();
        prop_assert_eq!(decoded_parts(&decoded), (3, body));
    }

    #[test]
    fn test_prop_buffer_never_exceeds_capacity(
        capacity in 16usize..256,
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..32),
    ) {
        let mut buf = TransferBuffer::new(capacity, 8);
        for chunk in &chunks {
            let before = buf.len();
            match buf.append(chunk) {
                Ok(()) => prop_assert_eq!(buf.len(), before + chunk.len()),
                Err(ProtocolError::BufferOverflow { .. }) => {
                    prop_assert!(before + chunk.len() > capacity);
                    prop_assert_eq!(buf.len(), before);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
            prop_assert!(buf.len() <= capacity);
        }
    }

    #[test]
    fn test_prop_flipped_byte_is_caught_only_with_checksum(
        body in prop::collection::vec(any::<u8>(), 1..512),
        index in any::<prop::sample::Index>(),
        with_checksum in any::<bool>(),
    ) {
        let options = if with_checksum {
            OptionFlags::empty() | OptionFlags::CHECKSUM
        } else {
            OptionFlags::empty()
        };
        let mut codec = codec();
        let mut frame = codec.encode(&outbound(9, options, &body)).unwrap();
        let header_len = options.header_len();
        let at = header_len + index.index(body.len());
        frame[at] ^= 0xFF;

        codec.add_transferred_data(&frame).unwrap();
        let result = codec.get_packet();
        if with_checksum {
            let is_mismatch = matches!(result, Err(ProtocolError::ChecksumMismatch { .. }));
            prop_assert!(is_mismatch);
        } else {
            let (_, decoded) = decoded_parts(&result.unwrap().unwrap());
            prop_assert_ne!(decoded, body);
        }
    }
}
