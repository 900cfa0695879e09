use packetforge_protocol::{
    BinaryCodec, DocumentPacket, EncryptionKey, JsonCodec, OptionFlags, PacketCodec, Payload,
    ProtocolConfig, ProtocolError, PACKETIO_ERROR_BUFFER_OVERFLOW, PACKETIO_ERROR_DATA,
};

const HELLO: [u8; 19] = [
    0xE8, 0x03, 0x00, 0x00, 0x00, 0x00, 0x0B, 0x00, b'h', b'e', b'l', b'l', b'o', b' ', b'w', b'o',
    b'r', b'l', b'd',
];

#[test]
fn test_hello_world_one_byte_at_a_time() {
    let mut codec = BinaryCodec::new(ProtocolConfig::default());
    let (last, head) = HELLO.split_last().unwrap();
    for byte in head {
        codec.add_transferred_data(&[*byte]).unwrap();
        assert!(codec.get_packet().unwrap().is_none());
    }
    codec.add_transferred_data(&[*last]).unwrap();

    let payload = codec.get_packet().unwrap().unwrap();
    assert_eq!(payload.packet_id(), 1000);
    let Payload::Binary(packet) = &payload else {
        panic!("expected a binary payload");
    };
    assert_eq!(packet.payload, b"hello world");
    assert_eq!(codec.encode(&payload).unwrap(), HELLO);
}

#[test]
fn test_declared_length_over_max_is_fatal() {
    let mut codec = BinaryCodec::new(ProtocolConfig::with_limits(1024, 100));
    // data_length = 200 > 100
    codec
        .add_transferred_data(&[1, 0, 0, 0, 0, 0, 200, 0])
        .unwrap();
    let err = codec.get_packet().unwrap_err();
    assert_eq!(err.code(), PACKETIO_ERROR_DATA);
    assert!(err.is_fatal());
}

#[test]
fn test_overflowing_chunk_is_rejected_and_recoverable() {
    let mut codec = BinaryCodec::new(ProtocolConfig::with_limits(64, 12));
    codec.add_transferred_data(&[0u8; 40]).unwrap();
    let err = codec.add_transferred_data(&[0u8; 40]).unwrap_err();
    assert_eq!(err.code(), PACKETIO_ERROR_BUFFER_OVERFLOW);
    assert!(!err.is_fatal());
    assert_eq!(codec.remaining_capacity(), 24);

    codec.reset();
    assert_eq!(codec.remaining_capacity(), 64);
    codec.add_transferred_data(&HELLO).unwrap();
    assert_eq!(codec.get_packet().unwrap().unwrap().packet_id(), 1000);
}

#[test]
fn test_unknown_option_bits_are_a_header_error() {
    let mut codec = BinaryCodec::new(ProtocolConfig::default());
    codec
        .add_transferred_data(&[1, 0, 0x80, 0, 0, 0, 0, 0])
        .unwrap();
    assert!(matches!(codec.get_packet(), Err(ProtocolError::Header(_))));
}

#[test]
fn test_many_frames_in_one_chunk_come_out_in_order() {
    let sender = BinaryCodec::new(ProtocolConfig::default());
    let mut stream = Vec::new();
    for id in 0..20u16 {
        stream.extend(sender.encode(&Payload::binary(id, vec![id as u8; id as usize])).unwrap());
    }

    let mut receiver = sender.fresh();
    receiver.add_transferred_data(&stream).unwrap();
    let mut ids = Vec::new();
    while let Some(payload) = receiver.get_packet().unwrap() {
        ids.push(payload.packet_id());
        receiver.dispose_packet(payload);
    }
    assert_eq!(ids, (0..20).collect::<Vec<_>>());
    assert_eq!(sender.pool().outstanding(), 0);
}

#[test]
fn test_json_with_checksum_detects_tampering() {
    let config = ProtocolConfig::default().with_options(OptionFlags::empty() | OptionFlags::CHECKSUM);
    let mut codec = JsonCodec::new(config);
    let mut packet = DocumentPacket::new(77);
    packet.insert("gold", 100).unwrap();
    let mut frame = codec.encode(&Payload::Json(packet)).unwrap();

    // `{"gold":100}` → `{"gold":900}`
    let at = 12 + frame[12..].iter().position(|b| *b == b'1').unwrap();
    frame[at] = b'9';
    codec.add_transferred_data(&frame).unwrap();
    assert!(matches!(
        codec.get_packet(),
        Err(ProtocolError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_initialize_changes_limits() {
    let mut codec = BinaryCodec::new(ProtocolConfig::default());
    codec.initialize(2048, 1000);
    assert_eq!(codec.config().io_buffer_size, 2048);
    assert_eq!(codec.config().max_packet_size, 1000);
    let too_big = Payload::binary(1, vec![0u8; 1001]);
    assert!(matches!(
        codec.encode(&too_big),
        Err(ProtocolError::PayloadTooLarge { len: 1001, max: 1000 })
    ));
}

#[test]
fn test_largest_frame_exactly_fills_io_buffer() {
    let config = ProtocolConfig::with_limits(1024, 4096).with_key(EncryptionKey::new([3; 32]));
    let mut codec = BinaryCodec::new(config);
    let max = codec.config().max_packet_size;
    let body: Vec<u8> = (0..max).map(|i| (i * 7 % 256) as u8).collect();

    let mut packet = Payload::binary(11, body.clone());
    if let Payload::Binary(p) = &mut packet {
        p.options = OptionFlags::empty() | OptionFlags::CHECKSUM | OptionFlags::ENCRYPT;
    }
    let frame = codec.encode(&packet).unwrap();
    assert_eq!(frame.len(), 1024);

    codec.add_transferred_data(&frame).unwrap();
    assert_eq!(codec.remaining_capacity(), 0);
    let Payload::Binary(decoded) = codec.get_packet().unwrap().unwrap() else {
        panic!("expected a binary payload");
    };
    assert_eq!(decoded.packet_id, 11);
    assert_eq!(decoded.payload, body);
    assert_eq!(codec.remaining_capacity(), 1024);
}

#[test]
fn test_checksum_frame_at_packet_size_limit_fits() {
    let mut codec = BinaryCodec::new(ProtocolConfig::with_limits(1024, 4096));
    let max = codec.config().max_packet_size;
    let mut packet = Payload::binary(12, vec![0xA5; max]);
    if let Payload::Binary(p) = &mut packet {
        p.options = OptionFlags::empty() | OptionFlags::CHECKSUM;
    }
    let frame = codec.encode(&packet).unwrap();
    assert_eq!(frame.len(), max + 12);

    codec.add_transferred_data(&frame).unwrap();
    let decoded = codec.get_packet().unwrap().unwrap();
    assert_eq!(decoded.packet_id(), 12);
}
