//! Property-based tests for framing, masking, compression and handshake parsing.

use proptest::prelude::*;
use wsserve::Error;
use wsserve::Role;
use wsserve::extensions::deflate::{DeflateExtension, DeflateParams};
use wsserve::protocol::{Frame, HandshakeRequest, OpCode, apply_mask};

const NO_LIMIT: u64 = 1 << 40;
const MAX_DECOMPRESSED: usize = 64 * 1024 * 1024;

fn data_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![Just(OpCode::Text), Just(OpCode::Binary)]
}

fn control_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![Just(OpCode::Close), Just(OpCode::Ping), Just(OpCode::Pong)]
}

/// Cheap deterministic filler so large payloads do not dominate generation time.
fn filler(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) ^ (i >> 8) as u8)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // =========================================================================
    // decode(encode(frame)) == frame for server frames up to 1 MiB
    // =========================================================================
    #[test]
    fn test_roundtrip_unmasked(
        opcode in data_opcode_strategy(),
        len in 0usize..=(1 << 20),
        seed in any::<u8>()
    ) {
        let payload = filler(len, seed);
        let frame = Frame::new(true, opcode, payload.clone());
        let encoded = frame.encode(None);
        prop_assert_eq!(encoded.len(), frame.wire_size(false));

        let (decoded, consumed) = Frame::decode(&encoded, NO_LIMIT).unwrap();
        prop_assert_eq!(consumed, encoded.len());
        prop_assert!(decoded.fin);
        prop_assert!(!decoded.is_masked());
        prop_assert_eq!(decoded.opcode, opcode);
        prop_assert_eq!(decoded.payload(), payload.as_slice());
    }
}

proptest! {
    #[test]
    fn test_roundtrip_masked(
        fin in any::<bool>(),
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..500),
        mask in any::<[u8; 4]>()
    ) {
        let frame = Frame::new(fin, opcode, payload.clone());
        let encoded = frame.encode(Some(mask));

        let (decoded, _) = Frame::decode(&encoded, NO_LIMIT).unwrap();
        prop_assert_eq!(decoded.mask, Some(mask));
        prop_assert_eq!(decoded.fin, fin);
        prop_assert_eq!(decoded.payload(), payload.as_slice());
    }

    // =========================================================================
    // Masking is an involution
    // =========================================================================
    #[test]
    fn test_mask_reversible(
        data in prop::collection::vec(any::<u8>(), 0..1000),
        mask in any::<[u8; 4]>()
    ) {
        let mut masked = data.clone();
        apply_mask(&mut masked, mask);
        apply_mask(&mut masked, mask);
        prop_assert_eq!(masked, data);
    }

    // =========================================================================
    // Feeding a frame byte by byte matches feeding it at once
    // =========================================================================
    #[test]
    fn test_byte_by_byte_decode(
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..300),
        mask in prop::option::of(any::<[u8; 4]>())
    ) {
        let encoded = Frame::new(true, opcode, payload).encode(mask);
        let whole = Frame::decode(&encoded, NO_LIMIT).unwrap();

        for end in 0..encoded.len() {
            let partial = Frame::decode(&encoded[..end], NO_LIMIT);
            prop_assert!(
                matches!(partial, Err(Error::IncompleteFrame { .. })),
                "prefix of {} bytes gave {:?}", end, partial
            );
        }
        prop_assert_eq!(Frame::decode(&encoded, NO_LIMIT).unwrap(), whole);
    }

    #[test]
    fn test_control_frame_size_limit(
        opcode in control_opcode_strategy(),
        len in 126usize..1000
    ) {
        let encoded = Frame::new(true, opcode, vec![0; len]).encode(None);
        prop_assert_eq!(
            Frame::decode(&encoded, NO_LIMIT),
            Err(Error::ControlFrameTooLarge(126))
        );
    }

    #[test]
    fn test_oversized_length_rejected(len in ((1u64 << 20) + 1)..(1u64 << 63)) {
        let mut header = vec![0x82, 0x7F];
        header.extend_from_slice(&len.to_be_bytes());
        let result = Frame::decode(&header, 1 << 20);
        prop_assert!(
            matches!(result, Err(Error::FrameTooLarge { size, .. }) if size == len),
            "got {:?}", result
        );
    }

    #[test]
    fn test_sequential_frames(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 1..5)
    ) {
        let mut buf = Vec::new();
        for payload in &payloads {
            buf.extend_from_slice(&Frame::binary(payload.clone()).encode(None));
        }

        let mut offset = 0;
        for payload in &payloads {
            let (frame, consumed) = Frame::decode(&buf[offset..], NO_LIMIT).unwrap();
            prop_assert_eq!(frame.payload(), payload.as_slice());
            offset += consumed;
        }
        prop_assert_eq!(offset, buf.len());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // =========================================================================
    // decompress(compress(payload)) == payload, across output buffer sizes
    // =========================================================================
    #[test]
    fn test_compression_roundtrip(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..70_000), 1..4)
    ) {
        let params = DeflateParams::default();
        let mut server = DeflateExtension::new(Role::Server, &params, 6, MAX_DECOMPRESSED);
        let mut client = DeflateExtension::new(Role::Client, &params, 6, MAX_DECOMPRESSED);

        for payload in &payloads {
            let compressed = server.compress(payload).unwrap();
            prop_assert_eq!(&client.decompress(&compressed).unwrap(), payload);
        }
    }

    #[test]
    fn test_compression_roundtrip_repetitive(len in 0usize..300_000, byte in any::<u8>()) {
        let params = DeflateParams::default();
        let mut server = DeflateExtension::new(Role::Server, &params, 6, MAX_DECOMPRESSED);
        let mut client = DeflateExtension::new(Role::Client, &params, 6, MAX_DECOMPRESSED);

        let payload = vec![byte; len];
        let compressed = server.compress(&payload).unwrap();
        prop_assert_eq!(client.decompress(&compressed).unwrap(), payload);
    }
}

proptest! {
    #[test]
    fn test_handshake_parse_no_panic(data in prop::collection::vec(any::<u8>(), 0..2000)) {
        let _ = HandshakeRequest::parse(&data);
    }

    #[test]
    fn test_handshake_valid_variations(
        path in "/[a-z]{1,20}",
        host in "[a-z]{3,10}\\.[a-z]{2,4}"
    ) {
        let request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n"
        );

        let parsed = HandshakeRequest::parse(request.as_bytes()).unwrap();
        prop_assert_eq!(&parsed.path, &path);
        prop_assert_eq!(&parsed.host, &host);
        prop_assert!(parsed.validate().is_ok());
    }
}
