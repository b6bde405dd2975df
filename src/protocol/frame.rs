//! WebSocket frame decoding and encoding (RFC 6455 Section 5.2).
//!
//! Both directions are pure functions over byte slices. Decoding never
//! consumes input it cannot fully interpret: when the buffer holds only part
//! of a frame it returns [`Error::IncompleteFrame`] and can be called again
//! with the same prefix once more bytes arrive.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask;

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Largest possible header: 2 + 8 (extended length) + 4 (mask key).
pub const MAX_HEADER_LEN: usize = 14;

const FIN_BIT: u8 = 0x80;
const RSV1_BIT: u8 = 0x40;
const RSV2_BIT: u8 = 0x20;
const RSV3_BIT: u8 = 0x10;
const MASK_BIT: u8 = 0x80;

/// A decoded frame header.
///
/// Parsing the header alone lets the caller reject a frame (bad opcode,
/// oversized length, masking violation) before its payload is buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1 (permessage-deflate "compressed" flag).
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key, present iff the MASK bit is set.
    pub mask: Option<[u8; 4]>,
    /// Payload length in bytes, already checked against `max_payload`.
    pub payload_len: u64,
    /// Number of header bytes preceding the payload.
    pub header_len: usize,
}

impl FrameHeader {
    /// Parse a frame header from the front of `buf`.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if the header is not fully buffered yet
    /// - `Error::ReservedOpcode` for opcodes 0x3-0x7 and 0xB-0xF
    /// - `Error::FragmentedControlFrame` for a control frame with FIN=0
    /// - `Error::ControlFrameTooLarge` for a control payload over 125 bytes
    /// - `Error::ProtocolViolation` if a 64-bit length has its high bit set
    /// - `Error::FrameTooLarge` if the length exceeds `max_payload`
    pub fn parse(buf: &[u8], max_payload: u64) -> Result<Self> {
        if buf.len() < 2 {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        }

        let byte0 = buf[0];
        let byte1 = buf[1];
        let fin = byte0 & FIN_BIT != 0;
        let opcode = OpCode::from_u8(byte0)?;
        let masked = byte1 & MASK_BIT != 0;
        let base_len = byte1 & 0x7F;

        if opcode.is_control() {
            if !fin {
                return Err(Error::FragmentedControlFrame);
            }
            if usize::from(base_len) > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(usize::from(base_len)));
            }
        }

        let (payload_len, len_end) = match base_len {
            0..=125 => (u64::from(base_len), 2),
            126 => {
                if buf.len() < 4 {
                    return Err(Error::IncompleteFrame {
                        needed: 4 - buf.len(),
                    });
                }
                (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4)
            }
            _ => {
                if buf.len() < 10 {
                    return Err(Error::IncompleteFrame {
                        needed: 10 - buf.len(),
                    });
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                let len = u64::from_be_bytes(raw);
                if len & (1 << 63) != 0 {
                    return Err(Error::ProtocolViolation(
                        "64-bit payload length has the most significant bit set".into(),
                    ));
                }
                (len, 10)
            }
        };

        if payload_len > max_payload {
            return Err(Error::FrameTooLarge {
                size: payload_len,
                max: max_payload,
            });
        }

        let header_len = if masked { len_end + 4 } else { len_end };
        if buf.len() < header_len {
            return Err(Error::IncompleteFrame {
                needed: header_len - buf.len(),
            });
        }

        let mask = masked.then(|| [buf[len_end], buf[len_end + 1], buf[len_end + 2], buf[len_end + 3]]);

        Ok(Self {
            fin,
            rsv1: byte0 & RSV1_BIT != 0,
            rsv2: byte0 & RSV2_BIT != 0,
            rsv3: byte0 & RSV3_BIT != 0,
            opcode,
            mask,
            payload_len,
            header_len,
        })
    }

    /// Total encoded size of the frame this header introduces.
    #[must_use]
    pub fn frame_len(&self) -> u64 {
        self.header_len as u64 + self.payload_len
    }
}

/// A WebSocket frame as defined in RFC 6455.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                 Masking key (if MASK is set)                  |
/// +---------------------------------------------------------------+
/// |                          Payload data                         |
/// +---------------------------------------------------------------+
/// ```
///
/// The payload is always stored unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag. True if this is the last fragment of a message.
    pub fin: bool,
    /// Reserved bit 1. Must be 0 unless an extension claims it.
    pub rsv1: bool,
    /// Reserved bit 2. Must be 0 unless an extension claims it.
    pub rsv2: bool,
    /// Reserved bit 3. Must be 0 unless an extension claims it.
    pub rsv3: bool,
    /// Frame opcode defining the interpretation of payload data.
    pub opcode: OpCode,
    /// Masking key the frame arrived with, if it was masked.
    pub mask: Option<[u8; 4]>,
    payload: Vec<u8>,
}

impl Frame {
    /// Create an unmasked frame with all reserved bits clear.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            payload,
        }
    }

    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    /// Create a final binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
    }

    /// Create a close frame from an already encoded close payload.
    #[must_use]
    pub fn close(payload: Vec<u8>) -> Self {
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    /// Returns `true` if the frame arrived masked.
    #[inline]
    #[must_use]
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Get the (unmasked) payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns the frame and the exact number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if `buf` holds only part of the frame
    /// - any header error from [`FrameHeader::parse`]
    pub fn decode(buf: &[u8], max_payload: u64) -> Result<(Self, usize)> {
        let header = FrameHeader::parse(buf, max_payload)?;
        Self::decode_with_header(buf, &header)
    }

    /// Decode the payload following an already parsed `header`.
    ///
    /// # Errors
    ///
    /// Returns `Error::IncompleteFrame` if the payload is not fully buffered.
    pub fn decode_with_header(buf: &[u8], header: &FrameHeader) -> Result<(Self, usize)> {
        // `payload_len` was bounded by `max_payload` during header parsing.
        let payload_len = usize::try_from(header.payload_len).map_err(|_| Error::FrameTooLarge {
            size: header.payload_len,
            max: usize::MAX as u64,
        })?;
        let total = header
            .header_len
            .checked_add(payload_len)
            .ok_or(Error::FrameTooLarge {
                size: header.payload_len,
                max: (usize::MAX - header.header_len) as u64,
            })?;

        if buf.len() < total {
            return Err(Error::IncompleteFrame {
                needed: total - buf.len(),
            });
        }

        let mut payload = buf[header.header_len..total].to_vec();
        if let Some(key) = header.mask {
            apply_mask(&mut payload, key);
        }

        let frame = Frame {
            fin: header.fin,
            rsv1: header.rsv1,
            rsv2: header.rsv2,
            rsv3: header.rsv3,
            opcode: header.opcode,
            mask: header.mask,
            payload,
        };
        Ok((frame, total))
    }

    /// Check the control-frame rules before sending.
    ///
    /// # Errors
    ///
    /// - `Error::FragmentedControlFrame` if a control frame has FIN=0
    /// - `Error::ControlFrameTooLarge` if a control payload exceeds 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len()));
            }
        }
        Ok(())
    }

    /// Exact encoded size of this frame.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let payload_len = self.payload.len();
        let extended_len_size = if payload_len <= 125 {
            0
        } else if payload_len <= usize::from(u16::MAX) {
            2
        } else {
            8
        };
        let mask_size = if masked { 4 } else { 0 };
        2 + extended_len_size + mask_size + payload_len
    }

    /// Append the encoded frame to `dst`.
    ///
    /// Uses the shortest length encoding. When `mask` is given the MASK bit
    /// is set and the payload is XORed with the key on the way out.
    pub fn encode_into(&self, dst: &mut BytesMut, mask: Option<[u8; 4]>) {
        dst.reserve(self.wire_size(mask.is_some()));

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= FIN_BIT;
        }
        if self.rsv1 {
            byte0 |= RSV1_BIT;
        }
        if self.rsv2 {
            byte0 |= RSV2_BIT;
        }
        if self.rsv3 {
            byte0 |= RSV3_BIT;
        }
        dst.put_u8(byte0);

        let mask_bit = if mask.is_some() { MASK_BIT } else { 0 };
        let len = self.payload.len();
        if len <= 125 {
            dst.put_u8(mask_bit | len as u8);
        } else if let Ok(len16) = u16::try_from(len) {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        match mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask(&mut dst[start..], key);
            }
            None => dst.put_slice(&self.payload),
        }
    }

    /// Encode the frame into a buffer sized exactly to the frame.
    #[must_use]
    pub fn encode(&self, mask: Option<[u8; 4]>) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.wire_size(mask.is_some()));
        self.encode_into(&mut buf, mask);
        buf.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_LIMIT: u64 = 1 << 40;

    #[test]
    fn test_decode_unmasked_text_frame() {
        // FIN=1, opcode=1 (text), unmasked, payload="Hello"
        let data = &[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
        let (frame, len) = Frame::decode(data, NO_LIMIT).unwrap();
        assert_eq!(len, 7);
        assert!(frame.fin);
        assert!(!frame.rsv1);
        assert!(!frame.is_masked());
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_decode_masked_text_frame() {
        // RFC 6455 section 5.7 example
        let data = &[
            0x81, 0x85, // FIN + Text, MASK + len=5
            0x37, 0xfa, 0x21, 0x3d, // Mask key
            0x7f, 0x9f, 0x4d, 0x51, 0x58, // Masked "Hello"
        ];
        let (frame, len) = Frame::decode(data, NO_LIMIT).unwrap();
        assert_eq!(len, 11);
        assert_eq!(frame.mask, Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_decode_close_frame() {
        let data = &[0x88, 0x02, 0x03, 0xe8];
        let (frame, len) = Frame::decode(data, NO_LIMIT).unwrap();
        assert_eq!(len, 4);
        assert_eq!(frame.opcode, OpCode::Close);
        assert_eq!(frame.payload(), &[0x03, 0xe8]);
    }

    #[test]
    fn test_decode_fragment_and_continuation() {
        let (first, _) = Frame::decode(&[0x01, 0x03, b'H', b'e', b'l'], NO_LIMIT).unwrap();
        assert!(!first.fin);
        assert_eq!(first.opcode, OpCode::Text);

        let (last, _) = Frame::decode(&[0x80, 0x02, b'l', b'o'], NO_LIMIT).unwrap();
        assert!(last.fin);
        assert_eq!(last.opcode, OpCode::Continuation);
    }

    #[test]
    fn test_decode_extended_length_16() {
        let mut data = vec![0x82, 0x7e, 0x01, 0x00];
        data.extend(vec![0xab; 256]);

        let (frame, len) = Frame::decode(&data, NO_LIMIT).unwrap();
        assert_eq!(len, 4 + 256);
        assert_eq!(frame.payload().len(), 256);
    }

    #[test]
    fn test_decode_extended_length_64() {
        let mut data = vec![0x82, 0x7f];
        data.extend(65536u64.to_be_bytes());
        data.extend(vec![0xcd; 65536]);

        let (frame, len) = Frame::decode(&data, NO_LIMIT).unwrap();
        assert_eq!(len, 10 + 65536);
        assert!(frame.payload().iter().all(|&b| b == 0xcd));
    }

    #[test]
    fn test_decode_empty_payload() {
        let (frame, len) = Frame::decode(&[0x81, 0x00], NO_LIMIT).unwrap();
        assert_eq!(len, 2);
        assert_eq!(frame.payload(), b"");
    }

    #[test]
    fn test_decode_consumes_only_first_frame() {
        let data = &[0x81, 0x01, b'a', 0x81, 0x01, b'b'];
        let (frame, len) = Frame::decode(data, NO_LIMIT).unwrap();
        assert_eq!(len, 3);
        assert_eq!(frame.payload(), b"a");
        let (frame, len) = Frame::decode(&data[len..], NO_LIMIT).unwrap();
        assert_eq!(len, 3);
        assert_eq!(frame.payload(), b"b");
    }

    #[test]
    fn test_decode_reserved_opcodes() {
        assert!(matches!(
            Frame::decode(&[0x83, 0x00], NO_LIMIT),
            Err(Error::ReservedOpcode(0x03))
        ));
        assert!(matches!(
            Frame::decode(&[0x8b, 0x00], NO_LIMIT),
            Err(Error::ReservedOpcode(0x0B))
        ));
    }

    #[test]
    fn test_decode_fragmented_control_frame() {
        // ping with FIN=0
        assert!(matches!(
            Frame::decode(&[0x09, 0x00], NO_LIMIT),
            Err(Error::FragmentedControlFrame)
        ));
    }

    #[test]
    fn test_decode_oversized_control_frame() {
        // ping claiming a 16-bit length; rejected before the length is read
        assert!(matches!(
            Frame::decode(&[0x89, 0x7e], NO_LIMIT),
            Err(Error::ControlFrameTooLarge(126))
        ));
    }

    #[test]
    fn test_decode_max_control_payload() {
        let mut data = vec![0x89, 0x7d];
        data.extend(vec![0u8; 125]);
        assert!(Frame::decode(&data, NO_LIMIT).is_ok());
    }

    #[test]
    fn test_decode_incomplete_header() {
        assert!(matches!(
            Frame::decode(&[0x81], NO_LIMIT),
            Err(Error::IncompleteFrame { needed: 1 })
        ));
        assert!(matches!(
            Frame::decode(&[0x82, 0x7e, 0x01], NO_LIMIT),
            Err(Error::IncompleteFrame { needed: 1 })
        ));
        assert!(matches!(
            Frame::decode(&[0x82, 0x7f, 0x00, 0x00, 0x00], NO_LIMIT),
            Err(Error::IncompleteFrame { needed: 5 })
        ));
        assert!(matches!(
            Frame::decode(&[0x81, 0x85, 0x37, 0xfa], NO_LIMIT),
            Err(Error::IncompleteFrame { needed: 2 })
        ));
    }

    #[test]
    fn test_decode_incomplete_payload() {
        assert!(matches!(
            Frame::decode(&[0x81, 0x05, 0x48, 0x65, 0x6c], NO_LIMIT),
            Err(Error::IncompleteFrame { needed: 2 })
        ));
    }

    #[test]
    fn test_decode_rejects_high_bit_length() {
        let mut data = vec![0x82, 0x7f];
        data.extend(u64::MAX.to_be_bytes());
        assert!(matches!(
            Frame::decode(&data, u64::MAX),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_decode_rejects_claim_above_max_before_payload_arrives() {
        // Claims 2^62 bytes; only the header is present.
        let mut data = vec![0x82, 0xff];
        data.extend((1u64 << 62).to_be_bytes());
        data.extend([0, 0, 0, 0]);
        assert!(matches!(
            Frame::decode(&data, 16 * 1024 * 1024),
            Err(Error::FrameTooLarge { size, .. }) if size == 1 << 62
        ));
    }

    #[test]
    fn test_decode_rejects_small_frame_above_tiny_max() {
        let data = &[0x82, 0x03, 1, 2, 3];
        assert!(matches!(
            Frame::decode(data, 2),
            Err(Error::FrameTooLarge { size: 3, max: 2 })
        ));
    }

    #[test]
    fn test_decode_keeps_rsv_bits() {
        let (frame, _) = Frame::decode(&[0xc1, 0x00], NO_LIMIT).unwrap();
        assert!(frame.rsv1);
        assert!(!frame.rsv2);
        assert!(!frame.rsv3);
    }

    #[test]
    fn test_encode_unmasked_text_frame() {
        let frame = Frame::text(b"Hello".to_vec());
        assert_eq!(
            frame.encode(None),
            vec![0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]
        );
    }

    #[test]
    fn test_encode_masked_text_frame() {
        let frame = Frame::text(b"Hello".to_vec());
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let buf = frame.encode(Some(mask));

        assert_eq!(buf.len(), 11);
        assert_eq!(buf[0], 0x81);
        assert_eq!(buf[1], 0x85);
        assert_eq!(&buf[2..6], &mask);
        assert_eq!(&buf[6..11], &[0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_encode_length_boundaries() {
        for (len, header) in [(125, 2), (126, 4), (65535, 4), (65536, 10)] {
            let frame = Frame::binary(vec![0u8; len]);
            let buf = frame.encode(None);
            assert_eq!(buf.len(), header + len, "payload length {len}");
            assert_eq!(buf.len(), frame.wire_size(false));
        }
    }

    #[test]
    fn test_encode_extended_length_64() {
        let frame = Frame::binary(vec![0xcd; 65536]);
        let buf = frame.encode(None);
        assert_eq!(buf[1], 0x7f);
        assert_eq!(&buf[2..10], &65536u64.to_be_bytes());
    }

    #[test]
    fn test_encode_sets_rsv1() {
        let mut frame = Frame::text(b"x".to_vec());
        frame.rsv1 = true;
        assert_eq!(frame.encode(None)[0], 0xc1);
    }

    #[test]
    fn test_roundtrip_masked() {
        let original = Frame::text(b"Masked roundtrip test!".to_vec());
        let buf = original.encode(Some([0x12, 0x34, 0x56, 0x78]));
        let (parsed, consumed) = Frame::decode(&buf, NO_LIMIT).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(parsed.payload(), original.payload());
        assert_eq!(parsed.opcode, original.opcode);
    }

    #[test]
    fn test_validate_outgoing_control_frames() {
        assert!(Frame::ping(vec![0u8; 125]).validate().is_ok());
        assert!(matches!(
            Frame::ping(vec![0u8; 126]).validate(),
            Err(Error::ControlFrameTooLarge(126))
        ));
        let mut frame = Frame::pong(b"x".to_vec());
        frame.fin = false;
        assert!(matches!(
            frame.validate(),
            Err(Error::FragmentedControlFrame)
        ));
        assert!(Frame::binary(vec![0u8; 1000]).validate().is_ok());
    }

    #[test]
    fn test_header_frame_len() {
        let header = FrameHeader::parse(&[0x82, 0xfe, 0x01, 0x00, 1, 2, 3, 4], NO_LIMIT).unwrap();
        assert_eq!(header.header_len, 8);
        assert_eq!(header.payload_len, 256);
        assert_eq!(header.frame_len(), 264);
    }
}
