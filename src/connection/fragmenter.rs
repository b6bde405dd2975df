//! Splitting outgoing messages into frames (RFC 6455 Section 5.4).

use crate::extensions::RsvBits;
use crate::protocol::{DataMessage, Frame, OpCode};

/// Iterator over the frames of one outgoing data message.
///
/// The first frame carries the message opcode and the extension RSV bits;
/// the rest are continuation frames with clear RSV bits. An empty payload
/// still yields one final frame.
pub struct MessageFragmenter<'a> {
    payload: &'a [u8],
    opcode: OpCode,
    rsv: RsvBits,
    fragment_size: usize,
    offset: usize,
    is_first: bool,
}

impl<'a> MessageFragmenter<'a> {
    /// Fragment a raw payload with no RSV bits.
    #[inline]
    #[must_use]
    pub fn new(payload: &'a [u8], opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            payload,
            opcode,
            rsv: RsvBits::NONE,
            fragment_size: fragment_size.max(1),
            offset: 0,
            is_first: true,
        }
    }

    /// Fragment an already extension-encoded message.
    #[must_use]
    pub fn for_message(message: &'a DataMessage, fragment_size: usize) -> Self {
        let mut fragmenter = Self::new(&message.payload, message.opcode, fragment_size);
        fragmenter.rsv = message.rsv;
        fragmenter
    }

    /// Returns `true` if more than one frame will be produced.
    #[inline]
    #[must_use]
    pub fn needs_fragmentation(&self) -> bool {
        self.payload.len() > self.fragment_size
    }

    /// Bytes not yet emitted.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.payload.len().saturating_sub(self.offset)
    }
}

impl Iterator for MessageFragmenter<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.payload.len() && !(self.is_first && self.payload.is_empty()) {
            return None;
        }

        let chunk_size = self.remaining().min(self.fragment_size);
        let chunk = self.payload[self.offset..self.offset + chunk_size].to_vec();
        self.offset += chunk_size;
        let fin = self.offset >= self.payload.len();

        let mut frame = if self.is_first {
            self.is_first = false;
            let mut frame = Frame::new(fin, self.opcode, chunk);
            frame.rsv1 = self.rsv.rsv1;
            frame.rsv2 = self.rsv.rsv2;
            frame.rsv3 = self.rsv.rsv3;
            frame
        } else {
            Frame::new(fin, OpCode::Continuation, chunk)
        };
        frame.fin = fin;
        Some(frame)
    }
}
