//! Message reassembly for fragmented data frames (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::extensions::RsvBits;
use crate::protocol::{Frame, OpCode};

/// A complete data message, before or after extension processing.
///
/// `rsv` carries the reserved bits of the first frame; extensions use them to
/// tell whether they transformed the payload (RSV1 = compressed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    /// `OpCode::Text` or `OpCode::Binary`.
    pub opcode: OpCode,
    /// Message payload.
    pub payload: Vec<u8>,
    /// Reserved bits of the first frame.
    pub rsv: RsvBits,
}

impl DataMessage {
    /// Create a message with no reserved bits set.
    #[must_use]
    pub fn new(opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            opcode,
            payload,
            rsv: RsvBits::NONE,
        }
    }

    /// Returns `true` for text messages.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.opcode == OpCode::Text
    }
}

/// Reassembles fragmented WebSocket messages.
///
/// Control frames are not accepted here; the connection handles them as they
/// arrive, including between fragments of a data message.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    rsv: RsvBits,
    limits: Limits,
}

impl MessageAssembler {
    /// Create an assembler enforcing `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            rsv: RsvBits::NONE,
            limits,
        }
    }

    /// Add a data frame to the message being assembled.
    ///
    /// Returns the complete message once a frame with FIN=1 arrives.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a continuation with no message in
    ///   progress, a new data frame while one is in progress, or a control frame
    /// - `Error::TooManyFragments` / `Error::MessageTooLarge` on limit overflow
    pub fn push(&mut self, frame: Frame) -> Result<Option<DataMessage>> {
        match (frame.opcode, self.opcode) {
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Continuation frame without a message in progress".into(),
                ));
            }
            (OpCode::Continuation, Some(_)) => {}
            (OpCode::Text | OpCode::Binary, None) => {
                self.opcode = Some(frame.opcode);
                self.rsv = RsvBits {
                    rsv1: frame.rsv1,
                    rsv2: frame.rsv2,
                    rsv3: frame.rsv3,
                };
            }
            (OpCode::Text | OpCode::Binary, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            (control, _) => {
                return Err(Error::ProtocolViolation(format!(
                    "{control} frame passed to message assembler"
                )));
            }
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let Some(opcode) = self.opcode.take() else {
            return Ok(None);
        };
        let message = DataMessage {
            opcode,
            payload: self.buffer.split().to_vec(),
            rsv: std::mem::replace(&mut self.rsv, RsvBits::NONE),
        };
        self.fragment_count = 0;
        Ok(Some(message))
    }

    /// Returns `true` while a fragmented message is in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Discard any partial message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fragment_count = 0;
        self.opcode = None;
        self.rsv = RsvBits::NONE;
    }
}
