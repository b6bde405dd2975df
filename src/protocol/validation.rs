//! Per-frame header checks for incoming frames (RFC 6455 Section 5).
//!
//! - Masking rules per RFC 6455 Section 5.1
//! - RSV bits: only bits claimed by a negotiated extension, and only on the
//!   first frame of a data message (RFC 7692 Section 6)
//! - Frame size limits

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::extensions::RsvBits;
use crate::protocol::OpCode;
use crate::protocol::frame::FrameHeader;

/// Frame validator for incoming WebSocket frames.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    role: Role,
    limits: Limits,
    accept_unmasked_frames: bool,
    allowed_rsv: RsvBits,
}

impl FrameValidator {
    /// Create a validator that allows no RSV bits.
    #[must_use]
    pub fn new(role: Role, limits: Limits) -> Self {
        Self {
            role,
            limits,
            accept_unmasked_frames: false,
            allowed_rsv: RsvBits::NONE,
        }
    }

    /// Accept unmasked client frames (non-compliant, for testing only).
    #[must_use]
    pub fn with_accept_unmasked(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }

    /// Allow the RSV bits claimed by the negotiated extensions.
    #[must_use]
    pub fn with_allowed_rsv(mut self, rsv: RsvBits) -> Self {
        self.allowed_rsv = rsv;
        self
    }

    /// Replace the allowed RSV bits after negotiation.
    pub fn set_allowed_rsv(&mut self, rsv: RsvBits) {
        self.allowed_rsv = rsv;
    }

    /// RSV bits currently allowed on the first frame of a data message.
    #[must_use]
    pub fn allowed_rsv(&self) -> RsvBits {
        self.allowed_rsv
    }

    /// Validate a parsed header before its payload is buffered.
    ///
    /// Checks run in order: masking, RSV bits, frame size.
    ///
    /// # Errors
    ///
    /// - `Error::UnmaskedClientFrame` - server received an unmasked frame
    /// - `Error::MaskedServerFrame` - client received a masked frame
    /// - `Error::ReservedBitsSet` - RSV bit without a negotiated meaning
    /// - `Error::FrameTooLarge` - payload exceeds `max_frame_size`
    pub fn validate(&self, header: &FrameHeader) -> Result<()> {
        self.validate_masking(header.mask.is_some())?;
        self.validate_rsv_bits(header)?;
        self.limits.check_frame_size(header.payload_len)
    }

    fn validate_masking(&self, masked: bool) -> Result<()> {
        match self.role {
            Role::Server if !masked && !self.accept_unmasked_frames => {
                Err(Error::UnmaskedClientFrame)
            }
            Role::Client if masked => Err(Error::MaskedServerFrame),
            _ => Ok(()),
        }
    }

    fn validate_rsv_bits(&self, header: &FrameHeader) -> Result<()> {
        // Extension bits only ever mark the first frame of a message.
        let allowed = match header.opcode {
            OpCode::Text | OpCode::Binary => self.allowed_rsv,
            _ => RsvBits::NONE,
        };
        if (header.rsv1 && !allowed.rsv1)
            || (header.rsv2 && !allowed.rsv2)
            || (header.rsv3 && !allowed.rsv3)
        {
            return Err(Error::ReservedBitsSet);
        }
        Ok(())
    }
}
