//! WebSocket protocol core (RFC 6455): framing, handshake, reassembly.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod subprotocol;
pub mod utf8;
pub mod validation;

pub use assembler::{DataMessage, MessageAssembler};
pub use frame::{Frame, FrameHeader, MAX_CONTROL_FRAME_PAYLOAD};
pub use handshake::{
    HandshakeRequest, HandshakeResponse, WS_GUID, compute_accept_key, find_header_end,
    reject_response, validate_origin,
};
pub use mask::apply_mask;
pub use opcode::OpCode;
pub use subprotocol::SubprotocolRegistry;
pub use utf8::validate_utf8;
pub use validation::FrameValidator;
