//! Error types for the WebSocket server.
//!
//! Every failure a connection can hit is an [`Error`]. Errors are grouped
//! into an [`ErrorKind`] that decides how the connection ends: protocol,
//! content and resource errors are answered with a close frame carrying
//! [`Error::close_code`], while transport and handshake errors simply drop
//! the socket.

use thiserror::Error;

use crate::message::CloseCode;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Socket-level failure; the connection is torn down.
    Transport,
    /// Malformed frame or protocol violation (close code 1002).
    Protocol,
    /// Invalid payload content such as bad UTF-8 (close code 1007).
    Content,
    /// A size cap or queue bound was exceeded.
    Resource,
    /// The opening handshake failed; the connection never opened.
    Handshake,
    /// More input is required before a frame can be decoded.
    Incomplete,
}

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in a text message or close reason.
    #[error("Invalid UTF-8 in text payload")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Claimed frame size.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Decompressed payload exceeded the configured cap.
    #[error("Decompressed payload exceeds {max} bytes")]
    DecompressionLimit {
        /// Maximum allowed decompressed size.
        max: usize,
    },

    /// The pending write queue would exceed its bound.
    #[error("Write queue full: {queued} bytes queued (max: {max})")]
    WriteQueueFull {
        /// Bytes that would be queued.
        queued: usize,
        /// Maximum queue size.
        max: usize,
    },

    /// Connection has been closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// Invalid WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake request exceeds the configured size limit.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Origin header not in the allow-list.
    #[error("Origin not allowed: {origin}")]
    OriginNotAllowed {
        /// The rejected origin.
        origin: String,
    },

    /// A response header value contains forbidden characters.
    #[error("Invalid value for header {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// No offered subprotocol was acceptable.
    #[error("No acceptable subprotocol in {0:?}")]
    NoAcceptableSubprotocol(Vec<String>),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Operation did not finish within its deadline.
    #[error("Timed out: {0}")]
    Timeout(&'static str),

    /// Extension-related error during frame transformation.
    #[error("Extension error: {0}")]
    Extension(String),

    /// Invalid close code.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Unmasked client frame (security violation).
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Masked server frame (security violation).
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Invalid extension configuration or negotiation.
    #[error("Invalid extension: {0}")]
    InvalidExtension(String),
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::IncompleteFrame { .. } => ErrorKind::Incomplete,
            Error::InvalidUtf8 => ErrorKind::Content,
            Error::FrameTooLarge { .. }
            | Error::MessageTooLarge { .. }
            | Error::TooManyFragments { .. }
            | Error::DecompressionLimit { .. }
            | Error::WriteQueueFull { .. } => ErrorKind::Resource,
            Error::InvalidHandshake(_)
            | Error::HandshakeTooLarge { .. }
            | Error::OriginNotAllowed { .. }
            | Error::InvalidHeaderValue { .. }
            | Error::NoAcceptableSubprotocol(_)
            | Error::InvalidExtension(_) => ErrorKind::Handshake,
            Error::Io(_) | Error::ConnectionClosed(_) | Error::Timeout(_) => ErrorKind::Transport,
            Error::InvalidFrame(_)
            | Error::ProtocolViolation(_)
            | Error::Extension(_)
            | Error::InvalidCloseCode(_)
            | Error::ReservedOpcode(_)
            | Error::FragmentedControlFrame
            | Error::ControlFrameTooLarge(_)
            | Error::UnmaskedClientFrame
            | Error::MaskedServerFrame
            | Error::ReservedBitsSet => ErrorKind::Protocol,
        }
    }

    /// The close code to send to the peer, if this error warrants a close frame.
    ///
    /// `None` means the transport is dropped without a close frame.
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match self.kind() {
            ErrorKind::Protocol => Some(CloseCode::ProtocolError),
            ErrorKind::Content => Some(CloseCode::InvalidPayload),
            ErrorKind::Resource => match self {
                Error::WriteQueueFull { .. } => None,
                _ => Some(CloseCode::MessageTooBig),
            },
            ErrorKind::Transport | ErrorKind::Handshake | ErrorKind::Incomplete => None,
        }
    }

    /// Returns `true` if the decoder simply needs more bytes.
    #[inline]
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Error::IncompleteFrame { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}
