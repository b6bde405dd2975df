use tokio::io::{AsyncRead, AsyncWrite};

use bytes::BytesMut;

use crate::codec::stream::{BufferedStream, ReadStatus};
use crate::config::Config;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::extensions::RsvBits;
use crate::protocol::validation::FrameValidator;
use crate::protocol::{Frame, FrameHeader};

/// A fresh random masking key for a client-role frame.
fn random_mask() -> Result<[u8; 4]> {
    let mut key = [0u8; 4];
    getrandom::getrandom(&mut key).map_err(|e| Error::Io(e.to_string()))?;
    Ok(key)
}

/// Frame-level reader/writer over a [`BufferedStream`].
///
/// Headers are validated as soon as they are buffered, so an oversized or
/// misflagged frame is rejected before its payload is read.
pub struct WebSocketCodec<T> {
    stream: BufferedStream<T>,
    role: Role,
    validator: FrameValidator,
    max_frame_size: u64,
    scratch: BytesMut,
}

impl<T> WebSocketCodec<T> {
    /// Wrap a raw transport.
    #[must_use]
    pub fn new(io: T, role: Role, config: &Config) -> Self {
        let stream = BufferedStream::new(
            io,
            config.read_buffer_size,
            config.limits.max_pending_write,
        );
        Self::from_stream(stream, role, config)
    }

    /// Continue on a stream that may already hold buffered frame bytes,
    /// e.g. data that followed the handshake request.
    #[must_use]
    pub fn from_stream(stream: BufferedStream<T>, role: Role, config: &Config) -> Self {
        let validator = FrameValidator::new(role, config.limits.clone())
            .with_accept_unmasked(config.accept_unmasked_frames);
        Self {
            stream,
            role,
            validator,
            max_frame_size: config.limits.max_frame_size as u64,
            scratch: BytesMut::with_capacity(config.write_buffer_size),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Allow the RSV bits claimed by negotiated extensions.
    pub fn set_allowed_rsv(&mut self, rsv: RsvBits) {
        self.validator.set_allowed_rsv(rsv);
    }

    /// Bytes queued behind a slow peer.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.stream.pending_len()
    }

    /// The underlying buffered stream, for the HTTP handshake.
    pub fn stream_mut(&mut self) -> &mut BufferedStream<T> {
        &mut self.stream
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.stream.into_inner()
    }

    /// Decode one frame from already buffered bytes, if a whole one is there.
    ///
    /// # Errors
    ///
    /// Any header, validation or payload error for the frame at the front.
    pub fn decode_buffered(&mut self) -> Result<Option<Frame>> {
        let buf = self.stream.buffered();
        let header = match FrameHeader::parse(buf, self.max_frame_size) {
            Ok(header) => header,
            Err(e) if e.is_incomplete() => return Ok(None),
            Err(e) => return Err(e),
        };
        self.validator.validate(&header)?;

        match Frame::decode_with_header(buf, &header) {
            Ok((frame, consumed)) => {
                self.stream.consume(consumed);
                Ok(Some(frame))
            }
            Err(e) if e.is_incomplete() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<T: AsyncRead + Unpin> WebSocketCodec<T> {
    /// Read the next complete frame.
    ///
    /// Cancel safe: partially received frames stay buffered.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed(None)` when the peer closes the transport
    /// - any decoding or validation error
    pub async fn next_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.decode_buffered()? {
                return Ok(frame);
            }
            match self.stream.read_available().await? {
                ReadStatus::Data(_) | ReadStatus::WouldBlock => {}
                ReadStatus::Closed => return Err(Error::ConnectionClosed(None)),
            }
        }
    }
}

impl<T: AsyncWrite + Unpin> WebSocketCodec<T> {
    /// Encode `frame` and hand it to the stream; clients mask it first.
    ///
    /// # Errors
    ///
    /// - `Error::FragmentedControlFrame` / `Error::ControlFrameTooLarge` for
    ///   control frames that break RFC 6455 Section 5.5
    /// - `Error::WriteQueueFull` if the peer is not keeping up
    /// - `Error::Io` if the transport fails
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        frame.validate()?;
        let mask = if self.role.must_mask() {
            Some(random_mask()?)
        } else {
            None
        };

        self.scratch.clear();
        frame.encode_into(&mut self.scratch, mask);
        self.stream.write(&self.scratch)?;
        Ok(())
    }

    /// Push queued bytes without waiting; returns how many remain.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the transport fails.
    pub fn flush(&mut self) -> Result<usize> {
        self.stream.flush()
    }

    /// Wait until every queued byte has been sent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the transport fails.
    pub async fn drain(&mut self) -> Result<()> {
        self.stream.drain().await
    }

    /// Drain and shut down the write half.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the transport fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await
    }
}
