//! Buffered duplex stream over one transport.
//!
//! Reads land in an accumulator that the frame decoder consumes from the
//! front. Writes are attempted immediately; whatever the transport does not
//! take is queued (up to `max_pending`) and pushed out by [`BufferedStream::flush`]
//! or [`BufferedStream::drain`].

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::error::{Error, Result};

/// Outcome of one read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// This many bytes were appended to the read buffer.
    Data(usize),
    /// Nothing is receivable right now.
    WouldBlock,
    /// The peer closed its side of the transport.
    Closed,
}

/// A transport with a read accumulator and a bounded pending-write queue.
pub struct BufferedStream<T> {
    io: T,
    read_buf: BytesMut,
    pending: BytesMut,
    read_chunk: usize,
    max_pending: usize,
}

impl<T> BufferedStream<T> {
    /// Wrap `io`, reading in `read_chunk` sized steps and queueing at most
    /// `max_pending` unsent bytes.
    #[must_use]
    pub fn new(io: T, read_chunk: usize, max_pending: usize) -> Self {
        Self {
            io,
            read_buf: BytesMut::with_capacity(read_chunk),
            pending: BytesMut::new(),
            read_chunk: read_chunk.max(1),
            max_pending,
        }
    }

    /// Bytes received but not yet consumed.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.read_buf
    }

    /// Drop the first `n` buffered bytes.
    #[inline]
    pub fn consume(&mut self, n: usize) {
        self.read_buf.advance(n.min(self.read_buf.len()));
    }

    /// Bytes accepted by [`write`](Self::write) but not yet sent.
    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns the wrapped transport, discarding both buffers.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }

    fn enqueue(&mut self, bytes: &[u8]) -> Result<()> {
        let queued = self.pending.len() + bytes.len();
        if queued > self.max_pending {
            return Err(Error::WriteQueueFull {
                queued,
                max: self.max_pending,
            });
        }
        self.pending.extend_from_slice(bytes);
        Ok(())
    }
}

impl<T: AsyncRead + Unpin> BufferedStream<T> {
    fn poll_fill(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<ReadStatus>> {
        let start = self.read_buf.len();
        self.read_buf.resize(start + self.read_chunk, 0);
        let mut buf = ReadBuf::new(&mut self.read_buf[start..]);
        let polled = Pin::new(&mut self.io).poll_read(cx, &mut buf);
        let filled = buf.filled().len();
        self.read_buf.truncate(start + filled);

        match polled {
            Poll::Ready(Ok(())) if filled == 0 => Poll::Ready(Ok(ReadStatus::Closed)),
            Poll::Ready(Ok(())) => Poll::Ready(Ok(ReadStatus::Data(filled))),
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Append whatever is receivable right now without waiting.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the transport fails.
    pub fn try_read_available(&mut self) -> Result<ReadStatus> {
        let mut cx = Context::from_waker(Waker::noop());
        match self.poll_fill(&mut cx) {
            Poll::Ready(status) => Ok(status?),
            Poll::Pending => Ok(ReadStatus::WouldBlock),
        }
    }

    /// Wait until at least one byte arrives or the peer closes.
    ///
    /// Cancel safe: bytes are only appended once the read completes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the transport fails.
    pub async fn read_available(&mut self) -> Result<ReadStatus> {
        Ok(poll_fn(|cx| self.poll_fill(cx)).await?)
    }
}

impl<T: AsyncWrite + Unpin> BufferedStream<T> {
    fn poll_send_pending(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.pending.is_empty() {
            match Pin::new(&mut self.io).poll_write(cx, &self.pending) {
                Poll::Ready(Ok(0)) => return Poll::Ready(Err(io::ErrorKind::WriteZero.into())),
                Poll::Ready(Ok(n)) => self.pending.advance(n),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(()))
    }

    /// Send `bytes`, queueing whatever the transport does not take now.
    ///
    /// Returns the number of bytes accepted, which is always `bytes.len()`
    /// on success. Queued bytes keep their order behind earlier ones.
    ///
    /// # Errors
    ///
    /// - `Error::WriteQueueFull` if the unsent suffix would overflow the queue
    /// - `Error::Io` if the transport fails
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        if !self.pending.is_empty() {
            self.flush()?;
        }
        if !self.pending.is_empty() {
            self.enqueue(bytes)?;
            return Ok(bytes.len());
        }

        let mut cx = Context::from_waker(Waker::noop());
        let sent = match Pin::new(&mut self.io).poll_write(&mut cx, bytes) {
            Poll::Ready(Ok(n)) => n,
            Poll::Ready(Err(e)) => return Err(e.into()),
            Poll::Pending => 0,
        };
        self.enqueue(&bytes[sent..])?;
        Ok(bytes.len())
    }

    /// Push queued bytes without waiting. Returns how many remain queued.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the transport fails.
    pub fn flush(&mut self) -> Result<usize> {
        let mut cx = Context::from_waker(Waker::noop());
        if let Poll::Ready(Err(e)) = self.poll_send_pending(&mut cx) {
            return Err(e.into());
        }
        Ok(self.pending.len())
    }

    /// Wait until every queued byte has been handed to the transport.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the transport fails.
    pub async fn drain(&mut self) -> Result<()> {
        poll_fn(|cx| self.poll_send_pending(cx)).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Drain the queue and shut down the write half.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the transport fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.drain().await?;
        self.io.shutdown().await?;
        Ok(())
    }
}
