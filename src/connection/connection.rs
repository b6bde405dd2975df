use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::codec::{ReadStatus, WebSocketCodec};
use crate::config::Config;
use crate::connection::dispatcher::{Action, ConnectionId, Dispatcher, Session};
use crate::connection::fragmenter::MessageFragmenter;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::extensions::{ExtensionChain, ExtensionRegistry};
use crate::message::{CloseCode, CloseFrame};
use crate::protocol::{
    DataMessage, Frame, HandshakeRequest, HandshakeResponse, MessageAssembler, OpCode,
    SubprotocolRegistry, find_header_end, reject_response, validate_origin, validate_utf8,
};

/// Everything a connection needs from the server, shared read-only.
#[derive(Clone)]
pub struct ConnectionContext {
    /// Per-connection settings.
    pub config: Config,
    /// Receives connection events.
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Subprotocols the server speaks.
    pub subprotocols: SubprotocolRegistry,
    /// Extensions the server can negotiate.
    pub extensions: ExtensionRegistry,
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("config", &self.config)
            .field("subprotocols", &self.subprotocols)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

/// Outcome of handling one event while open.
#[derive(Debug)]
enum Flow {
    Continue,
    /// Start the closing handshake from our side.
    Close(CloseFrame),
    /// The peer's close was answered; release the transport.
    Done,
}

enum Event {
    Frame(Frame),
    Shutdown,
    Idle,
}

/// How long a write may still take once the server is stopping.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Run `fut` under an optional deadline.
async fn within<T>(
    limit: Option<Duration>,
    what: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => timeout(limit, fut).await.map_err(|_| Error::Timeout(what))?,
        None => fut.await,
    }
}

/// Like [`within`], but a server stop cuts the remaining wait to
/// [`STOP_GRACE`], so a peer that stopped reading cannot hold up shutdown.
async fn within_or_stop<T>(
    shutdown: &mut watch::Receiver<bool>,
    limit: Option<Duration>,
    what: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::pin!(fut);
    if *shutdown.borrow() {
        let limit = limit.map_or(STOP_GRACE, |limit| limit.min(STOP_GRACE));
        return within(Some(limit), what, fut).await;
    }
    tokio::select! {
        result = within(limit, what, &mut fut) => result,
        _ = shutdown.changed() => {
            debug!(what, "server stopping; shortening write deadline");
            within(Some(STOP_GRACE), what, fut).await
        }
    }
}

/// One server-side WebSocket connection, from upgrade request to close.
///
/// The connection owns its transport, buffers and extension state. It is
/// driven to completion by [`Connection::run`] on its own task.
pub struct Connection<T> {
    id: ConnectionId,
    peer: SocketAddr,
    state: ConnectionState,
    codec: WebSocketCodec<T>,
    assembler: MessageAssembler,
    extensions: ExtensionChain,
    ctx: Arc<ConnectionContext>,
}

impl<T> Connection<T> {
    /// Wrap an accepted transport. Nothing is read until [`run`](Self::run).
    pub fn new(io: T, id: ConnectionId, peer: SocketAddr, ctx: Arc<ConnectionContext>) -> Self {
        Self {
            id,
            peer,
            state: ConnectionState::Handshaking,
            codec: WebSocketCodec::new(io, Role::Server, &ctx.config),
            assembler: MessageAssembler::new(ctx.config.limits.clone()),
            extensions: ExtensionChain::default(),
            ctx,
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn write_timeout(&self) -> Option<Duration> {
        self.ctx.config.timeouts.as_ref().map(|t| t.write)
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Drive the connection until it is closed.
    ///
    /// `shutdown` flipping to `true` (or its sender going away) closes an
    /// open connection with 1001. `on_close` fires exactly once before this
    /// returns, whichever way the connection ended.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let span = info_span!("connection", id = self.id, peer = %self.peer);
        async {
            self.drive(&mut shutdown).await;
            self.state = ConnectionState::Closed;
            debug!("connection closed");
            self.ctx.dispatcher.on_close(self.id);
        }
        .instrument(span)
        .await;
    }

    async fn drive(&mut self, shutdown: &mut watch::Receiver<bool>) {
        let handshake_timeout = self.ctx.config.timeouts.as_ref().map(|t| t.handshake);
        let handshake = tokio::select! {
            result = within(handshake_timeout, "handshake", self.handshake()) => result,
            _ = shutdown.changed() => {
                debug!("server stopped during handshake");
                return;
            }
        };
        let mut session = match handshake {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "handshake failed");
                self.reject(&err, shutdown).await;
                self.ctx.dispatcher.on_error(self.id, &err);
                return;
            }
        };

        self.state = ConnectionState::Open;
        info!(
            subprotocol = session.subprotocol().unwrap_or(""),
            extensions = ?self.extensions.names(),
            "connection open"
        );
        self.ctx.dispatcher.on_open(&mut session);

        let mut flow = self.run_actions(&mut session);
        loop {
            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close(frame)) => return self.close_local(frame, shutdown).await,
                Ok(Flow::Done) => return self.release(shutdown).await,
                Err(err) => return self.fail(err, shutdown).await,
            }
            if let Err(err) = self.flush_pending(shutdown).await {
                return self.fail(err, shutdown).await;
            }
            flow = match self.next_event(shutdown).await {
                Ok(event) => self.handle_event(event, &mut session),
                Err(err) => Err(err),
            };
        }
    }

    /// Read the upgrade request, negotiate, and answer with 101.
    async fn handshake(&mut self) -> Result<Session> {
        let max = self.ctx.config.limits.max_handshake_size;
        let head_len = loop {
            let buffered = self.codec.stream_mut().buffered();
            if let Some(end) = find_header_end(buffered) {
                self.ctx.config.limits.check_handshake_size(end)?;
                break end;
            }
            if buffered.len() >= max {
                return Err(Error::HandshakeTooLarge {
                    size: buffered.len(),
                    max,
                });
            }
            match self.codec.stream_mut().read_available().await? {
                ReadStatus::Data(_) | ReadStatus::WouldBlock => {}
                ReadStatus::Closed => return Err(Error::ConnectionClosed(None)),
            }
        };

        let request = HandshakeRequest::parse(&self.codec.stream_mut().buffered()[..head_len])?;
        // Anything after the blank line is already frame data.
        self.codec.stream_mut().consume(head_len);
        request.validate()?;
        debug!(path = %request.path, "upgrade request");

        if let Some(allowed) = &self.ctx.config.allowed_origins {
            validate_origin(request.origin.as_deref(), allowed)?;
        }

        let subprotocol = self.ctx.subprotocols.select(&request.protocols);
        if subprotocol.is_none()
            && self.ctx.config.require_subprotocol
            && !request.protocols.is_empty()
        {
            return Err(Error::NoAcceptableSubprotocol(request.protocols.clone()));
        }

        let offers = request.extension_offers()?;
        let extensions = self.ctx.extensions.negotiate(&offers);
        self.codec.set_allowed_rsv(extensions.rsv_bits());

        let response =
            HandshakeResponse::accept(&request, subprotocol.clone(), extensions.response_header());
        let mut out = Vec::with_capacity(256);
        response.write(&mut out)?;
        self.codec.stream_mut().write(&out)?;
        self.codec.drain().await?;

        self.extensions = extensions;
        Ok(Session::new(self.id, self.peer, subprotocol))
    }

    /// Best-effort HTTP error reply for a rejected upgrade.
    async fn reject(&mut self, err: &Error, shutdown: &mut watch::Receiver<bool>) {
        if matches!(
            err,
            Error::Io(_) | Error::ConnectionClosed(_) | Error::Timeout(_)
        ) {
            return;
        }
        let response = reject_response(err);
        let limit = self.write_timeout();
        let sent = async {
            self.codec.stream_mut().write(&response)?;
            self.codec.shutdown().await
        };
        if let Err(e) = within_or_stop(shutdown, limit, "write", sent).await {
            debug!(error = %e, "could not send handshake rejection");
        }
    }

    async fn next_event(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<Event> {
        if *shutdown.borrow() {
            return Ok(Event::Shutdown);
        }
        let idle = self.ctx.config.timeouts.as_ref().map(|t| t.idle);
        let codec = &mut self.codec;
        let read = async move {
            match idle {
                Some(limit) => match timeout(limit, codec.next_frame()).await {
                    Ok(frame) => frame.map(Event::Frame),
                    Err(_) => Ok(Event::Idle),
                },
                None => codec.next_frame().await.map(Event::Frame),
            }
        };

        tokio::select! {
            _ = shutdown.changed() => Ok(Event::Shutdown),
            event = read => event,
        }
    }

    fn handle_event(&mut self, event: Event, session: &mut Session) -> Result<Flow> {
        match event {
            Event::Frame(frame) => self.handle_frame(frame, session),
            Event::Shutdown => {
                info!("server stopping");
                Ok(Flow::Close(CloseFrame::new(CloseCode::GoingAway, "Going Away")))
            }
            Event::Idle => {
                info!("idle timeout");
                Ok(Flow::Close(CloseFrame::new(CloseCode::GoingAway, "Idle timeout")))
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame, session: &mut Session) -> Result<Flow> {
        trace!(opcode = %frame.opcode, fin = frame.fin, len = frame.payload().len(), "frame");
        match frame.opcode {
            OpCode::Ping => {
                self.codec.write_frame(&Frame::pong(frame.into_payload()))?;
                Ok(Flow::Continue)
            }
            OpCode::Pong => Ok(Flow::Continue),
            OpCode::Close => {
                let reply = match CloseFrame::parse(frame.payload())? {
                    Some(peer) => {
                        debug!(code = peer.code.as_u16(), reason = %peer.reason, "peer closed");
                        CloseFrame::new(peer.code, "")
                    }
                    None => {
                        debug!("peer closed without status");
                        CloseFrame::new(CloseCode::Normal, "")
                    }
                };
                self.state = ConnectionState::ClosingRemote;
                self.codec.write_frame(&Frame::close(reply.to_payload()))?;
                Ok(Flow::Done)
            }
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                let Some(mut message) = self.assembler.push(frame)? else {
                    return Ok(Flow::Continue);
                };
                self.extensions.decode(&mut message)?;
                // The assembler only saw the compressed size.
                self.ctx.config.limits.check_message_size(message.payload.len())?;
                if message.is_text() {
                    validate_utf8(&message.payload)?;
                }
                debug!(len = message.payload.len(), text = message.is_text(), "message");
                self.ctx
                    .dispatcher
                    .on_message(session, &message.payload, message.is_text());
                self.run_actions(session)
            }
        }
    }

    /// Execute what the dispatcher queued on the session.
    fn run_actions(&mut self, session: &mut Session) -> Result<Flow> {
        for action in session.take_actions() {
            match action {
                Action::Send(message) => self.send_message(message)?,
                Action::Close(frame) => return Ok(Flow::Close(frame)),
            }
        }
        Ok(Flow::Continue)
    }

    fn send_message(&mut self, mut message: DataMessage) -> Result<()> {
        if let Err(err) = self
            .ctx
            .config
            .limits
            .check_message_size(message.payload.len())
        {
            warn!(error = %err, "dropping outgoing message");
            self.ctx.dispatcher.on_error(self.id, &err);
            return Ok(());
        }

        self.extensions.encode(&mut message)?;
        for frame in MessageFragmenter::for_message(&message, self.ctx.config.fragment_size) {
            self.codec.write_frame(&frame)?;
        }
        Ok(())
    }

    /// Wait for queued bytes to reach the peer.
    ///
    /// Queued bytes are never discarded: a half-sent frame followed by a
    /// close frame would corrupt the stream. A stalled peer instead runs
    /// into the write deadline and the transport is aborted.
    async fn flush_pending(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        if self.codec.flush()? == 0 {
            return Ok(());
        }
        trace!(queued = self.codec.pending_len(), "waiting for peer to read");
        let limit = self.write_timeout();
        within_or_stop(shutdown, limit, "write", self.codec.drain()).await
    }

    /// Send our close frame, flush it, and release the transport.
    async fn close_local(&mut self, frame: CloseFrame, shutdown: &mut watch::Receiver<bool>) {
        self.state = ConnectionState::ClosingLocal;
        debug!(code = frame.code.as_u16(), reason = %frame.reason, "closing");
        if let Err(err) = self.codec.write_frame(&Frame::close(frame.to_payload())) {
            debug!(error = %err, "could not queue close frame");
        }
        self.release(shutdown).await;
    }

    async fn release(&mut self, shutdown: &mut watch::Receiver<bool>) {
        let limit = self.write_timeout();
        if let Err(err) = within_or_stop(shutdown, limit, "write", self.codec.shutdown()).await {
            debug!(error = %err, "close flush failed");
        }
        self.state = ConnectionState::Closed;
    }

    async fn fail(&mut self, err: Error, shutdown: &mut watch::Receiver<bool>) {
        if let Error::ConnectionClosed(_) = err {
            debug!("peer dropped the transport");
            self.state = ConnectionState::Closed;
            return;
        }

        self.ctx.dispatcher.on_error(self.id, &err);
        match err.close_code() {
            Some(code) => {
                warn!(error = %err, code = code.as_u16(), "failing connection");
                self.close_local(CloseFrame::new(code, err.to_string()), shutdown)
                    .await;
            }
            None => {
                warn!(error = %err, "aborting connection");
                self.state = ConnectionState::Closed;
            }
        }
    }
}
