//! Application callbacks and the per-connection session handle.

use std::net::SocketAddr;

use crate::error::Error;
use crate::message::{CloseCode, CloseFrame};
use crate::protocol::{DataMessage, OpCode};

/// Server-unique connection identifier.
pub type ConnectionId = u64;

/// Receives connection events.
///
/// Callbacks run on the connection's own task, one at a time and in the
/// order the frames arrived. They must not block; replies are queued on the
/// [`Session`] and written once the callback returns.
pub trait Dispatcher: Send + Sync + 'static {
    /// The handshake completed and the connection is open.
    fn on_open(&self, session: &mut Session) {
        let _ = session;
    }

    /// A complete data message arrived. Text payloads are valid UTF-8.
    fn on_message(&self, session: &mut Session, payload: &[u8], is_text: bool);

    /// The connection reached its terminal state. Called exactly once.
    fn on_close(&self, id: ConnectionId) {
        let _ = id;
    }

    /// The connection failed. `on_close` follows.
    fn on_error(&self, id: ConnectionId, reason: &Error) {
        let _ = (id, reason);
    }
}

/// Something the application asked the connection to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    Send(DataMessage),
    Close(CloseFrame),
}

/// What a callback knows about its connection, plus an outbox for replies.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    peer: SocketAddr,
    subprotocol: Option<String>,
    actions: Vec<Action>,
}

impl Session {
    pub(crate) fn new(id: ConnectionId, peer: SocketAddr, subprotocol: Option<String>) -> Self {
        Self {
            id,
            peer,
            subprotocol,
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The subprotocol agreed during the handshake.
    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    /// Queue a text message.
    pub fn send_text(&mut self, text: impl Into<String>) {
        let text: String = text.into();
        self.actions
            .push(Action::Send(DataMessage::new(OpCode::Text, text.into_bytes())));
    }

    /// Queue a binary message.
    pub fn send_binary(&mut self, data: impl Into<Vec<u8>>) {
        self.actions
            .push(Action::Send(DataMessage::new(OpCode::Binary, data.into())));
    }

    /// Ask the connection to close once queued messages are written.
    /// Actions queued after this are dropped.
    pub fn close(&mut self, code: CloseCode, reason: impl Into<String>) {
        self.actions.push(Action::Close(CloseFrame::new(code, reason)));
    }

    /// Number of queued actions.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.actions.len()
    }

    pub(crate) fn take_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }
}

/// Dispatcher that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Ignore;

impl Dispatcher for Ignore {
    fn on_message(&self, _session: &mut Session, _payload: &[u8], _is_text: bool) {}
}
