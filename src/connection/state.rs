//! Connection lifecycle states.

/// Where a connection is in its lifecycle.
///
/// ```text
/// Handshaking --101--> Open --peer close--> ClosingRemote --> Closed
///      |                 |
///      |                 +--error/shutdown/app close--> ClosingLocal --> Closed
///      +--rejected---------------------------------------------------> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Waiting for (or validating) the HTTP upgrade request.
    #[default]
    Handshaking,
    /// Handshake done; frames flow in both directions.
    Open,
    /// We sent a close frame and are flushing it before releasing the socket.
    ClosingLocal,
    /// The peer sent a close frame; we are echoing it.
    ClosingRemote,
    /// Terminal. The socket is released.
    Closed,
}

impl ConnectionState {
    /// Returns `true` until the connection reaches `Closed`.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }

    /// Application data may only be sent while `Open`.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Returns `true` in either closing state.
    #[must_use]
    #[inline]
    pub const fn is_closing(&self) -> bool {
        matches!(
            self,
            ConnectionState::ClosingLocal | ConnectionState::ClosingRemote
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Handshaking => "Handshaking",
            ConnectionState::Open => "Open",
            ConnectionState::ClosingLocal => "ClosingLocal",
            ConnectionState::ClosingRemote => "ClosingRemote",
            ConnectionState::Closed => "Closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        assert_eq!(ConnectionState::default(), ConnectionState::Handshaking);
    }

    #[test]
    fn test_can_send_only_when_open() {
        assert!(!ConnectionState::Handshaking.can_send());
        assert!(ConnectionState::Open.can_send());
        assert!(!ConnectionState::ClosingLocal.can_send());
        assert!(!ConnectionState::ClosingRemote.can_send());
        assert!(!ConnectionState::Closed.can_send());
    }

    #[test]
    fn test_closing_states() {
        assert!(ConnectionState::ClosingLocal.is_closing());
        assert!(ConnectionState::ClosingRemote.is_closing());
        assert!(!ConnectionState::Open.is_closing());
        assert!(!ConnectionState::Closed.is_closing());
    }

    #[test]
    fn test_is_active() {
        assert!(ConnectionState::Handshaking.is_active());
        assert!(ConnectionState::Open.is_active());
        assert!(ConnectionState::ClosingLocal.is_active());
        assert!(!ConnectionState::Closed.is_active());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::ClosingRemote.to_string(), "ClosingRemote");
        assert_eq!(ConnectionState::Closed.to_string(), "Closed");
    }
}
