//! Configuration and limits for the server and its connections.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::extensions::deflate::DeflateConfig;

/// Configuration limits for WebSocket connections.
///
/// These limits prevent resource exhaustion attacks and ensure
/// bounded memory usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single frame payload in bytes.
    ///
    /// Checked against the length field before any payload is buffered.
    ///
    /// Default: 16 MB
    pub max_frame_size: usize,

    /// Maximum size of a complete message in bytes, after reassembly.
    ///
    /// Default: 64 MB
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,

    /// Maximum size of the HTTP upgrade request in bytes.
    ///
    /// Default: 8 KB
    pub max_handshake_size: usize,

    /// Maximum number of bytes queued for writing while the peer is not reading.
    ///
    /// Default: 8 MB
    pub max_pending_write: usize,

    /// Maximum size of an inflated permessage-deflate payload.
    ///
    /// Default: 64 MB
    pub max_decompressed_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            max_fragment_count: 128,
            max_handshake_size: 8192,
            max_pending_write: 8 * 1024 * 1024,
            max_decompressed_size: 64 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Create limits suitable for small embedded systems.
    ///
    /// - Max frame: 64 KB
    /// - Max message: 256 KB
    /// - Max fragments: 16
    /// - Max handshake: 4 KB
    /// - Max pending write: 256 KB
    /// - Max decompressed: 256 KB
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_frame_size: 64 * 1024,
            max_message_size: 256 * 1024,
            max_fragment_count: 16,
            max_handshake_size: 4096,
            max_pending_write: 256 * 1024,
            max_decompressed_size: 256 * 1024,
        }
    }

    /// Set the maximum frame payload size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the maximum reassembled message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the maximum fragment count per message.
    #[must_use]
    pub const fn with_max_fragment_count(mut self, count: usize) -> Self {
        self.max_fragment_count = count;
        self
    }

    /// Set the maximum handshake size.
    #[must_use]
    pub const fn with_max_handshake_size(mut self, size: usize) -> Self {
        self.max_handshake_size = size;
        self
    }

    /// Set the bound of the pending write queue.
    #[must_use]
    pub const fn with_max_pending_write(mut self, size: usize) -> Self {
        self.max_pending_write = size;
        self
    }

    /// Set the cap on decompressed payloads.
    #[must_use]
    pub const fn with_max_decompressed_size(mut self, size: usize) -> Self {
        self.max_decompressed_size = size;
        self
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that a claimed frame length is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: u64) -> Result<(), crate::Error> {
        if size > self.max_frame_size as u64 {
            Err(crate::Error::FrameTooLarge {
                size,
                max: self.max_frame_size as u64,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`](crate::Error::TooManyFragments) if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<(), crate::Error> {
        if count > self.max_fragment_count {
            Err(crate::Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`](crate::Error::HandshakeTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_handshake_size {
            Err(crate::Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// Timeout configuration for WebSocket connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Maximum time to receive the upgrade request and send the response.
    ///
    /// Default: 30 seconds
    pub handshake: Duration,

    /// Maximum time to drain queued outbound bytes.
    ///
    /// Default: 60 seconds
    pub write: Duration,

    /// Maximum time a connection can go without receiving any bytes.
    ///
    /// Default: 300 seconds (5 minutes)
    pub idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(30),
            write: Duration::from_secs(60),
            idle: Duration::from_secs(300),
        }
    }
}

impl Timeouts {
    /// Create new timeouts with custom values.
    #[must_use]
    pub const fn new(handshake: Duration, write: Duration, idle: Duration) -> Self {
        Self {
            handshake,
            write,
            idle,
        }
    }
}

/// Per-connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Fragment size for outgoing messages (in bytes).
    ///
    /// Messages larger than this will be split into multiple frames.
    ///
    /// Default: 16 KB
    pub fragment_size: usize,

    /// Accept unmasked frames from clients.
    ///
    /// RFC 6455 requires clients to mask all frames. Setting this to `true`
    /// violates the protocol but may be useful for testing.
    ///
    /// Default: false
    pub accept_unmasked_frames: bool,

    /// Read buffer size (in bytes).
    ///
    /// Default: 8 KB
    pub read_buffer_size: usize,

    /// Write buffer size (in bytes).
    ///
    /// Default: 8 KB
    pub write_buffer_size: usize,

    /// Timeout configuration. `None` disables all deadlines.
    ///
    /// Default: `Some(Timeouts::default())`
    pub timeouts: Option<Timeouts>,

    /// Allowed origins for CSWSH protection.
    ///
    /// If `Some`, only connections from these origins are allowed.
    /// Default: None
    pub allowed_origins: Option<Vec<String>>,

    /// Reject clients whose offered subprotocols are all unacceptable.
    ///
    /// Clients that offer no subprotocol at all are still accepted.
    /// Default: false
    pub require_subprotocol: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            fragment_size: 16 * 1024,
            accept_unmasked_frames: false,
            read_buffer_size: 8192,
            write_buffer_size: 8192,
            timeouts: Some(Timeouts::default()),
            allowed_origins: None,
            require_subprotocol: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set fragment size for outgoing messages.
    #[must_use]
    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size;
        self
    }

    /// Accept unmasked client frames (testing only).
    #[must_use]
    pub fn with_accept_unmasked_frames(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set write buffer size.
    #[must_use]
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Set timeout configuration.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Disable all connection deadlines.
    #[must_use]
    pub fn without_timeouts(mut self) -> Self {
        self.timeouts = None;
        self
    }

    /// Set allowed origins for CSWSH protection.
    ///
    /// Only connections with an Origin header matching one of these values
    /// will be accepted. An empty vector accepts any origin.
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Some(origins);
        self
    }

    /// Reject clients that offer only unknown subprotocols.
    #[must_use]
    pub fn with_require_subprotocol(mut self, require: bool) -> Self {
        self.require_subprotocol = require;
        self
    }
}

/// Admission rate limit: at most `max_requests` connections per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Connections admitted per window.
    pub max_requests: u32,
    /// Length of the window.
    pub window: Duration,
}

impl RateLimit {
    /// Create a new rate limit.
    #[must_use]
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Server-wide configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to.
    ///
    /// Default: `0.0.0.0:8080`
    pub bind_addr: SocketAddr,

    /// Maximum number of simultaneously served connections.
    ///
    /// Default: 100
    pub max_connections: usize,

    /// Optional admission rate limit consulted on every accept.
    ///
    /// Default: None
    pub rate_limit: Option<RateLimit>,

    /// permessage-deflate settings; `None` disables compression.
    ///
    /// Default: `Some(DeflateConfig::default())`
    pub compression: Option<DeflateConfig>,

    /// Configuration applied to every accepted connection.
    pub connection: Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            max_connections: 100,
            rate_limit: None,
            compression: Some(DeflateConfig::default()),
            connection: Config::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    #[must_use]
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the connection slot count.
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Enable admission rate limiting.
    #[must_use]
    pub fn with_rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = Some(limit);
        self
    }

    /// Set or disable permessage-deflate.
    #[must_use]
    pub fn with_compression(mut self, compression: Option<DeflateConfig>) -> Self {
        self.compression = compression;
        self
    }

    /// Set the per-connection configuration.
    #[must_use]
    pub fn with_connection(mut self, config: Config) -> Self {
        self.connection = config;
        self
    }
}
