//! # wsserve - RFC 6455 WebSocket server
//!
//! `wsserve` accepts TCP connections, performs the HTTP upgrade handshake and
//! exchanges framed messages with each peer on its own tokio task.
//!
//! ## Features
//!
//! - **Incremental frame decoding** that never consumes a partial frame
//! - **Bounded buffering**: frame, message, handshake, write-queue and
//!   decompression limits, all checked before allocation
//! - **permessage-deflate** (RFC 7692) with context takeover control
//! - **Subprotocol and extension registries** fixed at construction
//! - **Graceful shutdown**: every connection is closed with 1001 and awaited
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wsserve::{Dispatcher, Server, ServerConfig, Session};
//!
//! struct Echo;
//!
//! impl Dispatcher for Echo {
//!     fn on_message(&self, session: &mut Session, payload: &[u8], is_text: bool) {
//!         if is_text {
//!             session.send_text(String::from_utf8_lossy(payload));
//!         } else {
//!             session.send_binary(payload.to_vec());
//!         }
//!     }
//! }
//!
//! let handle = Server::builder(ServerConfig::new())
//!     .dispatcher(Arc::new(Echo))
//!     .bind()
//!     .await?;
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod extensions;
pub mod message;
pub mod protocol;
pub mod server;

pub use codec::{BufferedStream, ReadStatus, WebSocketCodec};
pub use config::{Config, Limits, RateLimit, ServerConfig, Timeouts};
pub use connection::{Connection, ConnectionId, ConnectionState, Dispatcher, Role, Session};
pub use error::{Error, ErrorKind, Result};
pub use extensions::deflate::DeflateConfig;
pub use message::{CloseCode, CloseFrame};
pub use protocol::{Frame, HandshakeRequest, HandshakeResponse, OpCode, WS_GUID, compute_accept_key};
pub use server::{RateLimiter, Server, ServerBuilder, ServerHandle};
