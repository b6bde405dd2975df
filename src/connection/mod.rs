//! Per-connection protocol state machine.
//!
//! A [`Connection`] owns one accepted transport and walks it through
//!
//! 1. **Handshaking** - read the HTTP upgrade request and answer 101 (or reject)
//! 2. **Open** - decode frames, answer pings, reassemble and dispatch messages
//! 3. **ClosingLocal / ClosingRemote** - flush the close frame
//! 4. **Closed** - release the transport and report `on_close` once
//!
//! Application code sees the connection only through the [`Dispatcher`]
//! callbacks and the [`Session`] handle they receive.

#[allow(clippy::module_inception)]
mod connection;
mod dispatcher;
mod fragmenter;
mod role;
mod state;

pub use connection::{Connection, ConnectionContext};
pub(crate) use dispatcher::Ignore;
pub use dispatcher::{ConnectionId, Dispatcher, Session};
pub use fragmenter::MessageFragmenter;
pub use role::Role;
pub use state::ConnectionState;
