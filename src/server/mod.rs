//! TCP accept loop and server lifecycle.
//!
//! One task accepts sockets; every admitted socket gets its own task running
//! a [`Connection`]. The only state shared between connections is the slot
//! table, the rate limiter and the read-only [`ConnectionContext`].
//!
//! ```rust,ignore
//! let handle = Server::builder(ServerConfig::new())
//!     .dispatcher(Arc::new(MyApp))
//!     .bind()
//!     .await?;
//! println!("listening on {}", handle.local_addr());
//! handle.stop().await;
//! ```

mod limiter;
mod slots;

pub use limiter::RateLimiter;
pub use slots::{SlotGuard, Slots};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionContext, Dispatcher, Ignore};
use crate::error::Result;
use crate::extensions::ExtensionRegistry;
use crate::extensions::deflate::DeflateFactory;
use crate::protocol::SubprotocolRegistry;

/// Entry point for building a server.
#[derive(Debug, Clone, Copy)]
pub struct Server;

impl Server {
    /// Start configuring a server.
    #[must_use]
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder {
            config,
            dispatcher: Arc::new(Ignore),
            subprotocols: SubprotocolRegistry::new(),
            extensions: ExtensionRegistry::new(),
        }
    }
}

/// Collects the dispatcher and registries before binding.
pub struct ServerBuilder {
    config: ServerConfig,
    dispatcher: Arc<dyn Dispatcher>,
    subprotocols: SubprotocolRegistry,
    extensions: ExtensionRegistry,
}

impl ServerBuilder {
    /// Receiver for connection events. Without one, events are dropped.
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    #[must_use]
    pub fn subprotocols(mut self, subprotocols: SubprotocolRegistry) -> Self {
        self.subprotocols = subprotocols;
        self
    }

    /// Additional extensions. permessage-deflate is added from
    /// [`ServerConfig::compression`] when enabled.
    #[must_use]
    pub fn extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    /// Bind the listener and start accepting.
    ///
    /// # Errors
    ///
    /// - `Error::Io` if the address cannot be bound
    /// - `Error::InvalidExtension` if the registry already claims the
    ///   permessage-deflate name or RSV1
    pub async fn bind(self) -> Result<ServerHandle> {
        let ServerBuilder {
            config,
            dispatcher,
            subprotocols,
            mut extensions,
        } = self;

        if let Some(deflate) = &config.compression {
            let limits = &config.connection.limits;
            let max_inflated = limits.max_decompressed_size.min(limits.max_message_size);
            extensions.register(DeflateFactory::new(deflate.clone(), max_inflated))?;
        }

        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            max_connections = config.max_connections,
            compression = config.compression.is_some(),
            "listening"
        );

        let slots = Slots::new(config.max_connections);
        let limiter = config
            .rate_limit
            .as_ref()
            .map(|limit| RateLimiter::new(limit.max_requests, limit.window));
        let ctx = Arc::new(ConnectionContext {
            config: config.connection,
            dispatcher,
            subprotocols,
            extensions,
        });

        let (stop, stopped) = watch::channel(false);
        let accept = AcceptLoop {
            listener,
            ctx,
            slots: Arc::clone(&slots),
            limiter,
        };
        let task = tokio::spawn(accept.run(stopped));

        Ok(ServerHandle {
            local_addr,
            slots,
            stop,
            task,
        })
    }
}

/// A running server.
///
/// Dropping the handle without calling [`stop`](Self::stop) also signals
/// shutdown, but nothing waits for the connections to finish.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    slots: Arc<Slots>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections currently holding a slot.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.slots.len()
    }

    /// Stop accepting, close every connection with 1001, and wait for all
    /// connection tasks to finish.
    pub async fn stop(self) {
        self.stop.send_replace(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "accept task failed");
        }
    }
}

struct AcceptLoop {
    listener: TcpListener,
    ctx: Arc<ConnectionContext>,
    slots: Arc<Slots>,
    limiter: Option<RateLimiter>,
}

impl AcceptLoop {
    async fn run(self, mut stopped: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = stopped.changed() => break,
                Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = done {
                        warn!(error = %err, "connection task failed");
                    }
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(error = %err, "accept failed");
                            continue;
                        }
                    };

                    if self.limiter.as_ref().is_some_and(|limiter| !limiter.admit()) {
                        debug!(%peer, "rate limited");
                        continue;
                    }
                    let Some(slot) = self.slots.acquire(peer) else {
                        warn!(%peer, max = self.slots.capacity(), "connection limit reached");
                        continue;
                    };
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!(error = %err, "could not set TCP_NODELAY");
                    }

                    debug!(id = slot.id(), %peer, "accepted");
                    let conn = Connection::new(stream, slot.id(), peer, Arc::clone(&self.ctx));
                    let shutdown = stopped.clone();
                    tasks.spawn(async move {
                        conn.run(shutdown).await;
                        drop(slot);
                    });
                }
            }
        }

        drop(self.listener);
        info!(live = tasks.len(), "stopping; waiting for connections");
        while let Some(done) = tasks.join_next().await {
            if let Err(err) = done {
                warn!(error = %err, "connection task failed");
            }
        }
        info!("server stopped");
    }
}
