//! `wsserve` demo binary: an echo server.

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wsserve::{
    ConnectionId, DeflateConfig, Dispatcher, Error, RateLimit, Server, ServerConfig, Session,
};

#[derive(Debug, Parser)]
#[command(name = "wsserve", version, about = "RFC 6455 WebSocket echo server")]
struct Cli {
    /// TCP port to listen on
    #[arg(default_value_t = 8080)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Maximum number of simultaneous connections
    #[arg(long, default_value_t = 100)]
    max_clients: usize,

    /// Admit at most this many connections per rate window
    #[arg(long)]
    rate_limit: Option<u32>,

    /// Rate window length in seconds
    #[arg(long, default_value_t = 60, requires = "rate_limit")]
    rate_window: u64,

    /// Disable permessage-deflate
    #[arg(long)]
    no_compression: bool,

    /// Log filter, e.g. `info` or `wsserve=debug` (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::new()
            .with_bind_addr(SocketAddr::new(self.host, self.port))
            .with_max_connections(self.max_clients)
            .with_compression((!self.no_compression).then(DeflateConfig::default));
        if let Some(max) = self.rate_limit {
            config = config.with_rate_limit(RateLimit::new(max, Duration::from_secs(self.rate_window)));
        }
        config
    }
}

struct Echo;

impl Dispatcher for Echo {
    fn on_open(&self, session: &mut Session) {
        info!(id = session.id(), peer = %session.peer(), "client connected");
        session.send_text("Welcome to wsserve");
    }

    fn on_message(&self, session: &mut Session, payload: &[u8], is_text: bool) {
        if is_text {
            session.send_text(format!("Echo: {}", String::from_utf8_lossy(payload)));
        } else {
            session.send_binary(payload.to_vec());
        }
    }

    fn on_close(&self, id: ConnectionId) {
        info!(id, "client disconnected");
    }

    fn on_error(&self, id: ConnectionId, reason: &Error) {
        warn!(id, error = %reason, "client error");
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let handle = match Server::builder(cli.server_config())
        .dispatcher(Arc::new(Echo))
        .bind()
        .await
    {
        Ok(handle) => handle,
        Err(err) => {
            error!(error = %err, "failed to start server");
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %handle.local_addr(), "wsserve ready; press Ctrl-C to stop");

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "could not listen for Ctrl-C");
    }
    info!(live = handle.connection_count(), "shutting down");
    handle.stop().await;
    ExitCode::SUCCESS
}
