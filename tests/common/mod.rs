//! Shared helpers for integration tests: a client-role connection over TCP
//! and a dispatcher that records every event.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::time::timeout;

use wsserve::codec::{BufferedStream, ReadStatus, WebSocketCodec};
use wsserve::protocol::handshake::{client_request, generate_key};
use wsserve::protocol::{HandshakeResponse, find_header_end};
use wsserve::{
    CloseCode, CloseFrame, Config, ConnectionId, Dispatcher, Error, Frame, OpCode, Result,
    Role, Server, ServerConfig, ServerHandle, Session,
};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open(ConnectionId),
    Text(ConnectionId, String),
    Binary(ConnectionId, Vec<u8>),
    Error(ConnectionId, Error),
    Close(ConnectionId),
}

/// Echoes text as `"Echo: <text>"` and binary verbatim, recording everything.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    /// Wait until `pred` matches at least `n` events.
    pub async fn wait_for(&self, n: usize, pred: impl Fn(&Event) -> bool) {
        let waited = timeout(IO_TIMEOUT, async {
            while self.count(&pred) < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out; events so far: {:?}", self.events());
    }
}

impl Dispatcher for Recorder {
    fn on_open(&self, session: &mut Session) {
        self.events.lock().push(Event::Open(session.id()));
    }

    fn on_message(&self, session: &mut Session, payload: &[u8], is_text: bool) {
        let id = session.id();
        if is_text {
            let text = String::from_utf8_lossy(payload).into_owned();
            session.send_text(format!("Echo: {text}"));
            self.events.lock().push(Event::Text(id, text));
        } else {
            session.send_binary(payload.to_vec());
            self.events.lock().push(Event::Binary(id, payload.to_vec()));
        }
    }

    fn on_close(&self, id: ConnectionId) {
        self.events.lock().push(Event::Close(id));
    }

    fn on_error(&self, id: ConnectionId, reason: &Error) {
        self.events.lock().push(Event::Error(id, reason.clone()));
    }
}

pub fn local_config() -> ServerConfig {
    ServerConfig::new().with_bind_addr("127.0.0.1:0".parse().unwrap())
}

pub async fn start(config: ServerConfig) -> (ServerHandle, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let handle = Server::builder(config)
        .dispatcher(recorder.clone())
        .bind()
        .await
        .expect("bind test server");
    (handle, recorder)
}

/// Client side of a WebSocket connection, for driving the server.
pub struct TestClient {
    codec: WebSocketCodec<TcpStream>,
    pub response: HandshakeResponse,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with(addr, &[], None).await
    }

    pub async fn connect_with(
        addr: SocketAddr,
        protocols: &[&str],
        extensions: Option<&str>,
    ) -> Result<Self> {
        let io = TcpStream::connect(addr).await?;
        let key = generate_key()?;
        let mut stream = BufferedStream::new(io, 4096, 1 << 24);
        stream.write(&client_request(&addr.to_string(), "/", &key, protocols, extensions))?;
        stream.drain().await?;

        let end = timeout(IO_TIMEOUT, async {
            loop {
                if let Some(end) = find_header_end(stream.buffered()) {
                    return Ok::<_, Error>(end);
                }
                if stream.read_available().await? == ReadStatus::Closed {
                    return Err(Error::ConnectionClosed(None));
                }
            }
        })
        .await
        .map_err(|_| Error::Timeout("handshake"))??;

        let response = HandshakeResponse::parse(&stream.buffered()[..end])?;
        response.verify(&key)?;
        stream.consume(end);

        let codec = WebSocketCodec::from_stream(stream, Role::Client, &Config::default());
        Ok(Self { codec, response })
    }

    /// Allow RSV bits after negotiating an extension.
    pub fn allow_rsv1(&mut self) {
        self.codec.set_allowed_rsv(wsserve::extensions::RsvBits::RSV1);
    }

    pub async fn send(&mut self, frame: Frame) -> Result<()> {
        self.codec.write_frame(&frame)?;
        self.codec.drain().await
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send(Frame::text(text)).await
    }

    pub async fn recv(&mut self) -> Result<Frame> {
        timeout(IO_TIMEOUT, self.codec.next_frame())
            .await
            .map_err(|_| Error::Timeout("read"))?
    }

    pub async fn recv_text(&mut self) -> Result<String> {
        let frame = self.recv().await?;
        assert_eq!(frame.opcode, OpCode::Text, "expected text, got {frame:?}");
        Ok(String::from_utf8(frame.into_payload()).expect("server sent invalid UTF-8"))
    }

    /// Read a close frame and return its status code.
    pub async fn recv_close(&mut self) -> Result<u16> {
        let frame = self.recv().await?;
        assert_eq!(frame.opcode, OpCode::Close, "expected close, got {frame:?}");
        let payload = frame.payload();
        Ok(u16::from_be_bytes([payload[0], payload[1]]))
    }

    /// Start the closing handshake and return the server's reply code.
    pub async fn close(&mut self, code: CloseCode) -> Result<u16> {
        self.send(Frame::close(CloseFrame::new(code, "").to_payload()))
            .await?;
        self.recv_close().await
    }
}
