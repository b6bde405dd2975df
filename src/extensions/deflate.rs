//! Permessage-deflate compression extension (RFC 7692).
//!
//! Each connection owns two raw-deflate streams: one compressing outgoing
//! messages and one inflating incoming ones. Every message is flushed with
//! `Z_SYNC_FLUSH` and the resulting `00 00 FF FF` tail is removed on the wire
//! and put back before inflating.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tracing::trace;

use crate::connection::Role;
use crate::error::{Error, Result};
use crate::extensions::{
    Extension, ExtensionFactory, ExtensionOffer, ExtensionParam, Negotiated, RsvBits,
};
use crate::protocol::DataMessage;

/// Extension token used in `Sec-WebSocket-Extensions`.
pub const EXTENSION_NAME: &str = "permessage-deflate";

const MIN_WINDOW_BITS: u8 = 8;
const MAX_WINDOW_BITS: u8 = 15;
const DEFLATE_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];
const OUTPUT_CHUNK: usize = 4096;

/// Raw deflate streams cannot use a 256-byte window; zlib silently uses 512.
fn effective_window_bits(bits: u8) -> u8 {
    bits.clamp(MIN_WINDOW_BITS + 1, MAX_WINDOW_BITS)
}

fn check_window_bits(name: &str, bits: u8) -> Result<u8> {
    if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits) {
        return Err(Error::InvalidExtension(format!(
            "{name} must be {MIN_WINDOW_BITS}-{MAX_WINDOW_BITS}, got {bits}"
        )));
    }
    Ok(bits)
}

/// Server-side permessage-deflate preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeflateConfig {
    /// Always reset the outgoing compression context after each message.
    pub server_no_context_takeover: bool,
    /// Ask the client to reset its compression context after each message.
    pub client_no_context_takeover: bool,
    /// Largest LZ77 window the server compresses with.
    pub server_max_window_bits: u8,
    /// Largest LZ77 window the client may compress with.
    pub client_max_window_bits: u8,
    /// zlib compression level, 0-9.
    pub compression_level: u32,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            server_max_window_bits: MAX_WINDOW_BITS,
            client_max_window_bits: MAX_WINDOW_BITS,
            compression_level: 6,
        }
    }
}

impl DeflateConfig {
    /// Default preferences: full windows, context takeover, level 6.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `server_no_context_takeover`.
    #[must_use]
    pub fn with_server_no_context_takeover(mut self, value: bool) -> Self {
        self.server_no_context_takeover = value;
        self
    }

    /// Set `client_no_context_takeover`.
    #[must_use]
    pub fn with_client_no_context_takeover(mut self, value: bool) -> Self {
        self.client_no_context_takeover = value;
        self
    }

    /// Set the server window size.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidExtension` outside 8-15.
    pub fn with_server_max_window_bits(mut self, bits: u8) -> Result<Self> {
        self.server_max_window_bits = check_window_bits("server_max_window_bits", bits)?;
        Ok(self)
    }

    /// Set the client window size.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidExtension` outside 8-15.
    pub fn with_client_max_window_bits(mut self, bits: u8) -> Result<Self> {
        self.client_max_window_bits = check_window_bits("client_max_window_bits", bits)?;
        Ok(self)
    }

    /// Set the compression level.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidExtension` above 9.
    pub fn with_compression_level(mut self, level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidExtension(format!(
                "compression_level must be 0-9, got {level}"
            )));
        }
        self.compression_level = level;
        Ok(self)
    }

    /// Negotiate one client offer.
    ///
    /// Returns the agreed parameters and the response to send, or `None` if
    /// the offer has unknown, duplicated or out-of-range parameters.
    #[must_use]
    pub fn negotiate(&self, offer: &ExtensionOffer) -> Option<(DeflateParams, ExtensionOffer)> {
        let requested = DeflateParams::parse(&offer.params).ok()?;

        let server_no_context_takeover =
            requested.server_no_context_takeover || self.server_no_context_takeover;
        let client_no_context_takeover =
            requested.client_no_context_takeover || self.client_no_context_takeover;

        let server_bits = requested
            .server_max_window_bits
            .map_or(self.server_max_window_bits, |b| b.min(self.server_max_window_bits));

        // A client window limit can only be sent if the client offered the parameter.
        let client_bits = match requested.client_max_window_bits {
            ClientWindow::NotOffered => None,
            ClientWindow::Any => {
                (self.client_max_window_bits < MAX_WINDOW_BITS).then_some(self.client_max_window_bits)
            }
            ClientWindow::Bits(b) => Some(b.min(self.client_max_window_bits)),
        };

        let mut response = Vec::new();
        if server_no_context_takeover {
            response.push(ExtensionParam::flag("server_no_context_takeover"));
        }
        if client_no_context_takeover {
            response.push(ExtensionParam::flag("client_no_context_takeover"));
        }
        if requested.server_max_window_bits.is_some() || server_bits < MAX_WINDOW_BITS {
            response.push(ExtensionParam::new(
                "server_max_window_bits",
                server_bits.to_string(),
            ));
        }
        if let Some(bits) = client_bits {
            response.push(ExtensionParam::new("client_max_window_bits", bits.to_string()));
        }

        let params = DeflateParams {
            server_no_context_takeover,
            client_no_context_takeover,
            server_max_window_bits: server_bits,
            client_max_window_bits: client_bits.unwrap_or(MAX_WINDOW_BITS),
        };
        Some((params, ExtensionOffer::with_params(EXTENSION_NAME, response)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum ClientWindow {
    #[default]
    NotOffered,
    Any,
    Bits(u8),
}

#[derive(Debug, Default)]
struct RequestedParams {
    server_no_context_takeover: bool,
    client_no_context_takeover: bool,
    server_max_window_bits: Option<u8>,
    client_max_window_bits: ClientWindow,
}

/// Parameters in effect on a connection after negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateParams {
    /// Server resets its compressor after every message.
    pub server_no_context_takeover: bool,
    /// Client resets its compressor after every message.
    pub client_no_context_takeover: bool,
    /// Window the server compresses with.
    pub server_max_window_bits: u8,
    /// Window the client compresses with.
    pub client_max_window_bits: u8,
}

impl Default for DeflateParams {
    fn default() -> Self {
        Self {
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            server_max_window_bits: MAX_WINDOW_BITS,
            client_max_window_bits: MAX_WINDOW_BITS,
        }
    }
}

impl DeflateParams {
    fn parse(params: &[ExtensionParam]) -> Result<RequestedParams> {
        let mut requested = RequestedParams::default();
        let mut seen: Vec<&str> = Vec::with_capacity(params.len());

        for param in params {
            if seen.contains(&param.name.as_str()) {
                return Err(Error::InvalidExtension(format!(
                    "Duplicate parameter: {}",
                    param.name
                )));
            }
            seen.push(&param.name);

            match (param.name.as_str(), param.value.as_deref()) {
                ("server_no_context_takeover", None) => requested.server_no_context_takeover = true,
                ("client_no_context_takeover", None) => requested.client_no_context_takeover = true,
                ("server_max_window_bits", Some(v)) => {
                    requested.server_max_window_bits = Some(parse_window_bits(&param.name, v)?);
                }
                ("client_max_window_bits", None) => {
                    requested.client_max_window_bits = ClientWindow::Any;
                }
                ("client_max_window_bits", Some(v)) => {
                    requested.client_max_window_bits =
                        ClientWindow::Bits(parse_window_bits(&param.name, v)?);
                }
                (name, _) => {
                    return Err(Error::InvalidExtension(format!(
                        "Unsupported parameter: {name}"
                    )));
                }
            }
        }

        Ok(requested)
    }

    /// Read the parameters from a server response (client side).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidExtension` for unknown or malformed parameters.
    pub fn from_response(response: &ExtensionOffer) -> Result<Self> {
        let requested = Self::parse(&response.params)?;
        Ok(Self {
            server_no_context_takeover: requested.server_no_context_takeover,
            client_no_context_takeover: requested.client_no_context_takeover,
            server_max_window_bits: requested.server_max_window_bits.unwrap_or(MAX_WINDOW_BITS),
            client_max_window_bits: match requested.client_max_window_bits {
                ClientWindow::Bits(b) => b,
                _ => MAX_WINDOW_BITS,
            },
        })
    }
}

fn parse_window_bits(name: &str, value: &str) -> Result<u8> {
    let bits: u8 = value
        .parse()
        .map_err(|_| Error::InvalidExtension(format!("Invalid {name} value: {value}")))?;
    check_window_bits(name, bits)
}

/// Per-connection permessage-deflate state.
pub struct DeflateExtension {
    compressor: Compress,
    decompressor: Decompress,
    reset_compressor: bool,
    reset_decompressor: bool,
    max_decompressed_size: usize,
}

impl DeflateExtension {
    /// Create the streams for `role` from negotiated parameters.
    ///
    /// The inflater always uses a 15-bit window, which decodes any smaller
    /// window the peer chose.
    #[must_use]
    pub fn new(role: Role, params: &DeflateParams, level: u32, max_decompressed_size: usize) -> Self {
        let (own_bits, own_reset, peer_reset) = match role {
            Role::Server => (
                params.server_max_window_bits,
                params.server_no_context_takeover,
                params.client_no_context_takeover,
            ),
            Role::Client => (
                params.client_max_window_bits,
                params.client_no_context_takeover,
                params.server_no_context_takeover,
            ),
        };

        Self {
            compressor: Compress::new_with_window_bits(
                Compression::new(level.min(9)),
                false,
                effective_window_bits(own_bits),
            ),
            decompressor: Decompress::new_with_window_bits(false, MAX_WINDOW_BITS),
            reset_compressor: own_reset,
            reset_decompressor: peer_reset,
            max_decompressed_size,
        }
    }

    /// Compress one message payload, without the sync-flush trailer.
    ///
    /// # Errors
    ///
    /// Returns `Error::Extension` if zlib reports an error.
    pub fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let start_in = self.compressor.total_in();
        let mut out = Vec::with_capacity(input.len() / 2 + 64);

        loop {
            if out.capacity() - out.len() < 64 {
                out.reserve(out.capacity().max(OUTPUT_CHUNK));
            }
            let consumed = (self.compressor.total_in() - start_in) as usize;
            self.compressor
                .compress_vec(&input[consumed..], &mut out, FlushCompress::Sync)
                .map_err(|e| Error::Extension(format!("Compression failed: {e}")))?;

            let consumed = (self.compressor.total_in() - start_in) as usize;
            // A flush is complete once all input is in and zlib left spare room.
            if consumed == input.len() && out.len() < out.capacity() {
                break;
            }
        }

        if out.ends_with(&DEFLATE_TRAILER) {
            out.truncate(out.len() - DEFLATE_TRAILER.len());
        }
        if self.reset_compressor {
            self.compressor.reset();
        }
        Ok(out)
    }

    /// Inflate one message payload, growing the output incrementally.
    ///
    /// # Errors
    ///
    /// - `Error::DecompressionLimit` once the output would exceed the cap
    /// - `Error::Extension` for a corrupt stream
    pub fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let max = self.max_decompressed_size;
        let mut data = Vec::with_capacity(input.len() + DEFLATE_TRAILER.len());
        data.extend_from_slice(input);
        data.extend_from_slice(&DEFLATE_TRAILER);

        let start_in = self.decompressor.total_in();
        let mut out: Vec<u8> = Vec::with_capacity(input.len().saturating_mul(2).clamp(64, max.max(64)));
        let mut stream_ended = false;

        loop {
            if out.len() > max {
                return Err(Error::DecompressionLimit { max });
            }
            if out.len() == out.capacity() {
                let room = (max + 1).saturating_sub(out.len());
                out.reserve_exact(out.len().max(OUTPUT_CHUNK).min(room));
            }

            let consumed_before = (self.decompressor.total_in() - start_in) as usize;
            let produced_before = out.len();
            let status = self
                .decompressor
                .decompress_vec(&data[consumed_before..], &mut out, FlushDecompress::Sync)
                .map_err(|e| Error::Extension(format!("Decompression failed: {e}")))?;
            let consumed = (self.decompressor.total_in() - start_in) as usize;

            if status == Status::StreamEnd {
                stream_ended = true;
                break;
            }
            if consumed == data.len() && out.len() < out.capacity() {
                break;
            }
            if consumed == consumed_before
                && out.len() == produced_before
                && out.len() < out.capacity()
            {
                return Err(Error::Extension("Decompression made no progress".into()));
            }
        }

        if out.len() > max {
            return Err(Error::DecompressionLimit { max });
        }
        // A final block ends the stream; the next message starts a fresh one.
        if self.reset_decompressor || stream_ended {
            self.decompressor.reset(false);
        }
        trace!(compressed = input.len(), inflated = out.len(), "inflated message");
        Ok(out)
    }
}

impl Extension for DeflateExtension {
    fn name(&self) -> &str {
        EXTENSION_NAME
    }

    fn rsv_bits(&self) -> RsvBits {
        RsvBits::RSV1
    }

    fn encode(&mut self, message: &mut DataMessage) -> Result<()> {
        message.payload = self.compress(&message.payload)?;
        message.rsv.rsv1 = true;
        Ok(())
    }

    fn decode(&mut self, message: &mut DataMessage) -> Result<()> {
        if !message.rsv.rsv1 {
            return Ok(());
        }
        message.payload = self.decompress(&message.payload)?;
        message.rsv.rsv1 = false;
        Ok(())
    }
}

/// Creates a [`DeflateExtension`] for every connection that offers it.
#[derive(Debug, Clone)]
pub struct DeflateFactory {
    config: DeflateConfig,
    max_decompressed_size: usize,
}

impl DeflateFactory {
    /// Create a server-side factory.
    #[must_use]
    pub fn new(config: DeflateConfig, max_decompressed_size: usize) -> Self {
        Self {
            config,
            max_decompressed_size,
        }
    }
}

impl ExtensionFactory for DeflateFactory {
    fn name(&self) -> &str {
        EXTENSION_NAME
    }

    fn rsv_bits(&self) -> RsvBits {
        RsvBits::RSV1
    }

    fn accept(&self, offer: &ExtensionOffer) -> Option<Negotiated> {
        let (params, response) = self.config.negotiate(offer)?;
        Some(Negotiated {
            extension: Box::new(DeflateExtension::new(
                Role::Server,
                &params,
                self.config.compression_level,
                self.max_decompressed_size,
            )),
            response,
        })
    }
}
