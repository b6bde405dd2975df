//! WebSocket opening handshake (RFC 6455 Section 4).
//!
//! Server side: [`HandshakeRequest::parse`] and [`HandshakeRequest::validate`]
//! check the client's HTTP Upgrade request, [`HandshakeResponse::write`]
//! produces the `101 Switching Protocols` reply and [`reject_response`] the
//! error reply. The client side (request builder and response parser) is used
//! by client-role connections and tests.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::extensions::ExtensionOffer;

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this implementation speaks.
pub const WS_VERSION: u8 = 13;

/// Headers that must appear at most once in a request.
const SINGLE_VALUE_HEADERS: [&str; 5] = [
    "host",
    "upgrade",
    "connection",
    "sec-websocket-key",
    "sec-websocket-version",
];

/// Headers whose repeated occurrences are joined with `", "`.
const LIST_HEADERS: [&str; 2] = ["sec-websocket-protocol", "sec-websocket-extensions"];

/// Return the offset just past the `\r\n\r\n` that terminates the HTTP head.
///
/// Bytes after that offset belong to the WebSocket stream.
#[must_use]
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Parse header lines into a map keyed by lowercase name.
fn parse_headers<'a, I>(lines: I, reject_duplicates: bool) -> Result<HashMap<String, String>>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers: HashMap<String, String> = HashMap::new();

    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(Error::InvalidHandshake(format!("Malformed header line: {line}")));
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();

        match headers.get_mut(&name) {
            Some(existing) if LIST_HEADERS.contains(&name.as_str()) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            Some(_) if reject_duplicates && SINGLE_VALUE_HEADERS.contains(&name.as_str()) => {
                return Err(Error::InvalidHandshake(format!("Duplicate header: {name}")));
            }
            _ => {
                headers.insert(name, value.to_string());
            }
        }
    }

    Ok(headers)
}

fn required<'h>(headers: &'h HashMap<String, String>, name: &str, display: &str) -> Result<&'h str> {
    headers
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidHandshake(format!("Missing {display} header")))
}

fn split_list(value: Option<&String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn has_token(value: &str, token: &str) -> bool {
    value.split(',').any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Reject header values that could inject extra header lines.
fn validate_header_value(header: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(Error::InvalidHeaderValue {
            header: header.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

/// Compute the Sec-WebSocket-Accept value: `base64(SHA-1(key ++ GUID))`.
///
/// ```
/// use wsserve::protocol::handshake::compute_accept_key;
///
/// assert_eq!(
///     compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Check the `Origin` header against an allow-list.
///
/// An empty allow-list accepts any origin, including none.
///
/// # Errors
///
/// Returns `Error::OriginNotAllowed` if the list is non-empty and `origin` is
/// missing or not listed.
pub fn validate_origin(origin: Option<&str>, allowed: &[String]) -> Result<()> {
    if allowed.is_empty() {
        return Ok(());
    }

    match origin {
        Some(o) if allowed.iter().any(|a| a.eq_ignore_ascii_case(o)) => Ok(()),
        Some(o) => Err(Error::OriginNotAllowed {
            origin: o.to_string(),
        }),
        None => Err(Error::OriginNotAllowed {
            origin: "(none)".to_string(),
        }),
    }
}

/// Parsed WebSocket handshake request from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// The request target (e.g. "/chat").
    pub path: String,
    /// The Host header value.
    pub host: String,
    /// The Sec-WebSocket-Key header value.
    pub key: String,
    /// The Sec-WebSocket-Version header value.
    pub version: u8,
    /// The Origin header value, if present.
    pub origin: Option<String>,
    /// Offered subprotocols, in client preference order.
    pub protocols: Vec<String>,
    /// Raw Sec-WebSocket-Extensions value, all occurrences joined.
    pub extensions: Option<String>,
}

impl HandshakeRequest {
    /// Parse the HTTP head of an upgrade request.
    ///
    /// `data` must hold the complete head; trailing bytes after the blank
    /// line are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` for a malformed request line, a method
    /// other than `GET`, a version other than `HTTP/1.1`, a duplicated
    /// security-critical header, or a missing/invalid `Host`, `Upgrade`,
    /// `Connection`, `Sec-WebSocket-Key` or `Sec-WebSocket-Version` header.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let head = match find_header_end(data) {
            Some(end) => &data[..end],
            None => data,
        };
        let text = std::str::from_utf8(head)
            .map_err(|_| Error::InvalidHandshake("Request head is not UTF-8".into()))?;

        let mut lines = text.split("\r\n");

        let request_line = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| Error::InvalidHandshake("Empty request".into()))?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let &[method, target, http_version] = parts.as_slice() else {
            return Err(Error::InvalidHandshake(format!(
                "Invalid request line: {request_line}"
            )));
        };
        if method != "GET" {
            return Err(Error::InvalidHandshake(format!(
                "Expected GET method, got {method}"
            )));
        }
        if http_version != "HTTP/1.1" {
            return Err(Error::InvalidHandshake(format!(
                "Expected HTTP/1.1, got {http_version}"
            )));
        }

        let headers = parse_headers(lines, true)?;

        let upgrade = required(&headers, "upgrade", "Upgrade")?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }

        let connection = required(&headers, "connection", "Connection")?;
        if !has_token(connection, "upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }

        let host = required(&headers, "host", "Host")?.to_string();
        let key = required(&headers, "sec-websocket-key", "Sec-WebSocket-Key")?.to_string();
        let version_str = required(&headers, "sec-websocket-version", "Sec-WebSocket-Version")?;
        let version: u8 = version_str
            .parse()
            .map_err(|_| Error::InvalidHandshake(format!("Invalid version: {version_str}")))?;

        Ok(Self {
            path: target.to_string(),
            host,
            key,
            version,
            origin: headers.get("origin").cloned(),
            protocols: split_list(headers.get("sec-websocket-protocol")),
            extensions: headers.get("sec-websocket-extensions").cloned(),
        })
    }

    /// Apply the RFC 6455 Section 4.2.1 checks that need decoded values.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the version is not 13, the key is
    /// not base64 for exactly 16 bytes, or the Host header is empty.
    pub fn validate(&self) -> Result<()> {
        if self.version != WS_VERSION {
            return Err(Error::InvalidHandshake(format!(
                "Unsupported WebSocket version: {} (expected 13)",
                self.version
            )));
        }

        let decoded = BASE64.decode(&self.key).map_err(|_| {
            Error::InvalidHandshake("Invalid Sec-WebSocket-Key: not valid Base64".into())
        })?;
        if decoded.len() != 16 {
            return Err(Error::InvalidHandshake(format!(
                "Sec-WebSocket-Key must be 16 bytes, got {}",
                decoded.len()
            )));
        }

        if self.host.is_empty() {
            return Err(Error::InvalidHandshake("Host header cannot be empty".into()));
        }

        Ok(())
    }

    /// Parse the offered extensions.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidExtension` for a malformed header.
    pub fn extension_offers(&self) -> Result<Vec<ExtensionOffer>> {
        match &self.extensions {
            Some(header) => ExtensionOffer::parse_header(header),
            None => Ok(Vec::new()),
        }
    }
}

/// WebSocket handshake response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
    /// The selected subprotocol.
    pub protocol: Option<String>,
    /// The accepted Sec-WebSocket-Extensions value.
    pub extensions: Option<String>,
}

impl HandshakeResponse {
    /// Build the accepting response for `req`.
    #[must_use]
    pub fn accept(req: &HandshakeRequest, protocol: Option<String>, extensions: Option<String>) -> Self {
        Self {
            accept: compute_accept_key(&req.key),
            protocol,
            extensions: extensions.filter(|e| !e.is_empty()),
        }
    }

    /// Serialize the `101 Switching Protocols` response.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` if a protocol or extension value
    /// contains CR or LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());

        if let Some(proto) = &self.protocol {
            validate_header_value("Sec-WebSocket-Protocol", proto)?;
            buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {proto}\r\n").as_bytes());
        }

        if let Some(ext) = &self.extensions {
            validate_header_value("Sec-WebSocket-Extensions", ext)?;
            buf.extend_from_slice(format!("Sec-WebSocket-Extensions: {ext}\r\n").as_bytes());
        }

        buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Parse a server's handshake response (client side).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the status is not 101 or the
    /// `Upgrade`, `Connection` or `Sec-WebSocket-Accept` headers are missing
    /// or wrong.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let head = match find_header_end(data) {
            Some(end) => &data[..end],
            None => data,
        };
        let text = std::str::from_utf8(head)
            .map_err(|_| Error::InvalidHandshake("Response head is not UTF-8".into()))?;

        let mut lines = text.split("\r\n");
        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;
        if !status_line.starts_with("HTTP/1.1 101") {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got: {status_line}"
            )));
        }

        let headers = parse_headers(lines, false)?;

        let upgrade = required(&headers, "upgrade", "Upgrade")?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }
        let connection = required(&headers, "connection", "Connection")?;
        if !has_token(connection, "upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }

        Ok(Self {
            accept: required(&headers, "sec-websocket-accept", "Sec-WebSocket-Accept")?.to_string(),
            protocol: headers.get("sec-websocket-protocol").cloned(),
            extensions: headers.get("sec-websocket-extensions").cloned(),
        })
    }

    /// Check the accept value against the key the client sent.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` on mismatch.
    pub fn verify(&self, key: &str) -> Result<()> {
        if self.accept != compute_accept_key(key) {
            return Err(Error::InvalidHandshake(
                "Sec-WebSocket-Accept does not match the request key".into(),
            ));
        }
        Ok(())
    }
}

/// Generate a random Sec-WebSocket-Key (16 random bytes, base64).
///
/// # Errors
///
/// Returns `Error::Io` if the OS random source fails.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(nonce))
}

/// Build a client upgrade request.
#[must_use]
pub fn client_request(
    host: &str,
    path: &str,
    key: &str,
    protocols: &[&str],
    extensions: Option<&str>,
) -> Vec<u8> {
    let mut request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: {WS_VERSION}\r\n"
    );
    if !protocols.is_empty() {
        request.push_str(&format!("Sec-WebSocket-Protocol: {}\r\n", protocols.join(", ")));
    }
    if let Some(ext) = extensions {
        request.push_str(&format!("Sec-WebSocket-Extensions: {ext}\r\n"));
    }
    request.push_str("\r\n");
    request.into_bytes()
}

/// Build the HTTP error response sent before dropping a rejected handshake.
///
/// Origin rejections get `403 Forbidden`; everything else gets
/// `400 Bad Request`. Version mismatches advertise the supported version
/// (RFC 6455 Section 4.4).
#[must_use]
pub fn reject_response(err: &Error) -> Vec<u8> {
    let status = match err {
        Error::OriginNotAllowed { .. } => "403 Forbidden",
        _ => "400 Bad Request",
    };
    let mut response = format!("HTTP/1.1 {status}\r\nConnection: close\r\nContent-Length: 0\r\n");
    if matches!(err, Error::InvalidHandshake(msg) if msg.contains("version")) {
        response.push_str(&format!("Sec-WebSocket-Version: {WS_VERSION}\r\n"));
    }
    response.push_str("\r\n");
    response.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_REQUEST: &[u8] = b"GET /chat HTTP/1.1\r\n\
        Host: server.example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\
        Origin: http://example.com\r\n\
        Sec-WebSocket-Protocol: chat, superchat\r\n\
        \r\n";

    fn request_without(header: &str) -> Vec<u8> {
        let text = std::str::from_utf8(VALID_REQUEST).unwrap();
        text.split("\r\n")
            .filter(|line| !line.starts_with(header))
            .collect::<Vec<_>>()
            .join("\r\n")
            .into_bytes()
    }

    #[test]
    fn test_compute_accept_key_rfc_example() {
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n\r\n"), Some(18));
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\nHost: x\r\n"), None);
        let with_trailing = b"GET / HTTP/1.1\r\n\r\n\x81\x80";
        assert_eq!(&with_trailing[find_header_end(with_trailing).unwrap()..], b"\x81\x80");
    }

    #[test]
    fn test_parse_valid_request() {
        let req = HandshakeRequest::parse(VALID_REQUEST).unwrap();
        assert_eq!(req.path, "/chat");
        assert_eq!(req.host, "server.example.com");
        assert_eq!(req.key, "dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(req.version, 13);
        assert_eq!(req.origin.as_deref(), Some("http://example.com"));
        assert_eq!(req.protocols, vec!["chat", "superchat"]);
        assert_eq!(req.extensions, None);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_parse_ignores_bytes_after_head() {
        let mut data = VALID_REQUEST.to_vec();
        data.extend_from_slice(&[0x81, 0x85, 0xff, 0xfe]);
        assert!(HandshakeRequest::parse(&data).is_ok());
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let request = b"GET / HTTP/1.1\r\n\
            HOST: a\r\n\
            upgrade: WebSocket\r\n\
            connection: keep-alive, Upgrade\r\n\
            sec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            SEC-WEBSOCKET-VERSION: 13\r\n\r\n";
        let req = HandshakeRequest::parse(request).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_missing_required_headers() {
        for header in [
            "Host",
            "Upgrade",
            "Connection",
            "Sec-WebSocket-Key",
            "Sec-WebSocket-Version",
        ] {
            let result = HandshakeRequest::parse(&request_without(header));
            assert!(
                matches!(&result, Err(Error::InvalidHandshake(msg)) if msg.contains(header)),
                "{header}: {result:?}"
            );
        }
    }

    #[test]
    fn test_rejects_non_get_and_old_http() {
        let post = b"POST / HTTP/1.1\r\nHost: a\r\n\r\n";
        assert!(matches!(HandshakeRequest::parse(post), Err(Error::InvalidHandshake(_))));
        let http10 = b"GET / HTTP/1.0\r\nHost: a\r\n\r\n";
        assert!(matches!(HandshakeRequest::parse(http10), Err(Error::InvalidHandshake(_))));
    }

    #[test]
    fn test_connection_header_needs_upgrade_token() {
        let request = b"GET / HTTP/1.1\r\n\
            Host: a\r\n\
            Upgrade: websocket\r\n\
            Connection: keep-alive, notupgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Version: 13\r\n\r\n";
        assert!(matches!(
            HandshakeRequest::parse(request),
            Err(Error::InvalidHandshake(msg)) if msg.contains("Connection")
        ));
    }

    #[test]
    fn test_duplicate_security_header_rejected() {
        let request = b"GET / HTTP/1.1\r\n\
            Host: a\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Key: AAAAAAAAAAAAAAAAAAAAAA==\r\n\
            Sec-WebSocket-Version: 13\r\n\r\n";
        assert!(matches!(
            HandshakeRequest::parse(request),
            Err(Error::InvalidHandshake(msg)) if msg.contains("Duplicate")
        ));
    }

    #[test]
    fn test_repeated_list_headers_are_joined() {
        let request = b"GET / HTTP/1.1\r\n\
            Host: a\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Version: 13\r\n\
            Sec-WebSocket-Protocol: chat\r\n\
            Sec-WebSocket-Protocol: superchat\r\n\
            Sec-WebSocket-Extensions: permessage-deflate\r\n\
            Sec-WebSocket-Extensions: x-custom; a=1\r\n\r\n";
        let req = HandshakeRequest::parse(request).unwrap();
        assert_eq!(req.protocols, vec!["chat", "superchat"]);
        let offers = req.extension_offers().unwrap();
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].name, "permessage-deflate");
        assert_eq!(offers[1].name, "x-custom");
    }

    #[test]
    fn test_validate_rejects_wrong_version() {
        let mut req = HandshakeRequest::parse(VALID_REQUEST).unwrap();
        req.version = 8;
        assert!(matches!(req.validate(), Err(Error::InvalidHandshake(msg)) if msg.contains("version")));
    }

    #[test]
    fn test_validate_rejects_bad_keys() {
        let mut req = HandshakeRequest::parse(VALID_REQUEST).unwrap();
        req.key = "c2hvcnQ=".to_string(); // 5 bytes
        assert!(req.validate().is_err());
        req.key = "not base64!!".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_validate_origin() {
        let allowed = vec!["https://good.example".to_string()];
        assert!(validate_origin(None, &[]).is_ok());
        assert!(validate_origin(Some("anything"), &[]).is_ok());
        assert!(validate_origin(Some("https://good.example"), &allowed).is_ok());
        assert!(matches!(
            validate_origin(Some("https://evil.example"), &allowed),
            Err(Error::OriginNotAllowed { origin }) if origin == "https://evil.example"
        ));
        assert!(validate_origin(None, &allowed).is_err());
    }

    #[test]
    fn test_response_write() {
        let req = HandshakeRequest::parse(VALID_REQUEST).unwrap();
        let response = HandshakeResponse::accept(
            &req,
            Some("chat".into()),
            Some("permessage-deflate".into()),
        );
        let mut buf = Vec::new();
        response.write(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
        assert!(text.contains("Connection: Upgrade\r\n"));
        assert!(text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(text.contains("Sec-WebSocket-Protocol: chat\r\n"));
        assert!(text.contains("Sec-WebSocket-Extensions: permessage-deflate\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_response_omits_empty_extensions() {
        let req = HandshakeRequest::parse(VALID_REQUEST).unwrap();
        let response = HandshakeResponse::accept(&req, None, Some(String::new()));
        let mut buf = Vec::new();
        response.write(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains("Sec-WebSocket-Extensions"));
        assert!(!text.contains("Sec-WebSocket-Protocol"));
    }

    #[test]
    fn test_response_rejects_header_injection() {
        let req = HandshakeRequest::parse(VALID_REQUEST).unwrap();
        let response =
            HandshakeResponse::accept(&req, Some("chat\r\nSet-Cookie: x=1".into()), None);
        let mut buf = Vec::new();
        assert!(matches!(
            response.write(&mut buf),
            Err(Error::InvalidHeaderValue { header, .. }) if header == "Sec-WebSocket-Protocol"
        ));
    }

    #[test]
    fn test_client_request_roundtrip() {
        let key = generate_key().unwrap();
        let request = client_request("localhost:9000", "/ws", &key, &["chat"], Some("permessage-deflate"));
        let req = HandshakeRequest::parse(&request).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.key, key);
        assert_eq!(req.protocols, vec!["chat"]);

        let mut buf = Vec::new();
        HandshakeResponse::accept(&req, None, None).write(&mut buf).unwrap();
        let parsed = HandshakeResponse::parse(&buf).unwrap();
        assert!(parsed.verify(&key).is_ok());
        assert!(parsed.verify("dGhlIHNhbXBsZSBub25jZQ==").is_err());
    }

    #[test]
    fn test_response_parse_rejects_non_101() {
        let data = b"HTTP/1.1 400 Bad Request\r\n\r\n";
        assert!(matches!(HandshakeResponse::parse(data), Err(Error::InvalidHandshake(_))));
    }

    #[test]
    fn test_reject_response_status() {
        let forbidden = reject_response(&Error::OriginNotAllowed {
            origin: "x".into(),
        });
        assert!(forbidden.starts_with(b"HTTP/1.1 403 Forbidden\r\n"));

        let bad = reject_response(&Error::InvalidHandshake("Missing Host header".into()));
        assert!(bad.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
        assert!(!String::from_utf8_lossy(&bad).contains("Sec-WebSocket-Version"));

        let version = reject_response(&Error::InvalidHandshake(
            "Unsupported WebSocket version: 8 (expected 13)".into(),
        ));
        assert!(String::from_utf8_lossy(&version).contains("Sec-WebSocket-Version: 13\r\n"));
    }
}
