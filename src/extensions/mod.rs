//! WebSocket extension framework (RFC 6455 Section 9).
//!
//! An [`ExtensionRegistry`] holds one [`ExtensionFactory`] per supported
//! extension. During the handshake the registry matches the client's
//! `Sec-WebSocket-Extensions` offers against its factories and produces an
//! [`ExtensionChain`]: fresh per-connection [`Extension`] instances plus the
//! response header value. Extensions transform whole data messages, so
//! outgoing payloads are encoded before fragmentation and incoming payloads
//! are decoded after reassembly.
//!
//! ```rust,ignore
//! let mut registry = ExtensionRegistry::new();
//! registry.register(DeflateFactory::new(DeflateConfig::default(), limits))?;
//!
//! let offers = ExtensionOffer::parse_header("permessage-deflate; client_max_window_bits")?;
//! let mut chain = registry.negotiate(&offers);
//! assert_eq!(chain.response_header().as_deref(), Some("permessage-deflate"));
//! ```

pub mod deflate;

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::DataMessage;

/// Represents a single extension parameter.
///
/// For example `client_max_window_bits=15` or the flag
/// `server_no_context_takeover`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionParam {
    /// Parameter name (e.g., "client_max_window_bits").
    pub name: String,
    /// Optional parameter value. None for boolean parameters.
    pub value: Option<String>,
}

impl ExtensionParam {
    /// Create a new parameter with a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Create a boolean/flag parameter (no value).
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Parse `param=value`, `param="value"` or `param`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.split_once('=') {
            Some((name, value)) => Self {
                name: name.trim().to_string(),
                value: Some(value.trim().trim_matches('"').to_string()),
            },
            None => Self::flag(s),
        }
    }
}

impl fmt::Display for ExtensionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}

/// One entry of a `Sec-WebSocket-Extensions` header.
///
/// For example: `permessage-deflate; client_max_window_bits=15`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionOffer {
    /// Extension name (e.g., "permessage-deflate").
    pub name: String,
    /// Extension parameters.
    pub params: Vec<ExtensionParam>,
}

impl ExtensionOffer {
    /// Create a new extension offer with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Create a new extension offer with parameters.
    pub fn with_params(name: impl Into<String>, params: Vec<ExtensionParam>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Parse a single offer: `extension-name; param1=value1; param2`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExtension`] if the extension name is empty.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(';');
        let name = parts.next().unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidExtension("Empty extension name".into()));
        }

        let params = parts
            .filter(|p| !p.trim().is_empty())
            .map(ExtensionParam::parse)
            .collect();

        Ok(Self { name, params })
    }

    /// Parse a full header value: offers are comma-separated, parameters
    /// semicolon-separated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExtension`] if any offer is invalid.
    pub fn parse_header(header: &str) -> Result<Vec<Self>> {
        header
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| Self::parse(s.trim()))
            .collect()
    }

    /// Get a parameter by name.
    pub fn get_param(&self, name: &str) -> Option<&ExtensionParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Check if a parameter is present.
    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }
}

impl fmt::Display for ExtensionOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for param in &self.params {
            write!(f, "; {param}")?;
        }
        Ok(())
    }
}

/// RSV bit usage declaration for extensions.
///
/// Extensions declare which RSV bits they use so conflicts are caught when
/// the registry is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RsvBits {
    /// RSV1 (permessage-deflate).
    pub rsv1: bool,
    /// RSV2.
    pub rsv2: bool,
    /// RSV3.
    pub rsv3: bool,
}

impl RsvBits {
    /// No RSV bits used.
    pub const NONE: Self = Self {
        rsv1: false,
        rsv2: false,
        rsv3: false,
    };

    /// RSV1 only (used by permessage-deflate).
    pub const RSV1: Self = Self {
        rsv1: true,
        rsv2: false,
        rsv3: false,
    };

    /// Check if any bits conflict with another declaration.
    #[must_use]
    pub fn conflicts_with(&self, other: &RsvBits) -> bool {
        (self.rsv1 && other.rsv1) || (self.rsv2 && other.rsv2) || (self.rsv3 && other.rsv3)
    }

    /// Bitwise union of two declarations.
    #[must_use]
    pub fn union(self, other: RsvBits) -> RsvBits {
        RsvBits {
            rsv1: self.rsv1 || other.rsv1,
            rsv2: self.rsv2 || other.rsv2,
            rsv3: self.rsv3 || other.rsv3,
        }
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

/// A negotiated extension bound to one connection.
///
/// Instances own per-connection state (such as compression contexts) and are
/// never shared between connections.
pub trait Extension: Send {
    /// Extension name as it appears in the handshake.
    fn name(&self) -> &str;

    /// RSV bits this extension may set on the first frame of a message.
    fn rsv_bits(&self) -> RsvBits {
        RsvBits::NONE
    }

    /// Transform an outgoing data message before fragmentation.
    ///
    /// # Errors
    ///
    /// Returns `Error::Extension` if the transformation fails.
    fn encode(&mut self, message: &mut DataMessage) -> Result<()>;

    /// Reverse the transformation on a reassembled incoming message.
    ///
    /// An extension that undoes its transformation must clear its RSV bits
    /// on `message`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Extension` for corrupt input or a resource error if
    /// the decoded message exceeds a configured cap.
    fn decode(&mut self, message: &mut DataMessage) -> Result<()>;
}

/// Result of a factory accepting an offer.
pub struct Negotiated {
    /// Fresh per-connection instance.
    pub extension: Box<dyn Extension>,
    /// Parameters echoed in the response header.
    pub response: ExtensionOffer,
}

/// Creates per-connection [`Extension`] instances during the handshake.
pub trait ExtensionFactory: Send + Sync {
    /// Extension name matched against client offers.
    fn name(&self) -> &str;

    /// RSV bits the produced extensions use.
    fn rsv_bits(&self) -> RsvBits;

    /// Accept or decline one client offer.
    ///
    /// `None` declines this offer; the registry then tries the client's next
    /// offer for the same extension, if any.
    fn accept(&self, offer: &ExtensionOffer) -> Option<Negotiated>;
}

/// Registry of supported extensions.
///
/// Populated before the server starts and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    factories: Vec<Arc<dyn ExtensionFactory>>,
}

impl ExtensionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a factory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExtension`] if the name is already registered
    /// or its RSV bits conflict with an existing factory.
    pub fn register(&mut self, factory: impl ExtensionFactory + 'static) -> Result<()> {
        for existing in &self.factories {
            if existing.name() == factory.name() {
                return Err(Error::InvalidExtension(format!(
                    "Extension {} already registered",
                    factory.name()
                )));
            }
            if existing.rsv_bits().conflicts_with(&factory.rsv_bits()) {
                return Err(Error::InvalidExtension(format!(
                    "Extension {} RSV bits conflict with {}",
                    factory.name(),
                    existing.name()
                )));
            }
        }
        self.factories.push(Arc::new(factory));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn with(mut self, factory: impl ExtensionFactory + 'static) -> Result<Self> {
        self.register(factory)?;
        Ok(self)
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if no factory is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Match client offers against the registered factories.
    ///
    /// Offers are processed in client order; each extension is accepted at
    /// most once. Unknown extensions and declined offers are skipped.
    pub fn negotiate(&self, offers: &[ExtensionOffer]) -> ExtensionChain {
        let mut chain = ExtensionChain::default();

        for offer in offers {
            if chain.contains(&offer.name) {
                continue;
            }
            let Some(factory) = self.factories.iter().find(|f| f.name() == offer.name) else {
                continue;
            };
            if let Some(negotiated) = factory.accept(offer) {
                chain.push(negotiated);
            }
        }

        chain
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field(
                "factories",
                &self.factories.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// The extensions negotiated for one connection, in response order.
#[derive(Default)]
pub struct ExtensionChain {
    extensions: Vec<Box<dyn Extension>>,
    response: Vec<ExtensionOffer>,
}

impl ExtensionChain {
    fn push(&mut self, negotiated: Negotiated) {
        self.extensions.push(negotiated.extension);
        self.response.push(negotiated.response);
    }

    fn contains(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e.name() == name)
    }

    /// Returns `true` if nothing was negotiated.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Names of the negotiated extensions.
    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    /// Union of the RSV bits claimed by the negotiated extensions.
    pub fn rsv_bits(&self) -> RsvBits {
        self.extensions
            .iter()
            .fold(RsvBits::NONE, |acc, e| acc.union(e.rsv_bits()))
    }

    /// `Sec-WebSocket-Extensions` response value, if anything was accepted.
    pub fn response_header(&self) -> Option<String> {
        if self.response.is_empty() {
            return None;
        }
        Some(
            self.response
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    /// Run every extension's encoder, in negotiation order.
    ///
    /// # Errors
    ///
    /// Propagates the first extension error.
    pub fn encode(&mut self, message: &mut DataMessage) -> Result<()> {
        for ext in &mut self.extensions {
            ext.encode(message)?;
        }
        Ok(())
    }

    /// Run every extension's decoder, in reverse negotiation order.
    ///
    /// # Errors
    ///
    /// Propagates the first extension error, and returns
    /// `Error::ReservedBitsSet` if an RSV bit survives decoding.
    pub fn decode(&mut self, message: &mut DataMessage) -> Result<()> {
        for ext in self.extensions.iter_mut().rev() {
            ext.decode(message)?;
        }
        if !message.rsv.is_empty() {
            return Err(Error::ReservedBitsSet);
        }
        Ok(())
    }
}

impl fmt::Debug for ExtensionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionChain")
            .field("extensions", &self.names())
            .field("response", &self.response_header())
            .finish()
    }
}
