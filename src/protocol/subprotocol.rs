//! Subprotocol negotiation (`Sec-WebSocket-Protocol`).

use std::fmt;
use std::sync::Arc;

/// Predicate deciding whether a registered subprotocol may be selected.
pub type SubprotocolValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

struct Entry {
    name: String,
    validator: Option<SubprotocolValidator>,
}

/// Subprotocols the server is willing to speak.
///
/// Built once with [`SubprotocolRegistry::with`] and shared read-only by every
/// connection.
#[derive(Default, Clone)]
pub struct SubprotocolRegistry {
    entries: Arc<Vec<Entry>>,
}

impl SubprotocolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subprotocol that is always acceptable.
    #[must_use]
    pub fn with(self, name: impl Into<String>) -> Self {
        self.push(name.into(), None)
    }

    /// Register a subprotocol guarded by `validator`.
    ///
    /// The validator receives the offered name and may veto selection.
    #[must_use]
    pub fn with_validator<F>(self, name: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.push(name.into(), Some(Arc::new(validator)))
    }

    fn push(self, name: String, validator: Option<SubprotocolValidator>) -> Self {
        let mut entries = Arc::try_unwrap(self.entries).unwrap_or_else(|shared| {
            shared
                .iter()
                .map(|e| Entry {
                    name: e.name.clone(),
                    validator: e.validator.clone(),
                })
                .collect()
        });
        entries.retain(|e| e.name != name);
        entries.push(Entry { name, validator });
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Number of registered subprotocols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `name` is registered (exact, case-sensitive match).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Pick the first client-offered name that is registered and accepted.
    ///
    /// Offers are scanned in the client's order.
    #[must_use]
    pub fn select<S: AsRef<str>>(&self, offered: &[S]) -> Option<String> {
        offered.iter().map(AsRef::as_ref).find_map(|candidate| {
            self.entries
                .iter()
                .find(|e| e.name == candidate)
                .filter(|e| e.validator.as_ref().is_none_or(|accept| accept(candidate)))
                .map(|e| e.name.clone())
        })
    }
}

impl fmt::Debug for SubprotocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.name))
            .finish()
    }
}
