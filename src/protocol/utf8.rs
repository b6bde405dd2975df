//! UTF-8 validation for text messages and close reasons.
//!
//! Text payloads are validated once the whole message is reassembled (and
//! inflated, when compression is negotiated), so a single pure check is
//! enough.

use crate::error::{Error, Result};

/// Validate that `data` is well-formed UTF-8.
///
/// Overlong encodings (such as `0xC0 0x80`), surrogates and truncated
/// sequences are all rejected.
///
/// # Errors
///
/// Returns `Error::InvalidUtf8` on the first invalid sequence.
#[inline]
pub fn validate_utf8(data: &[u8]) -> Result<()> {
    if data.is_ascii() {
        return Ok(());
    }
    std::str::from_utf8(data).map(|_| ()).map_err(|_| Error::InvalidUtf8)
}

/// Validate `data` and return it as a `String` without copying.
///
/// # Errors
///
/// Returns `Error::InvalidUtf8` if `data` is not valid UTF-8.
pub fn into_utf8_string(data: Vec<u8>) -> Result<String> {
    String::from_utf8(data).map_err(|_| Error::InvalidUtf8)
}
