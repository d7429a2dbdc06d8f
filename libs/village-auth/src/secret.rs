use std::fmt;

use http::HeaderValue;
use http::header::InvalidHeaderValue;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Anti-forgery token the Village API hands out in its token header and
/// expects back on writes.
///
/// Formatting prints `XsrfToken(..)` only, and the buffer is wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct XsrfToken(String);

impl XsrfToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Token carried by a response header; blank values carry none.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        let value = value.trim();
        (!value.is_empty()).then(|| Self::new(value))
    }

    /// Outgoing header value, flagged sensitive so HTTP/2 never indexes it.
    ///
    /// # Errors
    /// When the token holds bytes a header cannot carry.
    pub fn header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&self.0)?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// The raw token. Not for logs.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<&str> for XsrfToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for XsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("XsrfToken(..)")
    }
}
