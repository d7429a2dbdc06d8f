use std::time::Duration;
use thiserror::Error;

/// Why a base URL or request path was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// Not a URL at all
    ParseError,
    /// Base URL cannot carry a path (e.g. `mailto:`)
    CannotBeABase,
    /// No host to connect to
    MissingAuthority,
}

/// Failure to exchange a request with the API.
///
/// An `HttpError` means no usable HTTP response was obtained. Non-2xx
/// statuses are *not* errors at this layer: they travel back to the caller
/// as a normal [`TransportResponse`](crate::TransportResponse).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    #[error("cannot build HTTP request: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("bad header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("bad header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// No response within the configured request timeout
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// Connection refused or reset, DNS failure, broken pipe
    #[error("network failure: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("TLS setup failed: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The response body was larger than `max_body_size`
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Request body could not be serialized
    #[error("cannot encode JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot encode query string: {0}")]
    QueryEncode(#[from] serde_urlencoded::ser::Error),

    /// `reason` is for logs; match on `kind`
    #[error("unusable URL `{url}`: {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    /// Scheme refused, e.g. plain `http` without the opt-in
    #[error("scheme `{scheme}` refused: {reason}")]
    InvalidScheme { scheme: String, reason: String },
}

impl HttpError {
    /// Whether the failure means the server was never reached (or never
    /// answered): the only class of failure that is worth retrying blindly.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        Self::Transport(err.into())
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        Self::Transport(err.into())
    }
}
