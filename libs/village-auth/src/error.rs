use thiserror::Error;
use village_http::HttpError;

/// Failure of an [`AuthenticatingClient`](crate::AuthenticatingClient) request.
///
/// 401 and 403 never show up here directly: the client absorbs them and
/// reports [`ReAuthenticationFailed`](Self::ReAuthenticationFailed) only when
/// the recovery itself fails.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No HTTP response was obtained
    #[error(transparent)]
    Transport(#[from] HttpError),

    /// Login or token probe failed, or a replayed request was rejected again
    #[error("re-authentication failed: {reason}")]
    ReAuthenticationFailed { reason: String },

    /// The request was cancelled by its caller
    #[error("request cancelled")]
    Cancelled,

    /// A configured header name or value is not valid HTTP
    #[error("invalid auth client configuration: {0}")]
    Config(#[source] HttpError),
}

impl ClientError {
    pub(crate) fn reauth_failed(reason: impl Into<String>) -> Self {
        Self::ReAuthenticationFailed {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same request might succeed without user action.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_connectivity())
    }
}
