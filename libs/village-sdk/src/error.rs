use http::StatusCode;
use thiserror::Error;
use village_auth::ClientError;
use village_http::HttpError;

/// Text shown when the server gave no usable explanation.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again later.";

/// Text shown when the API could not be reached at all.
pub const CONNECTION_ERROR_MESSAGE: &str =
    "Unable to reach Village. Check your internet connection and try again.";

/// Error returned by [`RetryingRequestService`](crate::RetryingRequestService)
/// and the pagination engines.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// The server could not be reached, retries included
    #[error("connection failed after {attempts} attempt(s): {source}")]
    ConnectionFailed {
        attempts: u32,
        #[source]
        source: HttpError,
    },

    /// The session could not be recovered
    #[error("re-authentication failed: {reason}")]
    ReAuthenticationFailed { reason: String },

    #[error("request cancelled")]
    Cancelled,

    /// Non-2xx response carrying an error envelope
    #[error("API error {status}: {message}")]
    Api { status: StatusCode, message: String },

    /// Non-2xx response without a readable error envelope
    #[error("API error {status}")]
    ApiUnknown { status: StatusCode },

    /// 2xx response whose body does not match the expected type
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    /// The request could not be built or sent for a reason retries won't fix
    #[error(transparent)]
    Request(HttpError),
}

impl ApiError {
    /// Message suitable for showing to an end user.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::Api { message, .. } => message,
            Self::ConnectionFailed { .. } => CONNECTION_ERROR_MESSAGE,
            _ => GENERIC_ERROR_MESSAGE,
        }
    }

    /// HTTP status of the failed response, when there was one.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } | Self::ApiUnknown { status } => Some(*status),
            _ => None,
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Transport(source) if source.is_connectivity() => Self::ConnectionFailed {
                attempts: 1,
                source,
            },
            ClientError::Transport(source) | ClientError::Config(source) => Self::Request(source),
            ClientError::ReAuthenticationFailed { reason } => {
                Self::ReAuthenticationFailed { reason }
            }
            ClientError::Cancelled => Self::Cancelled,
        }
    }
}
