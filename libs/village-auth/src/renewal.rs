use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use thiserror::Error;
use village_http::HttpError;

use crate::secret::XsrfToken;

/// The signed-in user, as established by the last successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    /// Token issued with the login response, if the server sent one.
    pub token: Option<XsrfToken>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<XsrfToken>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Why a re-authentication was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReAuthReason {
    /// 401: the session is gone, a full login is needed.
    Unauthorized,
    /// 403: the anti-forgery token is stale, a probe request refreshes it.
    Forbidden,
}

impl ReAuthReason {
    /// Classify a response status; `None` for anything but 401/403.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Option<Self> {
        match status {
            StatusCode::UNAUTHORIZED => Some(Self::Unauthorized),
            StatusCode::FORBIDDEN => Some(Self::Forbidden),
            _ => None,
        }
    }
}

impl fmt::Display for ReAuthReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => f.write_str("unauthorized"),
            Self::Forbidden => f.write_str("forbidden"),
        }
    }
}

/// Login failure reported by a [`SessionRenewal`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RenewalError {
    /// The identity provider refused the login
    #[error("login rejected: {reason}")]
    Rejected { reason: String },

    /// The login exchange could not be completed
    #[error("login request failed: {0}")]
    Http(#[from] HttpError),
}

/// Login flow invoked on a 401.
///
/// Implementations typically replay stored credentials or an SSO refresh
/// against the identity endpoint and return the new session.
#[async_trait]
pub trait SessionRenewal: Send + Sync + 'static {
    /// # Errors
    /// Returns `RenewalError` if a new session could not be established.
    async fn login(&self) -> Result<Session, RenewalError>;
}

#[async_trait]
impl<T: SessionRenewal + ?Sized> SessionRenewal for Arc<T> {
    async fn login(&self) -> Result<Session, RenewalError> {
        (**self).login().await
    }
}
