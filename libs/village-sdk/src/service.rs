use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use village_auth::{AuthTokenStore, AuthenticatingClient, ClientError, SessionRenewal};
use village_http::{HyperTransport, RequestTarget, TransportResponse};

use crate::config::VillageConfig;
use crate::decoder::ResponseDecoder;
use crate::error::ApiError;

/// Fixed-delay retry on connectivity failures.
///
/// Only failures where no HTTP response was obtained (connection refused,
/// DNS, timeout) are retried. Error statuses and re-authentication failures
/// are returned immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Pause before each retry
    #[serde(with = "village_http::humantime_serde")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retry.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }
}

/// Decoded API calls on top of an [`AuthenticatingClient`].
///
/// ```ignore
/// let service = RetryingRequestService::new(client, RetryPolicy::default());
/// let me: Person = service.request(RequestTarget::get("people/1.0/me")).await?;
/// ```
#[derive(Debug, Clone)]
pub struct RetryingRequestService {
    client: AuthenticatingClient,
    policy: RetryPolicy,
}

impl RetryingRequestService {
    #[must_use]
    pub fn new(client: AuthenticatingClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Full stack from configuration: [`HyperTransport`], then
    /// [`AuthenticatingClient`], then retries.
    ///
    /// # Errors
    /// `ApiError::Request` if the base URL, TLS setup or header names in
    /// `config` are unusable.
    pub fn from_config(
        config: &VillageConfig,
        store: Arc<AuthTokenStore>,
        renewal: impl SessionRenewal,
    ) -> Result<Self, ApiError> {
        let transport = HyperTransport::new(config.http.clone()).map_err(ApiError::Request)?;
        let client = AuthenticatingClient::new(transport, store, renewal, config.auth.clone())?;
        Ok(Self::new(client, config.retry.clone()))
    }

    #[must_use]
    pub fn client(&self) -> &AuthenticatingClient {
        &self.client
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `target` and decode the 2xx body into `R`.
    ///
    /// # Errors
    /// See [`ApiError`].
    pub async fn request<R: DeserializeOwned>(&self, target: RequestTarget) -> Result<R, ApiError> {
        let response = self.execute(target).await?;
        ResponseDecoder::decode(&response)
    }

    /// Like [`request`](Self::request) for untyped JSON.
    ///
    /// # Errors
    /// See [`ApiError`].
    pub async fn request_value(&self, target: RequestTarget) -> Result<serde_json::Value, ApiError> {
        self.request(target).await
    }

    /// Send `target` with connectivity retries and return the raw response,
    /// whatever its status.
    ///
    /// # Errors
    /// `ApiError::ConnectionFailed` once the retry budget is spent, or the
    /// mapped [`ClientError`] for any other failure.
    pub async fn execute(&self, target: RequestTarget) -> Result<TransportResponse, ApiError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.client.send(target.clone()).await {
                Ok(response) => return Ok(response),
                Err(ClientError::Transport(err)) if err.is_connectivity() => {
                    if attempt > self.policy.max_retries {
                        tracing::warn!(
                            path = %target.path(),
                            attempts = attempt,
                            error = %err,
                            "giving up after connectivity failures"
                        );
                        return Err(ApiError::ConnectionFailed {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    tracing::debug!(
                        path = %target.path(),
                        retry = attempt,
                        delay = ?self.policy.delay,
                        error = %err,
                        "connectivity failure, retrying"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
