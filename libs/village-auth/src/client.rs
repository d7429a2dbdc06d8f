//! Re-authenticating request client.
//!
//! Every authorized request goes through [`AuthenticatingClient`]. When the
//! server answers 401 or 403 the client parks the request, runs a single
//! recovery (login for 401, token probe for 403) and then replays or fails
//! everything that was parked in the meantime.
//!
//! ```text
//!            401/403 while Idle
//!   Idle ----------------------------> InProgress
//!    ^                                     |  401/403 or new request:
//!    |          drain (FIFO)               |  append to queue
//!    +-------------------------------------+
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, join_all};
use http::{HeaderMap, HeaderName, HeaderValue};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use village_http::{HttpError, OutboundRequest, RequestTarget, Transport, TransportResponse};

use crate::config::AuthClientConfig;
use crate::error::ClientError;
use crate::queue::{QueuedRequest, RequestQueue, Waiter};
use crate::renewal::{ReAuthReason, SessionRenewal};
use crate::secret::XsrfToken;
use crate::token_store::AuthTokenStore;

/// Transport wrapper that keeps the session alive.
///
/// Cheap to clone; clones share the token store, the queue and the
/// re-authentication state.
#[derive(Clone)]
pub struct AuthenticatingClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    store: Arc<AuthTokenStore>,
    renewal: Arc<dyn SessionRenewal>,
    token_header: HeaderName,
    diagnostic_header: HeaderName,
    attach_token_to_reads: bool,
    probe: RequestTarget,
    queue: Mutex<RequestQueue>,
}

/// Pending result of [`AuthenticatingClient::request`].
///
/// A request created while a re-authentication is in flight joins the
/// queue right away, so replay order is the order of the `request` calls,
/// whenever the handles are first polled. Otherwise nothing is sent until
/// the handle is polled. [`cancel`](Self::cancel)
/// resolves the handle with [`ClientError::Cancelled`]; a request that is
/// still parked in the queue is then dropped from the replay.
#[must_use = "requests do nothing unless awaited"]
pub struct RequestHandle {
    cancel: CancellationToken,
    future: BoxFuture<'static, Result<TransportResponse, ClientError>>,
}

impl RequestHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this request, for wiring into other tasks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Future for RequestHandle {
    type Output = Result<TransportResponse, ClientError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().future.as_mut().poll(cx)
    }
}

impl AuthenticatingClient {
    /// # Errors
    /// Returns `ClientError::Config` if a configured header name, the
    /// diagnostic id or the probe path is not valid.
    pub fn new(
        transport: impl Transport,
        store: Arc<AuthTokenStore>,
        renewal: impl SessionRenewal,
        config: AuthClientConfig,
    ) -> Result<Self, ClientError> {
        let token_header = HeaderName::try_from(config.token_header.as_str())
            .map_err(|e| ClientError::Config(e.into()))?;
        let diagnostic_header = HeaderName::try_from(config.diagnostic_header.as_str())
            .map_err(|e| ClientError::Config(e.into()))?;

        if let Some(id) = config.diagnostic_id {
            HeaderValue::from_str(&id).map_err(|e| ClientError::Config(e.into()))?;
            if store.diagnostic_id().is_none() {
                store.set_diagnostic_id(Some(id));
            }
        }

        let probe = RequestTarget::get(config.probe_path.as_str());
        probe.path_and_query().map_err(ClientError::Config)?;

        Ok(Self {
            inner: Arc::new(Inner {
                transport: Arc::new(transport),
                store,
                renewal: Arc::new(renewal),
                token_header,
                diagnostic_header,
                attach_token_to_reads: config.attach_token_to_reads,
                probe,
                queue: Mutex::new(RequestQueue::default()),
            }),
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<AuthTokenStore> {
        &self.inner.store
    }

    /// Issue a request with the normal re-authentication behaviour.
    pub fn request(&self, target: RequestTarget) -> RequestHandle {
        self.request_with(target, false)
    }

    /// Issue a request; with `ignore_reauthentication` the response is
    /// returned as-is, 401/403 included, and the queue is bypassed.
    pub fn request_with(
        &self,
        target: RequestTarget,
        ignore_reauthentication: bool,
    ) -> RequestHandle {
        let cancel = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let parked = if target.requires_auth() && !ignore_reauthentication {
            inner.park_if_reauthenticating(&target, &cancel)
        } else {
            None
        };
        let execute_cancel = cancel.clone();
        let work = async move {
            match parked {
                Some(waiter) => wait(waiter).await,
                None => {
                    inner
                        .execute(target, ignore_reauthentication, execute_cancel)
                        .await
                }
            }
        };
        let token = cancel.clone();
        let future = async move {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(ClientError::Cancelled),
                result = work => result,
            }
        }
        .boxed();
        RequestHandle { cancel, future }
    }

    /// Send and wait for the response.
    ///
    /// # Errors
    /// See [`ClientError`].
    pub async fn send(&self, target: RequestTarget) -> Result<TransportResponse, ClientError> {
        self.request(target).await
    }

    /// Whether a re-authentication is currently in flight.
    #[must_use]
    pub fn is_reauthenticating(&self) -> bool {
        self.inner.queue.lock().is_in_progress()
    }

    /// Number of requests parked behind the current re-authentication.
    #[must_use]
    pub fn queued_requests(&self) -> usize {
        self.inner.queue.lock().len()
    }
}

impl std::fmt::Debug for AuthenticatingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatingClient")
            .field("store", &self.inner.store)
            .field("reauthenticating", &self.is_reauthenticating())
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn execute(
        self: Arc<Self>,
        target: RequestTarget,
        ignore_reauthentication: bool,
        cancel: CancellationToken,
    ) -> Result<TransportResponse, ClientError> {
        if !target.requires_auth() || ignore_reauthentication {
            return Ok(self.send_once(target).await?);
        }

        if let Some(waiter) = self.park_if_reauthenticating(&target, &cancel) {
            return wait(waiter).await;
        }

        let response = self.send_once(target.clone()).await?;
        let Some(reason) = ReAuthReason::from_status(response.status) else {
            return Ok(response);
        };

        let (waiter, owns_reauth) = {
            let mut queue = self.queue.lock();
            let waiter = park(&mut queue, target, cancel);
            (waiter, queue.begin())
        };
        if owns_reauth {
            tokio::spawn(Arc::clone(&self).reauthenticate(reason));
        }
        wait(waiter).await
    }

    /// Queue `target` behind the running re-authentication, if there is one.
    fn park_if_reauthenticating(
        &self,
        target: &RequestTarget,
        cancel: &CancellationToken,
    ) -> Option<Waiter> {
        let mut queue = self.queue.lock();
        if !queue.is_in_progress() {
            return None;
        }
        tracing::debug!(path = %target.path(), "re-authentication in progress, request queued");
        Some(park(&mut queue, target.clone(), cancel.clone()))
    }

    /// Run the recovery for `reason`, then replay or fail the queue.
    async fn reauthenticate(self: Arc<Self>, reason: ReAuthReason) {
        tracing::info!(%reason, queued = self.queue.lock().len(), "re-authentication started");

        let outcome = match reason {
            ReAuthReason::Unauthorized => match self.renewal.login().await {
                Ok(session) => {
                    self.store.set_session(session);
                    Ok(())
                }
                Err(err) => Err(err.to_string()),
            },
            ReAuthReason::Forbidden => match self.send_once(self.probe.clone()).await {
                Ok(response) if response.is_success() => Ok(()),
                Ok(response) => Err(format!("token probe returned {}", response.status)),
                Err(err) => Err(err.to_string()),
            },
        };

        let drained = self.queue.lock().drain();
        let pending: Vec<QueuedRequest> = drained
            .into_iter()
            .filter(|entry| !entry.is_abandoned())
            .collect();

        match outcome {
            Ok(()) => {
                tracing::info!(%reason, replaying = pending.len(), "re-authentication succeeded");
                // join_all polls in queue order, so replays start FIFO
                join_all(pending.into_iter().map(|entry| {
                    let this = Arc::clone(&self);
                    async move {
                        let result = this.replay(entry.target).await;
                        if entry.responder.send(result).is_err() {
                            tracing::debug!("requester dropped before replay completed");
                        }
                    }
                }))
                .await;
            }
            Err(cause) => {
                tracing::warn!(%reason, error = %cause, failing = pending.len(), "re-authentication failed");
                for entry in pending {
                    if entry
                        .responder
                        .send(Err(ClientError::reauth_failed(cause.as_str())))
                        .is_err()
                    {
                        tracing::debug!("requester dropped before failure was delivered");
                    }
                }
            }
        }
    }

    /// Replays never re-enter the queue: a second 401/403 is terminal.
    async fn replay(&self, target: RequestTarget) -> Result<TransportResponse, ClientError> {
        let path = target.path().to_owned();
        let response = self.send_once(target).await?;
        if ReAuthReason::from_status(response.status).is_some() {
            tracing::warn!(path = %path, status = response.status.as_u16(), "replayed request rejected again");
            return Err(ClientError::reauth_failed(format!(
                "replayed request rejected with {}",
                response.status
            )));
        }
        Ok(response)
    }

    /// One transport exchange with auth headers attached and the token
    /// captured from the response.
    async fn send_once(&self, target: RequestTarget) -> Result<TransportResponse, HttpError> {
        let headers = self.auth_headers(&target);
        let response = self
            .transport
            .send(OutboundRequest::with_headers(target, headers))
            .await?;
        self.capture_token(&response);
        Ok(response)
    }

    fn auth_headers(&self, target: &RequestTarget) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(id) = self.store.diagnostic_id() {
            match HeaderValue::from_str(&id) {
                Ok(value) => {
                    headers.insert(self.diagnostic_header.clone(), value);
                }
                Err(_) => tracing::warn!("diagnostic id is not a valid header value, skipped"),
            }
        }

        if (self.attach_token_to_reads || !target.is_read_only())
            && let Some(token) = self.store.token()
        {
            match token.header_value() {
                Ok(value) => {
                    headers.insert(self.token_header.clone(), value);
                }
                Err(_) => tracing::warn!("stored token is not a valid header value, skipped"),
            }
        }

        headers
    }

    fn capture_token(&self, response: &TransportResponse) {
        if !response.is_success() {
            return;
        }
        if let Some(token) = response
            .header_str(self.token_header.as_str())
            .and_then(XsrfToken::from_header)
        {
            tracing::debug!(header = %self.token_header, "token refreshed from response");
            self.store.set_token(Some(token));
        }
    }
}

fn park(queue: &mut RequestQueue, target: RequestTarget, cancel: CancellationToken) -> Waiter {
    let (responder, waiter) = oneshot::channel();
    queue.enqueue(QueuedRequest {
        target,
        responder,
        cancel,
    });
    waiter
}

async fn wait(waiter: Waiter) -> Result<TransportResponse, ClientError> {
    // The responder is only dropped unanswered for abandoned entries
    waiter.await.unwrap_or(Err(ClientError::Cancelled))
}
