use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;

use crate::error::HttpError;
use crate::response::TransportResponse;
use crate::target::RequestTarget;

/// A target plus the per-attempt headers decided by the layers above
/// (anti-forgery token, diagnostic id).
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub target: RequestTarget,
    pub headers: HeaderMap,
}

impl OutboundRequest {
    #[must_use]
    pub fn new(target: RequestTarget) -> Self {
        Self {
            target,
            headers: HeaderMap::new(),
        }
    }

    #[must_use]
    pub fn with_headers(target: RequestTarget, headers: HeaderMap) -> Self {
        Self { target, headers }
    }
}

/// Performs exactly one HTTP exchange.
///
/// Implementations must return `Ok` for every HTTP status and reserve `Err`
/// for failures where no response was obtained (connection refused, DNS,
/// timeout, TLS, oversized body). No retries happen at this layer.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send the request and buffer the response.
    ///
    /// # Errors
    /// Returns `HttpError` when no HTTP response could be obtained.
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, HttpError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, HttpError> {
        (**self).send(request).await
    }
}
