//! In-memory transport and login doubles shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use village_auth::{RenewalError, Session, SessionRenewal};
use village_http::{
    HeaderMap, HeaderValue, HttpError, Method, OutboundRequest, StatusCode, Transport,
    TransportResponse,
};

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn status(code: u16) -> Result<TransportResponse, HttpError> {
    Ok(TransportResponse::from_status(
        StatusCode::from_u16(code).unwrap(),
        Bytes::new(),
    ))
}

pub fn json(code: u16, body: &serde_json::Value) -> Result<TransportResponse, HttpError> {
    Ok(TransportResponse::from_status(
        StatusCode::from_u16(code).unwrap(),
        serde_json::to_vec(body).unwrap(),
    ))
}

pub fn with_token(code: u16, token: &str) -> Result<TransportResponse, HttpError> {
    let mut headers = HeaderMap::new();
    headers.insert("X-XSRF-TOKEN", HeaderValue::from_str(token).unwrap());
    Ok(TransportResponse::new(
        StatusCode::from_u16(code).unwrap(),
        headers,
        Bytes::from_static(b"{}"),
    ))
}

pub fn offline() -> Result<TransportResponse, HttpError> {
    Err(HttpError::Transport("network is unreachable".into()))
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub token: Option<String>,
    pub diagnostic_id: Option<String>,
}

/// Requests seen by a [`MockTransport`], in the order they were sent.
#[derive(Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<Recorded>>>);

impl RequestLog {
    pub fn entries(&self) -> Vec<Recorded> {
        self.0.lock().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.0.lock().iter().map(|r| r.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
}

type Handler = dyn Fn(&OutboundRequest) -> Result<TransportResponse, HttpError> + Send + Sync;

pub struct MockTransport {
    handler: Box<Handler>,
    log: RequestLog,
    latency: Duration,
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&OutboundRequest) -> Result<TransportResponse, HttpError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            log: RequestLog::default(),
            latency: Duration::ZERO,
        }
    }

    /// Answers with `responses` in order, one per request.
    pub fn scripted(responses: Vec<Result<TransportResponse, HttpError>>) -> Self {
        let script = Mutex::new(VecDeque::from(responses));
        Self::new(move |req| {
            script
                .lock()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected request to {}", req.target.path()))
        })
    }

    /// Answers 401 until `session` is set, then 200 with `{}`.
    pub fn gated(session: Arc<AtomicBool>) -> Self {
        Self::new(move |_| {
            if session.load(Ordering::SeqCst) {
                json(200, &serde_json::json!({}))
            } else {
                status(401)
            }
        })
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn log(&self) -> RequestLog {
        self.log.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, HttpError> {
        let header = |name: &str| {
            request
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        self.log.0.lock().push(Recorded {
            method: request.target.method().clone(),
            path: request.target.path().to_owned(),
            token: header("x-xsrf-token"),
            diagnostic_id: header("x-diagnostic-id"),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.handler)(&request)
    }
}

/// Login double counting its calls.
pub struct MockLogin {
    succeed: bool,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    session_flag: Option<Arc<AtomicBool>>,
    token: Option<String>,
}

impl MockLogin {
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            delay: Duration::ZERO,
            calls: Arc::default(),
            session_flag: None,
            token: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            succeed: false,
            ..Self::succeeding()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Flag raised once a login succeeds, for use with [`MockTransport::gated`].
    #[must_use]
    pub fn raises(mut self, flag: Arc<AtomicBool>) -> Self {
        self.session_flag = Some(flag);
        self
    }

    #[must_use]
    pub fn issuing_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_owned());
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl SessionRenewal for MockLogin {
    async fn login(&self) -> Result<Session, RenewalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if !self.succeed {
            return Err(RenewalError::Rejected {
                reason: "invalid credentials".to_owned(),
            });
        }
        if let Some(flag) = &self.session_flag {
            flag.store(true, Ordering::SeqCst);
        }
        let session = Session::new("user-1");
        Ok(match &self.token {
            Some(token) => session.with_token(token.as_str()),
            None => session,
        })
    }
}
