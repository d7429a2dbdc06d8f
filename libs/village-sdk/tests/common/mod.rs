//! Scripted transport and login used by the SDK integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use village_auth::{
    AuthClientConfig, AuthTokenStore, AuthenticatingClient, RenewalError, Session, SessionRenewal,
};
use village_http::{
    HeaderMap, HeaderValue, HttpError, OutboundRequest, StatusCode, Transport, TransportResponse,
};
use village_sdk::{RetryPolicy, RetryingRequestService};

pub type Reply = Result<TransportResponse, HttpError>;

pub fn json(code: u16, body: &serde_json::Value) -> Reply {
    Ok(TransportResponse::from_status(
        StatusCode::from_u16(code).unwrap(),
        serde_json::to_vec(body).unwrap(),
    ))
}

pub fn status(code: u16) -> Reply {
    Ok(TransportResponse::from_status(
        StatusCode::from_u16(code).unwrap(),
        Bytes::new(),
    ))
}

pub fn with_token(code: u16, token: &str) -> Reply {
    let mut headers = HeaderMap::new();
    headers.insert("X-XSRF-TOKEN", HeaderValue::from_str(token).unwrap());
    Ok(TransportResponse::new(
        StatusCode::from_u16(code).unwrap(),
        headers,
        Bytes::from_static(b"{}"),
    ))
}

pub fn offline() -> Reply {
    Err(HttpError::Transport("connection refused".into()))
}

/// Path and token header of every request sent.
#[derive(Clone, Default)]
pub struct Sent(Arc<Mutex<Vec<(String, Option<String>)>>>);

impl Sent {
    pub fn count(&self) -> usize {
        self.0.lock().len()
    }

    pub fn tokens(&self) -> Vec<Option<String>> {
        self.0.lock().iter().map(|(_, token)| token.clone()).collect()
    }

    pub fn paths(&self) -> Vec<String> {
        self.0.lock().iter().map(|(path, _)| path.clone()).collect()
    }
}

/// Replies from a fixed script; the last reply repeats once the script runs
/// out.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    sent: Sent,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            last: Mutex::new(None),
            sent: Sent::default(),
        }
    }

    pub fn sent(&self) -> Sent {
        self.sent.clone()
    }
}

fn clone_reply(reply: &Reply) -> Reply {
    match reply {
        Ok(resp) => Ok(resp.clone()),
        Err(err) => Err(HttpError::Transport(err.to_string().into())),
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: OutboundRequest) -> Reply {
        let token = request
            .headers
            .get("x-xsrf-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.sent
            .0
            .lock()
            .push((request.target.path().to_owned(), token));

        let next = self.script.lock().pop_front();
        match next {
            Some(reply) => {
                *self.last.lock() = Some(clone_reply(&reply));
                reply
            }
            None => clone_reply(self.last.lock().as_ref().unwrap()),
        }
    }
}

pub struct Login {
    succeed: bool,
    calls: Arc<AtomicUsize>,
}

impl Login {
    pub fn ok() -> Self {
        Self {
            succeed: true,
            calls: Arc::default(),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            succeed: false,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl SessionRenewal for Login {
    async fn login(&self) -> Result<Session, RenewalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            Ok(Session::new("user-1"))
        } else {
            Err(RenewalError::Rejected {
                reason: "password changed".to_owned(),
            })
        }
    }
}

pub fn service_with(
    transport: ScriptedTransport,
    login: Login,
    auth: AuthClientConfig,
    policy: RetryPolicy,
) -> RetryingRequestService {
    let client = AuthenticatingClient::new(
        transport,
        Arc::new(AuthTokenStore::in_memory()),
        login,
        auth,
    )
    .unwrap();
    RetryingRequestService::new(client, policy)
}

pub fn service(transport: ScriptedTransport, login: Login) -> RetryingRequestService {
    service_with(
        transport,
        login,
        AuthClientConfig::default(),
        RetryPolicy::default(),
    )
}
