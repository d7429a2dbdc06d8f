#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Session handling for the Village API client
//!
//! - [`AuthenticatingClient`]: wraps a [`Transport`](village_http::Transport),
//!   attaches the anti-forgery token and diagnostic id, and recovers from
//!   401/403 with a single shared re-authentication
//! - [`AuthTokenStore`]: token, diagnostic id and current [`Session`]
//! - [`SessionRenewal`]: pluggable login flow used on 401
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use village_auth::{AuthClientConfig, AuthTokenStore, AuthenticatingClient};
//! use village_http::{HttpTransportConfig, HyperTransport, RequestTarget};
//!
//! let client = AuthenticatingClient::new(
//!     HyperTransport::new(HttpTransportConfig::default())?,
//!     Arc::new(AuthTokenStore::in_memory()),
//!     my_login_flow,
//!     AuthClientConfig::default(),
//! )?;
//! let me = client.send(RequestTarget::get("people/1.0/me")).await?;
//! ```

mod client;
mod config;
mod error;
mod queue;
mod renewal;
mod secret;
mod token_store;

pub use client::{AuthenticatingClient, RequestHandle};
pub use config::{
    AuthClientConfig, DEFAULT_DIAGNOSTIC_HEADER, DEFAULT_PROBE_PATH, DEFAULT_TOKEN_HEADER,
};
pub use error::ClientError;
pub use renewal::{ReAuthReason, RenewalError, Session, SessionRenewal};
pub use secret::XsrfToken;
pub use token_store::{AuthTokenStore, FnTokenAccessor, InMemoryTokens, TokenAccessor};
