#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP plumbing for the Village API client
//!
//! This crate owns everything below the authentication layer:
//! - [`RequestTarget`]: immutable, cloneable description of one API call
//! - [`Transport`]: the single-exchange seam the upper layers are written against
//! - [`HyperTransport`]: pooled hyper client over rustls with timeouts,
//!   default headers and transparent decompression
//! - [`TransportResponse`]: a fully buffered response, any status
//!
//! Non-2xx statuses are not errors here. [`HttpError`] is reserved for
//! failures where no response was obtained.
//!
//! # Example
//!
//! ```ignore
//! use village_http::{HttpTransportConfig, HyperTransport, OutboundRequest, RequestTarget, Transport};
//!
//! let transport = HyperTransport::new(HttpTransportConfig::default())?;
//! let resp = transport
//!     .send(OutboundRequest::new(RequestTarget::get("notices/1.0/notices").with_page(1, 50)))
//!     .await?;
//! assert!(resp.is_success());
//! ```

mod client;
mod config;
mod error;
pub mod humantime_serde;
mod response;
mod target;
mod tls;
mod transport;

pub use client::HyperTransport;
pub use config::{
    DEFAULT_BASE_URL, DEFAULT_USER_AGENT, HttpTransportConfig, TlsRootConfig, TransportSecurity,
};
pub use error::{HttpError, InvalidUriKind};
pub use response::TransportResponse;
pub use target::{DEFAULT_PAGE_SIZE, PAGE_QUERY_PARAM, RequestTarget, page_query_value};
pub use transport::{OutboundRequest, Transport};

// Re-exported so dependents can name statuses, methods and headers without
// pinning their own `http` version.
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
