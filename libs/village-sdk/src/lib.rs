#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Village API client SDK
//!
//! Builds on [`village_auth::AuthenticatingClient`]:
//! - [`RetryingRequestService`]: connectivity retries plus typed decoding
//!   through [`ResponseDecoder`]
//! - [`pagination`]: windowed loading of paged collections, flat or grouped
//!   into sections
//! - [`VillageConfig`]: layered configuration for the whole stack
//!
//! ```ignore
//! use std::sync::Arc;
//! use village_auth::AuthTokenStore;
//! use village_http::RequestTarget;
//! use village_sdk::pagination::{PaginationEngine, ServicePageSource};
//! use village_sdk::{RetryingRequestService, VillageConfig};
//!
//! let config = VillageConfig::load(Some("village.yaml".as_ref()))?;
//! let service = RetryingRequestService::from_config(
//!     &config,
//!     Arc::new(AuthTokenStore::in_memory()),
//!     my_login_flow,
//! )?;
//! let people = PaginationEngine::<Person>::new(
//!     ServicePageSource::for_target(service, RequestTarget::get("people/1.0/people")),
//!     config.pagination.page_size,
//! );
//! people.fetch_values(&[0, 1, 2]).await;
//! ```

mod config;
mod decoder;
mod error;
pub mod pagination;
mod service;

pub use config::{ConfigError, ENV_PREFIX, PaginationConfig, VillageConfig};
pub use decoder::ResponseDecoder;
pub use error::{ApiError, CONNECTION_ERROR_MESSAGE, GENERIC_ERROR_MESSAGE};
pub use pagination::{
    IndexPath, PageRequest, PageResponse, PageSource, PaginationDelegate, PaginationEngine,
    SectionDiff, SectionedPaginationDelegate, SectionedPaginationEngine, Sectioning,
    ServicePageSource,
};
pub use service::{RetryPolicy, RetryingRequestService};
