//! Windowed, on-demand loading of paged API collections.
//!
//! Two engines share one page store:
//! - [`PaginationEngine`] addresses items by flat index and fetches any page
//!   the caller asks for, concurrently.
//! - [`SectionedPaginationEngine`] groups loaded items into ordered sections
//!   and reports every change as a [`SectionDiff`].
//!
//! Pages are 1-based; page `p` covers indices `(p - 1) * page_size ..
//! p * page_size`. A page that is being fetched is never requested twice.

mod engine;
mod sectioned;
mod window;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use village_http::RequestTarget;

use crate::error::ApiError;
use crate::service::RetryingRequestService;

pub use engine::PaginationEngine;
pub use sectioned::{IndexPath, SectionDiff, SectionedPaginationEngine, Sectioning};

/// One page to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    /// 1-based page number
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    /// Absolute index of the first item on this page.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.page_size
    }

    /// `target` with the `page=<page>-<size>` query appended.
    #[must_use]
    pub fn apply(&self, target: RequestTarget) -> RequestTarget {
        target.with_page(self.page, self.page_size)
    }
}

/// Items of one page plus the collection size the server reported.
///
/// Wire shape: `{"items": [...], "totalCount": 123}`. When the total is
/// missing, a short page marks the end of the collection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    #[serde(rename = "totalCount", default)]
    pub total_count: Option<usize>,
}

impl<T> PageResponse<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total_count: Option<usize>) -> Self {
        Self { items, total_count }
    }
}

/// Supplies pages to the engines.
#[async_trait]
pub trait PageSource<T>: Send + Sync + 'static {
    /// # Errors
    /// Any [`ApiError`]; the engine reports it to its delegate and forgets
    /// the page so it can be requested again.
    async fn fetch_page(&self, request: PageRequest) -> Result<PageResponse<T>, ApiError>;
}

#[async_trait]
impl<T, S> PageSource<T> for Arc<S>
where
    S: PageSource<T> + ?Sized,
    T: 'static,
{
    async fn fetch_page(&self, request: PageRequest) -> Result<PageResponse<T>, ApiError> {
        (**self).fetch_page(request).await
    }
}

type TargetBuilder = dyn Fn(PageRequest) -> RequestTarget + Send + Sync;

/// [`PageSource`] backed by a [`RetryingRequestService`].
///
/// `W` is the wire type of one page. It defaults to [`PageResponse<T>`];
/// endpoints with a different envelope supply their own type convertible
/// into `PageResponse<T>`.
pub struct ServicePageSource<T, W = PageResponse<T>> {
    service: RetryingRequestService,
    target: Arc<TargetBuilder>,
    _wire: PhantomData<fn() -> (T, W)>,
}

impl<T> ServicePageSource<T> {
    /// Build each page's target with `target`.
    #[must_use]
    pub fn new(
        service: RetryingRequestService,
        target: impl Fn(PageRequest) -> RequestTarget + Send + Sync + 'static,
    ) -> Self {
        Self {
            service,
            target: Arc::new(target),
            _wire: PhantomData,
        }
    }

    /// Page through `base` with the standard `page` query parameter.
    #[must_use]
    pub fn for_target(service: RetryingRequestService, base: RequestTarget) -> Self {
        Self::new(service, move |request| request.apply(base.clone()))
    }
}

impl<T, W> ServicePageSource<T, W> {
    /// Decode pages as `W2` instead.
    #[must_use]
    pub fn with_wire<W2>(self) -> ServicePageSource<T, W2> {
        ServicePageSource {
            service: self.service,
            target: self.target,
            _wire: PhantomData,
        }
    }
}

impl<T, W> fmt::Debug for ServicePageSource<T, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePageSource")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T, W> PageSource<T> for ServicePageSource<T, W>
where
    T: Send + 'static,
    W: DeserializeOwned + Into<PageResponse<T>> + Send + 'static,
{
    async fn fetch_page(&self, request: PageRequest) -> Result<PageResponse<T>, ApiError> {
        let wire: W = self.service.request((self.target)(request)).await?;
        Ok(wire.into())
    }
}

/// Callbacks of a [`PaginationEngine`].
pub trait PaginationDelegate: Send + Sync + 'static {
    /// A page was merged. `None` for the very first page of a listing,
    /// meaning everything should be redrawn; afterwards the absolute
    /// indices that just became available.
    fn on_fetch_completed(&self, newly_loaded: Option<&[usize]>);

    fn on_fetch_failed(&self, error: &ApiError);
}

/// Callbacks of a [`SectionedPaginationEngine`].
pub trait SectionedPaginationDelegate: Send + Sync + 'static {
    fn on_fetch_completed(&self, diff: &SectionDiff);

    fn on_fetch_failed(&self, error: &ApiError);
}
