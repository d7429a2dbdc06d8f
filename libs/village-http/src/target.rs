use bytes::Bytes;
use http::Method;
use serde::Serialize;

use crate::error::HttpError;

/// Name of the query parameter carrying the `page-pageSize` window.
pub const PAGE_QUERY_PARAM: &str = "page";

/// Default number of items per page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Render the pagination window as the API expects it: `"<page>-<page_size>"`.
///
/// Pages are 1-based.
///
/// ```
/// assert_eq!(village_http::page_query_value(1, 50), "1-50");
/// ```
#[must_use]
pub fn page_query_value(page: usize, page_size: usize) -> String {
    format!("{page}-{page_size}")
}

/// Descriptor of one API call.
///
/// A target is built once and never mutated afterwards; it is cloned
/// whenever a request has to be replayed or retried.
///
/// Targets require authentication unless [`without_auth`](Self::without_auth)
/// is called.
///
/// # Example
///
/// ```
/// use village_http::RequestTarget;
///
/// let target = RequestTarget::get("people/1.0/people")
///     .query("q", "smith")
///     .with_page(2, 50);
/// assert!(target.requires_auth());
/// assert_eq!(target.query_pairs()[1], ("page".to_owned(), "2-50".to_owned()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct RequestTarget {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Bytes>,
    requires_auth: bool,
}

impl RequestTarget {
    /// Create a target for an arbitrary method and path.
    ///
    /// The path is relative to the transport's base URL; a leading `/` is
    /// tolerated.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            requires_auth: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Mark the target as public: the authentication pipeline is bypassed.
    pub fn without_auth(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// Append a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Append the `page=<page>-<page_size>` window parameter.
    pub fn with_page(self, page: usize, page_size: usize) -> Self {
        self.query(PAGE_QUERY_PARAM, page_query_value(page, page_size))
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    /// Returns `HttpError::Json` if the value cannot be serialized.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, HttpError> {
        self.body = Some(Bytes::from(serde_json::to_vec(body)?));
        Ok(self)
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    /// Whether the method only reads state (GET, HEAD, OPTIONS).
    ///
    /// Anti-forgery tokens are only required on requests that are not pure
    /// reads.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    /// Path plus encoded query string, as sent on the wire.
    ///
    /// # Errors
    /// Returns `HttpError::QueryEncode` if a parameter cannot be encoded.
    pub fn path_and_query(&self) -> Result<String, HttpError> {
        let path = self.path.trim_start_matches('/');
        if self.query.is_empty() {
            return Ok(path.to_owned());
        }
        let encoded = serde_urlencoded::to_string(&self.query)?;
        Ok(format!("{path}?{encoded}"))
    }
}
