use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use http::{HeaderValue, Response};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;
use tower_http::set_header::SetRequestHeaderLayer;
use url::Url;

use crate::config::{HttpTransportConfig, TransportSecurity};
use crate::error::{HttpError, InvalidUriKind};
use crate::response::{TransportResponse, read_body_limited};
use crate::target::RequestTarget;
use crate::tls;
use crate::transport::{OutboundRequest, Transport};

type ResponseBody = BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

type InnerService =
    BoxCloneSyncService<http::Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

/// [`Transport`] backed by a pooled hyper client over rustls.
///
/// Tower stack, outer to inner:
/// `Timeout -> User-Agent -> Accept -> Decompression -> hyper client`.
/// The two header layers only fill in headers the caller left out.
///
/// Every HTTP status comes back as `Ok`; only connection, timeout, TLS and
/// body-limit failures are errors.
///
/// ```no_run
/// use village_http::{HttpTransportConfig, HyperTransport, RequestTarget, Transport, OutboundRequest};
///
/// # async fn run() -> Result<(), village_http::HttpError> {
/// let transport = HyperTransport::new(HttpTransportConfig::default())?;
/// let resp = transport
///     .send(OutboundRequest::new(RequestTarget::get("people/1.0/me")))
///     .await?;
/// println!("{}", resp.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HyperTransport {
    service: InnerService,
    base_url: Url,
    max_body_size: usize,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("base_url", &self.base_url.as_str())
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Build a transport from configuration.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or uses a scheme the
    /// security mode forbids, if the user agent is not a valid header value,
    /// or if TLS initialization fails.
    pub fn new(config: HttpTransportConfig) -> Result<Self, HttpError> {
        let security = effective_security(config.transport_security());
        let base_url = parse_base_url(&config.base_url, security)?;

        let https = tls::https_connector(config.tls_roots, security)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout has no effect without a pool timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(idle) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let user_agent = HeaderValue::from_str(&config.user_agent)?;

        let timeout = config.request_timeout;
        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(SetRequestHeaderLayer::if_not_present(USER_AGENT, user_agent))
            .layer(SetRequestHeaderLayer::if_not_present(
                ACCEPT,
                HeaderValue::from_static("application/json"),
            ))
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(into_boxed_response)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

        tracing::debug!(
            base_url = %base_url,
            timeout = ?timeout,
            tls_roots = ?config.tls_roots,
            "village http transport ready"
        );

        Ok(Self {
            service: BoxCloneSyncService::new(service),
            base_url,
            max_body_size: config.max_body_size,
        })
    }

    /// The base URL every target path is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for a target.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidUri` if the path cannot be joined onto the
    /// base URL, or `HttpError::QueryEncode` if the query cannot be encoded.
    pub fn url_for(&self, target: &RequestTarget) -> Result<Url, HttpError> {
        let relative = target.path_and_query()?;
        self.base_url
            .join(&relative)
            .map_err(|e| HttpError::InvalidUri {
                url: relative,
                kind: InvalidUriKind::ParseError,
                reason: e.to_string(),
            })
    }

    fn build_request(
        &self,
        request: OutboundRequest,
    ) -> Result<http::Request<Full<Bytes>>, HttpError> {
        let OutboundRequest { target, headers } = request;
        let url = self.url_for(&target)?;
        let body = target.body().cloned().unwrap_or_default();

        let mut req = http::Request::builder()
            .method(target.method().clone())
            .uri(url.as_str())
            .body(Full::new(body))?;
        req.headers_mut().extend(headers);
        if target.body().is_some() && !req.headers().contains_key(CONTENT_TYPE) {
            req.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        Ok(req)
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, HttpError> {
        let method = request.target.method().clone();
        let path = request.target.path().to_owned();
        let req = self.build_request(request)?;

        let response = self.service.clone().oneshot(req).await?;
        let (parts, body) = response.into_parts();
        let body: std::pin::Pin<Box<dyn Future<Output = Result<Bytes, HttpError>> + Send + '_>> =
            Box::pin(read_body_limited(body, self.max_body_size));
        let body = body.await?;

        tracing::debug!(
            %method,
            path = %path,
            status = parts.status.as_u16(),
            bytes = body.len(),
            "village api response"
        );
        Ok(TransportResponse::new(parts.status, parts.headers, body))
    }
}

#[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
fn effective_security(requested: TransportSecurity) -> TransportSecurity {
    if requested == TransportSecurity::AllowInsecureHttp {
        tracing::warn!(
            target: "village_http::security",
            "insecure HTTP enabled; use only for testing with mock servers"
        );
    }
    requested
}

#[cfg(not(any(debug_assertions, feature = "allow-insecure-http")))]
fn effective_security(requested: TransportSecurity) -> TransportSecurity {
    if requested == TransportSecurity::AllowInsecureHttp {
        tracing::warn!(
            target: "village_http::security",
            "allow_insecure_http ignored in release builds without the allow-insecure-http feature"
        );
    }
    TransportSecurity::TlsOnly
}

fn parse_base_url(raw: &str, security: TransportSecurity) -> Result<Url, HttpError> {
    let invalid = |kind, reason: String| HttpError::InvalidUri {
        url: raw.to_owned(),
        kind,
        reason,
    };

    let mut url = Url::parse(raw).map_err(|e| invalid(InvalidUriKind::ParseError, e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid(
            InvalidUriKind::CannotBeABase,
            "URL cannot carry a path".to_owned(),
        ));
    }
    if url.host_str().is_none() {
        return Err(invalid(
            InvalidUriKind::MissingAuthority,
            "missing host/authority".to_owned(),
        ));
    }

    match url.scheme() {
        "https" => {}
        "http" => {
            if security == TransportSecurity::TlsOnly {
                return Err(HttpError::InvalidScheme {
                    scheme: "http".to_owned(),
                    reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
                });
            }
        }
        other => {
            return Err(HttpError::InvalidScheme {
                scheme: other.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            });
        }
    }

    // Relative joins replace the last segment unless the base ends with '/'
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

fn into_boxed_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, body.map_err(Into::into).boxed())
}
