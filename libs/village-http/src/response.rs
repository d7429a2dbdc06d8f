use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, Limited};

use crate::error::HttpError;

/// A fully buffered HTTP response.
///
/// Every status code, including 4xx/5xx, is represented as a
/// `TransportResponse`; interpreting the status is left to the layers above.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Shorthand for a response without headers.
    #[must_use]
    pub fn from_status(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(status, HeaderMap::new(), body.into())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Header value as UTF-8 text, if present and valid.
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Buffer a response body, failing once more than `limit` bytes were read.
///
/// The limit applies to decompressed bytes.
pub(crate) async fn read_body_limited<B>(body: B, limit: usize) -> Result<Bytes, HttpError>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) => {
            if err.is::<http_body_util::LengthLimitError>() {
                Err(HttpError::BodyTooLarge { limit })
            } else {
                Err(HttpError::Transport(err))
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;

    #[tokio::test]
    async fn reads_body_under_limit() {
        let bytes = read_body_limited(Full::new(Bytes::from_static(b"hello")), 16)
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn rejects_body_over_limit() {
        let err = read_body_limited(Full::new(Bytes::from_static(b"0123456789")), 4)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::BodyTooLarge { limit: 4 }));
    }

    #[test]
    fn header_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert("x-xsrf-token", "abc123".parse().unwrap());
        let resp = TransportResponse::new(StatusCode::OK, headers, Bytes::new());
        assert_eq!(resp.header_str("X-XSRF-TOKEN"), Some("abc123"));
        assert!(resp.is_success());
    }
}
