use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `User-Agent` sent unless configured otherwise
pub const DEFAULT_USER_AGENT: &str = concat!("village-http/", env!("CARGO_PKG_VERSION"));

/// Default base URL of the Village API
pub const DEFAULT_BASE_URL: &str = "https://api.village.app/";

/// Trust anchors for server certificates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Bundled Mozilla roots
    #[default]
    WebPki,
    /// Platform certificate store
    Native,
}

/// Whether plain `http://` base URLs are accepted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// `https` only
    #[default]
    TlsOnly,
    /// Also `http`; local mock servers only
    AllowInsecureHttp,
}

/// Configuration of the [`HyperTransport`](crate::HyperTransport).
///
/// Deserializable so it can be embedded in a larger application config;
/// durations are written in humantime form (`"30s"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpTransportConfig {
    /// Base URL every [`RequestTarget`](crate::RequestTarget) path is joined onto
    pub base_url: String,

    /// Deadline for one exchange, connect to last body byte (default: 30s)
    #[serde(with = "crate::humantime_serde")]
    pub request_timeout: Duration,

    /// Larger response bodies fail with `BodyTooLarge` (default: 10 MiB)
    pub max_body_size: usize,

    /// User-Agent header value
    pub user_agent: String,

    /// TLS root certificate strategy (default: `webpki`)
    pub tls_roots: TlsRootConfig,

    /// Accept plain `http://` base URLs. For mock servers only.
    pub allow_insecure_http: bool,

    /// Timeout for idle pooled connections (default: 90 seconds)
    #[serde(with = "crate::humantime_serde::option")]
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections kept per host (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            tls_roots: TlsRootConfig::default(),
            allow_insecure_http: false,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl HttpTransportConfig {
    /// Create configuration for testing against a local mock server
    ///
    /// **WARNING**: allows plain HTTP. Never use in production.
    #[must_use]
    pub fn for_testing(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            allow_insecure_http: true,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }

    /// Transport security mode implied by `allow_insecure_http`
    #[must_use]
    pub fn transport_security(&self) -> TransportSecurity {
        if self.allow_insecure_http {
            TransportSecurity::AllowInsecureHttp
        } else {
            TransportSecurity::TlsOnly
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_tls_only() {
        let cfg = HttpTransportConfig::default();
        assert_eq!(cfg.transport_security(), TransportSecurity::TlsOnly);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: HttpTransportConfig = serde_json::from_str(
            r#"{"base_url":"https://village.example.com/api/","request_timeout":"5s","tls_roots":"native"}"#,
        )
        .unwrap();
        assert_eq!(cfg.base_url, "https://village.example.com/api/");
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.tls_roots, TlsRootConfig::Native);
        assert_eq!(cfg.pool_max_idle_per_host, 32);
    }

    #[test]
    fn testing_preset_allows_http() {
        let cfg = HttpTransportConfig::for_testing("http://127.0.0.1:9");
        assert_eq!(cfg.transport_security(), TransportSecurity::AllowInsecureHttp);
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = serde_json::from_str::<HttpTransportConfig>(r#"{"base_uri":"x"}"#).unwrap_err();
        assert!(err.to_string().contains("base_uri"), "{err}");
    }
}
