//! rustls connector behind [`HyperTransport`](crate::HyperTransport).

use std::sync::{Arc, OnceLock};

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, RootCertStore};

use crate::config::{TlsRootConfig, TransportSecurity};
use crate::error::HttpError;

static NATIVE_STORE: OnceLock<RootCertStore> = OnceLock::new();

/// The OS trust store, read once per process. Entries rustls cannot parse
/// are skipped; the store may end up empty.
fn native_store() -> &'static RootCertStore {
    NATIVE_STORE.get_or_init(|| {
        let found = rustls_native_certs::load_native_certs();
        for err in &found.errors {
            tracing::warn!(error = %err, "skipping unreadable OS root certificate");
        }
        let mut store = RootCertStore::empty();
        let (added, ignored) = store.add_parsable_certificates(found.certs);
        tracing::debug!(added, ignored, "OS trust store read");
        store
    })
}

/// Installed process default, or aws-lc-rs. Nothing is installed globally.
fn provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn tls_error(err: rustls::Error) -> HttpError {
    HttpError::Tls(Box::new(err))
}

/// Connector trusting `roots`; plain `http` is only dialled when `security`
/// allows it.
///
/// # Errors
/// `HttpError::Tls` when the provider refuses the default protocol versions
/// or the OS trust store has nothing usable.
pub(crate) fn https_connector(
    roots: TlsRootConfig,
    security: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let builder = match roots {
        TlsRootConfig::WebPki => HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider())
            .map_err(tls_error)?,
        TlsRootConfig::Native => {
            let store = native_store();
            if store.is_empty() {
                return Err(HttpError::Tls(
                    "the OS trust store holds no usable root certificate".into(),
                ));
            }
            let config = ClientConfig::builder_with_provider(provider())
                .with_safe_default_protocol_versions()
                .map_err(tls_error)?
                .with_root_certificates(store.clone())
                .with_no_client_auth();
            HttpsConnectorBuilder::new().with_tls_config(config)
        }
    };
    let builder = match security {
        TransportSecurity::TlsOnly => builder.https_only(),
        TransportSecurity::AllowInsecureHttp => builder.https_or_http(),
    };
    Ok(builder.enable_all_versions().build())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn os_store_is_read_once() {
        assert!(std::ptr::eq(native_store(), native_store()));
    }

    #[test]
    fn webpki_connector_builds_in_both_modes() {
        assert!(https_connector(TlsRootConfig::WebPki, TransportSecurity::TlsOnly).is_ok());
        assert!(
            https_connector(TlsRootConfig::WebPki, TransportSecurity::AllowInsecureHttp).is_ok()
        );
    }

    #[test]
    fn native_connector_follows_the_os_store() {
        // Minimal containers ship without roots
        let result = https_connector(TlsRootConfig::Native, TransportSecurity::TlsOnly);
        if native_store().is_empty() {
            assert!(matches!(result, Err(HttpError::Tls(_))));
        } else {
            assert!(result.is_ok());
        }
    }
}
