use serde::{Deserialize, Serialize};

/// Header carrying the anti-forgery token, in both directions.
pub const DEFAULT_TOKEN_HEADER: &str = "X-XSRF-TOKEN";

/// Header carrying the per-installation diagnostic id.
pub const DEFAULT_DIAGNOSTIC_HEADER: &str = "X-Diagnostic-Id";

/// Authenticated GET used to refresh a stale token after a 403.
pub const DEFAULT_PROBE_PATH: &str = "people/1.0/me";

/// Settings of the [`AuthenticatingClient`](crate::AuthenticatingClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthClientConfig {
    pub token_header: String,
    pub diagnostic_header: String,
    /// Seeds the store's diagnostic id when it has none.
    pub diagnostic_id: Option<String>,
    pub probe_path: String,
    /// Send the token on GET/HEAD/OPTIONS too. Off by default: the API only
    /// checks it on state-changing methods.
    pub attach_token_to_reads: bool,
}

impl Default for AuthClientConfig {
    fn default() -> Self {
        Self {
            token_header: DEFAULT_TOKEN_HEADER.to_owned(),
            diagnostic_header: DEFAULT_DIAGNOSTIC_HEADER.to_owned(),
            diagnostic_id: None,
            probe_path: DEFAULT_PROBE_PATH.to_owned(),
            attach_token_to_reads: false,
        }
    }
}
