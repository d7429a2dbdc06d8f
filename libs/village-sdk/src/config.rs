use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use village_auth::AuthClientConfig;
use village_http::{DEFAULT_PAGE_SIZE, HttpTransportConfig};

use crate::service::RetryPolicy;

/// Prefix of environment variables overriding [`VillageConfig`].
/// Nested keys are separated by `__`, e.g. `VILLAGE_RETRY__MAX_RETRIES=3`.
pub const ENV_PREFIX: &str = "VILLAGE_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaginationConfig {
    /// Items per page (default: 50)
    pub page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete client configuration.
///
/// ```yaml
/// http:
///   base_url: "https://api.village.app/"
///   request_timeout: "30s"
/// auth:
///   diagnostic_id: "3f1c7d2e"
/// retry:
///   max_retries: 1
///   delay: "3s"
/// pagination:
///   page_size: 50
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VillageConfig {
    pub http: HttpTransportConfig,
    pub auth: AuthClientConfig,
    pub retry: RetryPolicy,
    pub pagination: PaginationConfig,
}

impl VillageConfig {
    /// Layered sources: defaults, then the YAML file if given, then
    /// `VILLAGE_*` environment variables.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate.
    ///
    /// # Errors
    /// `ConfigError::Load` if a source cannot be parsed or a value has the
    /// wrong shape, `ConfigError::Invalid` if validation fails.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment(file))
    }

    /// # Errors
    /// See [`load`](Self::load).
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns `ConfigError::Invalid` for a zero page size or an empty base URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pagination.page_size == 0 {
            return Err(ConfigError::Invalid(
                "pagination.page_size must be greater than zero".to_owned(),
            ));
        }
        if self.http.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("http.base_url must not be empty".to_owned()));
        }
        Ok(())
    }
}
