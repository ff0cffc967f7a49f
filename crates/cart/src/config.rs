//! Cart configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional.
//!
//! - `CATALOG_API_URL` - Base URL of the catalog/stock API (default: `http://localhost:3333`)
//! - `CATALOG_API_TOKEN` - Bearer token sent to the catalog API
//! - `CATALOG_TIMEOUT_SECS` - HTTP request timeout in seconds (default: 10)
//! - `PRODUCT_CACHE_TTL_SECS` - Product metadata cache TTL, `0` disables it (default: 300)
//! - `CART_STORAGE_PATH` - File backing the local store (default: `.rocketshoes/storage.json`)
//! - `CART_STORAGE_KEY` - Key the cart is stored under (default: `@RocketShoes:cart`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_CATALOG_URL: &str = "http://localhost:3333";
const DEFAULT_TIMEOUT_SECS: &str = "10";
const DEFAULT_CACHE_TTL_SECS: &str = "300";
const DEFAULT_STORAGE_PATH: &str = ".rocketshoes/storage.json";

/// Key the cart document is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "@RocketShoes:cart";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart application configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Catalog/stock API configuration
    pub catalog: CatalogConfig,
    /// Local persistent store configuration
    pub storage: StorageConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Catalog/stock API configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct CatalogConfig {
    /// Base URL; `stock/{id}` and `products/{id}` are resolved against it
    pub base_url: Url,
    /// Optional bearer token
    pub api_token: Option<SecretString>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Product metadata cache TTL (`None` disables caching)
    pub product_cache_ttl: Option<Duration>,
}

impl std::fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("base_url", &self.base_url.as_str())
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout", &self.timeout)
            .field("product_cache_ttl", &self.product_cache_ttl)
            .finish()
    }
}

/// Local persistent store configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// File backing the key-value store
    pub path: PathBuf,
    /// Key the cart document is stored under
    pub key: String,
}

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let catalog = CatalogConfig::from_env(&env)?;
        let storage = StorageConfig {
            path: PathBuf::from(env.get_or_default("CART_STORAGE_PATH", DEFAULT_STORAGE_PATH)),
            key: env.get_or_default("CART_STORAGE_KEY", DEFAULT_STORAGE_KEY),
        };

        Ok(Self {
            catalog,
            storage,
            sentry_dsn: env.get_optional("SENTRY_DSN"),
            sentry_environment: env.get_optional("SENTRY_ENVIRONMENT"),
        })
    }
}

impl CatalogConfig {
    fn from_env<F>(env: &Env<'_, F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = env
            .get_or_default("CATALOG_API_URL", DEFAULT_CATALOG_URL)
            .parse::<Url>()
            .map_err(|e| ConfigError::InvalidEnvVar("CATALOG_API_URL".to_string(), e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidEnvVar(
                "CATALOG_API_URL".to_string(),
                "must be an absolute http(s) URL".to_string(),
            ));
        }

        let timeout = Duration::from_secs(env.parse_secs("CATALOG_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?);
        let ttl = env.parse_secs("PRODUCT_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?;

        Ok(Self {
            base_url: with_trailing_slash(base_url),
            api_token: env.get_optional("CATALOG_API_TOKEN").map(SecretString::from),
            timeout,
            product_cache_ttl: (ttl > 0).then(|| Duration::from_secs(ttl)),
        })
    }

    /// Configuration for `base_url` with default timeout and cache TTL.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url: with_trailing_slash(base_url),
            api_token: None,
            timeout: Duration::from_secs(10),
            product_cache_ttl: Some(Duration::from_secs(300)),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Relative joins replace the last path segment unless the path ends with '/'.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get an optional variable, treating empty values as unset.
    fn get_optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn get_or_default(&self, key: &str, default: &str) -> String {
        self.get_optional(key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Parse a whole number of seconds.
    fn parse_secs(&self, key: &str, default: &str) -> Result<u64, ConfigError> {
        self.get_or_default(key, default)
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }
}
