//! Basket client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BASKET_REMOTE_URL` - Base URL of the remote store API
//! - `BASKET_REMOTE_TOKEN` - Bearer token for the remote store
//!
//! ## Optional
//! - `BASKET_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 10)
//! - `BASKET_PRODUCT_CACHE_TTL_SECS` - Product cache TTL (default: 300)
//! - `BASKET_PRODUCT_CACHE_CAPACITY` - Max cached products (default: 1000)
//! - `BASKET_NOTIFICATION_TEMPLATE` - Order notification message; `{order_id}`
//!   and `{total}` are substituted (default: `New order {order_id} placed: total {total}`)

use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_TOKEN_LENGTH: usize = 16;

const DEFAULT_NOTIFICATION_TEMPLATE: &str = "New order {order_id} placed: total {total}";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Basket client configuration.
#[derive(Debug, Clone)]
pub struct BasketConfig {
    /// Remote store connection settings
    pub remote: RemoteStoreConfig,
    /// Checkout behaviour
    pub checkout: CheckoutConfig,
}

/// Remote store connection settings.
#[derive(Debug, Clone)]
pub struct RemoteStoreConfig {
    /// Base URL of the store API (always ends with `/`)
    pub base_url: Url,
    /// Bearer token
    pub token: SecretString,
    /// Timeout applied to every request
    pub request_timeout: Duration,
    /// How long catalog products stay cached
    pub product_cache_ttl: Duration,
    /// Maximum number of cached products
    pub product_cache_capacity: u64,
}

/// Checkout behaviour.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Message template for the order notification
    pub notification_template: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            notification_template: DEFAULT_NOTIFICATION_TEMPLATE.to_string(),
        }
    }
}

impl CheckoutConfig {
    /// Render the notification message for a placed order.
    #[must_use]
    pub fn render_notification(&self, order_id: &str, total: &str) -> String {
        self.notification_template
            .replace("{order_id}", order_id)
            .replace("{total}", total)
    }
}

impl BasketConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the token looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            remote: RemoteStoreConfig::from_env()?,
            checkout: CheckoutConfig {
                notification_template: get_env_or_default(
                    "BASKET_NOTIFICATION_TEMPLATE",
                    DEFAULT_NOTIFICATION_TEMPLATE,
                ),
            },
        })
    }
}

impl RemoteStoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = parse_base_url(&get_required_env("BASKET_REMOTE_URL")?)?;
        let token = get_validated_secret("BASKET_REMOTE_TOKEN")?;

        Ok(Self {
            base_url,
            token,
            request_timeout: Duration::from_secs(get_parsed_or_default(
                "BASKET_REQUEST_TIMEOUT_SECS",
                10,
            )?),
            product_cache_ttl: Duration::from_secs(get_parsed_or_default(
                "BASKET_PRODUCT_CACHE_TTL_SECS",
                300,
            )?),
            product_cache_capacity: get_parsed_or_default("BASKET_PRODUCT_CACHE_CAPACITY", 1000)?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn get_parsed_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key).map_or(Ok(default), |raw| {
        raw.parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse the store base URL, forcing a trailing slash so relative joins keep the path.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash)
        .map_err(|e| ConfigError::InvalidEnvVar("BASKET_REMOTE_URL".to_string(), e.to_string()))
}

/// Validate that a token is not a placeholder and is long enough.
fn validate_token(token: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = token.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    if token.len() < MIN_TOKEN_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {MIN_TOKEN_LENGTH} characters (got {})",
                token.len()
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_token(&value, key)?;
    Ok(SecretString::from(value))
}

impl RemoteStoreConfig {
    /// Token value for the `Authorization` header.
    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn remote_config() -> RemoteStoreConfig {
        RemoteStoreConfig {
            base_url: parse_base_url("https://store.test/api/v1").unwrap(),
            token: SecretString::from("tok_9f8e7d6c5b4a3210"),
            request_timeout: Duration::from_secs(10),
            product_cache_ttl: Duration::from_secs(300),
            product_cache_capacity: 1000,
        }
    }

    #[test]
    fn test_validate_token_placeholder() {
        let result = validate_token("your-token-goes-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_token_too_short() {
        let result = validate_token("a1b2c3", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_token_valid() {
        assert!(validate_token("tok_9f8e7d6c5b4a3210", "TEST_VAR").is_ok());
    }

    #[test]
    fn test_parse_base_url_adds_trailing_slash() {
        let url = parse_base_url("https://store.test/api/v1").unwrap();
        assert_eq!(url.as_str(), "https://store.test/api/v1/");
        assert_eq!(
            url.join("line-items").unwrap().as_str(),
            "https://store.test/api/v1/line-items"
        );
    }

    #[test]
    fn test_parse_base_url_invalid() {
        assert!(matches!(
            parse_base_url("not a url"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
    }

    #[test]
    fn test_render_notification() {
        let checkout = CheckoutConfig::default();
        assert_eq!(
            checkout.render_notification("o-7", "50.00"),
            "New order o-7 placed: total 50.00"
        );
    }

    #[test]
    fn test_remote_config_debug_redacts_token() {
        let debug_output = format!("{:?}", remote_config());

        assert!(debug_output.contains("store.test"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("tok_9f8e7d6c5b4a3210"));
    }

    #[test]
    fn test_bearer_header() {
        assert_eq!(remote_config().bearer(), "Bearer tok_9f8e7d6c5b4a3210");
    }
}
