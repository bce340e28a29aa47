//! Checkout configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARIGOLD_API_BASE_URL` - Base URL of the commerce backend REST API
//! - `MARIGOLD_CONSUMER_KEY` - API consumer key
//! - `MARIGOLD_CONSUMER_SECRET` - API consumer secret
//!
//! ## Optional
//! - `MARIGOLD_RATES_URL` - Exchange-rate table endpoint
//!   (default: `https://open.er-api.com/v6/latest/USD`)
//! - `MARIGOLD_BASE_CURRENCY` - Store base currency (default: USD)
//! - `MARIGOLD_PIVOT_CURRENCY` - Currency the rate table is denominated in
//!   (default: USD)
//! - `MARIGOLD_RATES_REFRESH_SECS` - Rate refresh interval (default: 3600)
//! - `MARIGOLD_STATE_DIR` - Directory for persisted local state
//!   (default: `.marigold`)

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use marigold_core::CurrencyCode;

/// Default exchange-rate source, pivoted on USD.
const DEFAULT_RATES_URL: &str = "https://open.er-api.com/v6/latest/USD";

/// Default rate-refresh interval (hourly).
const DEFAULT_RATES_REFRESH_SECS: u64 = 3600;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Checkout pipeline configuration.
///
/// Implements `Debug` manually to redact the consumer secret.
#[derive(Clone)]
pub struct CheckoutConfig {
    /// Base URL of the commerce backend REST API.
    pub api_base_url: Url,
    /// API consumer key (sent as HTTP basic auth username).
    pub consumer_key: String,
    /// API consumer secret (sent as HTTP basic auth password).
    pub consumer_secret: SecretString,
    /// Exchange-rate table endpoint.
    pub rates_url: Url,
    /// Currency backend prices and authoritative order totals are in.
    pub base_currency: CurrencyCode,
    /// Currency the fetched rate table expresses all rates in.
    pub pivot_currency: CurrencyCode,
    /// How often the rate table is refreshed.
    pub rates_refresh: Duration,
    /// Directory for persisted local state (cart, wishlist, session).
    pub state_dir: PathBuf,
}

impl std::fmt::Debug for CheckoutConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"[REDACTED]")
            .field("rates_url", &self.rates_url.as_str())
            .field("base_currency", &self.base_currency)
            .field("pivot_currency", &self.pivot_currency)
            .field("rates_refresh", &self.rates_refresh)
            .field("state_dir", &self.state_dir)
            .finish()
    }
}

impl CheckoutConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from a `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = parse_url(&get_required_env("MARIGOLD_API_BASE_URL")?)?;
        let consumer_key = get_required_env("MARIGOLD_CONSUMER_KEY")?;
        let consumer_secret = SecretString::from(get_required_env("MARIGOLD_CONSUMER_SECRET")?);

        let rates_url = parse_url(&get_env_or_default("MARIGOLD_RATES_URL", DEFAULT_RATES_URL))?;
        let base_currency = parse_currency("MARIGOLD_BASE_CURRENCY")?;
        let pivot_currency = parse_currency("MARIGOLD_PIVOT_CURRENCY")?;

        let rates_refresh_secs = get_env_or_default(
            "MARIGOLD_RATES_REFRESH_SECS",
            &DEFAULT_RATES_REFRESH_SECS.to_string(),
        )
        .parse::<u64>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("MARIGOLD_RATES_REFRESH_SECS".to_string(), e.to_string())
        })?;

        let state_dir = PathBuf::from(get_env_or_default("MARIGOLD_STATE_DIR", ".marigold"));

        Ok(Self {
            api_base_url,
            consumer_key,
            consumer_secret,
            rates_url,
            base_currency,
            pivot_currency,
            rates_refresh: Duration::from_secs(rates_refresh_secs),
            state_dir,
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

fn parse_url(value: &str) -> Result<Url, ConfigError> {
    Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar("MARIGOLD_API_BASE_URL".to_string(), e.to_string()))
}

/// Parse a currency-code variable, defaulting to USD when unset.
fn parse_currency(key: &str) -> Result<CurrencyCode, ConfigError> {
    match std::env::var(key) {
        Ok(value) => CurrencyCode::parse(&value)
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(CurrencyCode::usd()),
    }
}
