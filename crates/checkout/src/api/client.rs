//! REST client for the commerce backend.
//!
//! Uses `reqwest` with JSON bodies and HTTP basic auth (consumer key/secret).
//! Slow-moving reference data (countries, states, cities, payment gateways)
//! is cached with `moka` (10-minute TTL). Mutable state - coupons, orders,
//! customers, auth - is never cached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use marigold_core::{CurrencyCode, CustomerId};

use crate::checkout::OrderDraft;
use crate::config::CheckoutConfig;
use crate::currency::CurrencyTable;

use super::{
    ApiError, AuthBackend, AuthToken, CatalogDirectory, CityOption, Country, CouponDirectory,
    CouponRecord, Customer, CustomerDirectory, CustomerUpdate, GeoDirectory, OrderConfirmation,
    OrderGateway, PaymentGateway, ProductSummary, RateSource, StateOption,
};

/// Reference-data cache TTL.
const CACHE_TTL: Duration = Duration::from_secs(600);

/// Cached reference-data values.
#[derive(Clone)]
enum CacheValue {
    Countries(Vec<Country>),
    States(Vec<StateOption>),
    Cities(Vec<CityOption>),
    Gateways(Vec<PaymentGateway>),
}

// =============================================================================
// RestClient
// =============================================================================

/// Client for the commerce backend REST API.
///
/// Cheaply cloneable; all clones share one connection pool and cache.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<RestClientInner>,
}

struct RestClientInner {
    client: reqwest::Client,
    base_url: Url,
    rates_url: Url,
    consumer_key: String,
    consumer_secret: String,
    cache: Cache<String, CacheValue>,
}

impl RestClient {
    /// Create a new backend client.
    #[must_use]
    pub fn new(config: &CheckoutConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(500)
            .time_to_live(CACHE_TTL)
            .build();

        Self {
            inner: Arc::new(RestClientInner {
                client: reqwest::Client::new(),
                base_url: config.api_base_url.clone(),
                rates_url: config.rates_url.clone(),
                consumer_key: config.consumer_key.clone(),
                consumer_secret: config.consumer_secret.expose_secret().to_string(),
                cache,
            }),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.inner.base_url.join(path)?)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.inner.consumer_key, Some(&self.inner.consumer_secret))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.authed(self.inner.client.get(self.endpoint(path)?));
        Self::execute(request).await
    }

    /// Send a request and normalize the response.
    ///
    /// Every transport, status, and parse failure becomes an [`ApiError`]
    /// here - nothing above this boundary handles raw responses.
    async fn execute<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        // Read the body as text first for better error diagnostics
        let body = response.text().await?;

        if !status.is_success() {
            let message = extract_message(&body);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ApiError::Unauthorized(message)
                }
                StatusCode::NOT_FOUND => ApiError::NotFound(message),
                s if s.is_client_error() => ApiError::Rejected(message),
                s => {
                    warn!(status = %s, body = %truncate(&body), "backend returned server error");
                    ApiError::Status {
                        status: s.as_u16(),
                        body: message,
                    }
                }
            });
        }

        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(error = %e, body = %truncate(&body), "failed to parse backend response");
                Err(ApiError::Parse(e))
            }
        }
    }
}

/// Pull a human-readable message out of an error body.
fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| truncate(body))
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

// =============================================================================
// Trait implementations
// =============================================================================

#[async_trait]
impl CatalogDirectory for RestClient {
    #[instrument(skip(self))]
    async fn products(&self) -> Result<Vec<ProductSummary>, ApiError> {
        self.get_json("products").await
    }
}

#[async_trait]
impl CouponDirectory for RestClient {
    #[instrument(skip(self), fields(code = %code))]
    async fn coupon_by_code(&self, code: &str) -> Result<Option<CouponRecord>, ApiError> {
        let request = self.authed(
            self.inner
                .client
                .get(self.endpoint("coupons")?)
                .query(&[("code", code)]),
        );
        // The registry returns an array; an unknown code is an empty list
        let mut records: Vec<CouponRecord> = Self::execute(request).await?;
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.remove(0))
        })
    }
}

#[async_trait]
impl GeoDirectory for RestClient {
    #[instrument(skip(self))]
    async fn countries(&self) -> Result<Vec<Country>, ApiError> {
        if let Some(CacheValue::Countries(countries)) = self.inner.cache.get("geo:countries").await
        {
            debug!("cache hit for countries");
            return Ok(countries);
        }

        let countries: Vec<Country> = self.get_json("geo/countries").await?;
        self.inner
            .cache
            .insert(
                "geo:countries".to_string(),
                CacheValue::Countries(countries.clone()),
            )
            .await;
        Ok(countries)
    }

    #[instrument(skip(self), fields(country = %country_code))]
    async fn states(&self, country_code: &str) -> Result<Vec<StateOption>, ApiError> {
        let cache_key = format!("geo:states:{country_code}");
        if let Some(CacheValue::States(states)) = self.inner.cache.get(&cache_key).await {
            debug!("cache hit for states");
            return Ok(states);
        }

        let states: Vec<StateOption> = self
            .get_json(&format!("geo/countries/{country_code}/states"))
            .await?;
        self.inner
            .cache
            .insert(cache_key, CacheValue::States(states.clone()))
            .await;
        Ok(states)
    }

    #[instrument(skip(self), fields(country = %country_code, state = %state_code))]
    async fn cities(
        &self,
        country_code: &str,
        state_code: &str,
    ) -> Result<Vec<CityOption>, ApiError> {
        let cache_key = format!("geo:cities:{country_code}:{state_code}");
        if let Some(CacheValue::Cities(cities)) = self.inner.cache.get(&cache_key).await {
            debug!("cache hit for cities");
            return Ok(cities);
        }

        let cities: Vec<CityOption> = self
            .get_json(&format!(
                "geo/countries/{country_code}/states/{state_code}/cities"
            ))
            .await?;
        self.inner
            .cache
            .insert(cache_key, CacheValue::Cities(cities.clone()))
            .await;
        Ok(cities)
    }
}

#[async_trait]
impl OrderGateway for RestClient {
    #[instrument(skip(self))]
    async fn payment_gateways(&self) -> Result<Vec<PaymentGateway>, ApiError> {
        if let Some(CacheValue::Gateways(gateways)) = self.inner.cache.get("gateways").await {
            debug!("cache hit for payment gateways");
            return Ok(gateways);
        }

        let gateways: Vec<PaymentGateway> = self.get_json("payment_gateways").await?;
        self.inner
            .cache
            .insert("gateways".to_string(), CacheValue::Gateways(gateways.clone()))
            .await;
        Ok(gateways)
    }

    #[instrument(skip(self, draft), fields(idempotency_key = %draft.idempotency_key))]
    async fn create_order(&self, draft: &OrderDraft) -> Result<OrderConfirmation, ApiError> {
        let request = self.authed(
            self.inner
                .client
                .post(self.endpoint("orders")?)
                .header("Idempotency-Key", draft.idempotency_key.to_string())
                .json(draft),
        );
        Self::execute(request).await
    }
}

#[async_trait]
impl CustomerDirectory for RestClient {
    #[instrument(skip(self), fields(customer_id = %id))]
    async fn customer(&self, id: CustomerId) -> Result<Customer, ApiError> {
        self.get_json(&format!("customers/{id}")).await
    }

    #[instrument(skip(self, update), fields(customer_id = %id))]
    async fn update_customer(
        &self,
        id: CustomerId,
        update: &CustomerUpdate,
    ) -> Result<Customer, ApiError> {
        let request = self.authed(
            self.inner
                .client
                .put(self.endpoint(&format!("customers/{id}"))?)
                .json(update),
        );
        Self::execute(request).await
    }
}

#[derive(serde::Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(serde::Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct ValidateResponse {
    valid: bool,
}

#[async_trait]
impl AuthBackend for RestClient {
    #[instrument(skip(self, password), fields(email = %email))]
    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthToken, ApiError> {
        let request = self
            .inner
            .client
            .post(self.endpoint("auth/login")?)
            .json(&LoginRequest { email, password });
        Self::execute(request).await
    }

    #[instrument(skip(self, token))]
    async fn validate_token(&self, token: &str) -> Result<bool, ApiError> {
        let request = self
            .inner
            .client
            .post(self.endpoint("auth/validate")?)
            .json(&ValidateRequest { token });
        let response: ValidateResponse = Self::execute(request).await?;
        Ok(response.valid)
    }
}

/// Wire shape of the rate endpoint (`{"base_code": "USD", "rates": {...}}`).
#[derive(Deserialize)]
struct RateTableWire {
    #[serde(alias = "base_code")]
    base: String,
    rates: HashMap<String, Decimal>,
}

#[async_trait]
impl RateSource for RestClient {
    #[instrument(skip(self))]
    async fn latest_rates(&self) -> Result<CurrencyTable, ApiError> {
        // The rate source is public; no consumer credentials attached
        let request = self.inner.client.get(self.inner.rates_url.clone());
        let wire: RateTableWire = Self::execute(request).await?;

        let pivot = CurrencyCode::parse(&wire.base)
            .map_err(|e| ApiError::Rejected(format!("bad pivot currency: {e}")))?;

        let mut rates = HashMap::with_capacity(wire.rates.len());
        for (code, rate) in wire.rates {
            match CurrencyCode::parse(&code) {
                Ok(code) => {
                    rates.insert(code, rate);
                }
                Err(_) => debug!(code, "skipping non-ISO currency code in rate table"),
            }
        }

        Ok(CurrencyTable::new(pivot, rates, Utc::now()))
    }
}
