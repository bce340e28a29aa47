//! Remote commerce backend contract.
//!
//! # Architecture
//!
//! The backend (catalog, coupon registry, payment gateways, geography data,
//! order ledger, customer records, auth authority) is an opaque external
//! service. This module is the only place that talks to it:
//!
//! - per-concern traits ([`CatalogDirectory`], [`CouponDirectory`],
//!   [`GeoDirectory`], [`OrderGateway`], [`CustomerDirectory`],
//!   [`AuthBackend`], [`RateSource`]) are the seams the pipeline components
//!   depend on, and what tests fake;
//! - [`RestClient`] implements them all over reqwest;
//! - [`ApiError`] is the normalization boundary - no raw transport error
//!   crosses it.

mod client;
mod types;

pub use client::RestClient;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

use marigold_core::CustomerId;

use crate::checkout::OrderDraft;
use crate::currency::CurrencyTable;

/// Errors that can occur when talking to the commerce backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be parsed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be constructed.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials or token rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Request rejected by the backend (e.g. stock unavailable).
    /// The message is surfaced to the user verbatim.
    #[error("{0}")]
    Rejected(String),

    /// Rate limited by the backend.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Unexpected response status.
    #[error("unexpected response ({status}): {body}")]
    Status { status: u16, body: String },
}

/// Product catalog lookups.
#[async_trait]
pub trait CatalogDirectory {
    /// List products with current price and stock status.
    async fn products(&self) -> Result<Vec<ProductSummary>, ApiError>;
}

/// Coupon registry lookups.
#[async_trait]
pub trait CouponDirectory {
    /// Fetch a coupon by its code, or `None` if no such code exists.
    async fn coupon_by_code(&self, code: &str) -> Result<Option<CouponRecord>, ApiError>;
}

/// Cascading geography option lists.
#[async_trait]
pub trait GeoDirectory {
    async fn countries(&self) -> Result<Vec<Country>, ApiError>;
    async fn states(&self, country_code: &str) -> Result<Vec<StateOption>, ApiError>;
    async fn cities(&self, country_code: &str, state_code: &str)
    -> Result<Vec<CityOption>, ApiError>;
}

/// Order creation and payment methods.
#[async_trait]
pub trait OrderGateway {
    /// List payment gateways (callers filter to `enabled`).
    async fn payment_gateways(&self) -> Result<Vec<PaymentGateway>, ApiError>;

    /// Create an order. Single-shot and non-idempotent server-side; the
    /// draft's idempotency key is attached so a backend that supports
    /// deduplication can use it.
    async fn create_order(&self, draft: &OrderDraft) -> Result<OrderConfirmation, ApiError>;
}

/// Customer profile access.
#[async_trait]
pub trait CustomerDirectory {
    async fn customer(&self, id: CustomerId) -> Result<Customer, ApiError>;
    async fn update_customer(
        &self,
        id: CustomerId,
        update: &CustomerUpdate,
    ) -> Result<Customer, ApiError>;
}

/// The remote auth authority.
#[async_trait]
pub trait AuthBackend {
    /// Exchange credentials for a token.
    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthToken, ApiError>;

    /// Check whether a token is still valid. `Ok(false)` means the authority
    /// rejected it; `Err` means the authority could not be reached.
    async fn validate_token(&self, token: &str) -> Result<bool, ApiError>;
}

/// Exchange-rate table source.
#[async_trait]
pub trait RateSource {
    /// Fetch the latest pivot-denominated rate table.
    async fn latest_rates(&self) -> Result<CurrencyTable, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_error_surfaces_message_verbatim() {
        let err = ApiError::Rejected("Product 7 is out of stock".to_string());
        assert_eq!(err.to_string(), "Product 7 is out of stock");
    }

    #[test]
    fn test_status_error_display() {
        let err = ApiError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "unexpected response (502): bad gateway");
    }
}
