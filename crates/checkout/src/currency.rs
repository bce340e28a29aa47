//! Currency rate service.
//!
//! Holds a pivot-denominated exchange-rate table and converts amounts for
//! *display only* - the authoritative order total submitted to the backend is
//! always in the store base currency, never in the shopper's display
//! currency.
//!
//! The service starts on a built-in fallback table and is refreshed on a
//! fixed interval; a failed refresh silently retains the last good table, so
//! price display is never blocked on network availability.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use marigold_core::{CurrencyCode, Money};

use crate::api::RateSource;
use crate::config::CheckoutConfig;

/// A pivot-denominated exchange-rate table.
///
/// Every rate is the multiplier from the pivot currency to the keyed
/// currency; the pivot itself has rate 1.
#[derive(Debug, Clone)]
pub struct CurrencyTable {
    pivot: CurrencyCode,
    rates: HashMap<CurrencyCode, Decimal>,
    fetched_at: DateTime<Utc>,
}

impl CurrencyTable {
    /// Build a table from fetched rates.
    #[must_use]
    pub fn new(
        pivot: CurrencyCode,
        mut rates: HashMap<CurrencyCode, Decimal>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        rates.insert(pivot.clone(), Decimal::ONE);
        Self {
            pivot,
            rates,
            fetched_at,
        }
    }

    /// The built-in fallback table (USD pivot, a handful of majors).
    ///
    /// Stale by definition, but guarantees the system is never without
    /// *some* rate table.
    #[must_use]
    pub fn fallback() -> Self {
        let mut rates = HashMap::new();
        let entries: [(&str, Decimal); 6] = [
            ("USD", Decimal::ONE),
            ("EUR", Decimal::new(92, 2)),
            ("GBP", Decimal::new(79, 2)),
            ("AED", Decimal::new(36725, 4)),
            ("CAD", Decimal::new(136, 2)),
            ("AUD", Decimal::new(152, 2)),
        ];
        for (code, rate) in entries {
            if let Ok(code) = CurrencyCode::parse(code) {
                rates.insert(code, rate);
            }
        }

        Self {
            pivot: CurrencyCode::usd(),
            rates,
            // Epoch, so the first refresh check always fires
            fetched_at: DateTime::UNIX_EPOCH,
        }
    }

    /// Multiplier from the pivot to `code`, if known.
    #[must_use]
    pub fn rate(&self, code: &CurrencyCode) -> Option<Decimal> {
        self.rates.get(code).copied()
    }

    /// The currency the table is denominated in.
    #[must_use]
    pub const fn pivot(&self) -> &CurrencyCode {
        &self.pivot
    }

    /// When the table was fetched.
    #[must_use]
    pub const fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

// =============================================================================
// CurrencyService
// =============================================================================

/// Owns the current rate table and performs display conversions.
#[derive(Debug)]
pub struct CurrencyService {
    table: CurrencyTable,
    refresh_interval: Duration,
}

impl CurrencyService {
    /// Create a service on the built-in fallback table.
    #[must_use]
    pub fn new(config: &CheckoutConfig) -> Self {
        Self {
            table: CurrencyTable::fallback(),
            refresh_interval: config.rates_refresh,
        }
    }

    /// Convert `amount` between currencies for display.
    ///
    /// Same-currency conversion is an exact no-op (no rounding noise on the
    /// common case). Otherwise the amount takes two hops through the pivot:
    /// divide by the source rate, multiply by the target rate. A currency
    /// missing from the table logs a warning and returns the amount
    /// unchanged - this layer must never block or panic over display money.
    #[must_use]
    pub fn convert(&self, amount: Decimal, from: &CurrencyCode, to: &CurrencyCode) -> Decimal {
        if from == to {
            return amount;
        }

        let Some(from_rate) = self.table.rate(from) else {
            warn!(%from, "currency missing from rate table, displaying unconverted");
            return amount;
        };
        let Some(to_rate) = self.table.rate(to) else {
            warn!(%to, "currency missing from rate table, displaying unconverted");
            return amount;
        };
        if from_rate.is_zero() {
            warn!(%from, "zero rate in table, displaying unconverted");
            return amount;
        }

        amount / from_rate * to_rate
    }

    /// Convert and package an amount for display, rounded to cents.
    #[must_use]
    pub fn display_price(&self, amount: Decimal, from: &CurrencyCode, to: &CurrencyCode) -> Money {
        Money::new(self.convert(amount, from, to).round_dp(2), to.clone())
    }

    /// Whether the table is due for a refresh.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        let age = Utc::now().signed_duration_since(self.table.fetched_at());
        age.to_std().ok().is_none_or(|age| age >= self.refresh_interval)
    }

    /// Fetch a fresh table, retaining the current one on failure.
    pub async fn refresh(&mut self, source: &impl RateSource) {
        match source.latest_rates().await {
            Ok(table) => {
                debug!(pivot = %table.pivot(), "rate table refreshed");
                self.table = table;
            }
            Err(e) => {
                warn!(error = %e, "rate refresh failed, retaining previous table");
            }
        }
    }

    /// Refresh only if the table is stale.
    pub async fn refresh_if_stale(&mut self, source: &impl RateSource) {
        if self.needs_refresh() {
            self.refresh(source).await;
        }
    }

    /// The current table.
    #[must_use]
    pub const fn table(&self) -> &CurrencyTable {
        &self.table
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::{ApiError, RateSource};
    use async_trait::async_trait;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::parse(s).unwrap()
    }

    fn service_with(rates: &[(&str, &str)], pivot: &str) -> CurrencyService {
        let rates = rates
            .iter()
            .map(|(c, r)| (code(c), dec(r)))
            .collect::<HashMap<_, _>>();
        CurrencyService {
            table: CurrencyTable::new(code(pivot), rates, Utc::now()),
            refresh_interval: Duration::from_secs(3600),
        }
    }

    struct FailingSource;

    #[async_trait]
    impl RateSource for FailingSource {
        async fn latest_rates(&self) -> Result<CurrencyTable, ApiError> {
            Err(ApiError::Status {
                status: 503,
                body: "down".to_string(),
            })
        }
    }

    struct FixedSource;

    #[async_trait]
    impl RateSource for FixedSource {
        async fn latest_rates(&self) -> Result<CurrencyTable, ApiError> {
            let mut rates = HashMap::new();
            rates.insert(code("AED"), dec("4.0"));
            Ok(CurrencyTable::new(code("USD"), rates, Utc::now()))
        }
    }

    #[test]
    fn test_same_currency_is_exact_noop() {
        let service = service_with(&[("USD", "1")], "USD");
        let amount = dec("19.990001");
        for currency in ["USD", "EUR", "XXX"] {
            assert_eq!(
                service.convert(amount, &code(currency), &code(currency)),
                amount
            );
        }
    }

    #[test]
    fn test_pivot_to_display_single_hop() {
        let service = service_with(&[("USD", "1"), ("AED", "3.6725")], "USD");
        assert_eq!(
            service.convert(dec("100"), &code("USD"), &code("AED")),
            dec("367.25")
        );
    }

    #[test]
    fn test_non_pivot_base_two_hops() {
        // Store base EUR, display AED, table pivoted on USD:
        // 92 EUR -> 100 USD -> 367.25 AED
        let service = service_with(&[("USD", "1"), ("EUR", "0.92"), ("AED", "3.6725")], "USD");
        assert_eq!(
            service.convert(dec("92"), &code("EUR"), &code("AED")),
            dec("367.25")
        );
    }

    #[test]
    fn test_missing_rate_returns_amount_unchanged() {
        let service = service_with(&[("USD", "1")], "USD");
        assert_eq!(
            service.convert(dec("10"), &code("USD"), &code("JPY")),
            dec("10")
        );
        assert_eq!(
            service.convert(dec("10"), &code("JPY"), &code("USD")),
            dec("10")
        );
    }

    #[test]
    fn test_display_price_rounds_to_cents() {
        let service = service_with(&[("USD", "1"), ("AED", "3.6725")], "USD");
        let price = service.display_price(dec("19.99"), &code("USD"), &code("AED"));
        assert_eq!(price.amount, dec("73.41"));
        assert_eq!(price.to_string(), "73.41 AED");
    }

    #[test]
    fn test_fallback_table_always_present() {
        let table = CurrencyTable::fallback();
        assert_eq!(table.pivot(), &CurrencyCode::usd());
        assert!(table.rate(&code("AED")).is_some());
        assert_eq!(table.rate(&code("USD")), Some(Decimal::ONE));
    }

    #[test]
    fn test_fallback_table_is_immediately_stale() {
        let service = CurrencyService {
            table: CurrencyTable::fallback(),
            refresh_interval: Duration::from_secs(3600),
        };
        assert!(service.needs_refresh());
    }

    #[tokio::test]
    async fn test_failed_refresh_retains_previous_table() {
        let mut service = service_with(&[("USD", "1"), ("AED", "3.6725")], "USD");
        let before = service.table().fetched_at();

        service.refresh(&FailingSource).await;

        assert_eq!(service.table().fetched_at(), before);
        assert_eq!(
            service.convert(dec("100"), &code("USD"), &code("AED")),
            dec("367.25")
        );
    }

    #[tokio::test]
    async fn test_successful_refresh_replaces_table() {
        let mut service = CurrencyService {
            table: CurrencyTable::fallback(),
            refresh_interval: Duration::from_secs(3600),
        };

        service.refresh_if_stale(&FixedSource).await;

        assert!(!service.needs_refresh());
        assert_eq!(
            service.convert(dec("1"), &code("USD"), &code("AED")),
            dec("4.0")
        );
    }
}
