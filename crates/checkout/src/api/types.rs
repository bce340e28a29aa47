//! Wire types for the commerce backend contract.
//!
//! These mirror what the backend sends and accepts; domain logic lives in the
//! component modules, not here. Decimal amounts travel as numeric strings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use marigold_core::{CouponId, CurrencyCode, CustomerId, OrderId, ProductId};

// =============================================================================
// Catalog
// =============================================================================

/// Stock availability of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    OutOfStock,
    OnBackorder,
}

impl StockStatus {
    /// Whether a line item for this product can still be ordered.
    #[must_use]
    pub const fn is_purchasable(self) -> bool {
        matches!(self, Self::InStock | Self::OnBackorder)
    }
}

/// A product as listed by the catalog endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    /// Price in the store base currency.
    pub price: Decimal,
    pub stock_status: StockStatus,
    pub image_url: Option<String>,
}

// =============================================================================
// Coupons
// =============================================================================

/// How a coupon's `amount` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `amount` is a percentage of the subtotal.
    Percent,
    /// `amount` is a fixed sum in the store base currency.
    Fixed,
}

/// A coupon as returned by the coupon registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponRecord {
    pub id: CouponId,
    pub code: String,
    pub discount_type: DiscountType,
    pub amount: Decimal,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
}

// =============================================================================
// Payments
// =============================================================================

/// A payment gateway offered by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentGateway {
    /// Gateway identifier (e.g. `cod`, `stripe`).
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Only enabled gateways are offered at checkout.
    pub enabled: bool,
}

// =============================================================================
// Geography
// =============================================================================

/// A country option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    /// ISO 3166-1 alpha-2 code (e.g. `AE`).
    pub code: String,
    pub name: String,
}

/// A state/province option within a country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateOption {
    /// Backend state code (e.g. `DU`).
    pub code: String,
    pub name: String,
}

/// A city option within a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityOption {
    pub name: String,
}

// =============================================================================
// Addresses & customers
// =============================================================================

/// A shipping or billing address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub street: String,
    pub city: String,
    pub state_code: String,
    pub country_code: String,
    pub postal_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Address {
    /// Whether every required field is filled in.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !(self.first_name.is_empty()
            || self.last_name.is_empty()
            || self.street.is_empty()
            || self.city.is_empty()
            || self.country_code.is_empty()
            || self.postal_code.is_empty())
    }
}

/// A customer profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub billing: Option<Address>,
    #[serde(default)]
    pub shipping: Option<Address>,
}

/// Partial customer update (address save-back after checkout edits).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CustomerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping: Option<Address>,
}

// =============================================================================
// Orders
// =============================================================================

/// A line item as submitted with an order: product and quantity only.
///
/// Prices are deliberately absent - the backend is the source of truth for
/// authoritative pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A line item as echoed back on a created order.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmedLine {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Authoritative line total, computed server-side.
    pub total: Decimal,
}

/// The backend's response to order creation.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderConfirmation {
    pub id: OrderId,
    pub status: String,
    /// Authoritative order total in the store base currency.
    pub total: Decimal,
    pub currency: CurrencyCode,
    pub line_items: Vec<ConfirmedLine>,
}

// =============================================================================
// Auth
// =============================================================================

/// The result of authenticating against the remote authority.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthToken {
    /// Opaque bearer token (typically a JWT).
    pub token: String,
    pub customer_id: CustomerId,
    /// Identity hint; may be absent, in which case the token is decoded
    /// best-effort or the profile is fetched.
    #[serde(default)]
    pub email: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&StockStatus::InStock).unwrap(),
            "\"in_stock\""
        );
        let parsed: StockStatus = serde_json::from_str("\"out_of_stock\"").unwrap();
        assert_eq!(parsed, StockStatus::OutOfStock);
        assert!(!parsed.is_purchasable());
        assert!(StockStatus::OnBackorder.is_purchasable());
    }

    #[test]
    fn test_order_line_has_no_price_field() {
        let line = OrderLine {
            product_id: ProductId::new(1),
            quantity: 2,
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json, serde_json::json!({"product_id": 1, "quantity": 2}));
    }

    #[test]
    fn test_address_completeness() {
        let mut address = Address {
            first_name: "Amina".to_string(),
            last_name: "Haddad".to_string(),
            street: "1 Palm St".to_string(),
            city: "Dubai".to_string(),
            state_code: "DU".to_string(),
            country_code: "AE".to_string(),
            postal_code: "00000".to_string(),
            phone: None,
        };
        assert!(address.is_complete());

        address.city.clear();
        assert!(!address.is_complete());
    }

    #[test]
    fn test_coupon_record_parses_decimal_string() {
        let json = r#"{
            "id": 5,
            "code": "SAVE30",
            "discount_type": "fixed",
            "amount": "30.00",
            "expires_at": null,
            "usage_limit": 10,
            "usage_count": 3
        }"#;
        let coupon: CouponRecord = serde_json::from_str(json).unwrap();
        assert_eq!(coupon.discount_type, DiscountType::Fixed);
        assert_eq!(coupon.amount, "30.00".parse().unwrap());
    }
}
