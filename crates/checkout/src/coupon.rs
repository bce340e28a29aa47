//! Coupon/discount engine.
//!
//! Validates a code against the remote registry and computes a bounded
//! discount against a given subtotal. Validity is re-checked at validation
//! time, never cached. Only one coupon applies at a time; applying a new one
//! replaces rather than stacks (the orchestrator holds the single
//! [`AppliedCoupon`] slot).

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::api::{ApiError, CouponDirectory, CouponRecord, DiscountType};

/// Why a coupon code was not accepted.
///
/// Surfaced to the shopper as a field-level message; rejection never mutates
/// cart or order state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CouponRejection {
    /// No coupon exists for the code.
    #[error("coupon code not recognized")]
    UnknownCode,

    /// The coupon's expiry date is in the past.
    #[error("coupon has expired")]
    Expired,

    /// The coupon has been redeemed as many times as its limit allows.
    #[error("coupon usage limit reached")]
    UsageLimitReached,

    /// The registry could not be reached or answered abnormally.
    #[error("coupon lookup failed: {0}")]
    Lookup(String),
}

/// A validated coupon bound to the subtotal it was validated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCoupon {
    /// The code as entered.
    pub code: String,
    /// Discount amount, already clamped to the subtotal.
    pub discount: Decimal,
    /// The subtotal the discount was computed from.
    pub subtotal: Decimal,
}

impl AppliedCoupon {
    /// Chargeable total after the discount. Never negative.
    #[must_use]
    pub fn total_after_discount(&self) -> Decimal {
        (self.subtotal - self.discount).max(Decimal::ZERO)
    }
}

/// Validate `code` against the registry and compute its discount for
/// `subtotal`.
///
/// # Errors
///
/// Returns a [`CouponRejection`] describing why the code was not accepted;
/// registry lookup failures are reported directly (coupon validation is
/// user-initiated, so there is no silent fallback here).
#[instrument(skip(directory), fields(code = %code))]
pub async fn validate(
    directory: &impl CouponDirectory,
    code: &str,
    subtotal: Decimal,
) -> Result<AppliedCoupon, CouponRejection> {
    let record = directory
        .coupon_by_code(code)
        .await
        .map_err(|e: ApiError| CouponRejection::Lookup(e.to_string()))?
        .ok_or(CouponRejection::UnknownCode)?;

    check_usable(&record)?;

    let discount = discount_for(&record, subtotal);
    debug!(%discount, "coupon accepted");

    Ok(AppliedCoupon {
        code: record.code,
        discount,
        subtotal,
    })
}

/// Expiry and usage-limit checks.
fn check_usable(record: &CouponRecord) -> Result<(), CouponRejection> {
    if let Some(expires_at) = record.expires_at
        && expires_at < Utc::now()
    {
        return Err(CouponRejection::Expired);
    }

    if let Some(limit) = record.usage_limit
        && record.usage_count >= limit
    {
        return Err(CouponRejection::UsageLimitReached);
    }

    Ok(())
}

/// Discount amount for a coupon against a subtotal.
///
/// Percent coupons take `amount%` of the subtotal; fixed coupons are clamped
/// to the subtotal they apply to - a discount can never exceed what it
/// discounts.
fn discount_for(record: &CouponRecord, subtotal: Decimal) -> Decimal {
    match record.discount_type {
        DiscountType::Percent => (subtotal * record.amount / Decimal::ONE_HUNDRED).round_dp(2),
        DiscountType::Fixed => record.amount.min(subtotal),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use marigold_core::CouponId;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn fixed_coupon(amount: &str) -> CouponRecord {
        CouponRecord {
            id: CouponId::new(1),
            code: "SAVE".to_string(),
            discount_type: DiscountType::Fixed,
            amount: dec(amount),
            expires_at: None,
            usage_limit: None,
            usage_count: 0,
        }
    }

    fn percent_coupon(amount: &str) -> CouponRecord {
        CouponRecord {
            discount_type: DiscountType::Percent,
            ..fixed_coupon(amount)
        }
    }

    struct FakeRegistry(Option<CouponRecord>);

    #[async_trait]
    impl CouponDirectory for FakeRegistry {
        async fn coupon_by_code(&self, _code: &str) -> Result<Option<CouponRecord>, ApiError> {
            Ok(self.0.clone())
        }
    }

    struct DownRegistry;

    #[async_trait]
    impl CouponDirectory for DownRegistry {
        async fn coupon_by_code(&self, _code: &str) -> Result<Option<CouponRecord>, ApiError> {
            Err(ApiError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            })
        }
    }

    #[test]
    fn test_fixed_discount_clamps_to_subtotal() {
        // 150 off a 100 subtotal clamps to 100
        assert_eq!(
            discount_for(&fixed_coupon("150"), dec("100.00")),
            dec("100.00")
        );
        assert_eq!(
            discount_for(&fixed_coupon("30"), dec("100.00")),
            dec("30")
        );
    }

    #[test]
    fn test_percent_discount() {
        assert_eq!(
            discount_for(&percent_coupon("10"), dec("50.00")),
            dec("5.00")
        );
        // Rounded to cents
        assert_eq!(
            discount_for(&percent_coupon("15"), dec("33.33")),
            dec("5.00")
        );
    }

    #[test]
    fn test_total_never_negative() {
        let applied = AppliedCoupon {
            code: "SAVE".to_string(),
            discount: dec("100.00"),
            subtotal: dec("100.00"),
        };
        assert_eq!(applied.total_after_discount(), Decimal::ZERO);
    }

    #[test]
    fn test_expiry_and_usage_checks() {
        let expired = CouponRecord {
            expires_at: Some(Utc::now() - Duration::hours(1)),
            ..fixed_coupon("10")
        };
        assert_eq!(check_usable(&expired), Err(CouponRejection::Expired));

        let still_valid = CouponRecord {
            expires_at: Some(Utc::now() + Duration::hours(1)),
            ..fixed_coupon("10")
        };
        assert_eq!(check_usable(&still_valid), Ok(()));

        let exhausted = CouponRecord {
            usage_limit: Some(5),
            usage_count: 5,
            ..fixed_coupon("10")
        };
        assert_eq!(check_usable(&exhausted), Err(CouponRejection::UsageLimitReached));

        let under_limit = CouponRecord {
            usage_limit: Some(5),
            usage_count: 4,
            ..fixed_coupon("10")
        };
        assert_eq!(check_usable(&under_limit), Ok(()));
    }

    #[tokio::test]
    async fn test_validate_happy_path() {
        let registry = FakeRegistry(Some(fixed_coupon("30")));
        let applied = validate(&registry, "SAVE", dec("100.00")).await.unwrap();

        assert_eq!(applied.discount, dec("30"));
        assert_eq!(applied.total_after_discount(), dec("70.00"));
    }

    #[tokio::test]
    async fn test_validate_unknown_code() {
        let registry = FakeRegistry(None);
        assert_eq!(
            validate(&registry, "NOPE", dec("100.00")).await,
            Err(CouponRejection::UnknownCode)
        );
    }

    #[tokio::test]
    async fn test_validate_lookup_failure_is_reported() {
        let result = validate(&DownRegistry, "SAVE", dec("100.00")).await;
        assert!(matches!(result, Err(CouponRejection::Lookup(_))));
    }

    #[tokio::test]
    async fn test_oversized_fixed_coupon_zeroes_total() {
        let registry = FakeRegistry(Some(fixed_coupon("150")));
        let applied = validate(&registry, "SAVE", dec("100.00")).await.unwrap();

        assert_eq!(applied.discount, dec("100.00"));
        assert_eq!(applied.total_after_discount(), dec("0.00"));
    }
}
