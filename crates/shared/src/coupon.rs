//! Coupon validation and discount calculation
//!
//! Pure rules engine: callers load the coupon row, hand it over together with
//! the order amount, and get back either a quote or a rejection reason. The
//! usage counter is incremented by the caller only after a successful
//! redemption.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::types::DiscountType;

/// The validation-relevant fields of a coupon
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CouponRules {
    pub discount_type: DiscountType,
    /// Percent (0-100) for percentage coupons, cents for fixed coupons
    pub value: i64,
    pub valid_from: OffsetDateTime,
    pub valid_until: OffsetDateTime,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub min_amount_cents: Option<i64>,
    pub is_active: bool,
}

/// A successfully validated coupon application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponQuote {
    pub discount_cents: i64,
    pub final_amount_cents: i64,
}

/// Why a coupon was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("Coupon is not active")]
    Inactive,
    #[error("Coupon is not valid at this time")]
    OutsideValidityWindow,
    #[error("Coupon has reached maximum usage")]
    UsageCapReached,
    #[error("Minimum amount required: {0} cents")]
    BelowMinimumAmount(i64),
}

impl CouponRules {
    /// Validate this coupon against an order amount at a point in time.
    ///
    /// The discount is capped at the order amount, so the final total can
    /// never go negative.
    pub fn validate(
        &self,
        amount_cents: i64,
        now: OffsetDateTime,
    ) -> Result<CouponQuote, CouponRejection> {
        if !self.is_active {
            return Err(CouponRejection::Inactive);
        }

        if now < self.valid_from || now > self.valid_until {
            return Err(CouponRejection::OutsideValidityWindow);
        }

        if let Some(max_uses) = self.max_uses {
            if self.used_count >= max_uses {
                return Err(CouponRejection::UsageCapReached);
            }
        }

        if let Some(min) = self.min_amount_cents {
            if amount_cents < min {
                return Err(CouponRejection::BelowMinimumAmount(min));
            }
        }

        let raw_discount = match self.discount_type {
            DiscountType::Percentage => amount_cents * self.value / 100,
            DiscountType::Fixed => self.value,
        };

        let discount_cents = raw_discount.min(amount_cents).max(0);

        Ok(CouponQuote {
            discount_cents,
            final_amount_cents: amount_cents - discount_cents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn coupon(discount_type: DiscountType, value: i64) -> CouponRules {
        let now = OffsetDateTime::now_utc();
        CouponRules {
            discount_type,
            value,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            max_uses: Some(100),
            used_count: 0,
            min_amount_cents: None,
            is_active: true,
        }
    }

    #[test]
    fn test_percentage_discount() {
        let c = coupon(DiscountType::Percentage, 20);
        let quote = c.validate(10_000, OffsetDateTime::now_utc()).unwrap();
        assert_eq!(quote.discount_cents, 2_000);
        assert_eq!(quote.final_amount_cents, 8_000);
    }

    #[test]
    fn test_fixed_discount() {
        let c = coupon(DiscountType::Fixed, 1_500);
        let quote = c.validate(10_000, OffsetDateTime::now_utc()).unwrap();
        assert_eq!(quote.discount_cents, 1_500);
        assert_eq!(quote.final_amount_cents, 8_500);
    }

    #[test]
    fn test_fixed_discount_capped_at_amount() {
        let c = coupon(DiscountType::Fixed, 50_000);
        let quote = c.validate(3_000, OffsetDateTime::now_utc()).unwrap();
        assert_eq!(quote.discount_cents, 3_000);
        assert_eq!(quote.final_amount_cents, 0);
    }

    #[test]
    fn test_inactive_rejected() {
        let mut c = coupon(DiscountType::Percentage, 10);
        c.is_active = false;
        assert_eq!(
            c.validate(10_000, OffsetDateTime::now_utc()),
            Err(CouponRejection::Inactive)
        );
    }

    #[test]
    fn test_outside_validity_window_rejected() {
        let c = coupon(DiscountType::Percentage, 10);

        let before = c.valid_from - Duration::hours(1);
        assert_eq!(
            c.validate(10_000, before),
            Err(CouponRejection::OutsideValidityWindow)
        );

        let after = c.valid_until + Duration::hours(1);
        assert_eq!(
            c.validate(10_000, after),
            Err(CouponRejection::OutsideValidityWindow)
        );
    }

    #[test]
    fn test_usage_cap_rejected() {
        let mut c = coupon(DiscountType::Percentage, 10);
        c.max_uses = Some(5);
        c.used_count = 5;
        assert_eq!(
            c.validate(10_000, OffsetDateTime::now_utc()),
            Err(CouponRejection::UsageCapReached)
        );
    }

    #[test]
    fn test_unlimited_uses_allowed() {
        let mut c = coupon(DiscountType::Percentage, 10);
        c.max_uses = None;
        c.used_count = 10_000;
        assert!(c.validate(10_000, OffsetDateTime::now_utc()).is_ok());
    }

    #[test]
    fn test_below_minimum_rejected() {
        let mut c = coupon(DiscountType::Percentage, 10);
        c.min_amount_cents = Some(5_000);
        assert_eq!(
            c.validate(4_999, OffsetDateTime::now_utc()),
            Err(CouponRejection::BelowMinimumAmount(5_000))
        );
        assert!(c.validate(5_000, OffsetDateTime::now_utc()).is_ok());
    }

    #[test]
    fn test_total_never_negative() {
        // 100% discount is the most a percentage coupon can take
        let c = coupon(DiscountType::Percentage, 100);
        let quote = c.validate(7_700, OffsetDateTime::now_utc()).unwrap();
        assert_eq!(quote.final_amount_cents, 0);
    }
}
