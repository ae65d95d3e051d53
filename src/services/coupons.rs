use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::coupon::{self, CouponStatus, DiscountType, Entity as Coupon, Model as CouponModel},
    errors::ServiceError,
};

/// Outcome of validating a coupon code against an order amount.
#[derive(Debug, Clone, Serialize)]
pub struct CouponQuote {
    pub coupon_id: Uuid,
    pub discount_amount: Decimal,
}

/// Coupon validation and redemption counting.
///
/// Validation is read-only; the usage counter is only ever incremented,
/// inside the checkout transaction, and never decremented (cancelling an
/// order does not return the coupon).
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds a coupon by code if it is active and inside its validity window.
    async fn find_active_coupon(&self, code: &str) -> Result<Option<CouponModel>, ServiceError> {
        let now = Utc::now();

        let coupon = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::Status.eq(CouponStatus::Active))
            .filter(coupon::Column::StartsAt.lte(now))
            .filter(coupon::Column::ExpiresAt.gte(now))
            .one(&*self.db)
            .await?;

        if let Some(ref c) = coupon {
            if let Some(limit) = c.usage_limit {
                if c.usage_count >= limit {
                    warn!("Coupon {} has reached its usage limit", code);
                    return Ok(None);
                }
            }
        }

        Ok(coupon)
    }

    /// Validates a coupon code against an order amount.
    ///
    /// Returns the coupon id and the discount it grants, or
    /// `ServiceError::InvalidCoupon` naming the failed precondition.
    #[instrument(skip(self), fields(code = %code, order_amount = %order_amount))]
    pub async fn validate(
        &self,
        code: &str,
        order_amount: Decimal,
    ) -> Result<CouponQuote, ServiceError> {
        let coupon = self
            .find_active_coupon(code)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidCoupon(format!("Coupon {code} is not valid or has expired"))
            })?;

        if let Some(min_amount) = coupon.min_order_amount {
            if order_amount < min_amount {
                debug!(
                    "Order amount {} is below coupon minimum {}",
                    order_amount, min_amount
                );
                return Err(ServiceError::InvalidCoupon(format!(
                    "Coupon {code} requires a minimum order amount of {min_amount}"
                )));
            }
        }

        let discount_amount = Self::calculate_discount(&coupon, order_amount);

        Ok(CouponQuote {
            coupon_id: coupon.id,
            discount_amount,
        })
    }

    /// Calculates the discount a coupon grants on a subtotal.
    ///
    /// The result is capped by `max_discount_amount` when set, and never
    /// exceeds the subtotal itself.
    pub fn calculate_discount(coupon: &CouponModel, subtotal: Decimal) -> Decimal {
        let discount = match coupon.discount_type {
            DiscountType::Percentage => {
                subtotal * coupon.discount_value / Decimal::from(100)
            }
            DiscountType::Fixed => coupon.discount_value,
        };

        let capped = match coupon.max_discount_amount {
            Some(max_discount) => discount.min(max_discount),
            None => discount,
        };

        capped.max(Decimal::ZERO).min(subtotal)
    }

    /// Increments a coupon's usage count by one.
    ///
    /// A single `UPDATE ... SET usage_count = usage_count + 1`, run on the
    /// caller's transaction so the increment commits or rolls back with the
    /// order that redeemed it.
    pub async fn increment_usage<C: ConnectionTrait>(
        &self,
        conn: &C,
        coupon_id: Uuid,
    ) -> Result<(), ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsageCount,
                Expr::col(coupon::Column::UsageCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(coupon_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Coupon {coupon_id} not found"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn coupon(discount_type: DiscountType, discount_value: Decimal) -> CouponModel {
        let now = Utc::now();
        CouponModel {
            id: Uuid::new_v4(),
            code: "WELCOME10".to_string(),
            description: None,
            discount_type,
            discount_value,
            min_order_amount: None,
            max_discount_amount: None,
            usage_limit: None,
            usage_count: 0,
            starts_at: now,
            expires_at: now + chrono::Duration::days(30),
            status: CouponStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn percentage_discount_scales_with_subtotal() {
        let c = coupon(DiscountType::Percentage, dec!(10));
        assert_eq!(CouponService::calculate_discount(&c, dec!(100)), dec!(10));
        assert_eq!(CouponService::calculate_discount(&c, dec!(250)), dec!(25));
    }

    #[test]
    fn fixed_discount_is_flat() {
        let c = coupon(DiscountType::Fixed, dec!(20));
        assert_eq!(CouponService::calculate_discount(&c, dec!(100)), dec!(20));
        assert_eq!(CouponService::calculate_discount(&c, dec!(500)), dec!(20));
    }

    #[test]
    fn discount_never_exceeds_subtotal() {
        let c = coupon(DiscountType::Fixed, dec!(75));
        assert_eq!(CouponService::calculate_discount(&c, dec!(50)), dec!(50));
    }

    #[test]
    fn max_discount_amount_caps_percentage() {
        let mut c = coupon(DiscountType::Percentage, dec!(50));
        c.max_discount_amount = Some(dec!(30));
        assert_eq!(CouponService::calculate_discount(&c, dec!(200)), dec!(30));
    }
}
