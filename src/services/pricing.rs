//! Pure pricing computation for checkout and cart preview.
//!
//! No I/O happens here: the same inputs always produce the same totals,
//! so the whole discount-stacking rule set is unit-testable without a
//! database.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::config::PricingConfig;
use crate::errors::ServiceError;

/// A cart line with its unit price already snapshotted from the catalog
/// (variant price if the line references a variant, else product price).
#[derive(Debug, Clone)]
pub struct LineQuote {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl LineQuote {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// The complete monetary breakdown of an order.
///
/// Invariants: `total = subtotal + tax + shipping_fee - discount`,
/// `discount = coupon_discount + coins_discount`, and
/// `coins_discount <= coin_redemption_cap * (subtotal - coupon_discount)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_fee: Decimal,
    pub coupon_discount: Decimal,
    pub coins_discount: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    /// Coins to debit from the wallet at checkout
    pub coins_used: i64,
    /// Coins to credit to the wallet once the order is delivered
    pub coins_earned: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("cart has no lines")]
    EmptyCart,

    #[error("coupon discount {discount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal { discount: Decimal, subtotal: Decimal },

    #[error("requested {requested} coins but wallet holds {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    #[error("computed total {0} is negative")]
    NegativeTotal(Decimal),
}

impl From<PricingError> for ServiceError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::EmptyCart => ServiceError::EmptyCart,
            PricingError::DiscountExceedsSubtotal { .. } => {
                ServiceError::InvalidCoupon(err.to_string())
            }
            PricingError::InsufficientBalance { .. } => {
                ServiceError::InsufficientCoins(err.to_string())
            }
            PricingError::NegativeTotal(_) => ServiceError::ValidationError(err.to_string()),
        }
    }
}

/// Computes the full monetary breakdown for a set of priced cart lines.
///
/// `coupon_discount` arrives pre-validated (zero when no code was given).
/// Coins redeem against at most `coin_redemption_cap` of the
/// coupon-adjusted subtotal; the capped value is floored to whole-coin
/// granularity and any fractional remainder of the cap is dropped, not
/// refunded. Tax is a flat rate on the pre-discount subtotal.
pub fn compute_order_totals(
    lines: &[LineQuote],
    coupon_discount: Decimal,
    coins_requested: i64,
    wallet_balance: i64,
    cfg: &PricingConfig,
) -> Result<OrderTotals, PricingError> {
    if lines.is_empty() {
        return Err(PricingError::EmptyCart);
    }

    let subtotal: Decimal = lines.iter().map(LineQuote::line_total).sum();

    if coupon_discount > subtotal {
        return Err(PricingError::DiscountExceedsSubtotal {
            discount: coupon_discount,
            subtotal,
        });
    }

    let tax = subtotal * cfg.tax_rate;

    let shipping_fee = if subtotal > cfg.free_shipping_threshold {
        Decimal::ZERO
    } else {
        cfg.flat_shipping_fee
    };

    let (coins_discount, coins_used) = if coins_requested > 0 {
        if coins_requested > wallet_balance {
            return Err(PricingError::InsufficientBalance {
                requested: coins_requested,
                available: wallet_balance,
            });
        }
        let max_coins_discount = (subtotal - coupon_discount) * cfg.coin_redemption_cap;
        let coins_discount = Decimal::from(coins_requested)
            .min(max_coins_discount)
            .floor();
        let coins_used = coins_discount.to_i64().unwrap_or(0).max(0);
        (coins_discount, coins_used)
    } else {
        (Decimal::ZERO, 0)
    };

    let discount = coupon_discount + coins_discount;

    let total = subtotal + tax + shipping_fee - discount;
    if total < Decimal::ZERO {
        // Unreachable given the redemption cap, but asserted rather than clamped.
        return Err(PricingError::NegativeTotal(total));
    }

    let coins_earned = (total / cfg.coin_earn_unit)
        .floor()
        .to_i64()
        .unwrap_or(0)
        .max(0);

    Ok(OrderTotals {
        subtotal,
        tax,
        shipping_fee,
        coupon_discount,
        coins_discount,
        discount,
        total,
        coins_used,
        coins_earned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: i32, unit_price: Decimal) -> LineQuote {
        LineQuote {
            product_id: Uuid::new_v4(),
            variant_id: None,
            sku: "SKU-TEST".to_string(),
            name: "Test product".to_string(),
            quantity,
            unit_price,
        }
    }

    fn cfg() -> PricingConfig {
        PricingConfig::default()
    }

    #[test]
    fn coins_capped_at_half_of_subtotal() {
        // subtotal 1000, no coupon, 600 coins requested against a balance of 1000
        let lines = vec![line(4, dec!(250))];
        let totals = compute_order_totals(&lines, Decimal::ZERO, 600, 1000, &cfg()).unwrap();

        assert_eq!(totals.subtotal, dec!(1000));
        assert_eq!(totals.coins_discount, dec!(500));
        assert_eq!(totals.coins_used, 500);
        assert_eq!(totals.tax, dec!(50));
        assert_eq!(totals.shipping_fee, Decimal::ZERO);
        assert_eq!(totals.total, dec!(550));
        assert_eq!(totals.coins_earned, 55);
    }

    #[test]
    fn coupon_shrinks_the_coin_redemption_cap() {
        // subtotal 150, coupon 20, 100 coins requested against a balance of 100
        let lines = vec![line(3, dec!(50))];
        let totals = compute_order_totals(&lines, dec!(20), 100, 100, &cfg()).unwrap();

        assert_eq!(totals.subtotal, dec!(150));
        assert_eq!(totals.coupon_discount, dec!(20));
        // cap = (150 - 20) * 0.5 = 65; the request of 100 is capped
        assert_eq!(totals.coins_discount, dec!(65));
        assert_eq!(totals.coins_used, 65);
        assert_eq!(totals.tax, dec!(7.5));
        assert_eq!(totals.shipping_fee, dec!(25));
        assert_eq!(totals.total, dec!(97.5));
        assert_eq!(totals.coins_earned, 9);
    }

    #[test]
    fn requesting_more_coins_than_the_wallet_holds_fails() {
        let lines = vec![line(1, dec!(100))];
        let err = compute_order_totals(&lines, Decimal::ZERO, 500, 100, &cfg()).unwrap_err();

        assert_eq!(
            err,
            PricingError::InsufficientBalance {
                requested: 500,
                available: 100
            }
        );
    }

    #[test]
    fn fractional_cap_remainder_is_dropped() {
        // subtotal 101, cap = 50.5; the half-coin is neither granted nor refunded
        let lines = vec![line(1, dec!(101))];
        let totals = compute_order_totals(&lines, Decimal::ZERO, 100, 1000, &cfg()).unwrap();

        assert_eq!(totals.coins_discount, dec!(50));
        assert_eq!(totals.coins_used, 50);
        // 101 + 5.05 + 25 - 50
        assert_eq!(totals.total, dec!(81.05));
        assert_eq!(totals.coins_earned, 8);
    }

    #[test]
    fn empty_cart_is_rejected() {
        let err = compute_order_totals(&[], Decimal::ZERO, 0, 0, &cfg()).unwrap_err();
        assert_eq!(err, PricingError::EmptyCart);
    }

    #[test]
    fn coupon_larger_than_subtotal_is_rejected() {
        let lines = vec![line(1, dec!(30))];
        let err = compute_order_totals(&lines, dec!(45), 0, 0, &cfg()).unwrap_err();
        assert_eq!(
            err,
            PricingError::DiscountExceedsSubtotal {
                discount: dec!(45),
                subtotal: dec!(30)
            }
        );
    }

    #[test]
    fn zero_coins_requested_skips_the_balance_check() {
        // An empty wallet is fine as long as no coins are spent.
        let lines = vec![line(2, dec!(40))];
        let totals = compute_order_totals(&lines, Decimal::ZERO, 0, 0, &cfg()).unwrap();

        assert_eq!(totals.coins_used, 0);
        assert_eq!(totals.coins_discount, Decimal::ZERO);
        assert_eq!(totals.total, dec!(80) + dec!(4) + dec!(25));
    }

    #[test]
    fn shipping_is_free_only_above_the_threshold() {
        // Exactly at the threshold still pays shipping (strictly greater wins)
        let at_threshold = compute_order_totals(
            &[line(1, dec!(200))],
            Decimal::ZERO,
            0,
            0,
            &cfg(),
        )
        .unwrap();
        assert_eq!(at_threshold.shipping_fee, dec!(25));

        let above_threshold = compute_order_totals(
            &[line(1, dec!(200.01))],
            Decimal::ZERO,
            0,
            0,
            &cfg(),
        )
        .unwrap();
        assert_eq!(above_threshold.shipping_fee, Decimal::ZERO);
    }

    #[test]
    fn totals_identity_holds() {
        let lines = vec![line(2, dec!(75)), line(1, dec!(19.99))];
        let totals = compute_order_totals(&lines, dec!(10), 30, 200, &cfg()).unwrap();

        assert_eq!(
            totals.total,
            totals.subtotal + totals.tax + totals.shipping_fee - totals.discount
        );
        assert_eq!(totals.discount, totals.coupon_discount + totals.coins_discount);
    }
}
