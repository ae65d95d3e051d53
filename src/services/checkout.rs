use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, SqlErr, TransactionTrait};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AppConfig,
    entities::{
        cart::Model as CartModel,
        customer_address::Entity as CustomerAddress,
        order::{self, OrderStatus, PaymentMethod, PaymentStatus},
        order_item,
        order_item::Model as OrderItemModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::carts::CartService,
    services::coupons::{CouponQuote, CouponService},
    services::orders::{OrderResponse, OrderService},
    services::pricing::{self, LineQuote, OrderTotals},
    services::wallet::WalletService,
};

/// Attempts before giving up on order-number collisions. The number is
/// timestamp + random suffix; the unique index is the actual guarantee.
const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderInput {
    pub customer_id: Uuid,
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    #[validate(range(min = 0, message = "coins_to_use must not be negative"))]
    pub coins_to_use: i64,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// Checkout orchestrator: turns the customer's active cart into a priced,
/// persisted order.
///
/// All writes happen in one transaction: the order row and its items, the
/// wallet debit for spent coins, the coupon usage increment, and the cart
/// clear commit together or not at all. The cart clear doubles as the
/// double-submit guard: a second checkout racing on the same cart finds
/// zero lines to delete and aborts with an empty-cart error.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    cart_service: Arc<CartService>,
    coupon_service: Arc<CouponService>,
    wallet_service: Arc<WalletService>,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        cart_service: Arc<CartService>,
        coupon_service: Arc<CouponService>,
        wallet_service: Arc<WalletService>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            cart_service,
            coupon_service,
            wallet_service,
            config,
        }
    }

    /// Creates an order from the customer's active cart.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn create_order(
        &self,
        input: CreateOrderInput,
    ) -> Result<OrderResponse, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        // Shipping address must exist and belong to the customer.
        let address = CustomerAddress::find_by_id(input.address_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Address {} not found", input.address_id))
            })?;
        if address.customer_id != input.customer_id {
            return Err(ServiceError::Forbidden(
                "Address does not belong to customer".to_string(),
            ));
        }

        // Snapshot cart lines at current catalog prices.
        let (cart, _items, lines) = self
            .cart_service
            .active_cart_with_lines(input.customer_id)
            .await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let subtotal: rust_decimal::Decimal = lines.iter().map(LineQuote::line_total).sum();

        // Coupon validation happens before anything is written; a validator
        // failure aborts the checkout with no state to unwind.
        let coupon = match input.coupon_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                Some(self.coupon_service.validate(code, subtotal).await?)
            }
            _ => None,
        };
        let coupon_discount = coupon
            .as_ref()
            .map(|c| c.discount_amount)
            .unwrap_or_default();

        let wallet = self
            .wallet_service
            .get_or_create_wallet(&*self.db, input.customer_id)
            .await?;

        let totals = pricing::compute_order_totals(
            &lines,
            coupon_discount,
            input.coins_to_use,
            wallet.balance,
            &self.config.pricing,
        )?;

        let mut last_err =
            ServiceError::InternalError("Order number generation exhausted".to_string());
        for _ in 0..MAX_ORDER_NUMBER_ATTEMPTS {
            let order_number = generate_order_number();
            match self
                .try_create(&input, &cart, &lines, &totals, coupon.as_ref(), order_number)
                .await
            {
                Ok((order, items)) => {
                    let order_id = order.id;

                    self.event_sender
                        .send_or_log(Event::OrderCreated(order_id))
                        .await;
                    if totals.coins_used > 0 {
                        self.event_sender
                            .send_or_log(Event::CoinsDebited {
                                customer_id: input.customer_id,
                                amount: totals.coins_used,
                                order_id,
                            })
                            .await;
                    }
                    if let Some(quote) = &coupon {
                        self.event_sender
                            .send_or_log(Event::CouponRedeemed {
                                coupon_id: quote.coupon_id,
                                order_id,
                            })
                            .await;
                    }
                    self.event_sender
                        .send_or_log(Event::CartCleared(cart.id))
                        .await;

                    info!(
                        order_id = %order_id,
                        customer_id = %input.customer_id,
                        total = %totals.total,
                        coins_used = totals.coins_used,
                        "Checkout completed"
                    );
                    return Ok(OrderService::model_to_response(order, items));
                }
                Err(ServiceError::DatabaseError(e))
                    if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
                {
                    warn!("Order number collision, retrying with a fresh number");
                    last_err = ServiceError::DatabaseError(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err)
    }

    /// One attempt at the checkout transaction, with a fixed order number.
    async fn try_create(
        &self,
        input: &CreateOrderInput,
        cart: &CartModel,
        lines: &[LineQuote],
        totals: &OrderTotals,
        coupon: Option<&CouponQuote>,
        order_number: String,
    ) -> Result<(order::Model, Vec<OrderItemModel>), ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        // Clearing the cart first doubles as the double-submit guard: if a
        // concurrent checkout already converted this cart, there is nothing
        // to delete and the whole transaction rolls back.
        let cleared = self.cart_service.clear_items(&txn, cart.id).await?;
        if cleared == 0 {
            return Err(ServiceError::EmptyCart);
        }

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            customer_id: Set(input.customer_id),
            address_id: Set(input.address_id),
            payment_method: Set(input.payment_method),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            subtotal: Set(totals.subtotal),
            tax: Set(totals.tax),
            shipping_fee: Set(totals.shipping_fee),
            discount: Set(totals.discount),
            total: Set(totals.total),
            coins_used: Set(totals.coins_used),
            coins_earned: Set(totals.coins_earned),
            coupon_id: Set(coupon.map(|c| c.coupon_id)),
            tracking_number: Set(None),
            confirmed_at: Set(None),
            shipped_at: Set(None),
            delivered_at: Set(None),
            cancelled_at: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };

        let order = order_model.insert(&txn).await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                variant_id: Set(line.variant_id),
                sku: Set(line.sku.clone()),
                name: Set(line.name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.line_total()),
                created_at: Set(now),
                updated_at: Set(Some(now)),
            };
            items.push(item.insert(&txn).await?);
        }

        // The conditional debit re-checks the balance atomically; a wallet
        // drained since pricing ran fails here and rolls everything back.
        if totals.coins_used > 0 {
            self.wallet_service
                .debit(&txn, input.customer_id, totals.coins_used)
                .await?;
        }

        if let Some(quote) = coupon {
            self.coupon_service
                .increment_usage(&txn, quote.coupon_id)
                .await?;
        }

        txn.commit().await?;

        Ok((order, items))
    }
}

/// Generates a human-readable order number: timestamp plus random suffix.
/// Uniqueness is enforced by the index on `orders.order_number`; callers
/// retry with a fresh number on collision.
fn generate_order_number() -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("ORD-{timestamp}-{suffix:04}")
}
