use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AppConfig,
    entities::{
        cart::{self, CartStatus, Entity as Cart, Model as CartModel},
        cart_item::{self, Entity as CartItem, Model as CartItemModel},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::catalog::ProductCatalogService,
    services::pricing::{self, LineQuote, OrderTotals},
};

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// A cart line together with its current catalog price. Prices shown here
/// are a preview; the binding snapshot is taken at checkout.
#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub cart: CartModel,
    pub items: Vec<CartLineView>,
    pub totals: OrderTotals,
}

/// Shopping cart service.
///
/// The cart itself is a thin container: lines reference products and
/// quantities, never prices. The preview and the checkout path both price
/// lines through the catalog and the shared pricing engine, so what the
/// customer sees on the cart page is computed by the same formula that
/// settles the order.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    catalog: Arc<ProductCatalogService>,
    config: Arc<AppConfig>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        catalog: Arc<ProductCatalogService>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
            config,
        }
    }

    /// Returns the customer's active cart, creating one lazily on first use.
    pub async fn get_or_create_cart(&self, customer_id: Uuid) -> Result<CartModel, ServiceError> {
        if let Some(existing) = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .one(&*self.db)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let fresh = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            currency: Set("USD".to_string()),
            status: Set(CartStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(fresh.insert(&*self.db).await?)
    }

    /// Adds a line to the customer's active cart, merging quantities when
    /// the same product/variant pair is already present.
    #[instrument(skip(self, input), fields(customer_id = %customer_id, product_id = %input.product_id))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartItemModel, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        // Reject unknown products/variants up front with a clear error.
        self.catalog
            .effective_unit_price(input.product_id, input.variant_id)
            .await?;

        let cart = self.get_or_create_cart(customer_id).await?;
        let now = Utc::now();

        let mut existing_filter = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id));
        existing_filter = match input.variant_id {
            Some(variant_id) => {
                existing_filter.filter(cart_item::Column::VariantId.eq(variant_id))
            }
            None => existing_filter.filter(cart_item::Column::VariantId.is_null()),
        };

        let item = if let Some(existing) = existing_filter.one(&*self.db).await? {
            let quantity = existing.quantity + input.quantity;
            let mut active: cart_item::ActiveModel = existing.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(now);
            active.update(&*self.db).await?
        } else {
            let fresh = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(input.product_id),
                variant_id: Set(input.variant_id),
                quantity: Set(input.quantity),
                created_at: Set(now),
                updated_at: Set(now),
            };
            fresh.insert(&*self.db).await?
        };

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: input.product_id,
            })
            .await;

        Ok(item)
    }

    /// Changes a line's quantity.
    #[instrument(skip(self), fields(customer_id = %customer_id, item_id = %item_id))]
    pub async fn update_item_quantity(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartItemModel, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let (item, _cart) = self.owned_item(customer_id, item_id).await?;

        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Removes a line from the cart.
    #[instrument(skip(self), fields(customer_id = %customer_id, item_id = %item_id))]
    pub async fn remove_item(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
    ) -> Result<(), ServiceError> {
        let (item, cart) = self.owned_item(customer_id, item_id).await?;

        item.delete(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { cart_id: cart.id })
            .await;

        Ok(())
    }

    /// Returns the customer's cart with lines priced at current catalog
    /// prices and a totals preview (no coupon, no coins).
    pub async fn get_cart(&self, customer_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(customer_id).await?;
        let (items, lines) = self.lines_for_cart(&cart).await?;

        let totals = if lines.is_empty() {
            OrderTotals {
                subtotal: Decimal::ZERO,
                tax: Decimal::ZERO,
                shipping_fee: Decimal::ZERO,
                coupon_discount: Decimal::ZERO,
                coins_discount: Decimal::ZERO,
                discount: Decimal::ZERO,
                total: Decimal::ZERO,
                coins_used: 0,
                coins_earned: 0,
            }
        } else {
            pricing::compute_order_totals(&lines, Decimal::ZERO, 0, 0, &self.config.pricing)?
        };

        let views = items
            .iter()
            .zip(lines.iter())
            .map(|(item, line)| CartLineView {
                id: item.id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                sku: line.sku.clone(),
                name: line.name.clone(),
                quantity: item.quantity,
                unit_price: line.unit_price,
                line_total: line.line_total(),
            })
            .collect();

        Ok(CartView {
            cart,
            items: views,
            totals,
        })
    }

    /// Loads the customer's active cart and its lines priced from the
    /// catalog. Used by checkout to snapshot unit prices.
    pub async fn active_cart_with_lines(
        &self,
        customer_id: Uuid,
    ) -> Result<(CartModel, Vec<CartItemModel>, Vec<LineQuote>), ServiceError> {
        let cart = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::EmptyCart)?;

        let (items, lines) = self.lines_for_cart(&cart).await?;
        Ok((cart, items, lines))
    }

    /// Deletes every line of a cart on the caller's connection, so checkout
    /// can clear the cart inside its own transaction.
    pub async fn clear_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<u64, ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(conn)
            .await?;

        info!(cart_id = %cart_id, removed = result.rows_affected, "Cart cleared");
        Ok(result.rows_affected)
    }

    async fn lines_for_cart(
        &self,
        cart: &CartModel,
    ) -> Result<(Vec<CartItemModel>, Vec<LineQuote>), ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&*self.db)
            .await?;

        let mut lines = Vec::with_capacity(items.len());
        for item in &items {
            let (unit_price, sku, name) = self
                .catalog
                .effective_unit_price(item.product_id, item.variant_id)
                .await?;
            lines.push(LineQuote {
                product_id: item.product_id,
                variant_id: item.variant_id,
                sku,
                name,
                quantity: item.quantity,
                unit_price,
            });
        }

        Ok((items, lines))
    }

    async fn owned_item(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
    ) -> Result<(CartItemModel, CartModel), ServiceError> {
        let item = CartItem::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {item_id} not found")))?;

        let cart = Cart::find_by_id(item.cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", item.cart_id)))?;

        if cart.customer_id != customer_id {
            return Err(ServiceError::Forbidden(
                "Cart does not belong to customer".to_string(),
            ));
        }

        Ok((item, cart))
    }
}
