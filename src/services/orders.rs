use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::order::{self, Entity as OrderEntity, Model as OrderModel},
    entities::order_item::Model as OrderItemModel,
    entities::{OrderStatus, PaymentMethod, PaymentStatus},
    errors::ServiceError,
};

/// Order as returned to callers, with its line items eagerly loaded.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_fee: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub coins_used: i64,
    pub coins_earned: i64,
    pub coupon_id: Option<Uuid>,
    pub tracking_number: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
    #[serde(default)]
    pub items: Vec<OrderItemModel>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Read side of the order store. Creation goes through checkout; status
/// changes go through the lifecycle manager.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Retrieves an order with its items.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let items = order
            .find_related(crate::entities::OrderItem)
            .all(&*self.db)
            .await?;

        Ok(Self::model_to_response(order, items))
    }

    /// Lists a customer's orders, newest first, with pagination.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn list_orders(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let paginator = OrderEntity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let responses: Vec<OrderResponse> = orders
            .into_iter()
            .map(|o| Self::model_to_response(o, Vec::new()))
            .collect();

        info!(
            customer_id = %customer_id,
            total = total,
            returned = responses.len(),
            "Orders listed"
        );

        Ok(OrderListResponse {
            orders: responses,
            total,
            page,
            per_page,
        })
    }

    /// Resolves an order number to its id.
    pub async fn find_order_id_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Uuid>, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?;

        Ok(order.map(|o| o.id))
    }

    /// Converts an order model (plus loaded items) to the response format.
    pub fn model_to_response(model: OrderModel, items: Vec<OrderItemModel>) -> OrderResponse {
        OrderResponse {
            id: model.id,
            order_number: model.order_number,
            customer_id: model.customer_id,
            address_id: model.address_id,
            payment_method: model.payment_method,
            status: model.status,
            payment_status: model.payment_status,
            subtotal: model.subtotal,
            tax: model.tax,
            shipping_fee: model.shipping_fee,
            discount: model.discount,
            total: model.total,
            coins_used: model.coins_used,
            coins_earned: model.coins_earned,
            coupon_id: model.coupon_id,
            tracking_number: model.tracking_number,
            confirmed_at: model.confirmed_at,
            shipped_at: model.shipped_at,
            delivered_at: model.delivered_at,
            cancelled_at: model.cancelled_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
            version: model.version,
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn model_to_response_preserves_settlement_fields() {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();

        let model = OrderModel {
            id: order_id,
            order_number: "ORD-20240401120000-4821".to_string(),
            customer_id,
            address_id: Uuid::new_v4(),
            payment_method: PaymentMethod::Card,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            subtotal: dec!(150.00),
            tax: dec!(7.50),
            shipping_fee: dec!(25.00),
            discount: dec!(85.00),
            total: dec!(97.50),
            coins_used: 65,
            coins_earned: 9,
            coupon_id: None,
            tracking_number: None,
            confirmed_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: Some(now),
            version: 1,
        };

        let response = OrderService::model_to_response(model, Vec::new());

        assert_eq!(response.id, order_id);
        assert_eq!(response.customer_id, customer_id);
        assert_eq!(response.status, OrderStatus::Pending);
        assert_eq!(
            response.total,
            response.subtotal + response.tax + response.shipping_fee - response.discount
        );
        assert_eq!(response.coins_used, 65);
        assert_eq!(response.coins_earned, 9);
    }
}
