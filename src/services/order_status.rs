use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::wallet::WalletService,
};

/// Order lifecycle manager.
///
/// Owns the status state machine and its settlement side effects: coins
/// promised at checkout are credited on delivery, and coins spent at
/// checkout are refunded on cancellation. Each side effect runs in the
/// same transaction as the status write, and the write itself is a
/// version-checked conditional update, so two racing transitions on one
/// order cannot both apply (the loser observes zero affected rows).
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    wallet_service: Arc<WalletService>,
}

/// Validates whether a status transition is allowed.
///
/// `PENDING → CONFIRMED → SHIPPED → DELIVERED`, with `CANCELLED`
/// reachable only from `PENDING` or `CONFIRMED`. Transitioning to the
/// current status is a no-op (accepted, nothing re-applied).
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    match (from, to) {
        // From pending
        (Pending, Confirmed) => true,
        (Pending, Cancelled) => true,

        // From confirmed
        (Confirmed, Shipped) => true,
        (Confirmed, Cancelled) => true,

        // From shipped
        (Shipped, Delivered) => true,

        // Allow transitioning to the same status (no-op)
        _ if from == to => true,

        // All other transitions are invalid
        _ => false,
    }
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        wallet_service: Arc<WalletService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            wallet_service,
        }
    }

    /// Transitions an order to `new_status`, applying the settlement side
    /// effects for the target state exactly once.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = ?new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        tracking_number: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let old_status = order.status;

        if !is_valid_transition(old_status, new_status) {
            error!(
                "Invalid status transition from {} to {}",
                old_status.as_str(),
                new_status.as_str()
            );
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot transition from status '{}' to '{}'",
                old_status.as_str(),
                new_status.as_str()
            )));
        }

        // Re-applying the current status is accepted but must not repeat
        // side effects (a replayed DELIVERED must credit coins only once).
        if old_status == new_status {
            return Ok(order);
        }

        let now = Utc::now();

        let mut update = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(now)))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            );

        match new_status {
            OrderStatus::Confirmed => {
                update = update
                    .col_expr(order::Column::ConfirmedAt, Expr::value(Some(now)))
                    .col_expr(
                        order::Column::PaymentStatus,
                        Expr::value(PaymentStatus::Paid),
                    );
            }
            OrderStatus::Shipped => {
                update = update.col_expr(order::Column::ShippedAt, Expr::value(Some(now)));
                if let Some(ref tracking) = tracking_number {
                    update = update.col_expr(
                        order::Column::TrackingNumber,
                        Expr::value(Some(tracking.clone())),
                    );
                }
            }
            OrderStatus::Delivered => {
                update = update.col_expr(order::Column::DeliveredAt, Expr::value(Some(now)));
            }
            OrderStatus::Cancelled => {
                update = update
                    .col_expr(order::Column::CancelledAt, Expr::value(Some(now)))
                    .col_expr(
                        order::Column::PaymentStatus,
                        Expr::value(PaymentStatus::Refunded),
                    );
            }
            OrderStatus::Pending => {}
        }

        // Version check serializes transitions per order: a concurrent
        // transition that committed first makes this one a conflict.
        let result = update
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Version.eq(order.version))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "Order {order_id} was modified concurrently"
            )));
        }

        // Settlement side effects, inside the same transaction as the
        // status write. The timestamp guards make replays harmless even
        // if a transition is ever re-driven through a fresh version.
        match new_status {
            OrderStatus::Delivered if order.delivered_at.is_none() && order.coins_earned > 0 => {
                self.wallet_service
                    .credit(&txn, order.customer_id, order.coins_earned)
                    .await?;
            }
            OrderStatus::Cancelled if order.cancelled_at.is_none() && order.coins_used > 0 => {
                self.wallet_service
                    .credit(&txn, order.customer_id, order.coins_used)
                    .await?;
            }
            _ => {}
        }

        let updated = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        txn.commit().await?;

        info!(
            "Order {} status updated from '{}' to '{}'",
            order_id,
            old_status.as_str(),
            new_status.as_str()
        );

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.as_str().to_string(),
                new_status: new_status.as_str().to_string(),
            })
            .await;

        match new_status {
            OrderStatus::Delivered => {
                self.event_sender
                    .send_or_log(Event::OrderDelivered(order_id))
                    .await;
                if order.coins_earned > 0 {
                    self.event_sender
                        .send_or_log(Event::CoinsCredited {
                            customer_id: order.customer_id,
                            amount: order.coins_earned,
                            order_id,
                        })
                        .await;
                }
            }
            OrderStatus::Cancelled => {
                self.event_sender
                    .send_or_log(Event::OrderCancelled(order_id))
                    .await;
                if order.coins_used > 0 {
                    self.event_sender
                        .send_or_log(Event::CoinsCredited {
                            customer_id: order.customer_id,
                            amount: order.coins_used,
                            order_id,
                        })
                        .await;
                }
            }
            _ => {}
        }

        Ok(updated)
    }

    /// Customer-facing cancellation: checks ownership and that the order
    /// has not shipped, then drives the same transition function as the
    /// fulfillment path.
    #[instrument(skip(self), fields(customer_id = %customer_id, order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if order.customer_id != customer_id {
            return Err(ServiceError::Forbidden(
                "Order does not belong to customer".to_string(),
            ));
        }

        match order.status {
            OrderStatus::Pending | OrderStatus::Confirmed => {}
            status => {
                return Err(ServiceError::InvalidTransition(format!(
                    "Cannot cancel an order in status '{}'",
                    status.as_str()
                )));
            }
        }

        self.update_status(order_id, OrderStatus::Cancelled, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn happy_path_transitions_are_allowed() {
        assert!(is_valid_transition(Pending, Confirmed));
        assert!(is_valid_transition(Confirmed, Shipped));
        assert!(is_valid_transition(Shipped, Delivered));
    }

    #[test]
    fn cancellation_is_only_reachable_before_shipping() {
        assert!(is_valid_transition(Pending, Cancelled));
        assert!(is_valid_transition(Confirmed, Cancelled));
        assert!(!is_valid_transition(Shipped, Cancelled));
        assert!(!is_valid_transition(Delivered, Cancelled));
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert!(!is_valid_transition(Pending, Shipped));
        assert!(!is_valid_transition(Pending, Delivered));
        assert!(!is_valid_transition(Confirmed, Delivered));
    }

    #[test]
    fn terminal_states_do_not_move_forward() {
        assert!(!is_valid_transition(Delivered, Shipped));
        assert!(!is_valid_transition(Cancelled, Confirmed));
        assert!(!is_valid_transition(Cancelled, Pending));
    }

    #[test]
    fn same_status_is_a_no_op_not_an_error() {
        for status in [Pending, Confirmed, Shipped, Delivered, Cancelled] {
            assert!(is_valid_transition(status, status));
        }
    }
}
