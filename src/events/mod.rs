use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted after state changes commit.
///
/// Events are strictly post-commit notifications: no consumer may assume an
/// event implies an in-flight transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    OrderDelivered(Uuid),

    // Wallet events
    CoinsDebited {
        customer_id: Uuid,
        amount: i64,
        order_id: Uuid,
    },
    CoinsCredited {
        customer_id: Uuid,
        amount: i64,
        order_id: Uuid,
    },

    // Coupon events
    CouponRedeemed {
        coupon_id: Uuid,
        order_id: Uuid,
    },

    // Cart events
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CartItemRemoved {
        cart_id: Uuid,
    },
    CartCleared(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {e}"))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Events are best-effort notifications; losing one must never fail the
    /// request that produced it.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {e}");
        }
    }
}

/// Processes incoming events from the channel until all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "Order status changed"
                );
            }
            Event::OrderCancelled(order_id) => {
                info!(order_id = %order_id, "Order cancelled");
            }
            Event::OrderDelivered(order_id) => {
                info!(order_id = %order_id, "Order delivered");
            }
            Event::CoinsDebited {
                customer_id,
                amount,
                order_id,
            } => {
                info!(
                    customer_id = %customer_id,
                    amount = amount,
                    order_id = %order_id,
                    "Coins debited from wallet"
                );
            }
            Event::CoinsCredited {
                customer_id,
                amount,
                order_id,
            } => {
                info!(
                    customer_id = %customer_id,
                    amount = amount,
                    order_id = %order_id,
                    "Coins credited to wallet"
                );
            }
            Event::CouponRedeemed {
                coupon_id,
                order_id,
            } => {
                info!(coupon_id = %coupon_id, order_id = %order_id, "Coupon redeemed");
            }
            Event::CartItemAdded {
                cart_id,
                product_id,
            } => {
                info!(cart_id = %cart_id, product_id = %product_id, "Cart item added");
            }
            Event::CartItemRemoved { cart_id } => {
                info!(cart_id = %cart_id, "Cart item removed");
            }
            Event::CartCleared(cart_id) => {
                info!(cart_id = %cart_id, "Cart cleared");
            }
        }
    }

    info!("Event processing loop stopped");
}
