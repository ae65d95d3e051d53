pub mod carts;
pub mod health;
pub mod orders;
pub mod wallets;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<crate::services::ProductCatalogService>,
    pub cart: Arc<crate::services::CartService>,
    pub checkout: Arc<crate::services::CheckoutService>,
    pub coupon: Arc<crate::services::CouponService>,
    pub wallet: Arc<crate::services::WalletService>,
    pub order: Arc<crate::services::OrderService>,
    pub order_status: Arc<crate::services::OrderStatusService>,
}

impl AppServices {
    /// Wires up the service graph over a shared connection pool.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        let catalog = Arc::new(crate::services::ProductCatalogService::new(db_pool.clone()));
        let wallet = Arc::new(crate::services::WalletService::new(db_pool.clone()));
        let coupon = Arc::new(crate::services::CouponService::new(db_pool.clone()));
        let order = Arc::new(crate::services::OrderService::new(db_pool.clone()));

        let cart = Arc::new(crate::services::CartService::new(
            db_pool.clone(),
            event_sender.clone(),
            catalog.clone(),
            config.clone(),
        ));

        let checkout = Arc::new(crate::services::CheckoutService::new(
            db_pool.clone(),
            event_sender.clone(),
            cart.clone(),
            coupon.clone(),
            wallet.clone(),
            config,
        ));

        let order_status = Arc::new(crate::services::OrderStatusService::new(
            db_pool,
            event_sender,
            wallet.clone(),
        ));

        Self {
            catalog,
            cart,
            checkout,
            coupon,
            wallet,
            order,
            order_status,
        }
    }
}
