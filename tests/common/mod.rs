#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_api::{
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        coupon, customer_address, wallet, CouponStatus, DiscountType,
    },
    events::{self, EventSender},
    handlers::AppServices,
    services::catalog::{CreateProductInput, CreateVariantInput},
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Helper harness for spinning up an application state backed by an
/// in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        // A single connection keeps the in-memory database alive and shared.
        let db_config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };

        let db_pool = db::establish_connection_with_config(&db_config)
            .await
            .expect("connect to in-memory sqlite");
        db::run_migrations(&db_pool).await.expect("run migrations");

        let db_arc = Arc::new(db_pool);
        let config = Arc::new(AppConfig::new(
            db_config.url.clone(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        ));

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            config.clone(),
        );

        let state = AppState {
            db: db_arc,
            config,
            event_sender,
            services,
        };

        let router = storefront_api::app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Issue a request against the in-process router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("request body"))
            .await
            .expect("router response")
    }

    /// Seed a product and return its id.
    pub async fn seed_product(&self, sku: &str, price: Decimal) -> Uuid {
        let product = self
            .state
            .services
            .catalog
            .create_product(CreateProductInput {
                name: format!("Product {sku}"),
                sku: sku.to_string(),
                price,
            })
            .await
            .expect("seed product");
        product.id
    }

    /// Seed a variant under a product and return its id.
    pub async fn seed_variant(&self, product_id: Uuid, sku: &str, price: Decimal) -> Uuid {
        let variant = self
            .state
            .services
            .catalog
            .create_variant(CreateVariantInput {
                product_id,
                sku: sku.to_string(),
                name: format!("Variant {sku}"),
                price,
            })
            .await
            .expect("seed variant");
        variant.id
    }

    /// Seed a shipping address owned by the given customer.
    pub async fn seed_address(&self, customer_id: Uuid) -> Uuid {
        let now = Utc::now();
        let address = customer_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            recipient: Set(Some("Test Customer".to_string())),
            address_line_1: Set("1 Test Street".to_string()),
            address_line_2: Set(None),
            city: Set("Testville".to_string()),
            province: Set("TS".to_string()),
            country_code: Set("US".to_string()),
            postal_code: Set("12345".to_string()),
            phone: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        address
            .insert(&*self.state.db)
            .await
            .expect("seed address")
            .id
    }

    /// Seed a wallet with an explicit starting balance.
    pub async fn seed_wallet(&self, customer_id: Uuid, balance: i64) {
        let now = Utc::now();
        let model = wallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            balance: Set(balance),
            lifetime_earned: Set(balance),
            lifetime_spent: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };
        model.insert(&*self.state.db).await.expect("seed wallet");
    }

    /// Seed an active coupon and return its id.
    pub async fn seed_coupon(
        &self,
        code: &str,
        discount_type: DiscountType,
        discount_value: Decimal,
    ) -> Uuid {
        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            description: Set(None),
            discount_type: Set(discount_type),
            discount_value: Set(discount_value),
            min_order_amount: Set(None),
            max_discount_amount: Set(None),
            usage_limit: Set(None),
            usage_count: Set(0),
            starts_at: Set(now - chrono::Duration::hours(1)),
            expires_at: Set(now + chrono::Duration::days(30)),
            status: Set(CouponStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        };
        model.insert(&*self.state.db).await.expect("seed coupon").id
    }

    /// Put a line into the customer's active cart.
    pub async fn add_cart_line(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) {
        self.state
            .services
            .cart
            .add_item(
                customer_id,
                storefront_api::services::carts::AddItemInput {
                    product_id,
                    variant_id,
                    quantity,
                },
            )
            .await
            .expect("add cart line");
    }
}

/// Decode a response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
