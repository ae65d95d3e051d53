use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::OrderStatus;
use crate::errors::ServiceError;
use crate::services::checkout::CreateOrderInput;
use crate::services::orders::{OrderListResponse, OrderResponse, OrderService};
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub customer_id: Uuid,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub customer_id: Uuid,
}

/// Create a new order from the customer's active cart
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderInput>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let order = state.services.checkout.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// Get an order by id, with its items
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order_id = resolve_order_id(&state, &id).await?;
    let order = state.services.order.get_order(order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// List a customer's orders, newest first
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let result = state
        .services
        .order
        .list_orders(query.customer_id, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Transition an order's status (fulfillment-facing)
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order_id = resolve_order_id(&state, &id).await?;
    let order = state
        .services
        .order_status
        .update_status(order_id, request.status, request.tracking_number)
        .await?;
    Ok(Json(ApiResponse::success(OrderService::model_to_response(
        order,
        Vec::new(),
    ))))
}

/// Cancel an order (customer-facing)
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order_id = resolve_order_id(&state, &id).await?;
    let order = state
        .services
        .order_status
        .cancel_order(request.customer_id, order_id)
        .await?;
    Ok(Json(ApiResponse::success(OrderService::model_to_response(
        order,
        Vec::new(),
    ))))
}

// Resolve an order identifier that may be a UUID or an order_number string
async fn resolve_order_id(state: &AppState, id: &str) -> Result<Uuid, ServiceError> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return Ok(uuid);
    }
    if let Some(uuid) = state
        .services
        .order
        .find_order_id_by_order_number(id)
        .await?
    {
        return Ok(uuid);
    }
    Err(ServiceError::NotFound(format!("Order {id} not found")))
}
