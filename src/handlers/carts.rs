use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::cart_item::Model as CartItemModel;
use crate::errors::ServiceError;
use crate::services::carts::{AddItemInput, CartView};
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

/// Get the customer's active cart with a priced totals preview
pub async fn get_cart(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let view = state.services.cart.get_cart(customer_id).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// Add an item to the customer's active cart
pub async fn add_item(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(request): Json<AddItemInput>,
) -> Result<(StatusCode, Json<ApiResponse<CartItemModel>>), ServiceError> {
    let item = state.services.cart.add_item(customer_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(item))))
}

/// Change a cart line's quantity
pub async fn update_item(
    State(state): State<AppState>,
    Path((customer_id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateQuantityRequest>,
) -> Result<Json<ApiResponse<CartItemModel>>, ServiceError> {
    let item = state
        .services
        .cart
        .update_item_quantity(customer_id, item_id, request.quantity)
        .await?;
    Ok(Json(ApiResponse::success(item)))
}

/// Remove a line from the cart
pub async fn remove_item(
    State(state): State<AppState>,
    Path((customer_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state
        .services
        .cart
        .remove_item(customer_id, item_id)
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        (),
        "Item removed from cart",
    )))
}
