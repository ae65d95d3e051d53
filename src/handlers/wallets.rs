use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::{ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub customer_id: Uuid,
    pub balance: i64,
    pub lifetime_earned: i64,
    pub lifetime_spent: i64,
}

/// Get a customer's coin wallet (zeroed view if none exists yet)
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<ApiResponse<WalletResponse>>, ServiceError> {
    let response = match state.services.wallet.get_wallet(customer_id).await {
        Ok(wallet) => WalletResponse {
            customer_id: wallet.customer_id,
            balance: wallet.balance,
            lifetime_earned: wallet.lifetime_earned,
            lifetime_spent: wallet.lifetime_spent,
        },
        Err(ServiceError::NotFound(_)) => WalletResponse {
            customer_id,
            balance: 0,
            lifetime_earned: 0,
            lifetime_spent: 0,
        },
        Err(e) => return Err(e),
    };

    Ok(Json(ApiResponse::success(response)))
}
