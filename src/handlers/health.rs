use axum::{extract::State, response::Json};
use sea_orm::{ConnectionTrait, Statement};
use serde_json::{json, Value};

use crate::AppState;

/// Basic liveness/readiness probe: reports up and whether the database
/// answers a trivial query.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_ok = state
        .db
        .execute(Statement::from_string(
            state.db.get_database_backend(),
            "SELECT 1".to_string(),
        ))
        .await
        .is_ok();

    Json(json!({
        "status": if db_ok { "up" } else { "degraded" },
        "database": if db_ok { "up" } else { "down" },
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
