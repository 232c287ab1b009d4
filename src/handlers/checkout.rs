use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::domain::{Principal, Transaction};
use crate::error::AppError;
use crate::handlers::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub product_id: i64,
}

/// Reserves one unit and returns the pending transaction with its payment URL.
pub async fn checkout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CheckoutRequest>,
) -> Result<ApiResponse<Transaction>, AppError> {
    if request.product_id <= 0 {
        return Err(AppError::BadRequest("product_id must be positive".to_string()));
    }

    let transaction = state.checkout.checkout(request.product_id, &principal).await?;
    Ok(ApiResponse::ok("Success checkout item", transaction))
}
