use axum::{
    extract::{Path, State},
    Extension,
};

use crate::domain::{Principal, Transaction};
use crate::error::AppError;
use crate::handlers::ApiResponse;
use crate::AppState;

/// Visible to the customer who created it and to administrators.
pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<Transaction>, AppError> {
    let transaction = state.transactions.read_by_id(id).await?;

    if transaction.user_id != principal.id && !principal.is_admin() {
        return Err(AppError::Forbidden(format!(
            "transaction {id} belongs to another user"
        )));
    }

    Ok(ApiResponse::ok(
        format!("Success get Transaction with id {id}"),
        transaction,
    ))
}
