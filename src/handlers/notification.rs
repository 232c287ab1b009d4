use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::domain::GatewayNotification;
use crate::error::AppError;
use crate::midtrans::verify_notification_signature;
use crate::use_cases::NotificationOutcome;
use crate::AppState;

/// Body of the gateway's HTTP notification. Only the fields the lifecycle
/// and the signature check need are read.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationPayload {
    pub order_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub payment_type: String,
    #[serde(default)]
    pub fraud_status: String,
    #[serde(default)]
    pub status_code: String,
    #[serde(default)]
    pub gross_amount: String,
    #[serde(default)]
    pub signature_key: Option<String>,
}

impl NotificationPayload {
    fn into_notification(self) -> GatewayNotification {
        GatewayNotification {
            order_id: self.order_id,
            payment_type: self.payment_type,
            transaction_status: self.transaction_status,
            fraud_status: self.fraud_status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationAck {
    pub status: &'static str,
    pub outcome: &'static str,
}

pub async fn handle_notification(
    State(state): State<AppState>,
    Json(payload): Json<NotificationPayload>,
) -> Result<Json<NotificationAck>, AppError> {
    if state.notifications.verify_signature {
        let signature = payload.signature_key.as_deref().unwrap_or_default();
        let valid = verify_notification_signature(
            &payload.order_id,
            &payload.status_code,
            &payload.gross_amount,
            &state.notifications.server_key,
            signature,
        );
        if !valid {
            tracing::warn!(order_id = %payload.order_id, "notification signature mismatch");
            return Err(AppError::Unauthorized("invalid notification signature".to_string()));
        }
    }

    tracing::info!(
        order_id = %payload.order_id,
        transaction_status = %payload.transaction_status,
        payment_type = %payload.payment_type,
        "payment notification received"
    );

    let outcome = state
        .checkout
        .apply_notification(&payload.into_notification())
        .await?;

    let outcome = match outcome {
        NotificationOutcome::Applied(_) => "applied",
        NotificationOutcome::Unchanged => "unchanged",
        NotificationOutcome::Ignored => "ignored",
    };

    Ok(Json(NotificationAck {
        status: "ok",
        outcome,
    }))
}
