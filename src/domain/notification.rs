//! Asynchronous payment-status notification delivered by the gateway.

use serde::{Deserialize, Serialize};

use super::TransactionStatus;

/// Transient notification; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayNotification {
    pub order_id: String,
    #[serde(default)]
    pub payment_type: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: String,
}

impl GatewayNotification {
    /// Maps the gateway vocabulary onto a lifecycle transition.
    ///
    /// First matching rule wins. Returns `None` for combinations with no
    /// defined transition (e.g. `pending`, or statuses added by the gateway later).
    pub fn target_status(&self) -> Option<TransactionStatus> {
        let status = self.transaction_status.as_str();

        if self.payment_type == "credit_card" && status == "capture" && self.fraud_status == "accept"
        {
            return Some(TransactionStatus::Paid);
        }

        match status {
            "settlement" => Some(TransactionStatus::Paid),
            "deny" | "expire" | "cancel" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }

    /// The store identifier this notification refers to, if well-formed.
    pub fn transaction_id(&self) -> Option<i64> {
        self.order_id.trim().parse().ok()
    }
}
