//! Checkout and payment reconciliation.
//!
//! Stock is reserved when a checkout opens a transaction and released if the
//! payment is cancelled. A paid notification turns the reservation into a sale,
//! so inventory moves by exactly one unit per paid transaction.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::domain::{GatewayNotification, NewTransaction, Principal, Transaction, TransactionStatus};
use crate::ports::{
    Customer, GatewayError, InventoryLedger, PaymentGateway, RepositoryError, TransactionRepository,
};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    NotFound(String),

    #[error("product {0} is out of stock")]
    OutOfStock(i64),

    #[error("{0}")]
    Conflict(String),

    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("store error: {0}")]
    Store(RepositoryError),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<RepositoryError> for CheckoutError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { .. } => CheckoutError::NotFound(err.to_string()),
            RepositoryError::InsufficientStock(product_id) => CheckoutError::OutOfStock(product_id),
            RepositoryError::Conflict(msg) => CheckoutError::Conflict(msg),
            other => CheckoutError::Store(other),
        }
    }
}

/// What a notification did to its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// The transaction moved out of `pending` into this status.
    Applied(TransactionStatus),
    /// The transaction had already left `pending`; nothing was written.
    Unchanged,
    /// The gateway status has no defined transition.
    Ignored,
}

/// Orchestrates the transaction lifecycle across the stores and the gateway.
/// Holds no mutable state of its own; all shared state lives behind the ports.
pub struct CheckoutService {
    transactions: Arc<dyn TransactionRepository>,
    inventory: Arc<dyn InventoryLedger>,
    gateway: Arc<dyn PaymentGateway>,
    budget: Duration,
}

impl CheckoutService {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        inventory: Arc<dyn InventoryLedger>,
        gateway: Arc<dyn PaymentGateway>,
        budget: Duration,
    ) -> Self {
        Self {
            transactions,
            inventory,
            gateway,
            budget,
        }
    }

    async fn within_budget<T, F>(&self, operation: F) -> Result<T, CheckoutError>
    where
        F: Future<Output = Result<T, CheckoutError>>,
    {
        timeout(self.budget, operation)
            .await
            .map_err(|_| CheckoutError::Timeout(self.budget))?
    }

    /// Opens a pending transaction for one unit of `product_id` and attaches a payment URL.
    pub async fn checkout(
        &self,
        product_id: i64,
        principal: &Principal,
    ) -> Result<Transaction, CheckoutError> {
        self.within_budget(self.run_checkout(product_id, principal))
            .await
            .inspect_err(|e| tracing::warn!(product_id, user_id = principal.id, error = %e, "checkout failed"))
    }

    async fn run_checkout(
        &self,
        product_id: i64,
        principal: &Principal,
    ) -> Result<Transaction, CheckoutError> {
        let product = self.inventory.read_by_id(product_id).await?;
        if !product.in_stock() {
            return Err(CheckoutError::OutOfStock(product.id));
        }

        // A concurrent checkout may take the last unit between the read and here;
        // the guarded reservation reports that as InsufficientStock.
        let pending = NewTransaction::new(product.id, principal.id, product.price.clone());
        let mut transaction = self.transactions.create_reserving(&pending).await?;
        tracing::info!(
            transaction_id = transaction.id,
            product_id = product.id,
            user_id = principal.id,
            amount = %transaction.amount,
            "pending transaction created"
        );

        let customer = Customer {
            name: principal.username.clone(),
            email: principal.email.clone(),
            phone: principal.phone.clone(),
        };
        let payment_url = self
            .gateway
            .create_payment_session(&transaction.order_id(), &transaction.amount, &customer)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    transaction_id = transaction.id,
                    error = %e,
                    "payment session failed, transaction left pending without URL"
                )
            })?;

        transaction.payment_url = Some(payment_url);
        self.transactions.update(&transaction).await?;

        Ok(transaction)
    }

    /// Reconciles a gateway notification against the stored transaction.
    pub async fn apply_notification(
        &self,
        notification: &GatewayNotification,
    ) -> Result<NotificationOutcome, CheckoutError> {
        self.within_budget(self.run_notification(notification)).await
    }

    async fn run_notification(
        &self,
        notification: &GatewayNotification,
    ) -> Result<NotificationOutcome, CheckoutError> {
        let id = notification.transaction_id().ok_or_else(|| {
            CheckoutError::from(RepositoryError::transaction_not_found(&notification.order_id))
        })?;
        let transaction = self.transactions.read_by_id(id).await?;

        let Some(target) = notification.target_status() else {
            tracing::info!(
                order_id = %notification.order_id,
                transaction_status = %notification.transaction_status,
                "notification has no mapped transition, ignoring"
            );
            return Ok(NotificationOutcome::Ignored);
        };

        let outcome = self.settle(&transaction, target).await?;
        if outcome == NotificationOutcome::Unchanged {
            tracing::info!(
                transaction_id = transaction.id,
                status = %transaction.status,
                requested = %target,
                "transaction already settled, notification is a no-op"
            );
        }
        Ok(outcome)
    }

    /// Cancels pending transactions that never got a payment URL before `cutoff`
    /// and returns their reserved units. Returns how many were cancelled.
    pub async fn expire_abandoned(&self, cutoff: DateTime<Utc>) -> Result<usize, CheckoutError> {
        let abandoned = self
            .within_budget(async {
                self.transactions
                    .list_abandoned(cutoff)
                    .await
                    .map_err(CheckoutError::from)
            })
            .await?;

        let mut cancelled = 0;
        for transaction in &abandoned {
            let outcome = self
                .within_budget(self.settle(transaction, TransactionStatus::Cancelled))
                .await?;
            if outcome != NotificationOutcome::Unchanged {
                cancelled += 1;
            }
        }

        tracing::info!(found = abandoned.len(), cancelled, %cutoff, "abandoned checkouts expired");
        Ok(cancelled)
    }

    /// Applies `pending -> target`. A cancellation returns the reserved unit in
    /// the same store operation, so it happens exactly when the row moves.
    async fn settle(
        &self,
        transaction: &Transaction,
        target: TransactionStatus,
    ) -> Result<NotificationOutcome, CheckoutError> {
        let moved = match target {
            // Release travels with the transition so a failed release can be retried.
            TransactionStatus::Cancelled => {
                self.transactions.cancel_and_release(transaction.id).await?
            }
            _ => {
                self.transactions
                    .update_status(transaction.id, TransactionStatus::Pending, target)
                    .await?
            }
        };
        if !moved {
            return Ok(NotificationOutcome::Unchanged);
        }

        tracing::info!(
            transaction_id = transaction.id,
            product_id = transaction.product_id,
            status = %target,
            "transaction settled"
        );
        Ok(NotificationOutcome::Applied(target))
    }
}
