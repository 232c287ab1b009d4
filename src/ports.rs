//! Ports the checkout core depends on. Adapters live in `crate::adapters`
//! and `crate::midtrans`.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{NewProduct, NewTransaction, Product, ProductDetails, Transaction, TransactionStatus};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("insufficient stock for product {0}")]
    InsufficientStock(i64),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub fn product_not_found(id: i64) -> Self {
        RepositoryError::NotFound {
            entity: "product",
            id: id.to_string(),
        }
    }

    pub fn transaction_not_found(id: impl ToString) -> Self {
        RepositoryError::NotFound {
            entity: "transaction",
            id: id.to_string(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Owns transaction records. Creates are appends, everything else is a point update.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Persists a `pending` transaction and assigns its id.
    async fn create(&self, tx: &NewTransaction) -> RepositoryResult<Transaction>;

    /// Reserves one unit of the product and persists a `pending` transaction
    /// in one atomic step. Nothing is written when the unit cannot be taken.
    async fn create_reserving(&self, tx: &NewTransaction) -> RepositoryResult<Transaction>;

    /// Persists the payment URL of a transaction that is still `pending`.
    /// A transaction that already left `pending` yields `Conflict`.
    async fn update(&self, tx: &Transaction) -> RepositoryResult<()>;

    /// Moves `id` from `from` to `to` only if its persisted status is still `from`.
    /// Returns whether a row changed. This is the single point that enforces
    /// at-most-one transition per transaction.
    async fn update_status(
        &self,
        id: i64,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> RepositoryResult<bool>;

    /// Moves `id` from `pending` to `cancelled` and returns its unit to the
    /// product's stock, both or neither. Returns whether this call moved the row.
    async fn cancel_and_release(&self, id: i64) -> RepositoryResult<bool>;

    async fn read_by_id(&self, id: i64) -> RepositoryResult<Transaction>;

    /// Pending transactions created before `cutoff` that never received a payment URL.
    async fn list_abandoned(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<Transaction>>;
}

/// Owns per-product stock.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn read_by_id(&self, product_id: i64) -> RepositoryResult<Product>;

    /// Atomically applies `delta` to the stock, refusing with
    /// `InsufficientStock` when the result would go below zero.
    /// Returns the new stock.
    async fn adjust_stock(&self, product_id: i64, delta: i64) -> RepositoryResult<i64>;
}

/// Plain product CRUD used by the admin endpoints.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn list(&self) -> RepositoryResult<Vec<Product>>;
    async fn get(&self, product_id: i64) -> RepositoryResult<Product>;
    async fn create(&self, product: &NewProduct) -> RepositoryResult<Product>;
    /// Rewrites catalog fields. Never touches stock.
    async fn update(&self, product_id: i64, details: &ProductDetails) -> RepositoryResult<Product>;
    async fn delete(&self, product_id: i64) -> RepositoryResult<()>;
}

/// Customer fields forwarded to the gateway's checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("amount cannot be charged: {0}")]
    InvalidAmount(String),

    #[error("invalid response from gateway: {0}")]
    InvalidResponse(String),

    #[error("circuit breaker open: {0}")]
    CircuitOpen(String),
}

/// External payment gateway: returns a redirect URL where the customer pays.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_session(
        &self,
        order_id: &str,
        gross_amount: &BigDecimal,
        customer: &Customer,
    ) -> Result<String, GatewayError>;
}
