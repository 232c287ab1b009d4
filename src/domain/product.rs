//! Product (ticket) entity owned by the inventory ledger.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE: &str = "image/default.jpg";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    /// Never negative. Changed only through `InventoryLedger::adjust_stock`.
    pub stock: i64,
    pub image_url: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// Catalog fields an administrator may write. Stock is deliberately absent:
/// it is only set once on creation and adjusted atomically afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDetails {
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    pub image_url: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub details: ProductDetails,
    pub initial_stock: i64,
}
