use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{NewProduct, NewTransaction, Product, ProductDetails, Transaction, TransactionStatus};
use crate::ports::{
    InventoryLedger, ProductCatalog, RepositoryError, RepositoryResult, TransactionRepository,
};

struct Table<T> {
    rows: BTreeMap<i64, T>,
    last_id: i64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }
}

impl<T> Table<T> {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// A thread-safe in-memory product store.
///
/// Every stock adjustment happens under the write lock, so it is as atomic as the
/// single-statement update of the Postgres adapter. Clones share the same data.
#[derive(Default, Clone)]
pub struct InMemoryProductRepository {
    table: Arc<RwLock<Table<Product>>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a product with a caller-chosen id, e.g. to reproduce fixtures.
    pub async fn insert(&self, product: Product) {
        let mut table = self.table.write().await;
        table.last_id = table.last_id.max(product.id);
        table.rows.insert(product.id, product);
    }

    pub async fn stock_of(&self, product_id: i64) -> Option<i64> {
        self.table.read().await.rows.get(&product_id).map(|p| p.stock)
    }

    /// Changes the catalog price directly, as an administrator would.
    pub async fn set_price(&self, product_id: i64, price: bigdecimal::BigDecimal) {
        if let Some(product) = self.table.write().await.rows.get_mut(&product_id) {
            product.price = price;
            product.updated_at = Utc::now();
        }
    }
}

#[async_trait]
impl InventoryLedger for InMemoryProductRepository {
    async fn read_by_id(&self, product_id: i64) -> RepositoryResult<Product> {
        self.table
            .read()
            .await
            .rows
            .get(&product_id)
            .cloned()
            .ok_or_else(|| RepositoryError::product_not_found(product_id))
    }

    async fn adjust_stock(&self, product_id: i64, delta: i64) -> RepositoryResult<i64> {
        let mut table = self.table.write().await;
        let product = table
            .rows
            .get_mut(&product_id)
            .ok_or_else(|| RepositoryError::product_not_found(product_id))?;

        let stock = product.stock + delta;
        if stock < 0 {
            return Err(RepositoryError::InsufficientStock(product_id));
        }
        product.stock = stock;
        product.updated_at = Utc::now();
        Ok(stock)
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductRepository {
    async fn list(&self) -> RepositoryResult<Vec<Product>> {
        Ok(self.table.read().await.rows.values().cloned().collect())
    }

    async fn get(&self, product_id: i64) -> RepositoryResult<Product> {
        InventoryLedger::read_by_id(self, product_id).await
    }

    async fn create(&self, product: &NewProduct) -> RepositoryResult<Product> {
        let mut table = self.table.write().await;
        let now = Utc::now();
        let details = product.details.clone();
        let created = Product {
            id: table.next_id(),
            name: details.name,
            description: details.description,
            price: details.price,
            stock: product.initial_stock,
            image_url: details.image_url,
            start_date: details.start_date,
            end_date: details.end_date,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, product_id: i64, details: &ProductDetails) -> RepositoryResult<Product> {
        let mut table = self.table.write().await;
        let product = table
            .rows
            .get_mut(&product_id)
            .ok_or_else(|| RepositoryError::product_not_found(product_id))?;

        product.name = details.name.clone();
        product.description = details.description.clone();
        product.price = details.price.clone();
        product.image_url = details.image_url.clone();
        product.start_date = details.start_date;
        product.end_date = details.end_date;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete(&self, product_id: i64) -> RepositoryResult<()> {
        self.table
            .write()
            .await
            .rows
            .remove(&product_id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::product_not_found(product_id))
    }
}

/// A thread-safe in-memory transaction store.
///
/// The reserving and releasing operations need the product store they draw
/// units from; link it with `with_ledger`.
#[derive(Default, Clone)]
pub struct InMemoryTransactionRepository {
    table: Arc<RwLock<Table<Transaction>>>,
    ledger: Option<InMemoryProductRepository>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(ledger: InMemoryProductRepository) -> Self {
        Self {
            table: Arc::default(),
            ledger: Some(ledger),
        }
    }

    fn ledger(&self) -> RepositoryResult<&InMemoryProductRepository> {
        self.ledger
            .as_ref()
            .ok_or_else(|| RepositoryError::Unavailable("no product store linked".to_string()))
    }

    fn pending_row(tx: &NewTransaction, id: i64) -> Transaction {
        let now = Utc::now();
        Transaction {
            id,
            product_id: tx.product_id,
            user_id: tx.user_id,
            amount: tx.amount.clone(),
            status: tx.status(),
            payment_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Inserts a transaction with a caller-chosen id.
    pub async fn insert(&self, tx: Transaction) {
        let mut table = self.table.write().await;
        table.last_id = table.last_id.max(tx.id);
        table.rows.insert(tx.id, tx);
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn all(&self) -> Vec<Transaction> {
        self.table.read().await.rows.values().cloned().collect()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn create(&self, tx: &NewTransaction) -> RepositoryResult<Transaction> {
        let mut table = self.table.write().await;
        let id = table.next_id();
        let created = Self::pending_row(tx, id);
        table.rows.insert(created.id, created.clone());
        Ok(created)
    }

    async fn create_reserving(&self, tx: &NewTransaction) -> RepositoryResult<Transaction> {
        let ledger = self.ledger()?;
        // Both locks are held before anything is written, so the reservation
        // and the insert land together or not at all.
        let mut table = self.table.write().await;
        let mut products = ledger.table.write().await;

        let product = products
            .rows
            .get_mut(&tx.product_id)
            .ok_or_else(|| RepositoryError::product_not_found(tx.product_id))?;
        if product.stock < 1 {
            return Err(RepositoryError::InsufficientStock(tx.product_id));
        }
        product.stock -= 1;
        product.updated_at = Utc::now();

        let id = table.next_id();
        let created = Self::pending_row(tx, id);
        table.rows.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, tx: &Transaction) -> RepositoryResult<()> {
        let mut table = self.table.write().await;
        let stored = table
            .rows
            .get_mut(&tx.id)
            .ok_or_else(|| RepositoryError::transaction_not_found(tx.id))?;

        if stored.status != TransactionStatus::Pending {
            return Err(RepositoryError::Conflict(format!(
                "transaction {} is already {}",
                tx.id, stored.status
            )));
        }
        stored.payment_url = tx.payment_url.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn cancel_and_release(&self, id: i64) -> RepositoryResult<bool> {
        let ledger = self.ledger()?;
        let mut table = self.table.write().await;
        let mut products = ledger.table.write().await;

        let Some(stored) = table.rows.get_mut(&id) else {
            return Ok(false);
        };
        if stored.status != TransactionStatus::Pending {
            return Ok(false);
        }
        let product = products
            .rows
            .get_mut(&stored.product_id)
            .ok_or_else(|| RepositoryError::product_not_found(stored.product_id))?;

        let now = Utc::now();
        product.stock += 1;
        product.updated_at = now;
        stored.status = TransactionStatus::Cancelled;
        stored.updated_at = now;
        Ok(true)
    }

    async fn update_status(
        &self,
        id: i64,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> RepositoryResult<bool> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&id) {
            Some(stored) if stored.status == from => {
                stored.status = to;
                stored.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn read_by_id(&self, id: i64) -> RepositoryResult<Transaction> {
        self.table
            .read()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::transaction_not_found(id))
    }

    async fn list_abandoned(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<Transaction>> {
        Ok(self
            .table
            .read()
            .await
            .rows
            .values()
            .filter(|tx| {
                tx.status == TransactionStatus::Pending
                    && tx.payment_url.is_none()
                    && tx.created_at < cutoff
            })
            .cloned()
            .collect())
    }
}
