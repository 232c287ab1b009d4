//! Postgres implementation of the inventory ledger and product catalog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{NewProduct, Product, ProductDetails};
use crate::ports::{InventoryLedger, ProductCatalog, RepositoryError, RepositoryResult};

const PRODUCT_COLUMNS: &str =
    "id, name, description, price, stock, image_url, start_date, end_date, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresProductRepository {
    pool: PgPool,
}

impl PostgresProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, product_id: i64) -> RepositoryResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProductRow::into_domain)
            .ok_or_else(|| RepositoryError::product_not_found(product_id))
    }
}

#[async_trait]
impl InventoryLedger for PostgresProductRepository {
    async fn read_by_id(&self, product_id: i64) -> RepositoryResult<Product> {
        self.fetch(product_id).await
    }

    async fn adjust_stock(&self, product_id: i64, delta: i64) -> RepositoryResult<i64> {
        // Single statement: the guard and the write cannot interleave with another adjustment.
        let stock: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products SET stock = stock + $1, updated_at = NOW()
            WHERE id = $2 AND stock + $1 >= 0
            RETURNING stock
            "#,
        )
        .bind(delta)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(stock) = stock {
            tracing::debug!(product_id, delta, stock, "stock adjusted");
            return Ok(stock);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;

        if exists {
            Err(RepositoryError::InsufficientStock(product_id))
        } else {
            Err(RepositoryError::product_not_found(product_id))
        }
    }
}

#[async_trait]
impl ProductCatalog for PostgresProductRepository {
    async fn list(&self) -> RepositoryResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ProductRow::into_domain).collect())
    }

    async fn get(&self, product_id: i64) -> RepositoryResult<Product> {
        self.fetch(product_id).await
    }

    async fn create(&self, product: &NewProduct) -> RepositoryResult<Product> {
        let details = &product.details;
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            INSERT INTO products (name, description, price, stock, image_url, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&details.name)
        .bind(&details.description)
        .bind(&details.price)
        .bind(product.initial_stock)
        .bind(&details.image_url)
        .bind(details.start_date)
        .bind(details.end_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_domain())
    }

    async fn update(&self, product_id: i64, details: &ProductDetails) -> RepositoryResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            UPDATE products
            SET name = $1, description = $2, price = $3, image_url = $4,
                start_date = $5, end_date = $6, updated_at = NOW()
            WHERE id = $7
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&details.name)
        .bind(&details.description)
        .bind(&details.price)
        .bind(&details.image_url)
        .bind(details.start_date)
        .bind(details.end_date)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProductRow::into_domain)
            .ok_or_else(|| RepositoryError::product_not_found(product_id))
    }

    async fn delete(&self, product_id: i64) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                    RepositoryError::Conflict(format!(
                        "product {product_id} has transactions and cannot be deleted"
                    ))
                }
                other => RepositoryError::from(other),
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::product_not_found(product_id));
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    description: String,
    price: bigdecimal::BigDecimal,
    stock: i64,
    image_url: String,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_domain(self) -> Product {
        Product {
            id: self.id,
            name: self.name,
            description: self.description,
            price: self.price,
            stock: self.stock,
            image_url: self.image_url,
            start_date: self.start_date,
            end_date: self.end_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
