//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{NewTransaction, Transaction, TransactionStatus};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

const TRANSACTION_COLUMNS: &str =
    "id, product_id, user_id, amount, status, payment_url, created_at, updated_at";

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn create(&self, tx: &NewTransaction) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (product_id, user_id, amount, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(tx.product_id)
        .bind(tx.user_id)
        .bind(&tx.amount)
        .bind(tx.status().as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                RepositoryError::product_not_found(tx.product_id)
            }
            other => RepositoryError::from(other),
        })?;

        row.into_domain()
    }

    async fn create_reserving(&self, tx: &NewTransaction) -> RepositoryResult<Transaction> {
        // Dropping `db_tx` without commit rolls the reservation back.
        let mut db_tx = self.pool.begin().await?;

        let reserved: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products SET stock = stock - 1, updated_at = NOW()
            WHERE id = $1 AND stock > 0
            RETURNING stock
            "#,
        )
        .bind(tx.product_id)
        .fetch_optional(&mut *db_tx)
        .await?;

        if reserved.is_none() {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                    .bind(tx.product_id)
                    .fetch_one(&mut *db_tx)
                    .await?;
            return Err(if exists {
                RepositoryError::InsufficientStock(tx.product_id)
            } else {
                RepositoryError::product_not_found(tx.product_id)
            });
        }

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (product_id, user_id, amount, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(tx.product_id)
        .bind(tx.user_id)
        .bind(&tx.amount)
        .bind(tx.status().as_str())
        .fetch_one(&mut *db_tx)
        .await?;

        db_tx.commit().await?;
        row.into_domain()
    }

    async fn update(&self, tx: &Transaction) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions SET payment_url = $1, updated_at = NOW()
            WHERE id = $2 AND status = $3
            "#,
        )
        .bind(&tx.payment_url)
        .bind(tx.id)
        .bind(TransactionStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.read_by_id(tx.id).await?;
            return Err(RepositoryError::Conflict(format!(
                "transaction {} is already {}",
                tx.id, current.status
            )));
        }
        Ok(())
    }

    async fn cancel_and_release(&self, id: i64) -> RepositoryResult<bool> {
        let mut db_tx = self.pool.begin().await?;

        let product_id: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE transactions SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status = $3
            RETURNING product_id
            "#,
        )
        .bind(TransactionStatus::Cancelled.as_str())
        .bind(id)
        .bind(TransactionStatus::Pending.as_str())
        .fetch_optional(&mut *db_tx)
        .await?;

        let Some(product_id) = product_id else {
            return Ok(false);
        };

        let released = sqlx::query(
            "UPDATE products SET stock = stock + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(product_id)
        .execute(&mut *db_tx)
        .await?;
        if released.rows_affected() == 0 {
            return Err(RepositoryError::product_not_found(product_id));
        }

        db_tx.commit().await?;
        tracing::debug!(transaction_id = id, product_id, "cancelled and released unit");
        Ok(true)
    }

    async fn update_status(
        &self,
        id: i64,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3",
        )
        .bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn read_by_id(&self, id: i64) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| RepositoryError::transaction_not_found(id))?
            .into_domain()
    }

    async fn list_abandoned(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM transactions
            WHERE status = 'pending' AND payment_url IS NULL AND created_at < $1
            ORDER BY created_at ASC
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    product_id: i64,
    user_id: i64,
    amount: bigdecimal::BigDecimal,
    status: String,
    payment_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(|e| RepositoryError::InvalidData(e.to_string()))?;

        Ok(Transaction {
            id: self.id,
            product_id: self.product_id,
            user_id: self.user_id,
            amount: self.amount,
            status,
            payment_url: self.payment_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
