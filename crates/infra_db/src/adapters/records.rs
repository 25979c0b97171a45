//! PostgreSQL adapters for transaction records, categories and the pending
//! posting queue

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use core_kernel::{CategoryId, DomainPort, PortError, TransactionId};
use domain_ledger::{
    Category, CategoryRepository, PendingPosting, PendingPostingStore, SourceType, Transaction, TransactionRepository,
};

use crate::error::DatabaseError;
use crate::repositories::document::{self, db_version, from_document, to_document, TRANSACTIONS};

/// Transaction records as versioned documents
#[derive(Debug, Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresTransactionRepository {}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert(&self, transaction: &Transaction) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions (transaction_id, source_type, source_id, version, document, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::from(transaction.id))
        .bind(transaction.source_type.as_str())
        .bind(&transaction.source_id)
        .bind(db_version(transaction.version))
        .bind(to_document(transaction)?)
        .bind(transaction.created_at)
        .execute(&self.pool)
        .await;

        match result.map_err(DatabaseError::from) {
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate() => Err(PortError::duplicate("Transaction", transaction.id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: TransactionId) -> Result<Transaction, PortError> {
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        Ok(document::fetch(&mut conn, TRANSACTIONS, id.into()).await?)
    }

    async fn find_by_source(
        &self,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<Option<Transaction>, PortError> {
        let document: Option<Value> = sqlx::query_scalar(
            r#"
            SELECT document FROM transactions
            WHERE source_type = $1 AND source_id = $2
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(source_type.as_str())
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(document.map(from_document).transpose()?)
    }

    async fn update(&self, mut transaction: Transaction) -> Result<Transaction, PortError> {
        let expected = transaction.version;
        transaction.version = expected.next();
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        document::compare_and_swap(&mut conn, TRANSACTIONS, transaction.id.into(), expected, &transaction).await?;
        Ok(transaction)
    }
}

/// Categories keyed by case-insensitive name
#[derive(Debug, Clone)]
pub struct PostgresCategoryRepository {
    pool: PgPool,
}

impl PostgresCategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresCategoryRepository {}

#[async_trait]
impl CategoryRepository for PostgresCategoryRepository {
    async fn insert(&self, category: &Category) -> Result<(), PortError> {
        let result = sqlx::query("INSERT INTO categories (category_id, name, document) VALUES ($1, $2, $3)")
            .bind(Uuid::from(category.id))
            .bind(&category.name)
            .bind(to_document(category)?)
            .execute(&self.pool)
            .await;

        match result.map_err(DatabaseError::from) {
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate() => Err(PortError::duplicate("Category", &category.name)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: CategoryId) -> Result<Category, PortError> {
        let document: Value = sqlx::query_scalar("SELECT document FROM categories WHERE category_id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?
            .ok_or_else(|| PortError::not_found("Category", id))?;
        Ok(from_document(document)?)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, PortError> {
        let document: Option<Value> =
            sqlx::query_scalar("SELECT document FROM categories WHERE LOWER(name) = LOWER($1)")
                .bind(name.trim())
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from)?;
        Ok(document.map(from_document).transpose()?)
    }

    async fn update(&self, category: &Category) -> Result<(), PortError> {
        let result = sqlx::query("UPDATE categories SET name = $1, document = $2 WHERE category_id = $3")
            .bind(&category.name)
            .bind(to_document(category)?)
            .bind(Uuid::from(category.id))
            .execute(&self.pool)
            .await;

        match result.map_err(DatabaseError::from) {
            Ok(done) if done.rows_affected() == 0 => Err(PortError::not_found("Category", category.id)),
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate() => Err(PortError::duplicate("Category", &category.name)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: CategoryId) -> Result<(), PortError> {
        let done = sqlx::query("DELETE FROM categories WHERE category_id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        if done.rows_affected() == 0 {
            return Err(PortError::not_found("Category", id));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Category>, PortError> {
        let documents: Vec<Value> = sqlx::query_scalar("SELECT document FROM categories ORDER BY LOWER(name)")
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(documents
            .into_iter()
            .map(from_document)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

/// Durable queue of postings that could not reach the ledger
#[derive(Debug, Clone)]
pub struct PostgresPendingPostingStore {
    pool: PgPool,
}

impl PostgresPendingPostingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresPendingPostingStore {}

#[async_trait]
impl PendingPostingStore for PostgresPendingPostingStore {
    async fn enqueue(&self, posting: PendingPosting) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO pending_postings (posting_key, document, queued_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (posting_key) DO NOTHING
            "#,
        )
        .bind(&posting.key)
        .bind(to_document(&posting)?)
        .bind(posting.queued_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        debug!(key = %posting.key, "Posting queued");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PendingPosting>, PortError> {
        let documents: Vec<Value> = sqlx::query_scalar("SELECT document FROM pending_postings ORDER BY queued_at")
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(documents
            .into_iter()
            .map(from_document)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn get(&self, key: &str) -> Result<Option<PendingPosting>, PortError> {
        let document: Option<Value> = sqlx::query_scalar("SELECT document FROM pending_postings WHERE posting_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(document.map(from_document).transpose()?)
    }

    async fn record_failure(&self, key: &str, error: &str) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;
        let document: Value =
            sqlx::query_scalar("SELECT document FROM pending_postings WHERE posting_key = $1 FOR UPDATE")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DatabaseError::from)?
                .ok_or_else(|| PortError::not_found("PendingPosting", key))?;

        let mut posting: PendingPosting = from_document(document)?;
        posting.attempts += 1;
        posting.last_error = error.to_string();

        sqlx::query("UPDATE pending_postings SET document = $1 WHERE posting_key = $2")
            .bind(to_document(&posting)?)
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from)?;
        tx.commit().await.map_err(DatabaseError::from)?;
        debug!(key, attempts = posting.attempts, "Pending posting attempt failed");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<PendingPosting>, PortError> {
        let document: Option<Value> =
            sqlx::query_scalar("DELETE FROM pending_postings WHERE posting_key = $1 RETURNING document")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from)?;
        Ok(document.map(from_document).transpose()?)
    }
}
