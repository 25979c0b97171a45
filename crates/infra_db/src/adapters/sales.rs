//! PostgreSQL Invoice Adapter
//!
//! Invoices are stored whole, payments included, so that a payment and the
//! balance it is checked against are always written by the same
//! compare-and-swap.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{DomainPort, InvoiceId, PortError};
use domain_sales::{Invoice, InvoiceRepository};

use crate::error::DatabaseError;
use crate::repositories::document::{self, db_version, to_document, INVOICES};

#[derive(Debug, Clone)]
pub struct PostgresInvoiceRepository {
    pool: PgPool,
}

impl PostgresInvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresInvoiceRepository {}

#[async_trait]
impl InvoiceRepository for PostgresInvoiceRepository {
    async fn insert(&self, invoice: &Invoice) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            INSERT INTO invoices (invoice_id, reference, version, document, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::from(invoice.id))
        .bind(&invoice.reference)
        .bind(db_version(invoice.version))
        .bind(to_document(invoice)?)
        .bind(invoice.created_at)
        .execute(&self.pool)
        .await;

        match result.map_err(DatabaseError::from) {
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate() => Err(PortError::duplicate("Invoice", &invoice.reference)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        Ok(document::fetch(&mut conn, INVOICES, id.into()).await?)
    }

    async fn update(&self, mut invoice: Invoice) -> Result<Invoice, PortError> {
        let expected = invoice.version;
        invoice.version = expected.next();
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        document::compare_and_swap(&mut conn, INVOICES, invoice.id.into(), expected, &invoice).await?;
        Ok(invoice)
    }
}
