//! General ledger tables
//!
//! Accounts are stored as JSONB documents keyed by id and code. Batches and
//! entries are relational so balances can be summed in SQL. Every function
//! takes a connection so callers decide the transaction boundary.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use core_kernel::{AccountId, Currency, EntryId, Money, PostingBatchId};
use domain_ledger::{Account, EntryStatus, GeneralLedgerEntry, PostingBatch, PostingReceipt, SourceType};

use crate::error::DatabaseError;
use crate::repositories::document::{from_document, to_document};

/// Debit and credit totals of an account's counted entries
pub type Movement = (Decimal, Decimal);

/// A committed batch header
#[derive(Debug, Clone, FromRow)]
pub struct BatchRow {
    pub batch_id: Uuid,
    pub idempotency_key: Option<String>,
    pub total: Decimal,
    pub currency: String,
    pub reversed_by: Option<Uuid>,
    pub posted_at: DateTime<Utc>,
}

/// A ledger entry row
#[derive(Debug, Clone, FromRow)]
pub struct EntryRow {
    pub entry_id: Uuid,
    pub batch_id: Uuid,
    pub account_id: Uuid,
    pub transaction_date: NaiveDate,
    pub source_type: String,
    pub source_id: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub currency: String,
    pub status: String,
    pub description: String,
    pub reverses: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl EntryRow {
    /// Converts the row back into a domain entry
    pub fn into_entry(self) -> Result<GeneralLedgerEntry, DatabaseError> {
        let currency = parse_currency(&self.currency)?;
        Ok(GeneralLedgerEntry {
            id: EntryId::from_uuid(self.entry_id),
            batch_id: PostingBatchId::from_uuid(self.batch_id),
            account_id: AccountId::from_uuid(self.account_id),
            transaction_date: self.transaction_date,
            source_type: SourceType::from_str(&self.source_type)
                .map_err(|e| DatabaseError::SerializationError(e.to_string()))?,
            source_id: self.source_id,
            debit: Money::new(self.debit, currency),
            credit: Money::new(self.credit, currency),
            status: EntryStatus::from_str(&self.status)
                .map_err(|e| DatabaseError::SerializationError(e.to_string()))?,
            description: self.description,
            reverses: self.reverses.map(EntryId::from_uuid),
            created_at: self.created_at,
        })
    }
}

fn parse_currency(code: &str) -> Result<Currency, DatabaseError> {
    Currency::from_str(code).map_err(|e| DatabaseError::SerializationError(e.to_string()))
}

const ENTRY_COLUMNS: &str = "entry_id, batch_id, account_id, transaction_date, source_type, source_id, \
     debit, credit, currency, status, description, reverses, created_at";

pub async fn insert_account(conn: &mut PgConnection, account: &Account) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO accounts (account_id, code, account_type, document, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::from(account.id))
    .bind(&account.code)
    .bind(format!("{:?}", account.account_type))
    .bind(to_document(account)?)
    .bind(account.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Replaces an account document; the code column follows the document
pub async fn update_account(conn: &mut PgConnection, account: &Account) -> Result<(), DatabaseError> {
    let result = sqlx::query("UPDATE accounts SET code = $1, document = $2 WHERE account_id = $3")
        .bind(&account.code)
        .bind(to_document(account)?)
        .bind(Uuid::from(account.id))
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("Account", account.id));
    }
    Ok(())
}

pub async fn fetch_account(conn: &mut PgConnection, id: AccountId) -> Result<Option<Account>, DatabaseError> {
    let document: Option<Value> = sqlx::query_scalar("SELECT document FROM accounts WHERE account_id = $1")
        .bind(Uuid::from(id))
        .fetch_optional(conn)
        .await?;
    document.map(from_document).transpose()
}

/// Locks one account row against concurrent postings and edits
pub async fn lock_account(conn: &mut PgConnection, id: AccountId) -> Result<Option<Account>, DatabaseError> {
    let document: Option<Value> =
        sqlx::query_scalar("SELECT document FROM accounts WHERE account_id = $1 FOR UPDATE")
            .bind(Uuid::from(id))
            .fetch_optional(conn)
            .await?;
    document.map(from_document).transpose()
}

pub async fn fetch_account_by_code(conn: &mut PgConnection, code: &str) -> Result<Option<Account>, DatabaseError> {
    let document: Option<Value> = sqlx::query_scalar("SELECT document FROM accounts WHERE code = $1")
        .bind(code)
        .fetch_optional(conn)
        .await?;
    document.map(from_document).transpose()
}

/// The chart ordered by code
pub async fn list_accounts(conn: &mut PgConnection) -> Result<Vec<Account>, DatabaseError> {
    let documents: Vec<Value> = sqlx::query_scalar("SELECT document FROM accounts ORDER BY code")
        .fetch_all(conn)
        .await?;
    documents.into_iter().map(from_document).collect()
}

/// Share-locks the accounts a batch touches so none is deactivated mid-post
pub async fn lock_accounts_for_posting(
    conn: &mut PgConnection,
    ids: &[AccountId],
) -> Result<HashMap<AccountId, Account>, DatabaseError> {
    let ids: Vec<Uuid> = ids.iter().map(|id| Uuid::from(*id)).collect();
    let documents: Vec<Value> =
        sqlx::query_scalar("SELECT document FROM accounts WHERE account_id = ANY($1) ORDER BY account_id FOR SHARE")
            .bind(&ids)
            .fetch_all(conn)
            .await?;
    documents
        .into_iter()
        .map(|doc| from_document::<Account>(doc).map(|a| (a.id, a)))
        .collect()
}

pub async fn account_has_entries(conn: &mut PgConnection, id: AccountId) -> Result<bool, DatabaseError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM ledger_entries WHERE account_id = $1)")
        .bind(Uuid::from(id))
        .fetch_one(conn)
        .await?;
    Ok(exists)
}

/// Receipt of the batch committed under an idempotency key, if any
pub async fn find_receipt_by_key(
    conn: &mut PgConnection,
    key: &str,
) -> Result<Option<PostingReceipt>, DatabaseError> {
    let row: Option<BatchRow> = sqlx::query_as(
        r#"
        SELECT batch_id, idempotency_key, total, currency, reversed_by, posted_at
        FROM ledger_batches
        WHERE idempotency_key = $1
        "#,
    )
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let entry_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT entry_id FROM ledger_entries WHERE batch_id = $1 ORDER BY line_no")
            .bind(row.batch_id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(Some(PostingReceipt {
        batch_id: PostingBatchId::from_uuid(row.batch_id),
        entry_ids: entry_ids.into_iter().map(EntryId::from_uuid).collect(),
        total: Money::new(row.total, parse_currency(&row.currency)?),
        posted_at: row.posted_at,
        replayed: true,
    }))
}

/// Writes a batch header and its entries
pub async fn insert_batch(
    conn: &mut PgConnection,
    batch_id: PostingBatchId,
    batch: &PostingBatch,
    total: Money,
    entries: &[GeneralLedgerEntry],
    posted_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO ledger_batches (
            batch_id, idempotency_key, description, transaction_date,
            source_type, source_id, total, currency, posted_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(Uuid::from(batch_id))
    .bind(&batch.idempotency_key)
    .bind(&batch.description)
    .bind(batch.transaction_date)
    .bind(batch.source_type.as_str())
    .bind(&batch.source_id)
    .bind(total.amount())
    .bind(total.currency().code())
    .bind(posted_at)
    .execute(&mut *conn)
    .await?;

    for (line_no, entry) in entries.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                entry_id, batch_id, line_no, account_id, transaction_date, source_type, source_id,
                debit, credit, currency, status, description, reverses, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(Uuid::from(entry.id))
        .bind(Uuid::from(entry.batch_id))
        .bind(i32::try_from(line_no).unwrap_or(i32::MAX))
        .bind(Uuid::from(entry.account_id))
        .bind(entry.transaction_date)
        .bind(entry.source_type.as_str())
        .bind(&entry.source_id)
        .bind(entry.debit.amount())
        .bind(entry.credit.amount())
        .bind(entry.currency().code())
        .bind(entry.status.as_str())
        .bind(&entry.description)
        .bind(entry.reverses.map(Uuid::from))
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Locks a batch header for reversal
pub async fn lock_batch(conn: &mut PgConnection, batch_id: PostingBatchId) -> Result<Option<BatchRow>, DatabaseError> {
    let row = sqlx::query_as(
        r#"
        SELECT batch_id, idempotency_key, total, currency, reversed_by, posted_at
        FROM ledger_batches
        WHERE batch_id = $1
        FOR UPDATE
        "#,
    )
    .bind(Uuid::from(batch_id))
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// Entries of a batch in line order; `None` if the batch does not exist
pub async fn batch_entries(
    conn: &mut PgConnection,
    batch_id: PostingBatchId,
) -> Result<Option<Vec<GeneralLedgerEntry>>, DatabaseError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM ledger_batches WHERE batch_id = $1)")
        .bind(Uuid::from(batch_id))
        .fetch_one(&mut *conn)
        .await?;
    if !exists {
        return Ok(None);
    }

    let sql = format!(
        "SELECT {} FROM ledger_entries WHERE batch_id = $1 ORDER BY line_no",
        ENTRY_COLUMNS
    );
    let rows: Vec<EntryRow> = sqlx::query_as(&sql)
        .bind(Uuid::from(batch_id))
        .fetch_all(&mut *conn)
        .await?;
    rows.into_iter().map(EntryRow::into_entry).collect::<Result<Vec<_>, _>>().map(Some)
}

/// Moves a batch's entries to Reversed and links the reversing batch
pub async fn mark_reversed(
    conn: &mut PgConnection,
    batch_id: PostingBatchId,
    reversal_batch_id: PostingBatchId,
) -> Result<(), DatabaseError> {
    sqlx::query("UPDATE ledger_entries SET status = $1 WHERE batch_id = $2")
        .bind(EntryStatus::Reversed.as_str())
        .bind(Uuid::from(batch_id))
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE ledger_batches SET reversed_by = $1 WHERE batch_id = $2")
        .bind(Uuid::from(reversal_batch_id))
        .bind(Uuid::from(batch_id))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Debit/credit totals per account over entries that count toward balances
pub async fn movements(
    conn: &mut PgConnection,
    account_id: Option<AccountId>,
    as_of: Option<NaiveDate>,
) -> Result<HashMap<AccountId, Movement>, DatabaseError> {
    let rows: Vec<(Uuid, Decimal, Decimal)> = sqlx::query_as(
        r#"
        SELECT account_id, COALESCE(SUM(debit), 0), COALESCE(SUM(credit), 0)
        FROM ledger_entries
        WHERE status = ANY($1)
          AND ($2::uuid IS NULL OR account_id = $2)
          AND ($3::date IS NULL OR transaction_date <= $3)
        GROUP BY account_id
        "#,
    )
    .bind(vec![
        EntryStatus::Posted.as_str().to_string(),
        EntryStatus::Reversed.as_str().to_string(),
    ])
    .bind(account_id.map(Uuid::from))
    .bind(as_of)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, debit, credit)| (AccountId::from_uuid(id), (debit, credit)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(status: &str, source_type: &str) -> EntryRow {
        EntryRow {
            entry_id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            transaction_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            source_type: source_type.to_string(),
            source_id: "INV-1".to_string(),
            debit: dec!(125.50),
            credit: Decimal::ZERO,
            currency: "USD".to_string(),
            status: status.to_string(),
            description: "Invoice".to_string(),
            reverses: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_entry_row_becomes_debit_entry() {
        let entry = row("Posted", "Invoice").into_entry().unwrap();
        assert_eq!(entry.status, EntryStatus::Posted);
        assert_eq!(entry.source_type, SourceType::Invoice);
        assert_eq!(entry.amount().amount(), dec!(125.50));
        assert_eq!(entry.currency(), Currency::USD);
        assert!(entry.credit.is_zero());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(matches!(
            row("Archived", "Invoice").into_entry(),
            Err(DatabaseError::SerializationError(_))
        ));
        assert!(row("Posted", "Quote").into_entry().is_err());
    }
}
