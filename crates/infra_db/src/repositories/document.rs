//! Versioned JSONB document storage
//!
//! Invoices, purchase orders, GRNs and transaction records are stored whole as
//! JSONB next to a `version` column. Every update is a compare-and-swap on
//! that column; the document itself carries the same version so that a loaded
//! aggregate can be written back without extra bookkeeping.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use core_kernel::Version;

use crate::error::DatabaseError;

/// A table holding versioned documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentTable {
    pub table: &'static str,
    pub id_column: &'static str,
    /// Entity name used in not-found and conflict errors
    pub entity: &'static str,
}

pub const INVOICES: DocumentTable = DocumentTable {
    table: "invoices",
    id_column: "invoice_id",
    entity: "Invoice",
};

pub const PURCHASE_ORDERS: DocumentTable = DocumentTable {
    table: "purchase_orders",
    id_column: "purchase_order_id",
    entity: "PurchaseOrder",
};

pub const GRNS: DocumentTable = DocumentTable {
    table: "grns",
    id_column: "grn_id",
    entity: "GoodsReceivedNote",
};

pub const TRANSACTIONS: DocumentTable = DocumentTable {
    table: "transactions",
    id_column: "transaction_id",
    entity: "Transaction",
};

/// Version as stored in a BIGINT column
pub fn db_version(version: Version) -> i64 {
    i64::try_from(version.value()).unwrap_or(i64::MAX)
}

/// Version read back from a BIGINT column
pub fn version_from_db(value: i64) -> Version {
    Version::from_u64(u64::try_from(value).unwrap_or_default())
}

/// Serializes an aggregate for a JSONB column
pub fn to_document<T: Serialize>(value: &T) -> Result<Value, DatabaseError> {
    Ok(serde_json::to_value(value)?)
}

/// Reads an aggregate back from a JSONB column
pub fn from_document<T: DeserializeOwned>(document: Value) -> Result<T, DatabaseError> {
    Ok(serde_json::from_value(document)?)
}

/// Loads a document by id
pub async fn fetch<T: DeserializeOwned>(
    conn: &mut PgConnection,
    table: DocumentTable,
    id: Uuid,
) -> Result<T, DatabaseError> {
    let sql = format!("SELECT document FROM {} WHERE {} = $1", table.table, table.id_column);
    let document: Value = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::not_found(table.entity, id))?;
    from_document(document)
}

/// Locks a document row for the rest of the transaction and returns its version
pub async fn lock_version(
    conn: &mut PgConnection,
    table: DocumentTable,
    id: Uuid,
) -> Result<Version, DatabaseError> {
    let sql = format!(
        "SELECT version FROM {} WHERE {} = $1 FOR UPDATE",
        table.table, table.id_column
    );
    let version: i64 = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::not_found(table.entity, id))?;
    Ok(version_from_db(version))
}

/// Writes `document` if the stored version is still `expected`
///
/// The caller passes the document already stamped with the next version.
/// Zero rows updated means either a missing row or a concurrent writer; the
/// follow-up read tells the two apart.
pub async fn compare_and_swap<T: Serialize>(
    conn: &mut PgConnection,
    table: DocumentTable,
    id: Uuid,
    expected: Version,
    document: &T,
) -> Result<(), DatabaseError> {
    let sql = format!(
        "UPDATE {} SET document = $1, version = $2 WHERE {} = $3 AND version = $4",
        table.table, table.id_column
    );
    let result = sqlx::query(&sql)
        .bind(to_document(document)?)
        .bind(db_version(expected.next()))
        .bind(id)
        .bind(db_version(expected))
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let sql = format!("SELECT version FROM {} WHERE {} = $1", table.table, table.id_column);
    let actual: Option<i64> = sqlx::query_scalar(&sql).bind(id).fetch_optional(&mut *conn).await?;
    match actual {
        Some(actual) => Err(DatabaseError::conflict(table.entity, id, expected, version_from_db(actual))),
        None => Err(DatabaseError::not_found(table.entity, id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tables_have_distinct_names() {
        let tables = [INVOICES, PURCHASE_ORDERS, GRNS, TRANSACTIONS];
        for (i, a) in tables.iter().enumerate() {
            for b in &tables[i + 1..] {
                assert_ne!(a.table, b.table);
            }
        }
    }

    #[test]
    fn test_negative_column_value_reads_as_zero() {
        assert_eq!(version_from_db(-3).value(), 0);
    }

    #[test]
    fn test_malformed_document_is_serialization_error() {
        let result = from_document::<Version>(serde_json::json!({"not": "a version"}));
        assert!(matches!(result, Err(DatabaseError::SerializationError(_))));
    }

    proptest! {
        #[test]
        fn prop_version_survives_bigint_column(raw in 0u64..=i64::MAX as u64) {
            let version = Version::from_u64(raw);
            prop_assert_eq!(version_from_db(db_version(version)), version);
        }
    }
}
