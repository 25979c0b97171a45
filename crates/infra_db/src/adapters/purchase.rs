//! PostgreSQL Purchasing Adapter
//!
//! Purchase orders and GRNs are versioned documents; stock movements are
//! relational rows so levels can be summed. A receipt is committed in one
//! database transaction that locks the PO row before the GRN row, checks both
//! versions, writes both documents and inserts the stock rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{DomainPort, GrnId, ItemId, PortError, PurchaseOrderId, StockTransactionId, WarehouseId};
use domain_purchase::{
    GoodsReceivedNote, PurchaseOrder, PurchaseRepository, ReceiptCommit, StockDirection, StockTransaction,
};

use crate::error::DatabaseError;
use crate::repositories::document::{self, db_version, from_document, to_document, GRNS, PURCHASE_ORDERS};

#[derive(Debug, Clone, FromRow)]
struct StockRow {
    stock_transaction_id: Uuid,
    item_id: Uuid,
    warehouse_id: Uuid,
    quantity: Decimal,
    direction: String,
    reference: String,
    created_at: DateTime<Utc>,
}

impl StockRow {
    fn into_transaction(self) -> Result<StockTransaction, DatabaseError> {
        let direction = match self.direction.as_str() {
            "In" => StockDirection::In,
            "Out" => StockDirection::Out,
            other => {
                return Err(DatabaseError::SerializationError(format!(
                    "unknown stock direction: {}",
                    other
                )))
            }
        };
        Ok(StockTransaction {
            id: StockTransactionId::from_uuid(self.stock_transaction_id),
            item_id: ItemId::from_uuid(self.item_id),
            warehouse_id: WarehouseId::from_uuid(self.warehouse_id),
            quantity: self.quantity,
            direction,
            reference: self.reference,
            created_at: self.created_at,
        })
    }
}

fn direction_column(direction: StockDirection) -> &'static str {
    match direction {
        StockDirection::In => "In",
        StockDirection::Out => "Out",
    }
}

async fn insert_stock(conn: &mut PgConnection, stock: &StockTransaction) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO stock_transactions (
            stock_transaction_id, item_id, warehouse_id, quantity, direction, reference, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::from(stock.id))
    .bind(Uuid::from(stock.item_id))
    .bind(Uuid::from(stock.warehouse_id))
    .bind(stock.quantity)
    .bind(direction_column(stock.direction))
    .bind(&stock.reference)
    .bind(stock.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Purchase orders, GRNs and stock movements over one pool
#[derive(Debug, Clone)]
pub struct PostgresPurchaseRepository {
    pool: PgPool,
}

impl PostgresPurchaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn write_receipt(
        conn: &mut PgConnection,
        receipt: ReceiptCommit,
    ) -> Result<(GoodsReceivedNote, Option<PurchaseOrder>), DatabaseError> {
        let ReceiptCommit {
            mut grn,
            purchase_order,
            stock,
        } = receipt;

        // PO first, then GRN: every receipt locks in the same order
        if let Some(order) = &purchase_order {
            let actual = document::lock_version(conn, PURCHASE_ORDERS, order.id.into()).await?;
            if actual != order.version {
                return Err(DatabaseError::conflict(PURCHASE_ORDERS.entity, order.id, order.version, actual));
            }
        }
        let actual = document::lock_version(conn, GRNS, grn.id.into()).await?;
        if actual != grn.version {
            return Err(DatabaseError::conflict(GRNS.entity, grn.id, grn.version, actual));
        }

        let order = match purchase_order {
            Some(mut order) => {
                let expected = order.version;
                order.version = expected.next();
                document::compare_and_swap(conn, PURCHASE_ORDERS, order.id.into(), expected, &order).await?;
                Some(order)
            }
            None => None,
        };

        let expected = grn.version;
        grn.version = expected.next();
        document::compare_and_swap(conn, GRNS, grn.id.into(), expected, &grn).await?;

        for movement in &stock {
            insert_stock(conn, movement).await?;
        }
        Ok((grn, order))
    }
}

impl DomainPort for PostgresPurchaseRepository {}

#[async_trait]
impl PurchaseRepository for PostgresPurchaseRepository {
    async fn insert_order(&self, order: &PurchaseOrder) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            INSERT INTO purchase_orders (purchase_order_id, reference, version, document, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::from(order.id))
        .bind(&order.reference)
        .bind(db_version(order.version))
        .bind(to_document(order)?)
        .bind(order.created_at)
        .execute(&self.pool)
        .await;

        match result.map_err(DatabaseError::from) {
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate() => Err(PortError::duplicate("PurchaseOrder", &order.reference)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_order(&self, id: PurchaseOrderId) -> Result<PurchaseOrder, PortError> {
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        Ok(document::fetch(&mut conn, PURCHASE_ORDERS, id.into()).await?)
    }

    async fn update_order(&self, mut order: PurchaseOrder) -> Result<PurchaseOrder, PortError> {
        let expected = order.version;
        order.version = expected.next();
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        document::compare_and_swap(&mut conn, PURCHASE_ORDERS, order.id.into(), expected, &order).await?;
        Ok(order)
    }

    async fn insert_grn(&self, grn: &GoodsReceivedNote) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            INSERT INTO grns (grn_id, reference, purchase_order_id, version, document, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::from(grn.id))
        .bind(&grn.reference)
        .bind(grn.purchase_order_id.map(Uuid::from))
        .bind(db_version(grn.version))
        .bind(to_document(grn)?)
        .bind(grn.created_at)
        .execute(&self.pool)
        .await;

        match result.map_err(DatabaseError::from) {
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate() => Err(PortError::duplicate("GoodsReceivedNote", &grn.reference)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_grn(&self, id: GrnId) -> Result<GoodsReceivedNote, PortError> {
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        Ok(document::fetch(&mut conn, GRNS, id.into()).await?)
    }

    async fn update_grn(&self, mut grn: GoodsReceivedNote) -> Result<GoodsReceivedNote, PortError> {
        let expected = grn.version;
        grn.version = expected.next();
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        document::compare_and_swap(&mut conn, GRNS, grn.id.into(), expected, &grn).await?;
        Ok(grn)
    }

    async fn grns_for_order(&self, id: PurchaseOrderId) -> Result<Vec<GoodsReceivedNote>, PortError> {
        let documents: Vec<Value> =
            sqlx::query_scalar("SELECT document FROM grns WHERE purchase_order_id = $1 ORDER BY created_at")
                .bind(Uuid::from(id))
                .fetch_all(&self.pool)
                .await
                .map_err(DatabaseError::from)?;
        Ok(documents
            .into_iter()
            .map(from_document)
            .collect::<Result<Vec<_>, _>>()?)
    }

    #[instrument(skip(self, receipt), fields(grn_id = %receipt.grn.id))]
    async fn commit_receipt(
        &self,
        receipt: ReceiptCommit,
    ) -> Result<(GoodsReceivedNote, Option<PurchaseOrder>), PortError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;
        let stock_rows = receipt.stock.len();
        let written = Self::write_receipt(&mut tx, receipt).await?;
        tx.commit().await.map_err(DatabaseError::from)?;
        debug!(stock_rows, "Receipt committed");
        Ok(written)
    }

    async fn stock_movements(&self, reference: &str) -> Result<Vec<StockTransaction>, PortError> {
        let rows: Vec<StockRow> = sqlx::query_as(
            r#"
            SELECT stock_transaction_id, item_id, warehouse_id, quantity, direction, reference, created_at
            FROM stock_transactions
            WHERE reference = $1
            ORDER BY created_at, stock_transaction_id
            "#,
        )
        .bind(reference)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(rows
            .into_iter()
            .map(StockRow::into_transaction)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn stock_level(&self, item_id: ItemId, warehouse_id: WarehouseId) -> Result<Decimal, PortError> {
        let level: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN direction = 'In' THEN quantity ELSE -quantity END), 0)
            FROM stock_transactions
            WHERE item_id = $1 AND warehouse_id = $2
            "#,
        )
        .bind(Uuid::from(item_id))
        .bind(Uuid::from(warehouse_id))
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(level)
    }
}
