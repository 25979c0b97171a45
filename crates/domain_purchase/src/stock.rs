//! Stock movements

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{ItemId, StockTransactionId, WarehouseId};

/// Direction of a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockDirection {
    In,
    Out,
}

/// One stock movement for one item in one warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: StockTransactionId,
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: Decimal,
    pub direction: StockDirection,
    /// Source document, e.g. the GRN id
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl StockTransaction {
    /// Goods coming into a warehouse
    pub fn stock_in(item_id: ItemId, warehouse_id: WarehouseId, quantity: Decimal, reference: impl Into<String>) -> Self {
        Self {
            id: StockTransactionId::new_v7(),
            item_id,
            warehouse_id,
            quantity,
            direction: StockDirection::In,
            reference: reference.into(),
            created_at: Utc::now(),
        }
    }

    /// Quantity with the direction applied
    pub fn signed_quantity(&self) -> Decimal {
        match self.direction {
            StockDirection::In => self.quantity,
            StockDirection::Out => -self.quantity,
        }
    }
}
