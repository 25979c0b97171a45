//! Purchasing Domain Ports
//!
//! One repository covers purchase orders, GRNs and the stock rows a receipt
//! writes, because receiving a GRN has to commit all three together.
//! `update_*` and [`PurchaseRepository::commit_receipt`] are compare-and-swap
//! on the aggregate versions.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

use core_kernel::{DomainPort, GrnId, ItemId, PortError, PurchaseOrderId, Version, WarehouseId};

use crate::grn::GoodsReceivedNote;
use crate::purchase_order::PurchaseOrder;
use crate::stock::StockTransaction;

/// Everything a GRN receipt writes
#[derive(Debug, Clone)]
pub struct ReceiptCommit {
    /// GRN marked received, carrying the version it was loaded at
    pub grn: GoodsReceivedNote,
    /// PO with updated received quantities, carrying the version it was loaded at
    pub purchase_order: Option<PurchaseOrder>,
    pub stock: Vec<StockTransaction>,
}

/// Storage for purchase orders, GRNs and stock movements
#[async_trait]
pub trait PurchaseRepository: DomainPort {
    /// Inserts a purchase order; a reused reference is `PortError::Duplicate`
    async fn insert_order(&self, order: &PurchaseOrder) -> Result<(), PortError>;

    async fn get_order(&self, id: PurchaseOrderId) -> Result<PurchaseOrder, PortError>;

    /// Compare-and-swap update; returns the stored order
    async fn update_order(&self, order: PurchaseOrder) -> Result<PurchaseOrder, PortError>;

    /// Inserts a GRN; a reused reference is `PortError::Duplicate`
    async fn insert_grn(&self, grn: &GoodsReceivedNote) -> Result<(), PortError>;

    async fn get_grn(&self, id: GrnId) -> Result<GoodsReceivedNote, PortError>;

    /// Compare-and-swap update; returns the stored GRN
    async fn update_grn(&self, grn: GoodsReceivedNote) -> Result<GoodsReceivedNote, PortError>;

    /// GRNs raised against an order
    async fn grns_for_order(&self, id: PurchaseOrderId) -> Result<Vec<GoodsReceivedNote>, PortError>;

    /// Writes a receipt atomically
    ///
    /// Both the GRN and the PO version are checked before anything is
    /// written; either mismatch aborts the whole commit with a conflict.
    async fn commit_receipt(
        &self,
        receipt: ReceiptCommit,
    ) -> Result<(GoodsReceivedNote, Option<PurchaseOrder>), PortError>;

    /// Stock movements written for a source document
    async fn stock_movements(&self, reference: &str) -> Result<Vec<StockTransaction>, PortError>;

    /// Net quantity of an item in a warehouse
    async fn stock_level(&self, item_id: ItemId, warehouse_id: WarehouseId) -> Result<Decimal, PortError>;
}

#[derive(Debug, Default)]
struct PurchaseStore {
    orders: HashMap<PurchaseOrderId, PurchaseOrder>,
    grns: HashMap<GrnId, GoodsReceivedNote>,
    stock: Vec<StockTransaction>,
}

/// In-memory purchasing repository; one lock makes receipts atomic
#[derive(Debug, Default)]
pub struct InMemoryPurchaseRepository {
    store: RwLock<PurchaseStore>,
}

impl InMemoryPurchaseRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DomainPort for InMemoryPurchaseRepository {}

fn check_version<T>(
    entity_type: &str,
    id: impl std::fmt::Display,
    stored: Option<&T>,
    expected: Version,
    version_of: impl Fn(&T) -> Version,
) -> Result<(), PortError> {
    let stored = stored.ok_or_else(|| PortError::not_found(entity_type, &id))?;
    let actual = version_of(stored);
    if actual != expected {
        return Err(PortError::conflict(entity_type, id, expected, actual));
    }
    Ok(())
}

#[async_trait]
impl PurchaseRepository for InMemoryPurchaseRepository {
    async fn insert_order(&self, order: &PurchaseOrder) -> Result<(), PortError> {
        let mut store = self.store.write().await;
        if store.orders.values().any(|o| o.reference == order.reference) {
            return Err(PortError::duplicate("PurchaseOrder", &order.reference));
        }
        store.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: PurchaseOrderId) -> Result<PurchaseOrder, PortError> {
        self.store
            .read()
            .await
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("PurchaseOrder", id))
    }

    async fn update_order(&self, mut order: PurchaseOrder) -> Result<PurchaseOrder, PortError> {
        let mut store = self.store.write().await;
        check_version("PurchaseOrder", order.id, store.orders.get(&order.id), order.version, |o| o.version)?;
        order.version = order.version.next();
        store.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn insert_grn(&self, grn: &GoodsReceivedNote) -> Result<(), PortError> {
        let mut store = self.store.write().await;
        if store.grns.values().any(|g| g.reference == grn.reference) {
            return Err(PortError::duplicate("GoodsReceivedNote", &grn.reference));
        }
        store.grns.insert(grn.id, grn.clone());
        Ok(())
    }

    async fn get_grn(&self, id: GrnId) -> Result<GoodsReceivedNote, PortError> {
        self.store
            .read()
            .await
            .grns
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("GoodsReceivedNote", id))
    }

    async fn update_grn(&self, mut grn: GoodsReceivedNote) -> Result<GoodsReceivedNote, PortError> {
        let mut store = self.store.write().await;
        check_version("GoodsReceivedNote", grn.id, store.grns.get(&grn.id), grn.version, |g| g.version)?;
        grn.version = grn.version.next();
        store.grns.insert(grn.id, grn.clone());
        Ok(grn)
    }

    async fn grns_for_order(&self, id: PurchaseOrderId) -> Result<Vec<GoodsReceivedNote>, PortError> {
        let mut grns: Vec<_> = self
            .store
            .read()
            .await
            .grns
            .values()
            .filter(|g| g.purchase_order_id == Some(id))
            .cloned()
            .collect();
        grns.sort_by_key(|g| g.created_at);
        Ok(grns)
    }

    async fn commit_receipt(
        &self,
        receipt: ReceiptCommit,
    ) -> Result<(GoodsReceivedNote, Option<PurchaseOrder>), PortError> {
        let ReceiptCommit {
            mut grn,
            purchase_order,
            stock,
        } = receipt;
        let mut store = self.store.write().await;

        if let Some(order) = &purchase_order {
            check_version("PurchaseOrder", order.id, store.orders.get(&order.id), order.version, |o| o.version)?;
        }
        check_version("GoodsReceivedNote", grn.id, store.grns.get(&grn.id), grn.version, |g| g.version)?;

        let order = purchase_order.map(|mut order| {
            order.version = order.version.next();
            store.orders.insert(order.id, order.clone());
            order
        });
        grn.version = grn.version.next();
        store.grns.insert(grn.id, grn.clone());
        store.stock.extend(stock);

        Ok((grn, order))
    }

    async fn stock_movements(&self, reference: &str) -> Result<Vec<StockTransaction>, PortError> {
        Ok(self
            .store
            .read()
            .await
            .stock
            .iter()
            .filter(|s| s.reference == reference)
            .cloned()
            .collect())
    }

    async fn stock_level(&self, item_id: ItemId, warehouse_id: WarehouseId) -> Result<Decimal, PortError> {
        Ok(self
            .store
            .read()
            .await
            .stock
            .iter()
            .filter(|s| s.item_id == item_id && s.warehouse_id == warehouse_id)
            .map(|s| s.signed_quantity())
            .sum())
    }
}
