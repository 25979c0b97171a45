//! Purchase fulfillment tracker
//!
//! Receiving a GRN is the one operation that spans two aggregates. The GRN,
//! its PO and the new stock rows are validated together and written in one
//! repository commit that checks both versions; a lost race reruns the whole
//! load-validate-commit cycle.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use core_kernel::{retry_on_conflict, GrnId, PortError, PurchaseOrderId, RetryPolicy};
use domain_ledger::{BusinessEvent, Committed, TransactionPoster};

use crate::error::PurchaseError;
use crate::grn::{GoodsReceivedNote, NewGrn};
use crate::ports::{PurchaseRepository, ReceiptCommit};
use crate::purchase_order::{AppliedReceipt, NewPurchaseOrder, PurchaseOrder};
use crate::stock::StockTransaction;

/// What a receipt changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrnReceipt {
    pub grn: GoodsReceivedNote,
    pub purchase_order: Option<PurchaseOrder>,
    /// PO lines the receipt advanced; empty on a repeat call
    pub applied: Vec<AppliedReceipt>,
    pub stock: Vec<StockTransaction>,
    /// True when the GRN had already been received and nothing changed
    pub already_received: bool,
}

/// Owns PO received quantities and GRN receipt
pub struct PurchaseFulfillmentTracker {
    purchases: Arc<dyn PurchaseRepository>,
    poster: Arc<TransactionPoster>,
    retry: RetryPolicy,
}

impl PurchaseFulfillmentTracker {
    pub fn new(purchases: Arc<dyn PurchaseRepository>, poster: Arc<TransactionPoster>) -> Self {
        Self {
            purchases,
            poster,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the version-conflict retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn create_purchase_order(&self, input: NewPurchaseOrder) -> Result<PurchaseOrder, PurchaseError> {
        if input.currency != self.poster.currency() {
            return Err(PurchaseError::Validation(format!(
                "purchase order is in {}, ledger currency is {}",
                input.currency,
                self.poster.currency()
            )));
        }
        let order = PurchaseOrder::create(input)?;
        match self.purchases.insert_order(&order).await {
            Ok(()) => {}
            Err(PortError::Duplicate { .. }) => return Err(PurchaseError::DuplicateReference(order.reference)),
            Err(e) => return Err(e.into()),
        }
        info!(purchase_order_id = %order.id, reference = %order.reference, total = %order.total(), "Purchase order created");
        Ok(order)
    }

    /// Retrieves an active purchase order
    pub async fn get_purchase_order(&self, id: PurchaseOrderId) -> Result<PurchaseOrder, PurchaseError> {
        let order = self.load_order(id).await?;
        if order.lifecycle.is_deleted() {
            return Err(PurchaseError::PurchaseOrderNotFound(id.to_string()));
        }
        Ok(order)
    }

    /// Approves an open order
    pub async fn approve(&self, id: PurchaseOrderId) -> Result<PurchaseOrder, PurchaseError> {
        let order = retry_on_conflict::<_, PurchaseError, _, _>(self.retry, "approve_purchase_order", |_| async move {
            let mut order = self.load_order(id).await?;
            if let Err(e) = order.approve() {
                warn!(purchase_order_id = %id, error = %e, "Purchase order approval rejected");
                return Err(e);
            }
            Ok(self.purchases.update_order(order).await?)
        })
        .await?;
        info!(purchase_order_id = %id, "Purchase order approved");
        Ok(order)
    }

    /// Closes an order; later GRNs against it are refused
    pub async fn close(&self, id: PurchaseOrderId) -> Result<PurchaseOrder, PurchaseError> {
        let order = retry_on_conflict::<_, PurchaseError, _, _>(self.retry, "close_purchase_order", |_| async move {
            let mut order = self.load_order(id).await?;
            if let Err(e) = order.close() {
                warn!(purchase_order_id = %id, error = %e, "Purchase order close rejected");
                return Err(e);
            }
            Ok(self.purchases.update_order(order).await?)
        })
        .await?;
        info!(purchase_order_id = %id, status = ?order.fulfillment_status(), "Purchase order closed");
        Ok(order)
    }

    /// Creates an unreceived GRN, standalone or against an open order
    pub async fn create_grn(&self, input: NewGrn) -> Result<GoodsReceivedNote, PurchaseError> {
        if input.currency != self.poster.currency() {
            return Err(PurchaseError::Validation(format!(
                "GRN is in {}, ledger currency is {}",
                input.currency,
                self.poster.currency()
            )));
        }

        let warehouse_id = match input.purchase_order_id {
            Some(po_id) => {
                let order = self.load_order(po_id).await?;
                order.ensure_open()?;
                if order.currency != input.currency {
                    return Err(PurchaseError::Validation(format!(
                        "GRN is in {}, purchase order {} is in {}",
                        input.currency, order.reference, order.currency
                    )));
                }
                input.warehouse_id.unwrap_or(order.warehouse_id)
            }
            None => input.warehouse_id.ok_or_else(|| {
                PurchaseError::Validation("a standalone GRN needs a warehouse".to_string())
            })?,
        };

        let grn = GoodsReceivedNote::create(input, warehouse_id)?;
        match self.purchases.insert_grn(&grn).await {
            Ok(()) => {}
            Err(PortError::Duplicate { .. }) => return Err(PurchaseError::DuplicateReference(grn.reference)),
            Err(e) => return Err(e.into()),
        }
        info!(grn_id = %grn.id, reference = %grn.reference, purchase_order_id = ?grn.purchase_order_id, "GRN created");
        Ok(grn)
    }

    /// Retrieves an active GRN
    pub async fn get_grn(&self, id: GrnId) -> Result<GoodsReceivedNote, PurchaseError> {
        let grn = self.load_grn(id).await?;
        if grn.is_deleted() {
            return Err(PurchaseError::GrnNotFound(id.to_string()));
        }
        Ok(grn)
    }

    /// GRNs raised against an order
    pub async fn list_grns(&self, id: PurchaseOrderId) -> Result<Vec<GoodsReceivedNote>, PurchaseError> {
        self.get_purchase_order(id).await?;
        let grns = self.purchases.grns_for_order(id).await?;
        Ok(grns.into_iter().filter(|g| !g.is_deleted()).collect())
    }

    /// Receives a GRN: PO quantities, stock IN rows and the inventory posting
    ///
    /// All PO lines are checked before any is changed; one over-receipt
    /// rejects the whole GRN. Receiving a GRN twice is the same as once.
    pub async fn receive_grn(&self, id: GrnId) -> Result<Committed<GrnReceipt>, PurchaseError> {
        let receipt = retry_on_conflict::<_, PurchaseError, _, _>(self.retry, "receive_grn", |_| async move {
            let mut grn = self.load_grn(id).await?;
            grn.ensure_active()?;

            if grn.is_received() {
                let purchase_order = match grn.purchase_order_id {
                    Some(po_id) => Some(self.load_order(po_id).await?),
                    None => None,
                };
                let stock = self.purchases.stock_movements(&grn.id.to_string()).await?;
                return Ok(GrnReceipt {
                    grn,
                    purchase_order,
                    applied: Vec::new(),
                    stock,
                    already_received: true,
                });
            }

            let (purchase_order, applied) = match grn.purchase_order_id {
                Some(po_id) => {
                    let mut order = self.load_order(po_id).await?;
                    let applied = order.apply_receipt(&grn.lines)?;
                    (Some(order), applied)
                }
                None => (None, Vec::new()),
            };

            let reference = grn.id.to_string();
            let stock: Vec<_> = grn
                .lines
                .iter()
                .map(|line| StockTransaction::stock_in(line.item_id, grn.warehouse_id, line.quantity, reference.clone()))
                .collect();
            grn.mark_received(Utc::now())?;

            let (grn, purchase_order) = self
                .purchases
                .commit_receipt(ReceiptCommit {
                    grn,
                    purchase_order,
                    stock: stock.clone(),
                })
                .await?;

            Ok(GrnReceipt {
                grn,
                purchase_order,
                applied,
                stock,
                already_received: false,
            })
        })
        .await
        .inspect_err(|e| {
            if matches!(e, PurchaseError::OverReceipt { .. } | PurchaseError::AlreadyClosed(_)) {
                warn!(grn_id = %id, error = %e, "GRN receipt rejected");
            }
        })?;

        if receipt.already_received {
            info!(grn_id = %id, "GRN already received");
        } else {
            info!(
                grn_id = %id,
                purchase_order_id = ?receipt.grn.purchase_order_id,
                lines = receipt.grn.lines.len(),
                total = %receipt.grn.total(),
                "GRN received"
            );
        }

        let ledger = self
            .poster
            .post_after_commit(BusinessEvent::GoodsReceived {
                grn_id: receipt.grn.id,
                reference: receipt.grn.reference.clone(),
                date: receipt.grn.grn_date,
                total: receipt.grn.total(),
                settlement: receipt.grn.settlement,
            })
            .await;
        Ok(Committed::new(receipt, ledger))
    }

    /// Soft-deletes an unreceived GRN
    pub async fn delete_grn(&self, id: GrnId) -> Result<GoodsReceivedNote, PurchaseError> {
        let grn = retry_on_conflict::<_, PurchaseError, _, _>(self.retry, "delete_grn", |_| async move {
            let mut grn = self.load_grn(id).await?;
            if let Err(e) = grn.delete() {
                warn!(grn_id = %id, error = %e, "GRN delete rejected");
                return Err(e);
            }
            Ok(self.purchases.update_grn(grn).await?)
        })
        .await?;
        info!(grn_id = %id, "GRN deleted");
        Ok(grn)
    }

    async fn load_order(&self, id: PurchaseOrderId) -> Result<PurchaseOrder, PurchaseError> {
        match self.purchases.get_order(id).await {
            Ok(order) => Ok(order),
            Err(e) if e.is_not_found() => Err(PurchaseError::PurchaseOrderNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_grn(&self, id: GrnId) -> Result<GoodsReceivedNote, PurchaseError> {
        match self.purchases.get_grn(id).await {
            Ok(grn) => Ok(grn),
            Err(e) if e.is_not_found() => Err(PurchaseError::GrnNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
