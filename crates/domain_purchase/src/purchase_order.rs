//! Purchase orders and their received-quantity accumulation
//!
//! A PO line's received quantity only ever grows, one GRN at a time, and
//! never past the ordered quantity. Approval and closing are one-way flags.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::{Currency, ItemId, Lifecycle, Money, PurchaseOrderId, VendorId, Version, WarehouseId};

use crate::error::PurchaseError;
use crate::grn::{checked_lines_total, GrnLine};

/// A line on a purchase order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub item_id: ItemId,
    pub description: String,
    pub quantity_ordered: Decimal,
    pub unit_price: Money,
    pub received_quantity: Decimal,
}

impl PurchaseOrderLine {
    /// Creates a line with nothing received
    pub fn new(item_id: ItemId, description: impl Into<String>, quantity_ordered: Decimal, unit_price: Money) -> Self {
        Self {
            item_id,
            description: description.into(),
            quantity_ordered,
            unit_price,
            received_quantity: Decimal::ZERO,
        }
    }

    /// Ordered minus received
    pub fn remaining(&self) -> Decimal {
        self.quantity_ordered - self.received_quantity
    }

    pub fn is_fully_received(&self) -> bool {
        self.received_quantity >= self.quantity_ordered
    }

    pub fn line_total(&self) -> Money {
        let amount = self.unit_price.amount().saturating_mul(self.quantity_ordered);
        Money::new(amount, self.unit_price.currency()).round_to_currency()
    }
}

/// Derived receipt progress of a purchase order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FulfillmentStatus {
    NotReceived,
    PartiallyReceived,
    FullyReceived,
}

/// Quantity applied to one PO line by a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedReceipt {
    pub item_id: ItemId,
    pub quantity: Decimal,
    pub received_quantity: Decimal,
}

/// Input for creating a purchase order
#[derive(Debug, Clone)]
pub struct NewPurchaseOrder {
    pub reference: String,
    pub vendor_id: Option<VendorId>,
    pub warehouse_id: WarehouseId,
    pub currency: Currency,
    pub order_date: NaiveDate,
    pub lines: Vec<PurchaseOrderLine>,
    pub notes: Option<String>,
}

/// A purchase order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub reference: String,
    pub vendor_id: Option<VendorId>,
    pub warehouse_id: WarehouseId,
    pub currency: Currency,
    pub order_date: NaiveDate,
    pub lines: Vec<PurchaseOrderLine>,
    pub approved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub lifecycle: Lifecycle,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrder {
    /// Validates the input and creates an open, unapproved order
    pub fn create(input: NewPurchaseOrder) -> Result<Self, PurchaseError> {
        let reference = input.reference.trim().to_string();
        if reference.is_empty() {
            return Err(PurchaseError::Validation("purchase order reference is required".to_string()));
        }
        if input.lines.is_empty() {
            return Err(PurchaseError::Validation("purchase order needs at least one line".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        let mut lines = Vec::with_capacity(input.lines.len());
        for (i, line) in input.lines.into_iter().enumerate() {
            if !seen.insert(line.item_id) {
                return Err(PurchaseError::Validation(format!(
                    "line {}: item {} appears more than once",
                    i + 1,
                    line.item_id
                )));
            }
            if line.quantity_ordered <= Decimal::ZERO {
                return Err(PurchaseError::Validation(format!(
                    "line {}: quantity ordered must be greater than zero",
                    i + 1
                )));
            }
            if line.unit_price.currency() != input.currency {
                return Err(PurchaseError::Validation(format!(
                    "line {}: unit price is in {}, order is in {}",
                    i + 1,
                    line.unit_price.currency(),
                    input.currency
                )));
            }
            if line.unit_price.is_negative() {
                return Err(PurchaseError::Validation(format!("line {}: unit price cannot be negative", i + 1)));
            }
            lines.push(PurchaseOrderLine {
                received_quantity: Decimal::ZERO,
                ..line
            });
        }
        checked_lines_total(input.currency, lines.iter().map(|l| (l.unit_price, l.quantity_ordered))).map_err(|e| {
            PurchaseError::Validation(format!("order total cannot be represented: {}", e))
        })?;

        let now = Utc::now();
        Ok(Self {
            id: PurchaseOrderId::new_v7(),
            reference,
            vendor_id: input.vendor_id,
            warehouse_id: input.warehouse_id,
            currency: input.currency,
            order_date: input.order_date,
            lines,
            approved_at: None,
            closed_at: None,
            notes: input.notes,
            lifecycle: Lifecycle::Active,
            version: Version::initial(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_approved(&self) -> bool {
        self.approved_at.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    /// Ordered value; bounded at creation, so the saturating sum is exact
    pub fn total(&self) -> Money {
        let amount = self
            .lines
            .iter()
            .fold(Decimal::ZERO, |acc, l| acc.saturating_add(l.line_total().amount()));
        Money::new(amount, self.currency)
    }

    pub fn line_for(&self, item_id: ItemId) -> Option<&PurchaseOrderLine> {
        self.lines.iter().find(|l| l.item_id == item_id)
    }

    pub fn fulfillment_status(&self) -> FulfillmentStatus {
        if self.lines.iter().all(|l| l.is_fully_received()) {
            FulfillmentStatus::FullyReceived
        } else if self.lines.iter().any(|l| l.received_quantity > Decimal::ZERO) {
            FulfillmentStatus::PartiallyReceived
        } else {
            FulfillmentStatus::NotReceived
        }
    }

    /// Refuses any GRN activity against a closed or deleted order
    pub fn ensure_open(&self) -> Result<(), PurchaseError> {
        if self.lifecycle.is_deleted() {
            return Err(PurchaseError::AlreadyClosed(format!("purchase order {} is deleted", self.reference)));
        }
        if self.is_closed() {
            return Err(PurchaseError::AlreadyClosed(format!("purchase order {} is closed", self.reference)));
        }
        Ok(())
    }

    pub fn approve(&mut self) -> Result<(), PurchaseError> {
        self.ensure_open()?;
        if self.is_approved() {
            return Err(PurchaseError::AlreadyClosed(format!(
                "purchase order {} is already approved",
                self.reference
            )));
        }
        let now = Utc::now();
        self.approved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Closes the order; partial receipt is allowed
    pub fn close(&mut self) -> Result<(), PurchaseError> {
        self.ensure_open()?;
        let now = Utc::now();
        self.closed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Adds GRN quantities to the matching PO lines, all or nothing
    ///
    /// GRN lines for items not on the order are skipped. Several GRN lines
    /// for the same item count together against that item's PO line.
    pub fn apply_receipt(&mut self, grn_lines: &[GrnLine]) -> Result<Vec<AppliedReceipt>, PurchaseError> {
        self.ensure_open()?;

        let mut per_item: BTreeMap<ItemId, Decimal> = BTreeMap::new();
        for line in grn_lines {
            let Some(po_line) = self.line_for(line.item_id) else {
                continue;
            };
            let so_far = per_item.get(&line.item_id).copied().unwrap_or_default();
            let attempted = so_far.checked_add(line.quantity);
            let fits = attempted
                .and_then(|q| po_line.received_quantity.checked_add(q))
                .is_some_and(|received| received <= po_line.quantity_ordered);
            match attempted {
                Some(quantity) if fits => {
                    per_item.insert(line.item_id, quantity);
                }
                _ => {
                    return Err(PurchaseError::OverReceipt {
                        item_id: line.item_id,
                        ordered: po_line.quantity_ordered,
                        already_received: po_line.received_quantity,
                        attempted: attempted.unwrap_or(Decimal::MAX),
                    });
                }
            }
        }

        let mut applied = Vec::with_capacity(per_item.len());
        for po_line in self.lines.iter_mut() {
            if let Some(quantity) = per_item.get(&po_line.item_id) {
                po_line.received_quantity += *quantity;
                applied.push(AppliedReceipt {
                    item_id: po_line.item_id,
                    quantity: *quantity,
                    received_quantity: po_line.received_quantity,
                });
            }
        }
        self.updated_at = Utc::now();
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(item: ItemId, ordered: Decimal) -> PurchaseOrder {
        PurchaseOrder::create(NewPurchaseOrder {
            reference: "PO-1".to_string(),
            vendor_id: None,
            warehouse_id: WarehouseId::new(),
            currency: Currency::USD,
            order_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            lines: vec![PurchaseOrderLine::new(item, "Bolts", ordered, Money::new(dec!(2.50), Currency::USD))],
            notes: None,
        })
        .unwrap()
    }

    fn grn_line(item: ItemId, qty: Decimal) -> GrnLine {
        GrnLine::new(item, "Bolts", qty, Money::new(dec!(2.50), Currency::USD))
    }

    #[test]
    fn test_receipt_accumulates_to_ordered() {
        let item = ItemId::new();
        let mut po = order(item, dec!(100));

        po.apply_receipt(&[grn_line(item, dec!(60))]).unwrap();
        assert_eq!(po.fulfillment_status(), FulfillmentStatus::PartiallyReceived);

        let err = po.apply_receipt(&[grn_line(item, dec!(50))]).unwrap_err();
        assert!(matches!(
            err,
            PurchaseError::OverReceipt { already_received, attempted, .. }
                if already_received == dec!(60) && attempted == dec!(50)
        ));
        assert_eq!(po.lines[0].received_quantity, dec!(60));

        po.apply_receipt(&[grn_line(item, dec!(40))]).unwrap();
        assert_eq!(po.lines[0].received_quantity, dec!(100));
        assert_eq!(po.fulfillment_status(), FulfillmentStatus::FullyReceived);
    }

    #[test]
    fn test_split_lines_count_together() {
        let item = ItemId::new();
        let mut po = order(item, dec!(10));
        let result = po.apply_receipt(&[grn_line(item, dec!(6)), grn_line(item, dec!(5))]);
        assert!(matches!(result, Err(PurchaseError::OverReceipt { .. })));
        assert_eq!(po.lines[0].received_quantity, dec!(0));
    }

    #[test]
    fn test_unknown_items_are_skipped() {
        let item = ItemId::new();
        let mut po = order(item, dec!(10));
        let applied = po.apply_receipt(&[grn_line(ItemId::new(), dec!(500))]).unwrap();
        assert!(applied.is_empty());
        assert_eq!(po.fulfillment_status(), FulfillmentStatus::NotReceived);
    }

    #[test]
    fn test_approve_and_close_are_one_way() {
        let mut po = order(ItemId::new(), dec!(1));
        po.approve().unwrap();
        assert!(matches!(po.approve(), Err(PurchaseError::AlreadyClosed(_))));

        po.close().unwrap();
        assert!(matches!(po.close(), Err(PurchaseError::AlreadyClosed(_))));
        assert!(matches!(po.apply_receipt(&[]), Err(PurchaseError::AlreadyClosed(_))));
    }

    #[test]
    fn test_huge_receipt_quantity_is_an_over_receipt() {
        let item = ItemId::new();
        let mut po = order(item, dec!(100));
        po.apply_receipt(&[grn_line(item, dec!(60))]).unwrap();

        let result = po.apply_receipt(&[grn_line(item, Decimal::MAX), grn_line(item, Decimal::MAX)]);
        assert!(matches!(result, Err(PurchaseError::OverReceipt { .. })));
        assert_eq!(po.lines[0].received_quantity, dec!(60));
    }

    #[test]
    fn test_unrepresentable_order_total_rejected() {
        let result = PurchaseOrder::create(NewPurchaseOrder {
            reference: "PO-BIG".to_string(),
            vendor_id: None,
            warehouse_id: WarehouseId::new(),
            currency: Currency::USD,
            order_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            lines: vec![PurchaseOrderLine::new(
                ItemId::new(),
                "Bolts",
                dec!(100000000000000000000),
                Money::new(dec!(10000000000), Currency::USD),
            )],
            notes: None,
        });
        assert!(matches!(result, Err(PurchaseError::Validation(_))));
    }

    #[test]
    fn test_duplicate_items_rejected() {
        let item = ItemId::new();
        let price = Money::new(dec!(1), Currency::USD);
        let result = PurchaseOrder::create(NewPurchaseOrder {
            reference: "PO-2".to_string(),
            vendor_id: None,
            warehouse_id: WarehouseId::new(),
            currency: Currency::USD,
            order_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            lines: vec![
                PurchaseOrderLine::new(item, "a", dec!(1), price),
                PurchaseOrderLine::new(item, "b", dec!(1), price),
            ],
            notes: None,
        });
        assert!(matches!(result, Err(PurchaseError::Validation(_))));
    }
}
