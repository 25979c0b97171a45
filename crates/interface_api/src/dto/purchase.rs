//! Purchase order and GRN DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{
    Currency, ItemId, Money, PaymentMethod, PurchaseOrderId, SettlementMode, SettlementStatus, VendorId,
    WarehouseId,
};
use domain_purchase::{
    AppliedReceipt, FulfillmentStatus, GoodsReceivedNote, GrnLine, GrnPayment, GrnPaymentDetails, GrnReceipt,
    NewGrn, NewGrnPayment, NewPurchaseOrder, PurchaseOrder, PurchaseOrderLine, StockTransaction,
};

use super::{currency_or, non_negative, positive};
use crate::error::ApiError;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePurchaseOrderRequest {
    #[validate(length(min = 1, max = 64, message = "Reference must be 1-64 characters"))]
    pub reference: String,
    pub vendor_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub currency: Option<String>,
    pub order_date: NaiveDate,
    #[validate(length(min = 1, message = "At least one line is required"), nested)]
    pub lines: Vec<PurchaseLineRequest>,
    pub notes: Option<String>,
}

/// Line shared by purchase order and GRN requests
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct PurchaseLineRequest {
    pub item_id: Uuid,
    #[serde(default)]
    pub description: String,
    #[validate(custom(function = "positive"))]
    pub quantity: Decimal,
    #[validate(custom(function = "non_negative"))]
    pub unit_price: Decimal,
}

impl CreatePurchaseOrderRequest {
    pub fn into_new_order(self, ledger_currency: Currency) -> Result<NewPurchaseOrder, ApiError> {
        let currency = currency_or(self.currency.as_deref(), ledger_currency)?;
        Ok(NewPurchaseOrder {
            reference: self.reference,
            vendor_id: self.vendor_id.map(VendorId::from_uuid),
            warehouse_id: WarehouseId::from_uuid(self.warehouse_id),
            currency,
            order_date: self.order_date,
            lines: self
                .lines
                .into_iter()
                .map(|line| {
                    PurchaseOrderLine::new(
                        ItemId::from_uuid(line.item_id),
                        line.description,
                        line.quantity,
                        Money::new(line.unit_price, currency),
                    )
                })
                .collect(),
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGrnRequest {
    #[validate(length(min = 1, max = 64, message = "Reference must be 1-64 characters"))]
    pub reference: String,
    /// Omitted for a standalone receipt
    pub purchase_order_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub currency: Option<String>,
    pub grn_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub settlement: SettlementMode,
    #[validate(length(min = 1, message = "At least one line is required"), nested)]
    pub lines: Vec<PurchaseLineRequest>,
    pub notes: Option<String>,
}

impl CreateGrnRequest {
    pub fn into_new_grn(self, ledger_currency: Currency) -> Result<NewGrn, ApiError> {
        let currency = currency_or(self.currency.as_deref(), ledger_currency)?;
        Ok(NewGrn {
            reference: self.reference,
            purchase_order_id: self.purchase_order_id.map(PurchaseOrderId::from_uuid),
            vendor_id: self.vendor_id.map(VendorId::from_uuid),
            warehouse_id: self.warehouse_id.map(WarehouseId::from_uuid),
            currency,
            grn_date: self.grn_date,
            due_date: self.due_date,
            settlement: self.settlement,
            lines: self
                .lines
                .into_iter()
                .map(|line| {
                    GrnLine::new(
                        ItemId::from_uuid(line.item_id),
                        line.description,
                        line.quantity,
                        Money::new(line.unit_price, currency),
                    )
                })
                .collect(),
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordGrnPaymentRequest {
    #[validate(custom(function = "positive"))]
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[validate(length(max = 128))]
    pub reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl RecordGrnPaymentRequest {
    pub fn into_new_payment(self, currency: Currency) -> NewGrnPayment {
        let mut payment = NewGrnPayment::new(Money::new(self.amount, currency), self.method);
        payment.external_reference = self.reference;
        payment.paid_at = self.paid_at;
        payment
    }
}

#[derive(Debug, Serialize)]
pub struct PurchaseOrderLineResponse {
    pub item_id: Uuid,
    pub description: String,
    pub quantity_ordered: Decimal,
    pub received_quantity: Decimal,
    pub remaining: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PurchaseOrderResponse {
    pub id: Uuid,
    pub reference: String,
    pub vendor_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub currency: Currency,
    pub order_date: NaiveDate,
    pub lines: Vec<PurchaseOrderLineResponse>,
    pub total: Decimal,
    pub fulfillment_status: FulfillmentStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl From<&PurchaseOrder> for PurchaseOrderResponse {
    fn from(order: &PurchaseOrder) -> Self {
        Self {
            id: order.id.into(),
            reference: order.reference.clone(),
            vendor_id: order.vendor_id.map(Into::into),
            warehouse_id: order.warehouse_id.into(),
            currency: order.currency,
            order_date: order.order_date,
            lines: order
                .lines
                .iter()
                .map(|line| PurchaseOrderLineResponse {
                    item_id: line.item_id.into(),
                    description: line.description.clone(),
                    quantity_ordered: line.quantity_ordered,
                    received_quantity: line.received_quantity,
                    remaining: line.remaining(),
                    unit_price: line.unit_price.amount(),
                    line_total: line.line_total().amount(),
                })
                .collect(),
            total: order.total().amount(),
            fulfillment_status: order.fulfillment_status(),
            approved_at: order.approved_at,
            closed_at: order.closed_at,
            version: order.version.value(),
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GrnLineResponse {
    pub item_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct GrnResponse {
    pub id: Uuid,
    pub reference: String,
    pub purchase_order_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub currency: Currency,
    pub grn_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub settlement: SettlementMode,
    pub lines: Vec<GrnLineResponse>,
    pub total: Decimal,
    pub payable: Decimal,
    pub paid_amount: Decimal,
    pub balance_due: Decimal,
    pub status: SettlementStatus,
    pub is_received: bool,
    pub received_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl GrnResponse {
    pub fn from_grn(grn: &GoodsReceivedNote, today: NaiveDate) -> Self {
        Self {
            id: grn.id.into(),
            reference: grn.reference.clone(),
            purchase_order_id: grn.purchase_order_id.map(Into::into),
            vendor_id: grn.vendor_id.map(Into::into),
            warehouse_id: grn.warehouse_id.into(),
            currency: grn.currency,
            grn_date: grn.grn_date,
            due_date: grn.due_date,
            settlement: grn.settlement,
            lines: grn
                .lines
                .iter()
                .map(|line| GrnLineResponse {
                    item_id: line.item_id.into(),
                    description: line.description.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price.amount(),
                    line_total: line.line_total().amount(),
                })
                .collect(),
            total: grn.total().amount(),
            payable: grn.payable().amount(),
            paid_amount: grn.paid_amount().amount(),
            balance_due: grn.balance_due().amount(),
            status: grn.status(today),
            is_received: grn.is_received(),
            received_at: grn.received_at,
            version: grn.version.value(),
            created_at: grn.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GrnReceiptResponse {
    pub grn: GrnResponse,
    pub purchase_order: Option<PurchaseOrderResponse>,
    pub applied: Vec<AppliedReceipt>,
    pub stock: Vec<StockTransaction>,
    pub already_received: bool,
}

impl GrnReceiptResponse {
    pub fn from_receipt(receipt: &GrnReceipt, today: NaiveDate) -> Self {
        Self {
            grn: GrnResponse::from_grn(&receipt.grn, today),
            purchase_order: receipt.purchase_order.as_ref().map(PurchaseOrderResponse::from),
            applied: receipt.applied.clone(),
            stock: receipt.stock.clone(),
            already_received: receipt.already_received,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GrnPaymentResponse {
    pub id: Uuid,
    pub grn_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
    pub reference: Option<String>,
}

impl From<&GrnPayment> for GrnPaymentResponse {
    fn from(payment: &GrnPayment) -> Self {
        Self {
            id: payment.id.into(),
            grn_id: payment.grn_id.into(),
            amount: payment.amount.amount(),
            currency: payment.amount.currency(),
            method: payment.method,
            paid_at: payment.paid_at,
            reference: payment.external_reference.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GrnPaymentDetailsResponse {
    pub grn_id: Uuid,
    pub currency: Currency,
    pub total: Decimal,
    pub payable: Decimal,
    pub paid_amount: Decimal,
    pub balance_due: Decimal,
    pub status: SettlementStatus,
    pub is_received: bool,
    pub payment_count: usize,
}

impl From<&GrnPaymentDetails> for GrnPaymentDetailsResponse {
    fn from(details: &GrnPaymentDetails) -> Self {
        Self {
            grn_id: details.grn_id.into(),
            currency: details.total.currency(),
            total: details.total.amount(),
            payable: details.payable.amount(),
            paid_amount: details.paid_amount.amount(),
            balance_due: details.balance_due.amount(),
            status: details.status,
            is_received: details.is_received,
            payment_count: details.payment_count,
        }
    }
}

impl GrnPaymentDetailsResponse {
    /// Figures attached to a rejected payment
    pub fn figures(&self) -> Value {
        json!({
            "payable": self.payable,
            "paid_amount": self.paid_amount,
            "balance_due": self.balance_due,
            "status": self.status,
            "is_received": self.is_received,
            "currency": self.currency,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct GrnPaymentHistoryResponse {
    #[serde(flatten)]
    pub details: GrnPaymentDetailsResponse,
    pub payments: Vec<GrnPaymentResponse>,
}
