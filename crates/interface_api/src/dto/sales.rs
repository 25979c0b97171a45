//! Invoice DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{BranchId, Currency, CustomerId, ItemId, Money, PaymentMethod, SettlementStatus};
use domain_sales::{Invoice, InvoiceLine, NewInvoice, NewPayment, Payment, PaymentDetails};

use super::{currency_or, non_negative, positive};
use crate::error::ApiError;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    #[validate(length(min = 1, max = 64, message = "Reference must be 1-64 characters"))]
    pub reference: String,
    pub invoice_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub customer_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    /// Defaults to the ledger currency
    pub currency: Option<String>,
    #[validate(length(min = 1, message = "At least one line is required"), nested)]
    pub lines: Vec<InvoiceLineRequest>,
    #[serde(default)]
    #[validate(custom(function = "non_negative"))]
    pub tax: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct InvoiceLineRequest {
    pub item_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[validate(custom(function = "positive"))]
    pub quantity: Decimal,
    #[validate(custom(function = "non_negative"))]
    pub unit_price: Decimal,
}

impl CreateInvoiceRequest {
    pub fn into_new_invoice(self, ledger_currency: Currency) -> Result<NewInvoice, ApiError> {
        let currency = currency_or(self.currency.as_deref(), ledger_currency)?;
        let lines = self
            .lines
            .into_iter()
            .map(|line| {
                let invoice_line = InvoiceLine::new(line.description, line.quantity, Money::new(line.unit_price, currency));
                match line.item_id {
                    Some(item_id) => invoice_line.with_item(ItemId::from_uuid(item_id)),
                    None => invoice_line,
                }
            })
            .collect();

        Ok(NewInvoice {
            reference: self.reference,
            invoice_date: self.invoice_date,
            due_date: self.due_date,
            customer_id: self.customer_id.map(CustomerId::from_uuid),
            branch_id: self.branch_id.map(BranchId::from_uuid),
            currency,
            lines,
            tax: Money::new(self.tax, currency),
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(custom(function = "positive"))]
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[validate(length(max = 128))]
    pub reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl RecordPaymentRequest {
    pub fn into_new_payment(self, currency: Currency) -> NewPayment {
        let mut payment = NewPayment::new(Money::new(self.amount, currency), self.method);
        payment.external_reference = self.reference;
        payment.paid_at = self.paid_at;
        payment
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceLineResponse {
    pub item_id: Option<Uuid>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub reference: String,
    pub invoice_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub customer_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub currency: Currency,
    pub lines: Vec<InvoiceLineResponse>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub balance_due: Decimal,
    pub status: SettlementStatus,
    pub is_paid: bool,
    pub deleted: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl InvoiceResponse {
    pub fn from_invoice(invoice: &Invoice, today: NaiveDate) -> Self {
        Self {
            id: invoice.id.into(),
            reference: invoice.reference.clone(),
            invoice_date: invoice.invoice_date,
            due_date: invoice.due_date,
            customer_id: invoice.customer_id.map(Into::into),
            branch_id: invoice.branch_id.map(Into::into),
            currency: invoice.currency,
            lines: invoice
                .lines
                .iter()
                .map(|line| InvoiceLineResponse {
                    item_id: line.item_id.map(Into::into),
                    description: line.description.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price.amount(),
                    line_total: line.line_total().amount(),
                })
                .collect(),
            subtotal: invoice.subtotal().amount(),
            tax: invoice.tax.amount(),
            total: invoice.total().amount(),
            paid_amount: invoice.paid_amount().amount(),
            balance_due: invoice.balance_due().amount(),
            status: invoice.status(today),
            is_paid: invoice.is_paid(),
            deleted: invoice.is_deleted(),
            version: invoice.version.value(),
            created_at: invoice.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
    pub reference: Option<String>,
}

impl From<&Payment> for PaymentResponse {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id.into(),
            invoice_id: payment.invoice_id.into(),
            amount: payment.amount.amount(),
            currency: payment.amount.currency(),
            method: payment.method,
            paid_at: payment.paid_at,
            reference: payment.external_reference.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentDetailsResponse {
    pub invoice_id: Uuid,
    pub currency: Currency,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub balance_due: Decimal,
    pub status: SettlementStatus,
    pub is_paid: bool,
    pub payment_count: usize,
}

impl From<&PaymentDetails> for PaymentDetailsResponse {
    fn from(details: &PaymentDetails) -> Self {
        Self {
            invoice_id: details.invoice_id.into(),
            currency: details.total.currency(),
            total: details.total.amount(),
            paid_amount: details.paid_amount.amount(),
            balance_due: details.balance_due.amount(),
            status: details.status,
            is_paid: details.is_paid,
            payment_count: details.payment_count,
        }
    }
}

impl PaymentDetailsResponse {
    /// Figures attached to a rejected payment
    pub fn figures(&self) -> Value {
        json!({
            "total": self.total,
            "paid_amount": self.paid_amount,
            "balance_due": self.balance_due,
            "status": self.status,
            "currency": self.currency,
        })
    }
}

/// Payment history with current figures
#[derive(Debug, Serialize)]
pub struct PaymentHistoryResponse {
    #[serde(flatten)]
    pub details: PaymentDetailsResponse,
    pub payments: Vec<PaymentResponse>,
}
