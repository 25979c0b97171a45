//! Invoices and the customer payments they own
//!
//! Subtotal, total, paid amount, balance due and payment status are never
//! stored; they are recomputed from the lines, the tax and the payment list
//! every time they are read.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{
    BranchId, Currency, CustomerId, InvoiceId, ItemId, Lifecycle, Money, MoneyError, PaymentId, PaymentMethod,
    SettlementStatus, Version,
};

use crate::error::SalesError;

/// A line on an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub item_id: Option<ItemId>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Money,
}

impl InvoiceLine {
    /// Creates a line
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Money) -> Self {
        Self {
            item_id: None,
            description: description.into(),
            quantity,
            unit_price,
        }
    }

    /// Links the line to an inventory item
    pub fn with_item(mut self, item_id: ItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    /// Quantity × unit price, rounded to the currency's minor unit
    pub fn line_total(&self) -> Money {
        let amount = self.unit_price.amount().saturating_mul(self.quantity);
        Money::new(amount, self.unit_price.currency()).round_to_currency()
    }

    fn checked_line_total(&self) -> Result<Money, MoneyError> {
        Ok(self.unit_price.multiply(self.quantity)?.round_to_currency())
    }

    fn validate(&self, currency: Currency, index: usize) -> Result<(), SalesError> {
        if self.quantity <= Decimal::ZERO {
            return Err(SalesError::Validation(format!(
                "line {}: quantity must be greater than zero",
                index + 1
            )));
        }
        if self.unit_price.currency() != currency {
            return Err(SalesError::Validation(format!(
                "line {}: unit price is in {}, invoice is in {}",
                index + 1,
                self.unit_price.currency(),
                currency
            )));
        }
        if self.unit_price.is_negative() {
            return Err(SalesError::Validation(format!(
                "line {}: unit price cannot be negative",
                index + 1
            )));
        }
        Ok(())
    }
}

/// A payment recorded against an invoice; never removed once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
    /// Bank or gateway reference
    pub external_reference: Option<String>,
}

/// Input for recording a payment
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: Money,
    pub method: PaymentMethod,
    pub external_reference: Option<String>,
    /// Defaults to now
    pub paid_at: Option<DateTime<Utc>>,
}

impl NewPayment {
    pub fn new(amount: Money, method: PaymentMethod) -> Self {
        Self {
            amount,
            method,
            external_reference: None,
            paid_at: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_reference = Some(reference.into());
        self
    }
}

/// Input for creating an invoice
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub reference: String,
    pub invoice_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub customer_id: Option<CustomerId>,
    pub branch_id: Option<BranchId>,
    pub currency: Currency,
    pub lines: Vec<InvoiceLine>,
    pub tax: Money,
    pub notes: Option<String>,
}

/// Current payment figures of an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub invoice_id: InvoiceId,
    pub total: Money,
    pub paid_amount: Money,
    pub balance_due: Money,
    pub status: SettlementStatus,
    pub is_paid: bool,
    pub payment_count: usize,
}

/// A customer invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub reference: String,
    pub invoice_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub customer_id: Option<CustomerId>,
    pub branch_id: Option<BranchId>,
    pub currency: Currency,
    pub lines: Vec<InvoiceLine>,
    pub tax: Money,
    pub payments: Vec<Payment>,
    pub notes: Option<String>,
    pub lifecycle: Lifecycle,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Validates the input and creates an invoice with no payments
    pub fn create(input: NewInvoice) -> Result<Self, SalesError> {
        let reference = input.reference.trim().to_string();
        if reference.is_empty() {
            return Err(SalesError::Validation("invoice reference is required".to_string()));
        }
        if input.lines.is_empty() {
            return Err(SalesError::Validation("invoice needs at least one line".to_string()));
        }
        for (i, line) in input.lines.iter().enumerate() {
            line.validate(input.currency, i)?;
        }
        if input.tax.currency() != input.currency {
            return Err(SalesError::Validation(format!(
                "tax is in {}, invoice is in {}",
                input.tax.currency(),
                input.currency
            )));
        }
        if input.tax.is_negative() {
            return Err(SalesError::Validation("tax cannot be negative".to_string()));
        }
        if let Some(due) = input.due_date {
            if due < input.invoice_date {
                return Err(SalesError::Validation("due date is before the invoice date".to_string()));
            }
        }
        checked_total(&input.lines, &input.tax).map_err(|e| {
            SalesError::Validation(format!("invoice total cannot be represented: {}", e))
        })?;

        let now = Utc::now();
        Ok(Self {
            id: InvoiceId::new_v7(),
            reference,
            invoice_date: input.invoice_date,
            due_date: input.due_date,
            customer_id: input.customer_id,
            branch_id: input.branch_id,
            currency: input.currency,
            lines: input.lines,
            tax: input.tax.round_to_currency(),
            payments: Vec::new(),
            notes: input.notes,
            lifecycle: Lifecycle::Active,
            version: Version::initial(),
            created_at: now,
            updated_at: now,
        })
    }

    // `create` bounds the total by MAX_AMOUNT and payments never exceed it,
    // so the saturating sums below stay exact.

    /// Sum of line totals
    pub fn subtotal(&self) -> Money {
        let amount = self
            .lines
            .iter()
            .fold(Decimal::ZERO, |acc, l| acc.saturating_add(l.line_total().amount()));
        Money::new(amount, self.currency)
    }

    /// Subtotal plus tax
    pub fn total(&self) -> Money {
        Money::new(self.subtotal().amount().saturating_add(self.tax.amount()), self.currency)
    }

    /// Sum of recorded payments
    pub fn paid_amount(&self) -> Money {
        let amount = self
            .payments
            .iter()
            .fold(Decimal::ZERO, |acc, p| acc.saturating_add(p.amount.amount()));
        Money::new(amount, self.currency)
    }

    /// Total minus paid amount
    pub fn balance_due(&self) -> Money {
        Money::new(self.total().amount().saturating_sub(self.paid_amount().amount()), self.currency)
    }

    pub fn is_paid(&self) -> bool {
        self.balance_due().amount() <= Decimal::ZERO
    }

    /// Payment status as of `today`
    pub fn status(&self, today: NaiveDate) -> SettlementStatus {
        SettlementStatus::from_amounts(&self.paid_amount(), &self.total()).with_due_date(self.due_date, today)
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle.is_deleted()
    }

    /// Current payment figures
    pub fn payment_details(&self, today: NaiveDate) -> PaymentDetails {
        PaymentDetails {
            invoice_id: self.id,
            total: self.total(),
            paid_amount: self.paid_amount(),
            balance_due: self.balance_due(),
            status: self.status(today),
            is_paid: self.is_paid(),
            payment_count: self.payments.len(),
        }
    }

    /// Appends a payment after checking it against the balance due
    ///
    /// An amount above the balance due is rejected; it is never clamped.
    pub fn record_payment(&mut self, input: NewPayment) -> Result<Payment, SalesError> {
        if self.is_deleted() {
            return Err(SalesError::AlreadyClosed(format!("invoice {} is deleted", self.reference)));
        }
        if input.amount.currency() != self.currency {
            return Err(SalesError::Validation(format!(
                "payment is in {}, invoice is in {}",
                input.amount.currency(),
                self.currency
            )));
        }
        if !input.amount.is_positive() {
            return Err(SalesError::Validation("payment amount must be greater than zero".to_string()));
        }
        if !input.amount.is_minor_unit_exact() {
            return Err(SalesError::Validation(format!(
                "payment amount {} has more precision than {} allows",
                input.amount.amount(),
                self.currency
            )));
        }

        let balance_due = self.balance_due();
        if input.amount > balance_due {
            return Err(SalesError::Overpayment {
                balance_due,
                attempted: input.amount,
            });
        }

        let payment = Payment {
            id: PaymentId::new_v7(),
            invoice_id: self.id,
            amount: input.amount,
            method: input.method,
            paid_at: input.paid_at.unwrap_or_else(Utc::now),
            external_reference: input.external_reference,
        };
        self.payments.push(payment.clone());
        self.updated_at = Utc::now();
        Ok(payment)
    }

    /// Soft delete; only while nothing has been paid
    pub fn delete(&mut self) -> Result<(), SalesError> {
        if self.is_deleted() {
            return Err(SalesError::AlreadyClosed(format!("invoice {} is already deleted", self.reference)));
        }
        if self.paid_amount().is_positive() {
            return Err(SalesError::AlreadyClosed(format!(
                "invoice {} has payments of {}",
                self.reference,
                self.paid_amount()
            )));
        }
        let now = Utc::now();
        self.lifecycle.delete(now)?;
        self.updated_at = now;
        Ok(())
    }
}

/// Lines plus tax with overflow checks, capped at [`core_kernel::MAX_AMOUNT`]
fn checked_total(lines: &[InvoiceLine], tax: &Money) -> Result<Money, MoneyError> {
    lines
        .iter()
        .try_fold(tax.round_to_currency(), |acc, line| acc.checked_add(&line.checked_line_total()?))?
        .within_limit()
}
