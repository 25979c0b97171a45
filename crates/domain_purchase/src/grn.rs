//! Goods received notes and the vendor payments they own

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{
    Currency, GrnId, GrnPaymentId, ItemId, Lifecycle, Money, MoneyError, PaymentMethod, PurchaseOrderId, SettlementMode,
    SettlementStatus, VendorId, Version, WarehouseId,
};

use crate::error::PurchaseError;

/// A received line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrnLine {
    pub item_id: ItemId,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Money,
}

impl GrnLine {
    pub fn new(item_id: ItemId, description: impl Into<String>, quantity: Decimal, unit_price: Money) -> Self {
        Self {
            item_id,
            description: description.into(),
            quantity,
            unit_price,
        }
    }

    pub fn line_total(&self) -> Money {
        let amount = self.unit_price.amount().saturating_mul(self.quantity);
        Money::new(amount, self.unit_price.currency()).round_to_currency()
    }
}

/// Sum of rounded `unit price × quantity` with overflow checks, capped at
/// [`core_kernel::MAX_AMOUNT`]
pub(crate) fn checked_lines_total(
    currency: Currency,
    lines: impl IntoIterator<Item = (Money, Decimal)>,
) -> Result<Money, MoneyError> {
    lines
        .into_iter()
        .try_fold(Money::zero(currency), |acc, (unit_price, quantity)| {
            acc.checked_add(&unit_price.multiply(quantity)?.round_to_currency())
        })?
        .within_limit()
}

/// A payment to the vendor against a GRN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrnPayment {
    pub id: GrnPaymentId,
    pub grn_id: GrnId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
    pub external_reference: Option<String>,
}

/// Input for recording a vendor payment
#[derive(Debug, Clone)]
pub struct NewGrnPayment {
    pub amount: Money,
    pub method: PaymentMethod,
    pub external_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl NewGrnPayment {
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

/// Input for creating a GRN
#[derive(Debug, Clone)]
pub struct NewGrn {
    pub reference: String,
    /// None for a standalone receipt
    pub purchase_order_id: Option<PurchaseOrderId>,
    pub vendor_id: Option<VendorId>,
    /// Defaults to the PO's warehouse; required for standalone receipts
    pub warehouse_id: Option<WarehouseId>,
    pub currency: Currency,
    pub grn_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub settlement: SettlementMode,
    pub lines: Vec<GrnLine>,
    pub notes: Option<String>,
}

/// Current vendor payment figures of a GRN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrnPaymentDetails {
    pub grn_id: GrnId,
    pub total: Money,
    /// What the vendor is owed through GRN payments; zero for cash on delivery
    pub payable: Money,
    pub paid_amount: Money,
    pub balance_due: Money,
    pub status: SettlementStatus,
    pub is_received: bool,
    pub payment_count: usize,
}

/// A goods received note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsReceivedNote {
    pub id: GrnId,
    pub reference: String,
    pub purchase_order_id: Option<PurchaseOrderId>,
    pub vendor_id: Option<VendorId>,
    pub warehouse_id: WarehouseId,
    pub currency: Currency,
    pub grn_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub settlement: SettlementMode,
    pub lines: Vec<GrnLine>,
    pub received_at: Option<DateTime<Utc>>,
    pub payments: Vec<GrnPayment>,
    pub notes: Option<String>,
    pub lifecycle: Lifecycle,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GoodsReceivedNote {
    /// Validates the lines and creates an unreceived GRN in `warehouse_id`
    pub fn create(input: NewGrn, warehouse_id: WarehouseId) -> Result<Self, PurchaseError> {
        let reference = input.reference.trim().to_string();
        if reference.is_empty() {
            return Err(PurchaseError::Validation("GRN reference is required".to_string()));
        }
        if input.lines.is_empty() {
            return Err(PurchaseError::Validation("GRN needs at least one line".to_string()));
        }
        for (i, line) in input.lines.iter().enumerate() {
            if line.quantity <= Decimal::ZERO {
                return Err(PurchaseError::Validation(format!(
                    "line {}: quantity must be greater than zero",
                    i + 1
                )));
            }
            if line.unit_price.currency() != input.currency {
                return Err(PurchaseError::Validation(format!(
                    "line {}: unit price is in {}, GRN is in {}",
                    i + 1,
                    line.unit_price.currency(),
                    input.currency
                )));
            }
            if line.unit_price.is_negative() {
                return Err(PurchaseError::Validation(format!("line {}: unit price cannot be negative", i + 1)));
            }
        }
        checked_lines_total(input.currency, input.lines.iter().map(|l| (l.unit_price, l.quantity))).map_err(|e| {
            PurchaseError::Validation(format!("GRN total cannot be represented: {}", e))
        })?;

        let now = Utc::now();
        Ok(Self {
            id: GrnId::new_v7(),
            reference,
            purchase_order_id: input.purchase_order_id,
            vendor_id: input.vendor_id,
            warehouse_id,
            currency: input.currency,
            grn_date: input.grn_date,
            due_date: input.due_date,
            settlement: input.settlement,
            lines: input.lines,
            received_at: None,
            payments: Vec::new(),
            notes: input.notes,
            lifecycle: Lifecycle::Active,
            version: Version::initial(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_received(&self) -> bool {
        self.received_at.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle.is_deleted()
    }

    /// sum(qty × unit price); bounded at creation, so the saturating sum is exact
    pub fn total(&self) -> Money {
        let amount = self
            .lines
            .iter()
            .fold(Decimal::ZERO, |acc, l| acc.saturating_add(l.line_total().amount()));
        Money::new(amount, self.currency)
    }

    /// Amount settled through GRN payments
    pub fn payable(&self) -> Money {
        match self.settlement {
            SettlementMode::OnAccount => self.total(),
            SettlementMode::CashOnDelivery => Money::zero(self.currency),
        }
    }

    pub fn paid_amount(&self) -> Money {
        let amount = self
            .payments
            .iter()
            .fold(Decimal::ZERO, |acc, p| acc.saturating_add(p.amount.amount()));
        Money::new(amount, self.currency)
    }

    pub fn balance_due(&self) -> Money {
        Money::new(self.payable().amount().saturating_sub(self.paid_amount().amount()), self.currency)
    }

    pub fn status(&self, today: NaiveDate) -> SettlementStatus {
        SettlementStatus::from_amounts(&self.paid_amount(), &self.payable()).with_due_date(self.due_date, today)
    }

    pub fn payment_details(&self, today: NaiveDate) -> GrnPaymentDetails {
        GrnPaymentDetails {
            grn_id: self.id,
            total: self.total(),
            payable: self.payable(),
            paid_amount: self.paid_amount(),
            balance_due: self.balance_due(),
            status: self.status(today),
            is_received: self.is_received(),
            payment_count: self.payments.len(),
        }
    }

    /// Refuses changes to a deleted GRN
    pub fn ensure_active(&self) -> Result<(), PurchaseError> {
        if self.is_deleted() {
            return Err(PurchaseError::AlreadyClosed(format!("GRN {} is deleted", self.reference)));
        }
        Ok(())
    }

    /// Marks the goods as received; quantities become immutable
    pub fn mark_received(&mut self, at: DateTime<Utc>) -> Result<(), PurchaseError> {
        self.ensure_active()?;
        if self.is_received() {
            return Err(PurchaseError::AlreadyClosed(format!("GRN {} is already received", self.reference)));
        }
        self.received_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Appends a vendor payment after checking receipt and balance due
    pub fn record_payment(&mut self, input: NewGrnPayment) -> Result<GrnPayment, PurchaseError> {
        self.ensure_active()?;
        if !self.is_received() {
            return Err(PurchaseError::NotReceived(self.reference.clone()));
        }
        if input.amount.currency() != self.currency {
            return Err(PurchaseError::Validation(format!(
                "payment is in {}, GRN is in {}",
                input.amount.currency(),
                self.currency
            )));
        }
        if !input.amount.is_positive() {
            return Err(PurchaseError::Validation("payment amount must be greater than zero".to_string()));
        }
        if !input.amount.is_minor_unit_exact() {
            return Err(PurchaseError::Validation(format!(
                "payment amount {} has more precision than {} allows",
                input.amount.amount(),
                self.currency
            )));
        }

        let balance_due = self.balance_due();
        if input.amount > balance_due {
            return Err(PurchaseError::Overpayment {
                balance_due,
                attempted: input.amount,
            });
        }

        let payment = GrnPayment {
            id: GrnPaymentId::new_v7(),
            grn_id: self.id,
            amount: input.amount,
            method: input.method,
            paid_at: input.paid_at.unwrap_or_else(Utc::now),
            external_reference: input.external_reference,
        };
        self.payments.push(payment.clone());
        self.updated_at = Utc::now();
        Ok(payment)
    }

    /// Soft delete; received GRNs stay
    pub fn delete(&mut self) -> Result<(), PurchaseError> {
        self.ensure_active()?;
        if self.is_received() {
            return Err(PurchaseError::AlreadyClosed(format!(
                "GRN {} is received and cannot be deleted",
                self.reference
            )));
        }
        let now = Utc::now();
        self.lifecycle.delete(now)?;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd(amount: Decimal) -> Money {
        Money::new(amount, Currency::USD)
    }

    fn grn(settlement: SettlementMode) -> GoodsReceivedNote {
        GoodsReceivedNote::create(
            NewGrn {
                reference: "GRN-1".to_string(),
                purchase_order_id: None,
                vendor_id: None,
                warehouse_id: None,
                currency: Currency::USD,
                grn_date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
                due_date: None,
                settlement,
                lines: vec![
                    GrnLine::new(ItemId::new(), "Paint", dec!(10), usd(dec!(50.00))),
                    GrnLine::new(ItemId::new(), "Brushes", dec!(25), usd(dec!(10.00))),
                ],
                notes: None,
            },
            WarehouseId::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_total_is_sum_of_lines() {
        assert_eq!(grn(SettlementMode::OnAccount).total().amount(), dec!(750.00));
    }

    #[test]
    fn test_unrepresentable_total_rejected() {
        let result = GoodsReceivedNote::create(
            NewGrn {
                reference: "GRN-BIG".to_string(),
                purchase_order_id: None,
                vendor_id: None,
                warehouse_id: None,
                currency: Currency::USD,
                grn_date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
                due_date: None,
                settlement: SettlementMode::OnAccount,
                lines: vec![GrnLine::new(
                    ItemId::new(),
                    "Paint",
                    dec!(100000000000000000000),
                    usd(dec!(10000000000)),
                )],
                notes: None,
            },
            WarehouseId::new(),
        );
        assert!(matches!(result, Err(PurchaseError::Validation(_))));
    }

    #[test]
    fn test_payment_requires_receipt() {
        let mut note = grn(SettlementMode::OnAccount);
        let result = note.record_payment(NewGrnPayment::new(usd(dec!(1)), PaymentMethod::BankTransfer));
        assert!(matches!(result, Err(PurchaseError::NotReceived(_))));

        note.mark_received(Utc::now()).unwrap();
        note.record_payment(NewGrnPayment::new(usd(dec!(750)), PaymentMethod::BankTransfer))
            .unwrap();
        assert_eq!(note.status(Utc::now().date_naive()), SettlementStatus::FullyPaid);
    }

    #[test]
    fn test_cash_on_delivery_has_nothing_payable() {
        let mut note = grn(SettlementMode::CashOnDelivery);
        note.mark_received(Utc::now()).unwrap();
        assert!(note.balance_due().is_zero());
        assert_eq!(note.status(Utc::now().date_naive()), SettlementStatus::FullyPaid);
        assert!(matches!(
            note.record_payment(NewGrnPayment::new(usd(dec!(0.01)), PaymentMethod::Cash)),
            Err(PurchaseError::Overpayment { .. })
        ));
    }

    #[test]
    fn test_received_grn_cannot_be_deleted() {
        let mut note = grn(SettlementMode::OnAccount);
        let mut unreceived = note.clone();
        note.mark_received(Utc::now()).unwrap();
        assert!(matches!(note.delete(), Err(PurchaseError::AlreadyClosed(_))));
        assert!(matches!(note.mark_received(Utc::now()), Err(PurchaseError::AlreadyClosed(_))));

        unreceived.delete().unwrap();
        assert!(matches!(unreceived.mark_received(Utc::now()), Err(PurchaseError::AlreadyClosed(_))));
    }
}
