//! Test Data Builders
//!
//! Provides builder patterns for constructing domain inputs with sensible
//! defaults. Tests specify only the fields they care about.

use chrono::NaiveDate;
use core_kernel::{
    CategoryId, Currency, CustomerId, ItemId, Money, PaymentMethod, PurchaseOrderId, SettlementMode, VendorId,
    WarehouseId,
};
use domain_ledger::{NewTransaction, TransactionKind};
use domain_purchase::{GrnLine, NewGrn, NewPurchaseOrder, PurchaseOrderLine};
use domain_sales::{InvoiceLine, NewInvoice};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixtures::{DateFixtures, IdFixtures, ReferenceFixtures};

/// Builder for invoice input
pub struct InvoiceBuilder {
    reference: String,
    invoice_date: NaiveDate,
    due_date: Option<NaiveDate>,
    customer_id: Option<CustomerId>,
    currency: Currency,
    lines: Vec<InvoiceLine>,
    tax: Decimal,
}

impl Default for InvoiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceBuilder {
    /// A USD invoice with no lines and a fresh reference
    pub fn new() -> Self {
        Self {
            reference: ReferenceFixtures::invoice(),
            invoice_date: DateFixtures::document_date(),
            due_date: None,
            customer_id: None,
            currency: Currency::USD,
            lines: Vec::new(),
            tax: Decimal::ZERO,
        }
    }

    /// Sets the invoice number
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Adds a line priced in the invoice currency
    pub fn with_line(mut self, description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        self.lines
            .push(InvoiceLine::new(description, quantity, Money::new(unit_price, self.currency)));
        self
    }

    pub fn with_tax(mut self, tax: Decimal) -> Self {
        self.tax = tax;
        self
    }

    pub fn build(self) -> NewInvoice {
        NewInvoice {
            reference: self.reference,
            invoice_date: self.invoice_date,
            due_date: self.due_date,
            customer_id: self.customer_id,
            branch_id: None,
            currency: self.currency,
            lines: self.lines,
            tax: Money::new(self.tax, self.currency),
            notes: None,
        }
    }

    /// Shortcut for a single-line invoice totalling `total`
    pub fn for_total(total: Decimal) -> NewInvoice {
        Self::new().with_line("Services", dec!(1), total).build()
    }
}

/// Builder for purchase order input
pub struct PurchaseOrderBuilder {
    reference: String,
    vendor_id: Option<VendorId>,
    warehouse_id: WarehouseId,
    order_date: NaiveDate,
    lines: Vec<PurchaseOrderLine>,
}

impl Default for PurchaseOrderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PurchaseOrderBuilder {
    pub fn new() -> Self {
        Self {
            reference: ReferenceFixtures::purchase_order(),
            vendor_id: Some(IdFixtures::vendor_id()),
            warehouse_id: IdFixtures::warehouse_id(),
            order_date: DateFixtures::document_date(),
            lines: Vec::new(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn with_warehouse(mut self, warehouse_id: WarehouseId) -> Self {
        self.warehouse_id = warehouse_id;
        self
    }

    /// Adds an ordered line in USD
    pub fn with_line(mut self, item_id: ItemId, quantity: Decimal, unit_price: Decimal) -> Self {
        self.lines.push(PurchaseOrderLine::new(
            item_id,
            "Stock item",
            quantity,
            Money::new(unit_price, Currency::USD),
        ));
        self
    }

    pub fn build(self) -> NewPurchaseOrder {
        NewPurchaseOrder {
            reference: self.reference,
            vendor_id: self.vendor_id,
            warehouse_id: self.warehouse_id,
            currency: Currency::USD,
            order_date: self.order_date,
            lines: self.lines,
            notes: None,
        }
    }
}

/// Builder for GRN input
pub struct GrnBuilder {
    reference: String,
    purchase_order_id: Option<PurchaseOrderId>,
    warehouse_id: Option<WarehouseId>,
    grn_date: NaiveDate,
    due_date: Option<NaiveDate>,
    settlement: SettlementMode,
    lines: Vec<GrnLine>,
}

impl GrnBuilder {
    /// A GRN against `purchase_order_id`; the order's warehouse is used
    pub fn against(purchase_order_id: PurchaseOrderId) -> Self {
        Self {
            purchase_order_id: Some(purchase_order_id),
            warehouse_id: None,
            ..Self::standalone()
        }
    }

    /// A GRN with no purchase order, into the fixture warehouse
    pub fn standalone() -> Self {
        Self {
            reference: ReferenceFixtures::grn(),
            purchase_order_id: None,
            warehouse_id: Some(IdFixtures::warehouse_id()),
            grn_date: DateFixtures::document_date(),
            due_date: None,
            settlement: SettlementMode::OnAccount,
            lines: Vec::new(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn cash_on_delivery(mut self) -> Self {
        self.settlement = SettlementMode::CashOnDelivery;
        self
    }

    /// Adds a received line in USD
    pub fn with_line(mut self, item_id: ItemId, quantity: Decimal, unit_price: Decimal) -> Self {
        self.lines
            .push(GrnLine::new(item_id, "Stock item", quantity, Money::new(unit_price, Currency::USD)));
        self
    }

    pub fn build(self) -> NewGrn {
        NewGrn {
            reference: self.reference,
            purchase_order_id: self.purchase_order_id,
            vendor_id: Some(IdFixtures::vendor_id()),
            warehouse_id: self.warehouse_id,
            currency: Currency::USD,
            grn_date: self.grn_date,
            due_date: self.due_date,
            settlement: self.settlement,
            lines: self.lines,
            notes: None,
        }
    }
}

/// Builder for manual income/expense transactions
pub struct TransactionBuilder {
    kind: TransactionKind,
    category_id: CategoryId,
    amount: Decimal,
    transaction_date: NaiveDate,
    payment_method: PaymentMethod,
    description: String,
}

impl TransactionBuilder {
    pub fn expense(category_id: CategoryId, amount: Decimal) -> Self {
        Self {
            kind: TransactionKind::Expense,
            category_id,
            amount,
            transaction_date: DateFixtures::document_date(),
            payment_method: PaymentMethod::Cash,
            description: "Expense".to_string(),
        }
    }

    pub fn income(category_id: CategoryId, amount: Decimal) -> Self {
        Self {
            kind: TransactionKind::Income,
            description: "Income".to_string(),
            ..Self::expense(category_id, amount)
        }
    }

    pub fn paid_by(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn build(self) -> NewTransaction {
        NewTransaction {
            kind: self.kind,
            category_id: self.category_id,
            amount: Money::new(self.amount, Currency::USD),
            transaction_date: self.transaction_date,
            payment_method: self.payment_method,
            description: self.description,
        }
    }
}
