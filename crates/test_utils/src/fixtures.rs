//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data and a fully wired in-memory back office.
//! Fixtures are deterministic so that assertions can name exact figures.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use core_kernel::{Currency, ItemId, Money, VendorId, WarehouseId};
use domain_ledger::{
    InMemoryCategoryRepository, InMemoryLedger, InMemoryPendingPostingStore, InMemoryTransactionRepository,
    LedgerError, PostingAccounts, TransactionPoster,
};
use domain_purchase::{GrnPaymentTracker, InMemoryPurchaseRepository, PurchaseFulfillmentTracker};
use domain_sales::{InMemoryInvoiceRepository, InvoicePaymentTracker};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// USD amount
    pub fn usd(amount: Decimal) -> Money {
        Money::new(amount, Currency::USD)
    }

    /// The 500.00 invoice of the payment walkthrough
    pub fn usd_500() -> Money {
        Self::usd(dec!(500.00))
    }

    /// The 750.00 GRN of the vendor payment walkthrough
    pub fn usd_750() -> Money {
        Self::usd(dec!(750.00))
    }

    pub fn usd_zero() -> Money {
        Money::zero(Currency::USD)
    }

    /// Creates a EUR amount for currency mismatch tests
    pub fn eur_100() -> Money {
        Money::new(dec!(100.00), Currency::EUR)
    }
}

/// Fixture for dates
pub struct DateFixtures;

impl DateFixtures {
    /// Standard document date (Mar 1, 2024)
    pub fn document_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    /// Thirty days after the document date
    pub fn due_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
    }

    /// A day after the due date
    pub fn past_due() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    /// Payment timestamp within the document month
    pub fn paid_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap()
    }
}

/// Fixture for identifier test data
pub struct IdFixtures;

impl IdFixtures {
    pub fn item_id() -> ItemId {
        ItemId::from_uuid(Uuid::parse_str("7d1c2a6e-0b7f-4c6e-9f3a-1a2b3c4d5e01").unwrap())
    }

    /// A second item for multi-line documents
    pub fn other_item_id() -> ItemId {
        ItemId::from_uuid(Uuid::parse_str("7d1c2a6e-0b7f-4c6e-9f3a-1a2b3c4d5e02").unwrap())
    }

    pub fn warehouse_id() -> WarehouseId {
        WarehouseId::from_uuid(Uuid::parse_str("7d1c2a6e-0b7f-4c6e-9f3a-1a2b3c4d5e03").unwrap())
    }

    pub fn vendor_id() -> VendorId {
        VendorId::from_uuid(Uuid::parse_str("7d1c2a6e-0b7f-4c6e-9f3a-1a2b3c4d5e04").unwrap())
    }
}

/// Document references in the formats used across the tests
pub struct ReferenceFixtures;

impl ReferenceFixtures {
    /// A unique invoice number
    pub fn invoice() -> String {
        format!("INV-{}", &Uuid::new_v4().simple().to_string()[..8])
    }

    /// A unique purchase order number
    pub fn purchase_order() -> String {
        format!("PO-{}", &Uuid::new_v4().simple().to_string()[..8])
    }

    /// A unique GRN number
    pub fn grn() -> String {
        format!("GRN-{}", &Uuid::new_v4().simple().to_string()[..8])
    }
}

/// Every tracker wired over in-memory ports and a USD standard chart
///
/// The concrete adapters are kept alongside the trackers so tests can
/// inspect storage directly.
pub struct InMemoryBackoffice {
    pub ledger: Arc<InMemoryLedger>,
    pub accounts: PostingAccounts,
    pub poster: Arc<TransactionPoster>,
    pub pending: Arc<InMemoryPendingPostingStore>,
    pub invoices: Arc<InvoicePaymentTracker>,
    pub invoice_store: Arc<InMemoryInvoiceRepository>,
    pub fulfillment: Arc<PurchaseFulfillmentTracker>,
    pub grn_payments: Arc<GrnPaymentTracker>,
    pub purchases: Arc<InMemoryPurchaseRepository>,
}

impl InMemoryBackoffice {
    pub async fn new() -> Result<Self, LedgerError> {
        let ledger = Arc::new(InMemoryLedger::with_standard_chart(Currency::USD));
        let accounts = PostingAccounts::resolve(ledger.as_ref()).await?;
        let pending = Arc::new(InMemoryPendingPostingStore::new());
        let poster = Arc::new(TransactionPoster::new(
            ledger.clone(),
            Arc::new(InMemoryTransactionRepository::new()),
            Arc::new(InMemoryCategoryRepository::new()),
            pending.clone(),
            accounts,
        ));

        let invoice_store = Arc::new(InMemoryInvoiceRepository::new());
        let purchases = Arc::new(InMemoryPurchaseRepository::new());

        Ok(Self {
            invoices: Arc::new(InvoicePaymentTracker::new(invoice_store.clone(), poster.clone())),
            fulfillment: Arc::new(PurchaseFulfillmentTracker::new(purchases.clone(), poster.clone())),
            grn_payments: Arc::new(GrnPaymentTracker::new(purchases.clone(), poster.clone())),
            ledger,
            accounts,
            poster,
            pending,
            invoice_store,
            purchases,
        })
    }
}
