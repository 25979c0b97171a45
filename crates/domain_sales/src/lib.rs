//! Sales Domain - Invoices and Customer Payments
//!
//! The [`InvoicePaymentTracker`] owns an invoice's payment collection. It
//! keeps `sum(payments) <= total` under concurrent writers and hands every
//! financial event to the ledger poster once the invoice is committed.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_sales::{InvoicePaymentTracker, NewPayment};
//!
//! let committed = tracker.record_payment(invoice_id, NewPayment::new(amount, PaymentMethod::Cash)).await?;
//! let details = tracker.get_payment_details(invoice_id).await?;
//! ```

pub mod invoice;
pub mod ports;
pub mod tracker;
pub mod error;

pub use invoice::{Invoice, InvoiceLine, NewInvoice, NewPayment, Payment, PaymentDetails};
pub use ports::{InvoiceRepository, InMemoryInvoiceRepository};
pub use tracker::InvoicePaymentTracker;
pub use error::SalesError;
