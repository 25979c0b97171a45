//! Domain Adapters
//!
//! PostgreSQL implementations of the domain ports. Each adapter:
//! - Implements one port trait from a domain crate
//! - Translates between domain aggregates and rows or JSONB documents
//! - Maps `DatabaseError` to `PortError` at the boundary
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresInvoiceRepository;
//! use domain_sales::InvoicePaymentTracker;
//!
//! let invoices = Arc::new(PostgresInvoiceRepository::new(pool.clone()));
//! let tracker = InvoicePaymentTracker::new(invoices, poster);
//! ```

pub mod ledger;
pub mod records;
pub mod sales;
pub mod purchase;

pub use ledger::PostgresLedgerAdapter;
pub use records::{PostgresCategoryRepository, PostgresPendingPostingStore, PostgresTransactionRepository};
pub use sales::PostgresInvoiceRepository;
pub use purchase::PostgresPurchaseRepository;
