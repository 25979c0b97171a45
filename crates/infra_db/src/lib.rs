//! Infrastructure Database Layer
//!
//! PostgreSQL adapters for the back-office ports, built on SQLx.
//!
//! # Architecture
//!
//! - `repositories`: table-level queries taking a connection
//! - `adapters`: port implementations that own transaction boundaries
//!
//! # Storage model
//!
//! Ledger batches and entries are relational so balances are SQL sums.
//! Invoices, purchase orders, GRNs and transaction records are JSONB
//! documents with a `version` column; every write is a compare-and-swap on
//! that column.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/backoffice")).await?;
//! run_migrations(&pool).await?;
//! let ledger = PostgresLedgerAdapter::new(pool.clone(), Currency::USD);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use adapters::{
    PostgresLedgerAdapter, PostgresTransactionRepository, PostgresCategoryRepository, PostgresPendingPostingStore,
    PostgresInvoiceRepository, PostgresPurchaseRepository,
};
