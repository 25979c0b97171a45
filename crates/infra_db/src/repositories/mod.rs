//! Table-level database access
//!
//! Functions here take a `PgConnection` and leave the transaction boundary
//! to the adapters. Queries are built at runtime so the crate compiles
//! without a live database.

pub mod document;
pub mod ledger;

pub use document::DocumentTable;
