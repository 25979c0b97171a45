//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! back-office test suite.
//!
//! # Modules
//!
//! - `fixtures`: Deterministic test data and an in-memory back office
//! - `builders`: Builder patterns for document inputs
//! - `database`: PostgreSQL container management
//! - `assertions`: Assertion helpers for reconciliation invariants
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
