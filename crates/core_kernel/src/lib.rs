//! Core Kernel - Foundational types shared by the back-office domains
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Money types with precise decimal arithmetic
//! - Strongly-typed identifiers
//! - Lifecycle tags and version tokens for optimistic concurrency
//! - Settlement status shared by payable and receivable documents
//! - Port infrastructure and a bounded conflict retry helper

pub mod money;
pub mod identifiers;
pub mod lifecycle;
pub mod settlement;
pub mod ports;
pub mod retry;
pub mod error;

pub use money::{Money, Currency, MoneyError, MAX_AMOUNT};
pub use identifiers::{
    AccountId, EntryId, PostingBatchId, TransactionId, CategoryId,
    InvoiceId, PaymentId, CustomerId, BranchId,
    PurchaseOrderId, GrnId, GrnPaymentId, VendorId, WarehouseId, ItemId, StockTransactionId,
};
pub use lifecycle::{Lifecycle, Version};
pub use settlement::{SettlementStatus, SettlementMode, PaymentMethod};
pub use ports::{PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
pub use retry::{retry_on_conflict, ConflictAware, RetryPolicy};
pub use error::{CoreError, ErrorKind};
