//! Ledger Domain - Double-Entry General Ledger
//!
//! This crate implements the posting side of the back office: a strict
//! double-entry ledger, the per-account balance index derived from it, and the
//! poster that turns business events into balanced postings.
//!
//! # Double-Entry Accounting Principles
//!
//! Every posting batch creates balanced debits and credits:
//! - Debits increase asset/expense accounts
//! - Credits increase liability/equity/revenue accounts
//! - The sum of all debits must equal the sum of all credits, exactly
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_ledger::{MoneyLedger, PostingBatch, SourceType};
//!
//! let mut ledger = MoneyLedger::with_standard_chart(Currency::USD);
//!
//! let batch = PostingBatch::new("Cash sale", SourceType::Manual, "REF-1")
//!     .debit(cash_account, amount)
//!     .credit(sales_revenue, amount);
//!
//! let receipt = ledger.post(batch)?;
//! ```

pub mod account;
pub mod entry;
pub mod balance;
pub mod ledger;
pub mod transaction;
pub mod ports;
pub mod poster;
pub mod error;

pub use account::{Account, AccountType, AccountCategory, StandardChartOfAccounts};
pub use entry::{
    GeneralLedgerEntry, EntryStatus, SourceType, PostingType, PostingLine, PostingBatch, PostingReceipt,
};
pub use balance::AccountBalanceIndex;
pub use ledger::{MoneyLedger, TrialBalance, TrialBalanceLine};
pub use transaction::{Transaction, TransactionKind, TransactionStatus, Category, NewTransaction};
pub use ports::{
    LedgerPort, TransactionRepository, CategoryRepository, PendingPostingStore, PendingPosting, PendingAction,
    InMemoryLedger, InMemoryTransactionRepository, InMemoryCategoryRepository, InMemoryPendingPostingStore,
};
pub use poster::{
    TransactionPoster, PostingAccounts, BusinessEvent, PostedEvent, LedgerOutcome, RetryReport, Committed,
};
pub use error::LedgerError;
