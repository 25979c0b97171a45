//! Ledger domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{ConflictAware, CoreError, ErrorKind, MoneyError, PortError};

/// Errors that can occur in the ledger domain
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Account code already in use
    #[error("Account code already exists: {0}")]
    AccountCodeExists(String),

    /// Account was deactivated
    #[error("Account is inactive: {0}")]
    AccountInactive(String),

    /// Account code cannot change once postings reference the account
    #[error("Account {0} has postings; its code is immutable")]
    AccountHasPostings(String),

    /// Posting batch not found
    #[error("Posting batch not found: {0}")]
    BatchNotFound(String),

    /// Debits and credits differ
    #[error("Unbalanced posting: debits={debits}, credits={credits}")]
    UnbalancedPosting {
        debits: Decimal,
        credits: Decimal,
    },

    /// Malformed posting line or batch
    #[error("Invalid posting: {0}")]
    InvalidPosting(String),

    /// Operation on a closed record (reversed batch, posted transaction, ...)
    #[error("Already closed: {0}")]
    AlreadyClosed(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Category not found
    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    /// Category name already taken
    #[error("Category already exists: {0}")]
    CategoryExists(String),

    /// System categories are managed by the poster
    #[error("System category cannot be modified: {0}")]
    SystemCategory(String),

    /// Invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Port(#[from] PortError),
}

impl LedgerError {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AccountNotFound(_)
            | LedgerError::BatchNotFound(_)
            | LedgerError::TransactionNotFound(_)
            | LedgerError::CategoryNotFound(_) => ErrorKind::NotFound,
            LedgerError::UnbalancedPosting { .. } => ErrorKind::UnbalancedPosting,
            LedgerError::AlreadyClosed(_)
            | LedgerError::AccountInactive(_)
            | LedgerError::AccountHasPostings(_)
            | LedgerError::SystemCategory(_) => ErrorKind::AlreadyClosed,
            LedgerError::AccountCodeExists(_)
            | LedgerError::CategoryExists(_)
            | LedgerError::InvalidPosting(_)
            | LedgerError::Validation(_)
            | LedgerError::Money(_) => ErrorKind::Validation,
            LedgerError::Core(e) => e.kind(),
            LedgerError::Port(e) => e.kind(),
        }
    }

    /// Returns true if the ledger could not be reached and the call may succeed later
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Port(e) if e.is_transient())
    }
}

impl ConflictAware for LedgerError {
    fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Port(e) if e.is_conflict())
    }
}
