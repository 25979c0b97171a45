//! Sales domain errors

use thiserror::Error;

use core_kernel::{ConflictAware, CoreError, ErrorKind, Money, MoneyError, PortError};
use domain_ledger::LedgerError;

/// Errors that can occur in the sales domain
#[derive(Debug, Error)]
pub enum SalesError {
    /// Invoice not found (or deleted)
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    /// Invoice reference already used
    #[error("Invoice reference already exists: {0}")]
    DuplicateReference(String),

    /// Payment exceeds what is still owed; nothing was recorded
    #[error("Payment of {attempted} exceeds balance due of {balance_due}")]
    Overpayment { balance_due: Money, attempted: Money },

    /// Operation on a deleted or settled invoice
    #[error("Already closed: {0}")]
    AlreadyClosed(String),

    /// Invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Port(#[from] PortError),
}

impl SalesError {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SalesError::InvoiceNotFound(_) => ErrorKind::NotFound,
            SalesError::Overpayment { .. } => ErrorKind::Overpayment,
            SalesError::AlreadyClosed(_) => ErrorKind::AlreadyClosed,
            SalesError::DuplicateReference(_) | SalesError::Validation(_) | SalesError::Money(_) => {
                ErrorKind::Validation
            }
            SalesError::Core(e) => e.kind(),
            SalesError::Ledger(e) => e.kind(),
            SalesError::Port(e) => e.kind(),
        }
    }
}

impl ConflictAware for SalesError {
    fn is_conflict(&self) -> bool {
        matches!(self, SalesError::Port(e) if e.is_conflict())
    }
}
