//! Purchasing domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{ConflictAware, CoreError, ErrorKind, ItemId, Money, MoneyError, PortError};
use domain_ledger::LedgerError;

/// Errors that can occur in the purchasing domain
#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("Purchase order not found: {0}")]
    PurchaseOrderNotFound(String),

    #[error("Goods received note not found: {0}")]
    GrnNotFound(String),

    /// Document reference already used
    #[error("Reference already exists: {0}")]
    DuplicateReference(String),

    /// Receipt would push a PO line past its ordered quantity; nothing was applied
    #[error("Over-receipt of {item_id}: ordered {ordered}, already received {already_received}, attempted {attempted}")]
    OverReceipt {
        item_id: ItemId,
        ordered: Decimal,
        already_received: Decimal,
        attempted: Decimal,
    },

    /// Payment exceeds what is still owed; nothing was recorded
    #[error("Payment of {attempted} exceeds balance due of {balance_due}")]
    Overpayment { balance_due: Money, attempted: Money },

    /// Vendor payment against goods not yet received
    #[error("Goods received note {0} has not been received")]
    NotReceived(String),

    /// Closed PO, received GRN, deleted document
    #[error("Already closed: {0}")]
    AlreadyClosed(String),

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

impl PurchaseError {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PurchaseError::PurchaseOrderNotFound(_) | PurchaseError::GrnNotFound(_) => ErrorKind::NotFound,
            PurchaseError::OverReceipt { .. } => ErrorKind::OverReceipt,
            PurchaseError::Overpayment { .. } => ErrorKind::Overpayment,
            PurchaseError::NotReceived(_) | PurchaseError::AlreadyClosed(_) => ErrorKind::AlreadyClosed,
            PurchaseError::DuplicateReference(_) | PurchaseError::Validation(_) | PurchaseError::Money(_) => {
                ErrorKind::Validation
            }
            PurchaseError::Core(e) => e.kind(),
            PurchaseError::Ledger(e) => e.kind(),
            PurchaseError::Port(e) => e.kind(),
        }
    }
}

impl ConflictAware for PurchaseError {
    fn is_conflict(&self) -> bool {
        matches!(self, PurchaseError::Port(e) if e.is_conflict())
    }
}
