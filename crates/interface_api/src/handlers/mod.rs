//! Request handlers

pub mod health;
pub mod invoices;
pub mod purchase_orders;
pub mod grns;
pub mod transactions;
pub mod ledger;

use chrono::{NaiveDate, Utc};

/// Date the overdue overlay is evaluated against
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}
