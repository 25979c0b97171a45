//! API error handling
//!
//! Every failure leaves the API as `{error, message, state}`. `error` is a
//! stable snake_case code, `state` carries the figures the caller needs to
//! decide what to do next (balance due, received quantities, batch totals)
//! and is `null` when there is nothing to report.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{error, warn};

use core_kernel::{ErrorKind, MoneyError};
use domain_ledger::LedgerError;
use domain_purchase::PurchaseError;
use domain_sales::SalesError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A business rule refused the operation
    #[error("{message}")]
    Rejected {
        kind: ErrorKind,
        message: String,
        state: Value,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub state: Value,
}

impl ApiError {
    /// Builds an error from a domain classification
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>, state: Value) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::NotFound => ApiError::NotFound(message),
            ErrorKind::Validation => ApiError::Validation(message),
            ErrorKind::Conflict => ApiError::Conflict(message),
            ErrorKind::Unavailable => ApiError::Unavailable(message),
            ErrorKind::Internal => ApiError::Internal(message),
            ErrorKind::Overpayment
            | ErrorKind::OverReceipt
            | ErrorKind::UnbalancedPosting
            | ErrorKind::AlreadyClosed => ApiError::Rejected { kind, message, state },
        }
    }

    /// Merges aggregate figures into the `state` of a rejected operation
    pub fn with_state(self, figures: Value) -> Self {
        match self {
            ApiError::Rejected { kind, message, state } => ApiError::Rejected {
                kind,
                message,
                state: merge(state, figures),
            },
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Rejected { kind, .. } => match kind {
                ErrorKind::AlreadyClosed => StatusCode::CONFLICT,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            },
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "validation_error",
            ApiError::Rejected { kind, .. } => match kind {
                ErrorKind::Overpayment => "overpayment",
                ErrorKind::OverReceipt => "over_receipt",
                ErrorKind::UnbalancedPosting => "unbalanced_posting",
                _ => "already_closed",
            },
            ApiError::Conflict(_) => "conflict",
            ApiError::Unavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

fn merge(state: Value, figures: Value) -> Value {
    match (state, figures) {
        (Value::Object(mut base), Value::Object(extra)) => {
            for (key, value) in extra {
                base.entry(key).or_insert(value);
            }
            Value::Object(base)
        }
        (Value::Null, figures) => figures,
        (state, _) => state,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let error = self.code().to_string();
        let (message, state) = match self {
            ApiError::Rejected { message, state, .. } => (message, state),
            other => (other.to_string(), Value::Null),
        };

        (status, Json(ErrorResponse { error, message, state })).into_response()
    }
}

impl From<SalesError> for ApiError {
    fn from(err: SalesError) -> Self {
        let state = match &err {
            SalesError::Overpayment { balance_due, attempted } => json!({
                "balance_due": balance_due.amount(),
                "attempted": attempted.amount(),
                "currency": balance_due.currency(),
            }),
            SalesError::Ledger(e) => ledger_state(e),
            _ => Value::Null,
        };
        if matches!(err, SalesError::Overpayment { .. }) {
            warn!(error = %err, "Invoice payment rejected");
        }
        ApiError::from_kind(err.kind(), err.to_string(), state)
    }
}

impl From<PurchaseError> for ApiError {
    fn from(err: PurchaseError) -> Self {
        let state = match &err {
            PurchaseError::Overpayment { balance_due, attempted } => json!({
                "balance_due": balance_due.amount(),
                "attempted": attempted.amount(),
                "currency": balance_due.currency(),
            }),
            PurchaseError::OverReceipt {
                item_id,
                ordered,
                already_received,
                attempted,
            } => json!({
                "item_id": item_id,
                "ordered": ordered,
                "already_received": already_received,
                "attempted": attempted,
            }),
            PurchaseError::NotReceived(_) => json!({ "is_received": false }),
            PurchaseError::Ledger(e) => ledger_state(e),
            _ => Value::Null,
        };
        ApiError::from_kind(err.kind(), err.to_string(), state)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let state = ledger_state(&err);
        ApiError::from_kind(err.kind(), err.to_string(), state)
    }
}

impl From<MoneyError> for ApiError {
    fn from(err: MoneyError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

fn ledger_state(err: &LedgerError) -> Value {
    match err {
        LedgerError::UnbalancedPosting { debits, credits } => {
            let mut state = Map::new();
            state.insert("debits".to_string(), json!(debits));
            state.insert("credits".to_string(), json!(credits));
            state.insert("difference".to_string(), json!(debits - credits));
            Value::Object(state)
        }
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Currency, Money, PortError};
    use rust_decimal_macros::dec;

    #[test]
    fn test_overpayment_carries_balance_due() {
        let err = ApiError::from(SalesError::Overpayment {
            balance_due: Money::new(dec!(200.00), Currency::USD),
            attempted: Money::new(dec!(250.00), Currency::USD),
        });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "overpayment");
        match err {
            ApiError::Rejected { state, .. } => {
                assert_eq!(state["balance_due"], json!(dec!(200.00)));
                assert_eq!(state["currency"], json!("USD"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_kind_to_status() {
        let closed = ApiError::from(PurchaseError::AlreadyClosed("PO-1 is closed".to_string()));
        assert_eq!(closed.status(), StatusCode::CONFLICT);
        assert_eq!(closed.code(), "already_closed");

        let missing = ApiError::from(LedgerError::AccountNotFound("x".to_string()));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let unavailable = ApiError::from(LedgerError::Port(PortError::connection("down")));
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_unbalanced_posting_state() {
        let err = ApiError::from(LedgerError::UnbalancedPosting {
            debits: dec!(1000.00),
            credits: dec!(900.00),
        });
        assert_eq!(err.code(), "unbalanced_posting");
        match err {
            ApiError::Rejected { state, .. } => assert_eq!(state["difference"], json!(dec!(100.00))),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_with_state_keeps_error_figures() {
        let err = ApiError::from(SalesError::Overpayment {
            balance_due: Money::new(dec!(0.00), Currency::USD),
            attempted: Money::new(dec!(0.01), Currency::USD),
        })
        .with_state(json!({ "balance_due": "stale", "status": "FullyPaid" }));
        match err {
            ApiError::Rejected { state, .. } => {
                assert_eq!(state["balance_due"], json!(dec!(0.00)));
                assert_eq!(state["status"], json!("FullyPaid"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_with_state_ignores_non_rejections() {
        let err = ApiError::NotFound("gone".to_string()).with_state(json!({ "a": 1 }));
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
