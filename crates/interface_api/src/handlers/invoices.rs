//! Invoice handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use core_kernel::InvoiceId;

use crate::dto::sales::*;
use crate::dto::{ReasonQuery, ValidatedJson, WithLedger};
use crate::handlers::today;
use crate::{error::ApiError, AppState};

/// Creates an invoice and posts it to receivables
pub async fn create_invoice(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<WithLedger<InvoiceResponse>>), ApiError> {
    let input = request.into_new_invoice(state.currency())?;
    let committed = state.invoices.create_invoice(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(WithLedger {
            document: InvoiceResponse::from_invoice(&committed.document, today()),
            ledger: committed.ledger,
        }),
    ))
}

/// Gets an invoice by ID
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let invoice = state.invoices.get_invoice(InvoiceId::from_uuid(id)).await?;
    Ok(Json(InvoiceResponse::from_invoice(&invoice, today())))
}

/// Soft-deletes an unpaid invoice
pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ReasonQuery>,
) -> Result<Json<WithLedger<InvoiceResponse>>, ApiError> {
    let reason = query.reason_or("Invoice deleted");
    let committed = state.invoices.delete_invoice(InvoiceId::from_uuid(id), &reason).await?;
    Ok(Json(WithLedger {
        document: InvoiceResponse::from_invoice(&committed.document, today()),
        ledger: committed.ledger,
    }))
}

/// Records a payment
///
/// A rejection carries the invoice's current figures in `state`.
pub async fn record_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<WithLedger<PaymentResponse>>), ApiError> {
    let id = InvoiceId::from_uuid(id);
    let payment = request.into_new_payment(state.currency());

    match state.invoices.record_payment(id, payment).await {
        Ok(committed) => Ok((
            StatusCode::CREATED,
            Json(WithLedger {
                document: PaymentResponse::from(&committed.document),
                ledger: committed.ledger,
            }),
        )),
        Err(e) => {
            let error = ApiError::from(e);
            match state.invoices.get_payment_details(id).await {
                Ok(details) => Err(error.with_state(PaymentDetailsResponse::from(&details).figures())),
                Err(_) => Err(error),
            }
        }
    }
}

/// Lists payments with the invoice's current figures
pub async fn list_payments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentHistoryResponse>, ApiError> {
    let id = InvoiceId::from_uuid(id);
    let details = state.invoices.get_payment_details(id).await?;
    let payments = state.invoices.list_payments(id).await?;
    Ok(Json(PaymentHistoryResponse {
        details: PaymentDetailsResponse::from(&details),
        payments: payments.iter().map(PaymentResponse::from).collect(),
    }))
}
