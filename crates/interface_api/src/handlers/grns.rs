//! GRN handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use core_kernel::GrnId;

use crate::dto::purchase::*;
use crate::dto::{ValidatedJson, WithLedger};
use crate::handlers::today;
use crate::{error::ApiError, AppState};

/// Creates an unreceived GRN
pub async fn create_grn(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateGrnRequest>,
) -> Result<(StatusCode, Json<GrnResponse>), ApiError> {
    let input = request.into_new_grn(state.currency())?;
    let grn = state.fulfillment.create_grn(input).await?;
    Ok((StatusCode::CREATED, Json(GrnResponse::from_grn(&grn, today()))))
}

pub async fn get_grn(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GrnResponse>, ApiError> {
    let grn = state.fulfillment.get_grn(GrnId::from_uuid(id)).await?;
    Ok(Json(GrnResponse::from_grn(&grn, today())))
}

/// Soft-deletes an unreceived GRN
pub async fn delete_grn(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GrnResponse>, ApiError> {
    let grn = state.fulfillment.delete_grn(GrnId::from_uuid(id)).await?;
    Ok(Json(GrnResponse::from_grn(&grn, today())))
}

/// Receives the goods; repeating the call returns the original receipt
pub async fn receive_grn(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WithLedger<GrnReceiptResponse>>, ApiError> {
    let committed = state.fulfillment.receive_grn(GrnId::from_uuid(id)).await?;
    Ok(Json(WithLedger {
        document: GrnReceiptResponse::from_receipt(&committed.document, today()),
        ledger: committed.ledger,
    }))
}

/// Records a vendor payment against a received GRN
pub async fn record_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<RecordGrnPaymentRequest>,
) -> Result<(StatusCode, Json<WithLedger<GrnPaymentResponse>>), ApiError> {
    let id = GrnId::from_uuid(id);
    let payment = request.into_new_payment(state.currency());

    match state.grn_payments.record_payment(id, payment).await {
        Ok(committed) => Ok((
            StatusCode::CREATED,
            Json(WithLedger {
                document: GrnPaymentResponse::from(&committed.document),
                ledger: committed.ledger,
            }),
        )),
        Err(e) => {
            let error = ApiError::from(e);
            match state.grn_payments.get_payment_details(id).await {
                Ok(details) => Err(error.with_state(GrnPaymentDetailsResponse::from(&details).figures())),
                Err(_) => Err(error),
            }
        }
    }
}

pub async fn list_payments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GrnPaymentHistoryResponse>, ApiError> {
    let id = GrnId::from_uuid(id);
    let details = state.grn_payments.get_payment_details(id).await?;
    let payments = state.grn_payments.list_payments(id).await?;
    Ok(Json(GrnPaymentHistoryResponse {
        details: GrnPaymentDetailsResponse::from(&details),
        payments: payments.iter().map(GrnPaymentResponse::from).collect(),
    }))
}
