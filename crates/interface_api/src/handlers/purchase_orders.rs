//! Purchase order handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use core_kernel::PurchaseOrderId;

use crate::dto::purchase::*;
use crate::dto::ValidatedJson;
use crate::handlers::today;
use crate::{error::ApiError, AppState};

/// Creates an open, unapproved purchase order
pub async fn create_purchase_order(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreatePurchaseOrderRequest>,
) -> Result<(StatusCode, Json<PurchaseOrderResponse>), ApiError> {
    let input = request.into_new_order(state.currency())?;
    let order = state.fulfillment.create_purchase_order(input).await?;
    Ok((StatusCode::CREATED, Json(PurchaseOrderResponse::from(&order))))
}

pub async fn get_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PurchaseOrderResponse>, ApiError> {
    let order = state.fulfillment.get_purchase_order(PurchaseOrderId::from_uuid(id)).await?;
    Ok(Json(PurchaseOrderResponse::from(&order)))
}

pub async fn approve_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PurchaseOrderResponse>, ApiError> {
    let order = state.fulfillment.approve(PurchaseOrderId::from_uuid(id)).await?;
    Ok(Json(PurchaseOrderResponse::from(&order)))
}

/// Closes the order; later GRNs against it are refused
pub async fn close_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PurchaseOrderResponse>, ApiError> {
    let order = state.fulfillment.close(PurchaseOrderId::from_uuid(id)).await?;
    Ok(Json(PurchaseOrderResponse::from(&order)))
}

/// GRNs raised against the order
pub async fn list_grns(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<GrnResponse>>, ApiError> {
    let grns = state.fulfillment.list_grns(PurchaseOrderId::from_uuid(id)).await?;
    let today = today();
    Ok(Json(grns.iter().map(|grn| GrnResponse::from_grn(grn, today)).collect()))
}
