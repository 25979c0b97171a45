//! Income/expense transaction and category handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use core_kernel::{AccountId, CategoryId, Money, TransactionId};
use domain_ledger::{Category, NewTransaction};

use crate::dto::ledger::*;
use crate::dto::{currency_or, ValidatedJson, WithLedger};
use crate::{error::ApiError, AppState};

/// Creates a Draft transaction; it has no ledger effect until posted
pub async fn create_transaction(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let currency = currency_or(request.currency.as_deref(), state.currency())?;
    let category_id = match (request.category_id, request.category.as_deref()) {
        (Some(id), _) => CategoryId::from_uuid(id),
        (None, Some(name)) => state.poster.get_or_create_category(name, request.kind).await?.id,
        (None, None) => return Err(ApiError::Validation("category_id or category is required".to_string())),
    };

    let transaction = state
        .poster
        .create_transaction(NewTransaction {
            kind: request.kind,
            category_id,
            amount: Money::new(request.amount, currency),
            transaction_date: request.transaction_date,
            payment_method: request.payment_method,
            description: request.description,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(TransactionResponse::from(&transaction))))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let transaction = state.poster.get_transaction(TransactionId::from_uuid(id)).await?;
    Ok(Json(TransactionResponse::from(&transaction)))
}

/// Draft → Posted; posting twice returns the first posting
pub async fn post_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WithLedger<TransactionResponse>>, ApiError> {
    let id = TransactionId::from_uuid(id);
    let posted = state.poster.post_transaction(id).await?;
    let transaction = match posted.transaction {
        Some(transaction) => transaction,
        None => state.poster.get_transaction(id).await?,
    };
    Ok(Json(WithLedger {
        document: TransactionResponse::from(&transaction),
        ledger: posted.ledger,
    }))
}

pub async fn reverse_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<ReverseRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let transaction = state
        .poster
        .reverse_transaction(TransactionId::from_uuid(id), &request.reason)
        .await?;
    Ok(Json(TransactionResponse::from(&transaction)))
}

/// Deletes a manual Draft transaction
pub async fn delete_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let transaction = state.poster.delete_transaction(TransactionId::from_uuid(id)).await?;
    Ok(Json(TransactionResponse::from(&transaction)))
}

pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.poster.list_categories().await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state
        .poster
        .create_category(&request.name, request.kind, request.account_id.map(AccountId::from_uuid))
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn rename_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<RenameCategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    let category = state.poster.rename_category(CategoryId::from_uuid(id), &request.name).await?;
    Ok(Json(category))
}

/// System categories are refused
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.poster.delete_category(CategoryId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
