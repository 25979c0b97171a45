//! Ledger handlers: journal entries, balances and the pending queue

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use core_kernel::{AccountId, Money};
use domain_ledger::{
    Account, PendingPosting, PostingBatch, PostingLine, PostingReceipt, RetryReport, SourceType, TrialBalance,
};

use crate::dto::ledger::*;
use crate::dto::ValidatedJson;
use crate::handlers::today;
use crate::{error::ApiError, AppState};

/// Posts a manual journal entry
///
/// Lines may name accounts by id or by chart code. The ledger checks the
/// whole entry before writing anything; a replayed idempotency key answers
/// 200 with the original receipt instead of 201.
pub async fn post_journal_entry(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<JournalEntryRequest>,
) -> Result<(StatusCode, Json<PostingReceipt>), ApiError> {
    let currency = state.currency();
    let reference = request.reference.unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut batch = PostingBatch::new(request.description, SourceType::JournalEntry, reference)
        .dated(request.transaction_date.unwrap_or_else(today));
    if let Some(key) = request.idempotency_key {
        batch = batch.with_idempotency_key(key);
    }

    for line in request.lines {
        let account_id = resolve_account(&state, line.account_id, line.account_code.as_deref()).await?;
        let posting = match (line.debit, line.credit) {
            (Some(debit), None) => PostingLine::debit(account_id, Money::new(debit, currency)),
            (None, Some(credit)) => PostingLine::credit(account_id, Money::new(credit, currency)),
            _ => return Err(ApiError::Validation("each line needs exactly one of debit or credit".to_string())),
        };
        batch = batch.line(match line.description {
            Some(description) => posting.with_description(description),
            None => posting,
        });
    }

    let receipt = state.poster.post_journal_entry(batch).await?;
    let status = if receipt.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(receipt)))
}

async fn resolve_account(state: &AppState, id: Option<Uuid>, code: Option<&str>) -> Result<AccountId, ApiError> {
    match (id, code) {
        (Some(id), _) => Ok(AccountId::from_uuid(id)),
        (None, Some(code)) => state
            .poster
            .ledger()
            .find_account_by_code(code)
            .await?
            .map(|account| account.id)
            .ok_or_else(|| ApiError::NotFound(format!("Account with code {}", code))),
        (None, None) => Err(ApiError::Validation("line needs account_id or account_code".to_string())),
    }
}

pub async fn list_accounts(State(state): State<AppState>) -> Result<Json<Vec<Account>>, ApiError> {
    Ok(Json(state.poster.ledger().list_accounts().await?))
}

/// Natural-side balance of one account, optionally as of a date
pub async fn account_balance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let ledger = state.poster.ledger();
    let id = AccountId::from_uuid(id);
    let account = ledger.get_account(id).await?;
    let balance = ledger.account_balance(id, query.as_of).await?;
    Ok(Json(BalanceResponse::new(&account, balance.amount(), balance.currency(), query.as_of)))
}

pub async fn trial_balance(
    State(state): State<AppState>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<TrialBalance>, ApiError> {
    Ok(Json(state.poster.ledger().trial_balance(query.as_of).await?))
}

/// Drains the pending posting queue once
pub async fn retry_pending(State(state): State<AppState>) -> Result<Json<RetryReport>, ApiError> {
    Ok(Json(state.poster.retry_pending().await?))
}

pub async fn list_pending(State(state): State<AppState>) -> Result<Json<Vec<PendingPosting>>, ApiError> {
    Ok(Json(state.poster.pending_postings().await?))
}
