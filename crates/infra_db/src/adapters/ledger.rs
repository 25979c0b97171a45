//! PostgreSQL Ledger Adapter
//!
//! Implements `LedgerPort` over the `accounts`, `ledger_batches` and
//! `ledger_entries` tables. Each batch is written in one database
//! transaction: either every entry lands or none does.
//!
//! # Concurrency
//!
//! - Posting share-locks the accounts it touches; deactivation and code
//!   changes take an exclusive lock on the account row
//! - Reversal locks the original batch header, so a batch is reversed once
//! - The unique idempotency key makes a replayed batch return the receipt of
//!   the batch already committed under that key

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, warn};

use core_kernel::{
    AccountId, AdapterHealth, Currency, DomainPort, EntryId, HealthCheckResult, HealthCheckable, Money, PortError,
    PostingBatchId,
};
use domain_ledger::{
    Account, EntryStatus, GeneralLedgerEntry, LedgerError, LedgerPort, PostingBatch, PostingLine, PostingReceipt,
    StandardChartOfAccounts, TrialBalance,
};

use crate::error::DatabaseError;
use crate::repositories::ledger as tables;

fn db(error: DatabaseError) -> LedgerError {
    LedgerError::Port(PortError::from(error))
}

fn sql(error: sqlx::Error) -> LedgerError {
    db(DatabaseError::from(error))
}

/// PostgreSQL-backed general ledger
#[derive(Debug, Clone)]
pub struct PostgresLedgerAdapter {
    pool: PgPool,
    currency: Currency,
}

impl PostgresLedgerAdapter {
    /// Creates the adapter for a ledger kept in `currency`
    pub fn new(pool: PgPool, currency: Currency) -> Self {
        Self { pool, currency }
    }

    /// Adds the standard chart accounts whose codes are not yet in use
    ///
    /// Returns the number of accounts created.
    pub async fn seed_standard_chart(&self) -> Result<usize, LedgerError> {
        let mut created = 0;
        for account in StandardChartOfAccounts::create_standard_accounts(self.currency) {
            match self.add_account(account).await {
                Ok(_) => created += 1,
                Err(LedgerError::AccountCodeExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        info!(created, currency = %self.currency, "Standard chart of accounts seeded");
        Ok(created)
    }

    fn ensure_postable(accounts: &HashMap<AccountId, Account>, lines: &[PostingLine]) -> Result<(), LedgerError> {
        for line in lines {
            let account = accounts
                .get(&line.account_id)
                .ok_or_else(|| LedgerError::AccountNotFound(line.account_id.to_string()))?;
            if !account.is_active() {
                return Err(LedgerError::AccountInactive(account.code.clone()));
            }
        }
        Ok(())
    }

    /// Stages a validated batch inside `conn`'s transaction
    async fn commit(
        &self,
        conn: &mut PgConnection,
        batch: &PostingBatch,
        reverses: Option<Vec<EntryId>>,
    ) -> Result<PostingReceipt, LedgerError> {
        let batch_id = PostingBatchId::new_v7();
        let now = Utc::now();

        let mut entries: Vec<GeneralLedgerEntry> = batch
            .lines
            .iter()
            .map(|line| GeneralLedgerEntry::from_line(batch_id, batch, line, now))
            .collect();
        if let Some(reverses) = reverses {
            for (entry, original) in entries.iter_mut().zip(reverses) {
                entry.reverses = Some(original);
            }
        }
        for entry in &mut entries {
            entry.status = EntryStatus::Posted;
        }

        let (debits, _) = batch.totals();
        let total = Money::new(debits, self.currency);
        tables::insert_batch(conn, batch_id, batch, total, &entries, now)
            .await
            .map_err(db)?;

        Ok(PostingReceipt {
            batch_id,
            entry_ids: entries.iter().map(|e| e.id).collect(),
            total,
            posted_at: now,
            replayed: false,
        })
    }

    async fn replayed_receipt(&self, key: &str) -> Result<Option<PostingReceipt>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(sql)?;
        tables::find_receipt_by_key(&mut conn, key).await.map_err(db)
    }
}

impl DomainPort for PostgresLedgerAdapter {}

#[async_trait]
impl HealthCheckable for PostgresLedgerAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (status, message) = match result {
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
        };
        HealthCheckResult {
            adapter_id: "postgres-ledger-adapter".to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl LedgerPort for PostgresLedgerAdapter {
    fn currency(&self) -> Currency {
        self.currency
    }

    #[instrument(skip(self, account), fields(code = %account.code))]
    async fn add_account(&self, account: Account) -> Result<Account, LedgerError> {
        if account.currency() != self.currency {
            return Err(LedgerError::Validation(format!(
                "account {} is in {}, ledger currency is {}",
                account.code,
                account.currency(),
                self.currency
            )));
        }
        if account.code.trim().is_empty() {
            return Err(LedgerError::Validation("account code is required".to_string()));
        }

        let mut conn = self.pool.acquire().await.map_err(sql)?;
        match tables::insert_account(&mut conn, &account).await {
            Ok(()) => {}
            Err(e) if e.is_duplicate() => return Err(LedgerError::AccountCodeExists(account.code)),
            Err(e) => return Err(db(e)),
        }
        info!(account_id = %account.id, "Account added");
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(sql)?;
        tables::fetch_account(&mut conn, id)
            .await
            .map_err(db)?
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))
    }

    async fn find_account_by_code(&self, code: &str) -> Result<Option<Account>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(sql)?;
        tables::fetch_account_by_code(&mut conn, code).await.map_err(db)
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(sql)?;
        tables::list_accounts(&mut conn).await.map_err(db)
    }

    #[instrument(skip(self), fields(account_id = %id))]
    async fn change_account_code(&self, id: AccountId, new_code: &str) -> Result<Account, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(sql)?;
        let mut account = tables::lock_account(&mut tx, id)
            .await
            .map_err(db)?
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))?;

        if tables::account_has_entries(&mut tx, id).await.map_err(db)? {
            return Err(LedgerError::AccountHasPostings(id.to_string()));
        }
        if let Some(other) = tables::fetch_account_by_code(&mut tx, new_code).await.map_err(db)? {
            if other.id != id {
                return Err(LedgerError::AccountCodeExists(new_code.to_string()));
            }
        }

        account.code = new_code.to_string();
        match tables::update_account(&mut tx, &account).await {
            Ok(()) => {}
            Err(e) if e.is_duplicate() => return Err(LedgerError::AccountCodeExists(new_code.to_string())),
            Err(e) => return Err(db(e)),
        }
        tx.commit().await.map_err(sql)?;
        Ok(account)
    }

    #[instrument(skip(self), fields(account_id = %id))]
    async fn deactivate_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(sql)?;
        let mut account = tables::lock_account(&mut tx, id)
            .await
            .map_err(db)?
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))?;
        account.lifecycle.delete(Utc::now())?;
        tables::update_account(&mut tx, &account).await.map_err(db)?;
        tx.commit().await.map_err(sql)?;
        info!("Account deactivated");
        Ok(account)
    }

    #[instrument(skip(self, batch), fields(source_type = %batch.source_type, source_id = %batch.source_id))]
    async fn post_batch(&self, batch: PostingBatch) -> Result<PostingReceipt, LedgerError> {
        if let Some(key) = &batch.idempotency_key {
            if let Some(receipt) = self.replayed_receipt(key).await? {
                info!(batch_id = %receipt.batch_id, "Idempotent replay of posting batch");
                return Ok(receipt);
            }
        }

        if let Err(e) = batch.validate(self.currency) {
            if let LedgerError::UnbalancedPosting { debits, credits } = &e {
                error!(%debits, %credits, "Rejected unbalanced posting");
            }
            return Err(e);
        }

        let mut tx = self.pool.begin().await.map_err(sql)?;
        let ids: Vec<AccountId> = batch.lines.iter().map(|l| l.account_id).collect();
        let accounts = tables::lock_accounts_for_posting(&mut tx, &ids).await.map_err(db)?;
        Self::ensure_postable(&accounts, &batch.lines)?;

        let staged = self.commit(&mut tx, &batch, None).await;
        let receipt = match staged {
            Ok(receipt) => receipt,
            // A concurrent caller committed the same key first
            Err(LedgerError::Port(PortError::Duplicate { .. })) if batch.idempotency_key.is_some() => {
                drop(tx);
                let key = batch.idempotency_key.as_deref().unwrap_or_default();
                return self.replayed_receipt(key).await?.ok_or_else(|| {
                    LedgerError::Port(PortError::internal(format!("batch for key {} vanished", key)))
                });
            }
            Err(e) => return Err(e),
        };
        tx.commit().await.map_err(sql)?;

        info!(batch_id = %receipt.batch_id, total = %receipt.total, "Posting batch committed");
        Ok(receipt)
    }

    #[instrument(skip(self), fields(batch_id = %batch_id))]
    async fn reverse_batch(
        &self,
        batch_id: PostingBatchId,
        reason: &str,
        date: NaiveDate,
    ) -> Result<PostingReceipt, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(sql)?;
        let header = tables::lock_batch(&mut tx, batch_id)
            .await
            .map_err(db)?
            .ok_or_else(|| LedgerError::BatchNotFound(batch_id.to_string()))?;

        if let Some(by) = header.reversed_by {
            let by = PostingBatchId::from_uuid(by);
            warn!(reversed_by = %by, "Batch already reversed");
            return Err(LedgerError::AlreadyClosed(format!(
                "batch {} was already reversed by {}",
                batch_id, by
            )));
        }

        let originals = tables::batch_entries(&mut tx, batch_id)
            .await
            .map_err(db)?
            .ok_or_else(|| LedgerError::BatchNotFound(batch_id.to_string()))?;
        let reversal = PostingBatch::reversal(batch_id, &originals, reason, date);

        let ids: Vec<AccountId> = reversal.lines.iter().map(|l| l.account_id).collect();
        let accounts = tables::lock_accounts_for_posting(&mut tx, &ids).await.map_err(db)?;
        Self::ensure_postable(&accounts, &reversal.lines)?;

        let reverses = originals.iter().map(|e| e.id).collect();
        let receipt = self.commit(&mut tx, &reversal, Some(reverses)).await?;
        tables::mark_reversed(&mut tx, batch_id, receipt.batch_id)
            .await
            .map_err(db)?;
        tx.commit().await.map_err(sql)?;

        info!(reversal_batch_id = %receipt.batch_id, reason, "Batch reversed");
        Ok(receipt)
    }

    async fn batch_entries(&self, batch_id: PostingBatchId) -> Result<Vec<GeneralLedgerEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(sql)?;
        tables::batch_entries(&mut conn, batch_id)
            .await
            .map_err(db)?
            .ok_or_else(|| LedgerError::BatchNotFound(batch_id.to_string()))
    }

    async fn account_balance(&self, id: AccountId, as_of: Option<NaiveDate>) -> Result<Money, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(sql)?;
        let account = tables::fetch_account(&mut conn, id)
            .await
            .map_err(db)?
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))?;
        let movements = tables::movements(&mut conn, Some(id), as_of).await.map_err(db)?;
        Ok(natural_balance(&account, movements.get(&id).copied()))
    }

    async fn trial_balance(&self, as_of: Option<NaiveDate>) -> Result<TrialBalance, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(sql)?;
        let accounts = tables::list_accounts(&mut conn).await.map_err(db)?;
        let movements = tables::movements(&mut conn, None, as_of).await.map_err(db)?;
        debug!(accounts = accounts.len(), "Computing trial balance");

        let balances = accounts.into_iter().map(|account| {
            let balance = natural_balance(&account, movements.get(&account.id).copied());
            (account, balance)
        });
        Ok(TrialBalance::from_balances(self.currency, as_of, balances))
    }
}

/// Opening balance plus the natural-side effect of the summed movements
fn natural_balance(account: &Account, movement: Option<tables::Movement>) -> Money {
    let (debit, credit) = movement.unwrap_or_default();
    let change = account.account_type.natural_change(debit, credit);
    Money::new(account.opening_balance.amount().saturating_add(change), account.currency())
}
