//! Ledger Domain Ports
//!
//! This module defines the port interfaces the ledger domain needs from its
//! storage, enabling swappable implementations.
//!
//! # Architecture
//!
//! - **In-memory adapters** (this module): `tokio::sync::RwLock` maps, used
//!   by tests and by the `memory` storage backend
//! - **PostgreSQL adapters** (infra_db): same traits over sqlx
//!
//! Repository `update` calls are compare-and-swap: the stored version must
//! equal the version carried by the record passed in, and the stored record
//! comes back with the next version. A mismatch is a `PortError::Conflict`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use core_kernel::{
    AccountId, CategoryId, Currency, DomainPort, HealthCheckResult, HealthCheckable, Money, PortError,
    PostingBatchId, TransactionId,
};

use crate::account::Account;
use crate::entry::{GeneralLedgerEntry, PostingBatch, PostingReceipt, SourceType};
use crate::error::LedgerError;
use crate::ledger::{MoneyLedger, TrialBalance};
use crate::transaction::{Category, Transaction};

/// The general ledger as seen by the poster and the HTTP layer
///
/// Business rule failures come back as the matching `LedgerError` variant;
/// storage failures come back as `LedgerError::Port`.
#[async_trait]
pub trait LedgerPort: DomainPort + HealthCheckable {
    /// Currency every posting must be in
    fn currency(&self) -> Currency;

    /// Adds an account to the chart
    async fn add_account(&self, account: Account) -> Result<Account, LedgerError>;

    /// Retrieves an account by ID
    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError>;

    /// Finds an account by code
    async fn find_account_by_code(&self, code: &str) -> Result<Option<Account>, LedgerError>;

    /// Lists the chart ordered by code
    async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError>;

    /// Changes an account code (refused once postings exist)
    async fn change_account_code(&self, id: AccountId, new_code: &str) -> Result<Account, LedgerError>;

    /// Soft-deactivates an account
    async fn deactivate_account(&self, id: AccountId) -> Result<Account, LedgerError>;

    /// Posts a batch; all or nothing
    async fn post_batch(&self, batch: PostingBatch) -> Result<PostingReceipt, LedgerError>;

    /// Reverses a committed batch
    async fn reverse_batch(
        &self,
        batch_id: PostingBatchId,
        reason: &str,
        date: NaiveDate,
    ) -> Result<PostingReceipt, LedgerError>;

    /// Entries of a committed batch
    async fn batch_entries(&self, batch_id: PostingBatchId) -> Result<Vec<GeneralLedgerEntry>, LedgerError>;

    /// Natural-side balance of an account, optionally as of a date
    async fn account_balance(&self, id: AccountId, as_of: Option<NaiveDate>) -> Result<Money, LedgerError>;

    /// Trial balance, optionally as of a date
    async fn trial_balance(&self, as_of: Option<NaiveDate>) -> Result<TrialBalance, LedgerError>;
}

/// Storage for transaction records
#[async_trait]
pub trait TransactionRepository: DomainPort {
    /// Inserts a new transaction
    async fn insert(&self, transaction: &Transaction) -> Result<(), PortError>;

    /// Retrieves a transaction by ID
    async fn get(&self, id: TransactionId) -> Result<Transaction, PortError>;

    /// Finds the transaction recorded for a source document
    async fn find_by_source(
        &self,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<Option<Transaction>, PortError>;

    /// Compare-and-swap update; returns the stored record
    async fn update(&self, transaction: Transaction) -> Result<Transaction, PortError>;
}

/// Storage for transaction categories
#[async_trait]
pub trait CategoryRepository: DomainPort {
    /// Inserts a category; a case-insensitive name clash is `PortError::Duplicate`
    async fn insert(&self, category: &Category) -> Result<(), PortError>;

    /// Retrieves a category by ID
    async fn get(&self, id: CategoryId) -> Result<Category, PortError>;

    /// Case-insensitive lookup by name
    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, PortError>;

    /// Replaces a category
    async fn update(&self, category: &Category) -> Result<(), PortError>;

    /// Removes a category
    async fn delete(&self, id: CategoryId) -> Result<(), PortError>;

    /// Lists all categories
    async fn list(&self) -> Result<Vec<Category>, PortError>;
}

/// Ledger call that still has to happen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PendingAction {
    /// Post a new batch
    Post { batch: PostingBatch },
    /// Reverse a committed batch
    Reverse {
        batch_id: PostingBatchId,
        reason: String,
        date: NaiveDate,
    },
}

/// A posting whose document was committed while the ledger was unreachable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPosting {
    /// Idempotency key of the ledger call; unique in the queue
    pub key: String,
    /// Transaction record to update once the call lands
    pub transaction_id: Option<TransactionId>,
    pub action: PendingAction,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: String,
}

/// Durable queue of postings awaiting the ledger
#[async_trait]
pub trait PendingPostingStore: DomainPort {
    /// Adds a posting; an existing entry with the same key is kept
    async fn enqueue(&self, posting: PendingPosting) -> Result<(), PortError>;

    /// Queued postings, oldest first
    async fn list(&self) -> Result<Vec<PendingPosting>, PortError>;

    /// The queued posting under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<PendingPosting>, PortError>;

    /// Records a failed attempt
    async fn record_failure(&self, key: &str, error: &str) -> Result<(), PortError>;

    /// Removes a posting (after it reached the ledger)
    async fn remove(&self, key: &str) -> Result<Option<PendingPosting>, PortError>;
}

/// In-memory ledger over a [`MoneyLedger`]
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    inner: Arc<RwLock<MoneyLedger>>,
    currency: Currency,
}

impl InMemoryLedger {
    /// Wraps an existing ledger
    pub fn new(ledger: MoneyLedger) -> Self {
        let currency = ledger.currency();
        Self {
            inner: Arc::new(RwLock::new(ledger)),
            currency,
        }
    }

    /// Ledger seeded with the standard chart
    pub fn with_standard_chart(currency: Currency) -> Self {
        Self::new(MoneyLedger::with_standard_chart(currency))
    }
}

impl DomainPort for InMemoryLedger {}

#[async_trait]
impl HealthCheckable for InMemoryLedger {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("in-memory-ledger")
    }
}

#[async_trait]
impl LedgerPort for InMemoryLedger {
    fn currency(&self) -> Currency {
        self.currency
    }

    async fn add_account(&self, account: Account) -> Result<Account, LedgerError> {
        let mut ledger = self.inner.write().await;
        ledger.add_account(account.clone())?;
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.inner
            .read()
            .await
            .get_account(&id)
            .cloned()
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))
    }

    async fn find_account_by_code(&self, code: &str) -> Result<Option<Account>, LedgerError> {
        Ok(self.inner.read().await.find_account_by_code(code).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.inner.read().await.accounts())
    }

    async fn change_account_code(&self, id: AccountId, new_code: &str) -> Result<Account, LedgerError> {
        self.inner.write().await.change_account_code(&id, new_code)
    }

    async fn deactivate_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.inner.write().await.deactivate_account(&id)
    }

    async fn post_batch(&self, batch: PostingBatch) -> Result<PostingReceipt, LedgerError> {
        self.inner.write().await.post(batch)
    }

    async fn reverse_batch(
        &self,
        batch_id: PostingBatchId,
        reason: &str,
        date: NaiveDate,
    ) -> Result<PostingReceipt, LedgerError> {
        self.inner.write().await.reverse(&batch_id, reason, date)
    }

    async fn batch_entries(&self, batch_id: PostingBatchId) -> Result<Vec<GeneralLedgerEntry>, LedgerError> {
        self.inner.read().await.batch_entries(&batch_id)
    }

    async fn account_balance(&self, id: AccountId, as_of: Option<NaiveDate>) -> Result<Money, LedgerError> {
        self.inner.read().await.account_balance(&id, as_of)
    }

    async fn trial_balance(&self, as_of: Option<NaiveDate>) -> Result<TrialBalance, LedgerError> {
        Ok(self.inner.read().await.trial_balance(as_of))
    }
}

/// In-memory transaction repository
#[derive(Debug, Default)]
pub struct InMemoryTransactionRepository {
    transactions: RwLock<HashMap<TransactionId, Transaction>>,
}

impl InMemoryTransactionRepository {
    /// Creates an empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

impl DomainPort for InMemoryTransactionRepository {}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, transaction: &Transaction) -> Result<(), PortError> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&transaction.id) {
            return Err(PortError::duplicate("Transaction", transaction.id));
        }
        if let Some(source_id) = transaction.source_id.as_deref() {
            let taken = transactions
                .values()
                .any(|t| t.source_type == transaction.source_type && t.source_id.as_deref() == Some(source_id));
            if taken {
                return Err(PortError::duplicate(
                    "Transaction",
                    format!("{}:{}", transaction.source_type, source_id),
                ));
            }
        }
        transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn get(&self, id: TransactionId) -> Result<Transaction, PortError> {
        self.transactions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Transaction", id))
    }

    async fn find_by_source(
        &self,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<Option<Transaction>, PortError> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .find(|t| t.source_type == source_type && t.source_id.as_deref() == Some(source_id))
            .cloned())
    }

    async fn update(&self, mut transaction: Transaction) -> Result<Transaction, PortError> {
        let mut transactions = self.transactions.write().await;
        let stored = transactions
            .get_mut(&transaction.id)
            .ok_or_else(|| PortError::not_found("Transaction", transaction.id))?;
        if stored.version != transaction.version {
            return Err(PortError::conflict("Transaction", transaction.id, transaction.version, stored.version));
        }
        transaction.version = transaction.version.next();
        *stored = transaction.clone();
        Ok(transaction)
    }
}

/// In-memory category repository
#[derive(Debug, Default)]
pub struct InMemoryCategoryRepository {
    categories: RwLock<HashMap<CategoryId, Category>>,
}

impl InMemoryCategoryRepository {
    /// Creates an empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

impl DomainPort for InMemoryCategoryRepository {}

#[async_trait]
impl CategoryRepository for InMemoryCategoryRepository {
    async fn insert(&self, category: &Category) -> Result<(), PortError> {
        let mut categories = self.categories.write().await;
        if categories.values().any(|c| c.has_name(&category.name)) {
            return Err(PortError::duplicate("Category", &category.name));
        }
        categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn get(&self, id: CategoryId) -> Result<Category, PortError> {
        self.categories
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Category", id))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, PortError> {
        Ok(self.categories.read().await.values().find(|c| c.has_name(name)).cloned())
    }

    async fn update(&self, category: &Category) -> Result<(), PortError> {
        let mut categories = self.categories.write().await;
        if categories
            .values()
            .any(|c| c.id != category.id && c.has_name(&category.name))
        {
            return Err(PortError::duplicate("Category", &category.name));
        }
        let stored = categories
            .get_mut(&category.id)
            .ok_or_else(|| PortError::not_found("Category", category.id))?;
        *stored = category.clone();
        Ok(())
    }

    async fn delete(&self, id: CategoryId) -> Result<(), PortError> {
        self.categories
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PortError::not_found("Category", id))
    }

    async fn list(&self) -> Result<Vec<Category>, PortError> {
        let mut categories: Vec<_> = self.categories.read().await.values().cloned().collect();
        categories.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(categories)
    }
}

/// In-memory pending posting queue
#[derive(Debug, Default)]
pub struct InMemoryPendingPostingStore {
    queue: RwLock<Vec<PendingPosting>>,
}

impl InMemoryPendingPostingStore {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self::default()
    }
}

impl DomainPort for InMemoryPendingPostingStore {}

#[async_trait]
impl PendingPostingStore for InMemoryPendingPostingStore {
    async fn enqueue(&self, posting: PendingPosting) -> Result<(), PortError> {
        let mut queue = self.queue.write().await;
        if !queue.iter().any(|p| p.key == posting.key) {
            queue.push(posting);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PendingPosting>, PortError> {
        Ok(self.queue.read().await.clone())
    }

    async fn get(&self, key: &str) -> Result<Option<PendingPosting>, PortError> {
        Ok(self.queue.read().await.iter().find(|p| p.key == key).cloned())
    }

    async fn record_failure(&self, key: &str, error: &str) -> Result<(), PortError> {
        let mut queue = self.queue.write().await;
        let posting = queue
            .iter_mut()
            .find(|p| p.key == key)
            .ok_or_else(|| PortError::not_found("PendingPosting", key))?;
        posting.attempts += 1;
        posting.last_error = error.to_string();
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<PendingPosting>, PortError> {
        let mut queue = self.queue.write().await;
        let position = queue.iter().position(|p| p.key == key);
        Ok(position.map(|i| queue.remove(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{NewTransaction, TransactionKind};
    use core_kernel::PaymentMethod;
    use rust_decimal_macros::dec;

    fn draft() -> Transaction {
        Transaction::draft(NewTransaction {
            kind: TransactionKind::Income,
            category_id: CategoryId::new(),
            amount: Money::new(dec!(50), Currency::USD),
            transaction_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            payment_method: PaymentMethod::BankTransfer,
            description: "Consulting".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_transaction_update_is_compare_and_swap() {
        let repo = InMemoryTransactionRepository::new();
        let tx = draft();
        repo.insert(&tx).await.unwrap();

        let updated = repo.update(tx.clone()).await.unwrap();
        assert_eq!(updated.version, tx.version.next());

        let stale = repo.update(tx).await;
        assert!(matches!(stale, Err(PortError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_source_rejected() {
        let repo = InMemoryTransactionRepository::new();
        let receipt = |amount| {
            Transaction::auto(
                TransactionKind::Income,
                CategoryId::new(),
                Money::new(amount, Currency::USD),
                NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                Some(PaymentMethod::Cash),
                "Payment received",
                SourceType::Payment,
                "pay-1",
            )
        };

        repo.insert(&receipt(dec!(10))).await.unwrap();
        let second = repo.insert(&receipt(dec!(20))).await;
        assert!(matches!(second, Err(PortError::Duplicate { .. })));

        let stored = repo.find_by_source(SourceType::Payment, "pay-1").await.unwrap().unwrap();
        assert_eq!(stored.amount.amount(), dec!(10));

        // Manual transactions carry no source and never collide
        repo.insert(&draft()).await.unwrap();
        repo.insert(&draft()).await.unwrap();
    }

    #[tokio::test]
    async fn test_category_names_are_case_insensitive() {
        let repo = InMemoryCategoryRepository::new();
        repo.insert(&Category::new("Rent", TransactionKind::Expense)).await.unwrap();

        let dup = repo.insert(&Category::new("RENT", TransactionKind::Expense)).await;
        assert!(matches!(dup, Err(PortError::Duplicate { .. })));
        assert!(repo.find_by_name("rent").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pending_queue_dedupes_by_key() {
        let store = InMemoryPendingPostingStore::new();
        let posting = PendingPosting {
            key: "payment:1".to_string(),
            transaction_id: None,
            action: PendingAction::Post {
                batch: PostingBatch::new("p", SourceType::Payment, "1"),
            },
            queued_at: Utc::now(),
            attempts: 1,
            last_error: "timeout".to_string(),
        };
        store.enqueue(posting.clone()).await.unwrap();
        store.enqueue(posting).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.get("payment:1").await.unwrap().is_some());
        assert!(store.get("payment:2").await.unwrap().is_none());

        store.record_failure("payment:1", "still down").await.unwrap();
        let removed = store.remove("payment:1").await.unwrap().unwrap();
        assert_eq!(removed.attempts, 2);
        assert!(store.list().await.unwrap().is_empty());
    }
}
