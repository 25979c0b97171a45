//! Transaction poster
//!
//! Translates business events into one [`Transaction`] record plus one
//! balanced ledger batch, and owns the manual income/expense workflow
//! (Draft → Posted → reversed).
//!
//! # Ledger outages
//!
//! Auto events arrive after their document has been committed. If the ledger
//! cannot be reached at that point the batch is written to the pending queue
//! and the caller is told "document posted, ledger pending". Every batch
//! carries an idempotency key, so [`TransactionPoster::retry_pending`] can be
//! run any number of times without double posting.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use core_kernel::{
    retry_on_conflict, AccountId, CategoryId, Currency, GrnId, GrnPaymentId, InvoiceId, Money,
    PaymentId, PaymentMethod, PostingBatchId, PortError, RetryPolicy, SettlementMode, TransactionId,
};

use crate::account::StandardChartOfAccounts;
use crate::entry::{PostingBatch, PostingReceipt, SourceType};
use crate::error::LedgerError;
use crate::ports::{
    CategoryRepository, LedgerPort, PendingAction, PendingPosting, PendingPostingStore, TransactionRepository,
};
use crate::transaction::{Category, NewTransaction, Transaction, TransactionKind, TransactionStatus};

/// Accounts the auto postings hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingAccounts {
    pub cash: AccountId,
    pub bank: AccountId,
    pub receivables: AccountId,
    pub inventory: AccountId,
    pub payables: AccountId,
    pub tax_payable: AccountId,
    pub sales_revenue: AccountId,
    pub operating_expense: AccountId,
}

impl PostingAccounts {
    /// Looks the accounts up by their standard codes
    pub async fn resolve(ledger: &dyn LedgerPort) -> Result<Self, LedgerError> {
        async fn by_code(ledger: &dyn LedgerPort, code: &str) -> Result<AccountId, LedgerError> {
            ledger
                .find_account_by_code(code)
                .await?
                .map(|a| a.id)
                .ok_or_else(|| LedgerError::AccountNotFound(format!("code {}", code)))
        }

        Ok(Self {
            cash: by_code(ledger, StandardChartOfAccounts::CASH).await?,
            bank: by_code(ledger, StandardChartOfAccounts::BANK).await?,
            receivables: by_code(ledger, StandardChartOfAccounts::ACCOUNTS_RECEIVABLE).await?,
            inventory: by_code(ledger, StandardChartOfAccounts::INVENTORY).await?,
            payables: by_code(ledger, StandardChartOfAccounts::ACCOUNTS_PAYABLE).await?,
            tax_payable: by_code(ledger, StandardChartOfAccounts::TAX_PAYABLE).await?,
            sales_revenue: by_code(ledger, StandardChartOfAccounts::SALES_REVENUE).await?,
            operating_expense: by_code(ledger, StandardChartOfAccounts::OPERATING_EXPENSE).await?,
        })
    }

    /// Cash for cash payments, Bank for everything else
    pub fn settlement_account(&self, method: PaymentMethod) -> AccountId {
        if method.settles_through_cash() {
            self.cash
        } else {
            self.bank
        }
    }
}

/// A document-level event with financial effect
#[derive(Debug, Clone, PartialEq)]
pub enum BusinessEvent {
    /// Debit Accounts Receivable total; credit Sales Revenue subtotal and Tax Payable tax
    InvoiceCreated {
        invoice_id: InvoiceId,
        reference: String,
        date: NaiveDate,
        subtotal: Money,
        tax: Money,
        total: Money,
    },
    /// Debit Cash/Bank; credit Accounts Receivable
    PaymentReceived {
        invoice_id: InvoiceId,
        payment_id: PaymentId,
        amount: Money,
        method: PaymentMethod,
        date: NaiveDate,
    },
    /// Debit Inventory; credit Accounts Payable or Cash
    GoodsReceived {
        grn_id: GrnId,
        reference: String,
        date: NaiveDate,
        total: Money,
        settlement: SettlementMode,
    },
    /// Debit Accounts Payable; credit Cash/Bank
    GrnPaid {
        grn_id: GrnId,
        payment_id: GrnPaymentId,
        amount: Money,
        method: PaymentMethod,
        date: NaiveDate,
    },
}

impl BusinessEvent {
    /// Source document of the event
    pub fn source(&self) -> (SourceType, String) {
        match self {
            BusinessEvent::InvoiceCreated { invoice_id, .. } => (SourceType::Invoice, invoice_id.to_string()),
            BusinessEvent::PaymentReceived { payment_id, .. } => (SourceType::Payment, payment_id.to_string()),
            BusinessEvent::GoodsReceived { grn_id, .. } => (SourceType::Grn, grn_id.to_string()),
            BusinessEvent::GrnPaid { payment_id, .. } => (SourceType::Payment, payment_id.to_string()),
        }
    }

    fn kind(&self) -> TransactionKind {
        match self {
            BusinessEvent::InvoiceCreated { .. } | BusinessEvent::PaymentReceived { .. } => TransactionKind::Income,
            BusinessEvent::GoodsReceived { .. } | BusinessEvent::GrnPaid { .. } => TransactionKind::Expense,
        }
    }

    fn category_name(&self) -> &'static str {
        match self {
            BusinessEvent::InvoiceCreated { .. } => "Invoiced Sales",
            BusinessEvent::PaymentReceived { .. } => "Customer Payments",
            BusinessEvent::GoodsReceived { .. } => "Goods Received",
            BusinessEvent::GrnPaid { .. } => "Vendor Payments",
        }
    }

    fn amount(&self) -> Money {
        match self {
            BusinessEvent::InvoiceCreated { total, .. } | BusinessEvent::GoodsReceived { total, .. } => *total,
            BusinessEvent::PaymentReceived { amount, .. } | BusinessEvent::GrnPaid { amount, .. } => *amount,
        }
    }

    fn date(&self) -> NaiveDate {
        match self {
            BusinessEvent::InvoiceCreated { date, .. }
            | BusinessEvent::PaymentReceived { date, .. }
            | BusinessEvent::GoodsReceived { date, .. }
            | BusinessEvent::GrnPaid { date, .. } => *date,
        }
    }

    fn payment_method(&self) -> Option<PaymentMethod> {
        match self {
            BusinessEvent::PaymentReceived { method, .. } | BusinessEvent::GrnPaid { method, .. } => Some(*method),
            BusinessEvent::GoodsReceived { settlement: SettlementMode::CashOnDelivery, .. } => {
                Some(PaymentMethod::Cash)
            }
            _ => None,
        }
    }

    fn description(&self) -> String {
        match self {
            BusinessEvent::InvoiceCreated { reference, .. } => format!("Invoice {} issued", reference),
            BusinessEvent::PaymentReceived { invoice_id, .. } => format!("Payment received for {}", invoice_id),
            BusinessEvent::GoodsReceived { reference, .. } => format!("Goods received on {}", reference),
            BusinessEvent::GrnPaid { grn_id, .. } => format!("Payment to vendor for {}", grn_id),
        }
    }

    /// Balanced batch for this event
    pub fn batch(&self, accounts: &PostingAccounts) -> PostingBatch {
        let (source_type, source_id) = self.source();
        let batch = PostingBatch::new(self.description(), source_type, source_id).dated(self.date());
        match self {
            BusinessEvent::InvoiceCreated { subtotal, tax, total, .. } => batch
                .debit(accounts.receivables, *total)
                .credit_if_nonzero(accounts.sales_revenue, *subtotal)
                .credit_if_nonzero(accounts.tax_payable, *tax),
            BusinessEvent::PaymentReceived { amount, method, .. } => batch
                .debit(accounts.settlement_account(*method), *amount)
                .credit(accounts.receivables, *amount),
            BusinessEvent::GoodsReceived { total, settlement, .. } => {
                let credit = match settlement {
                    SettlementMode::OnAccount => accounts.payables,
                    SettlementMode::CashOnDelivery => accounts.cash,
                };
                batch.debit(accounts.inventory, *total).credit(credit, *total)
            }
            BusinessEvent::GrnPaid { amount, method, .. } => batch
                .debit(accounts.payables, *amount)
                .credit(accounts.settlement_account(*method), *amount),
        }
    }
}

/// Where the ledger side of an operation stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LedgerOutcome {
    /// The batch is in the ledger
    Posted { batch_id: PostingBatchId },
    /// The document is committed; the batch waits in the pending queue
    Pending { key: String },
    /// Nothing to post (zero amount, or a queued posting was cancelled)
    NotRequired,
    /// The document is committed but the posting could not be built or queued
    Failed { reason: String },
}

/// Result of recording a business event or posting a manual transaction
#[derive(Debug, Clone, PartialEq)]
pub struct PostedEvent {
    pub transaction: Option<Transaction>,
    pub ledger: LedgerOutcome,
}

/// A committed document together with the state of its ledger posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Committed<T> {
    pub document: T,
    pub ledger: LedgerOutcome,
}

impl<T> Committed<T> {
    pub fn new(document: T, ledger: LedgerOutcome) -> Self {
        Self { document, ledger }
    }
}

/// Result of a pending-queue drain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryReport {
    /// Keys that reached the ledger
    pub posted: Vec<String>,
    /// Keys still queued
    pub still_pending: Vec<String>,
}

/// Turns business events into ledger postings and transaction records
pub struct TransactionPoster {
    ledger: Arc<dyn LedgerPort>,
    transactions: Arc<dyn TransactionRepository>,
    categories: Arc<dyn CategoryRepository>,
    pending: Arc<dyn PendingPostingStore>,
    accounts: PostingAccounts,
    retry: RetryPolicy,
}

impl TransactionPoster {
    /// Creates a poster
    pub fn new(
        ledger: Arc<dyn LedgerPort>,
        transactions: Arc<dyn TransactionRepository>,
        categories: Arc<dyn CategoryRepository>,
        pending: Arc<dyn PendingPostingStore>,
        accounts: PostingAccounts,
    ) -> Self {
        Self {
            ledger,
            transactions,
            categories,
            pending,
            accounts,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the version-conflict retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Ledger currency; documents in other currencies cannot be posted
    pub fn currency(&self) -> Currency {
        self.ledger.currency()
    }

    /// The ledger behind this poster
    pub fn ledger(&self) -> &Arc<dyn LedgerPort> {
        &self.ledger
    }

    /// Records an auto event: one Posted transaction and one ledger batch
    ///
    /// Re-recording an event whose source already has a transaction returns
    /// the existing record without posting again. A failed ledger call is
    /// queued whatever the cause, so the outcome is either Posted or Pending.
    pub async fn record_event(&self, event: BusinessEvent) -> Result<PostedEvent, LedgerError> {
        let (source_type, source_id) = event.source();

        if let Some(existing) = self.transactions.find_by_source(source_type, &source_id).await? {
            return self.resume_event(existing, &event).await;
        }

        if event.amount().is_zero() {
            return Ok(PostedEvent {
                transaction: None,
                ledger: LedgerOutcome::NotRequired,
            });
        }

        let category = self
            .get_or_create_category(event.category_name(), event.kind())
            .await?;
        let transaction = Transaction::auto(
            event.kind(),
            category.id,
            event.amount(),
            event.date(),
            event.payment_method(),
            event.description(),
            source_type,
            source_id.clone(),
        );
        match self.transactions.insert(&transaction).await {
            Ok(()) => {}
            Err(e @ PortError::Duplicate { .. }) => {
                // Recorded concurrently by another request
                return match self.transactions.find_by_source(source_type, &source_id).await? {
                    Some(existing) => self.resume_event(existing, &event).await,
                    None => Err(e.into()),
                };
            }
            Err(e) => return Err(e.into()),
        }

        let batch = event.batch(&self.accounts).with_idempotency_key(transaction.posting_key());
        self.post_event_batch(transaction, batch).await
    }

    /// Records an event for a document that is already committed
    ///
    /// The document stays committed whatever happens here, so errors are
    /// folded into [`LedgerOutcome::Failed`] instead of being returned.
    pub async fn post_after_commit(&self, event: BusinessEvent) -> LedgerOutcome {
        let (source_type, source_id) = event.source();
        match self.record_event(event).await {
            Ok(posted) => posted.ledger,
            Err(e) => {
                error!(source_type = %source_type, source_id = %source_id, error = %e, "Document committed but ledger posting failed");
                LedgerOutcome::Failed { reason: e.to_string() }
            }
        }
    }

    /// [`Self::reverse_document`] for a document whose withdrawal is already committed
    pub async fn reverse_after_commit(&self, source_type: SourceType, source_id: &str, reason: &str) -> LedgerOutcome {
        match self.reverse_document(source_type, source_id, reason).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(source_type = %source_type, source_id = %source_id, error = %e, "Document withdrawn but ledger reversal failed");
                LedgerOutcome::Failed { reason: e.to_string() }
            }
        }
    }

    /// Reverses the posting recorded for a source document
    ///
    /// Used when a document with financial effect is withdrawn. A posting
    /// still waiting in the queue is cancelled instead of reversed.
    pub async fn reverse_document(
        &self,
        source_type: SourceType,
        source_id: &str,
        reason: &str,
    ) -> Result<LedgerOutcome, LedgerError> {
        let Some(transaction) = self.transactions.find_by_source(source_type, source_id).await? else {
            return Ok(LedgerOutcome::NotRequired);
        };

        if let Some(reversal) = transaction.reversal_batch_id {
            return Ok(LedgerOutcome::Posted { batch_id: reversal });
        }

        let Some(batch_id) = transaction.posting_batch_id else {
            let key = transaction.posting_key();
            if self.pending.remove(&key).await?.is_some() {
                info!(transaction_id = %transaction.id, key = %key, "Queued posting cancelled");
            }
            self.cancel_unposted(transaction.id).await?;
            return Ok(LedgerOutcome::NotRequired);
        };

        let date = Utc::now().date_naive();
        match self.ledger.reverse_batch(batch_id, reason, date).await {
            Ok(receipt) => {
                self.mark_reversed(transaction.id, receipt.batch_id).await?;
                Ok(LedgerOutcome::Posted { batch_id: receipt.batch_id })
            }
            Err(e) => {
                if !e.is_transient() {
                    error!(transaction_id = %transaction.id, batch_id = %batch_id, error = %e, "Reversal rejected by ledger");
                }
                let key = format!("reversal:{}", batch_id);
                let action = PendingAction::Reverse {
                    batch_id,
                    reason: reason.to_string(),
                    date,
                };
                self.enqueue(key.clone(), Some(transaction.id), action, &e).await?;
                Ok(LedgerOutcome::Pending { key })
            }
        }
    }

    /// Drains the pending queue
    ///
    /// Entries that fail again stay queued with the failure recorded; nothing
    /// is ever dropped from the queue except by a successful ledger call.
    pub async fn retry_pending(&self) -> Result<RetryReport, LedgerError> {
        let mut report = RetryReport::default();

        for pending in self.pending.list().await? {
            let result = match &pending.action {
                PendingAction::Post { batch } => self.ledger.post_batch(batch.clone()).await,
                PendingAction::Reverse { batch_id, reason, date } => {
                    self.ledger.reverse_batch(*batch_id, reason, *date).await
                }
            };

            match result {
                Ok(receipt) => {
                    if let Some(transaction_id) = pending.transaction_id {
                        self.settle_pending(&pending.action, transaction_id, &receipt).await?;
                    }
                    self.pending.remove(&pending.key).await?;
                    info!(key = %pending.key, batch_id = %receipt.batch_id, "Pending posting reached the ledger");
                    report.posted.push(pending.key);
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(key = %pending.key, attempts = pending.attempts + 1, error = %e, "Ledger still unavailable");
                    } else {
                        error!(key = %pending.key, error = %e, "Pending posting rejected by ledger; kept in queue");
                    }
                    self.pending.record_failure(&pending.key, &e.to_string()).await?;
                    report.still_pending.push(pending.key);
                }
            }
        }

        Ok(report)
    }

    /// Queued postings
    pub async fn pending_postings(&self) -> Result<Vec<PendingPosting>, LedgerError> {
        Ok(self.pending.list().await?)
    }

    /// Creates a manual income/expense transaction in Draft
    pub async fn create_transaction(&self, input: NewTransaction) -> Result<Transaction, LedgerError> {
        if input.amount.currency() != self.currency() {
            return Err(LedgerError::Validation(format!(
                "transaction is in {}, ledger currency is {}",
                input.amount.currency(),
                self.currency()
            )));
        }
        let category = self.load_category(input.category_id).await?;
        if category.kind != input.kind {
            return Err(LedgerError::Validation(format!(
                "category {} is for {:?} transactions",
                category.name, category.kind
            )));
        }

        let transaction = Transaction::draft(input)?;
        self.transactions.insert(&transaction).await?;
        info!(transaction_id = %transaction.id, kind = ?transaction.kind, amount = %transaction.amount, "Draft transaction created");
        Ok(transaction)
    }

    /// Retrieves a transaction
    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        self.load_transaction(id).await
    }

    /// Draft → Posted; posting an already Posted transaction is a no-op success
    pub async fn post_transaction(&self, id: TransactionId) -> Result<PostedEvent, LedgerError> {
        retry_on_conflict::<_, LedgerError, _, _>(self.retry, "post_transaction", |_| async move {
            let mut transaction = self.load_transaction(id).await?;
            if transaction.lifecycle.is_deleted() {
                return Err(LedgerError::AlreadyClosed(format!("transaction {} is deleted", id)));
            }
            if transaction.status == TransactionStatus::Posted {
                let ledger = self.outcome_of(&transaction).await?;
                return Ok(PostedEvent {
                    transaction: Some(transaction),
                    ledger,
                });
            }

            let category = self.load_category(transaction.category_id).await?;
            let batch = self.manual_batch(&transaction, &category)?;
            let receipt = self.ledger.post_batch(batch).await?;

            transaction.mark_posted(Some(receipt.batch_id))?;
            let transaction = self.transactions.update(transaction).await?;
            info!(transaction_id = %id, batch_id = %receipt.batch_id, "Transaction posted");
            Ok(PostedEvent {
                transaction: Some(transaction),
                ledger: LedgerOutcome::Posted { batch_id: receipt.batch_id },
            })
        })
        .await
    }

    /// Soft-deletes a manual Draft transaction
    pub async fn delete_transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        retry_on_conflict::<_, LedgerError, _, _>(self.retry, "delete_transaction", |_| async move {
            let mut transaction = self.load_transaction(id).await?;
            if let Err(e) = transaction.delete() {
                warn!(transaction_id = %id, error = %e, "Transaction delete rejected");
                return Err(e);
            }
            let transaction = self.transactions.update(transaction).await?;
            info!(transaction_id = %id, "Transaction deleted");
            Ok(transaction)
        })
        .await
    }

    /// Reverses a Posted transaction with an offsetting ledger batch
    pub async fn reverse_transaction(&self, id: TransactionId, reason: &str) -> Result<Transaction, LedgerError> {
        let transaction = self.load_transaction(id).await?;
        let batch_id = transaction.reversible_batch()?;
        let receipt = self
            .ledger
            .reverse_batch(batch_id, reason, Utc::now().date_naive())
            .await?;
        let transaction = self.mark_reversed(id, receipt.batch_id).await?;
        info!(transaction_id = %id, reversal_batch_id = %receipt.batch_id, reason, "Transaction reversed");
        Ok(transaction)
    }

    /// Posts a manual journal entry straight to the ledger
    ///
    /// The ledger validates the whole batch before writing; an unbalanced
    /// entry leaves no trace.
    pub async fn post_journal_entry(&self, batch: PostingBatch) -> Result<PostingReceipt, LedgerError> {
        if !matches!(batch.source_type, SourceType::JournalEntry | SourceType::Manual) {
            return Err(LedgerError::Validation(format!(
                "journal entries must use source type JournalEntry or Manual, got {}",
                batch.source_type
            )));
        }
        match self.ledger.post_batch(batch).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                warn!(error = %e, "Journal entry rejected");
                Err(e)
            }
        }
    }

    /// Case-insensitive find, else create as a system category
    pub async fn get_or_create_category(&self, name: &str, kind: TransactionKind) -> Result<Category, LedgerError> {
        if name.trim().is_empty() {
            return Err(LedgerError::Validation("category name is required".to_string()));
        }
        if let Some(existing) = self.categories.find_by_name(name).await? {
            return Self::ensure_kind(existing, kind);
        }

        let category = Category::system(name, kind);
        match self.categories.insert(&category).await {
            Ok(()) => {
                info!(category_id = %category.id, name = %category.name, "System category created");
                Ok(category)
            }
            // Lost a race with a concurrent creator
            Err(PortError::Duplicate { .. }) => {
                let existing = self
                    .categories
                    .find_by_name(name)
                    .await?
                    .ok_or_else(|| LedgerError::CategoryNotFound(name.to_string()))?;
                Self::ensure_kind(existing, kind)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Creates a user category
    pub async fn create_category(
        &self,
        name: &str,
        kind: TransactionKind,
        account_id: Option<AccountId>,
    ) -> Result<Category, LedgerError> {
        if name.trim().is_empty() {
            return Err(LedgerError::Validation("category name is required".to_string()));
        }
        let mut category = Category::new(name, kind);
        if let Some(account_id) = account_id {
            self.ledger.get_account(account_id).await?;
            category = category.with_account(account_id);
        }
        match self.categories.insert(&category).await {
            Ok(()) => Ok(category),
            Err(PortError::Duplicate { .. }) => Err(LedgerError::CategoryExists(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Renames a user category
    pub async fn rename_category(&self, id: CategoryId, name: &str) -> Result<Category, LedgerError> {
        let mut category = self.load_category(id).await?;
        category.ensure_editable()?;
        if name.trim().is_empty() {
            return Err(LedgerError::Validation("category name is required".to_string()));
        }
        category.name = name.trim().to_string();
        match self.categories.update(&category).await {
            Ok(()) => Ok(category),
            Err(PortError::Duplicate { .. }) => Err(LedgerError::CategoryExists(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes a user category
    pub async fn delete_category(&self, id: CategoryId) -> Result<(), LedgerError> {
        let category = self.load_category(id).await?;
        category.ensure_editable()?;
        self.categories.delete(id).await?;
        Ok(())
    }

    /// Lists categories
    pub async fn list_categories(&self) -> Result<Vec<Category>, LedgerError> {
        Ok(self.categories.list().await?)
    }

    fn ensure_kind(category: Category, kind: TransactionKind) -> Result<Category, LedgerError> {
        if category.kind != kind {
            return Err(LedgerError::Validation(format!(
                "category {} already exists for {:?} transactions",
                category.name, category.kind
            )));
        }
        Ok(category)
    }

    fn manual_batch(&self, transaction: &Transaction, category: &Category) -> Result<PostingBatch, LedgerError> {
        let method = transaction.payment_method.ok_or_else(|| {
            LedgerError::Validation(format!("transaction {} has no payment method", transaction.id))
        })?;
        let money_account = self.accounts.settlement_account(method);
        let batch = PostingBatch::new(
            transaction.description.clone(),
            SourceType::Manual,
            transaction.id.to_string(),
        )
        .dated(transaction.transaction_date)
        .with_idempotency_key(transaction.posting_key());

        Ok(match transaction.kind {
            TransactionKind::Income => batch
                .debit(money_account, transaction.amount)
                .credit(category.account_id.unwrap_or(self.accounts.sales_revenue), transaction.amount),
            TransactionKind::Expense => batch
                .debit(category.account_id.unwrap_or(self.accounts.operating_expense), transaction.amount)
                .credit(money_account, transaction.amount),
        })
    }

    /// Where a recorded transaction stands with the ledger
    async fn outcome_of(&self, transaction: &Transaction) -> Result<LedgerOutcome, LedgerError> {
        if let Some(batch_id) = transaction.posting_batch_id {
            return Ok(LedgerOutcome::Posted { batch_id });
        }
        // Withdrawn before it ever reached the ledger
        if transaction.lifecycle.is_deleted() {
            return Ok(LedgerOutcome::NotRequired);
        }
        let key = transaction.posting_key();
        if self.pending.get(&key).await?.is_some() {
            return Ok(LedgerOutcome::Pending { key });
        }
        Ok(LedgerOutcome::Failed {
            reason: format!("no ledger batch for {} and nothing queued", key),
        })
    }

    /// Continues an event whose transaction is already recorded
    ///
    /// A transaction left with neither a batch nor a queue entry is posted
    /// again under its idempotency key.
    async fn resume_event(&self, existing: Transaction, event: &BusinessEvent) -> Result<PostedEvent, LedgerError> {
        let ledger = self.outcome_of(&existing).await?;
        if !matches!(ledger, LedgerOutcome::Failed { .. }) {
            return Ok(PostedEvent {
                transaction: Some(existing),
                ledger,
            });
        }

        warn!(transaction_id = %existing.id, "Recorded event never reached the ledger; posting again");
        let batch = event.batch(&self.accounts).with_idempotency_key(existing.posting_key());
        self.post_event_batch(existing, batch).await
    }

    /// Posts an event batch for a recorded transaction, queueing it on any failure
    async fn post_event_batch(&self, transaction: Transaction, batch: PostingBatch) -> Result<PostedEvent, LedgerError> {
        let key = transaction.posting_key();
        let cause = match self.ledger.post_batch(batch.clone()).await {
            Ok(receipt) => match self.attach_batch(transaction.id, receipt.batch_id).await {
                Ok(transaction) => {
                    info!(
                        transaction_id = %transaction.id,
                        batch_id = %receipt.batch_id,
                        source_type = %transaction.source_type,
                        "Business event posted"
                    );
                    return Ok(PostedEvent {
                        transaction: Some(transaction),
                        ledger: LedgerOutcome::Posted { batch_id: receipt.batch_id },
                    });
                }
                // The batch landed; replaying its key from the queue reattaches it
                Err(e) => e,
            },
            Err(e) => {
                if !e.is_transient() {
                    error!(transaction_id = %transaction.id, error = %e, "Business event posting rejected by ledger");
                }
                e
            }
        };

        self.enqueue(key.clone(), Some(transaction.id), PendingAction::Post { batch }, &cause)
            .await?;
        Ok(PostedEvent {
            transaction: Some(transaction),
            ledger: LedgerOutcome::Pending { key },
        })
    }

    async fn enqueue(
        &self,
        key: String,
        transaction_id: Option<TransactionId>,
        action: PendingAction,
        cause: &LedgerError,
    ) -> Result<(), LedgerError> {
        warn!(key = %key, error = %cause, "Ledger call queued for retry");
        self.pending
            .enqueue(PendingPosting {
                key,
                transaction_id,
                action,
                queued_at: Utc::now(),
                attempts: 1,
                last_error: cause.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn settle_pending(
        &self,
        action: &PendingAction,
        transaction_id: TransactionId,
        receipt: &PostingReceipt,
    ) -> Result<(), LedgerError> {
        match action {
            PendingAction::Post { .. } => {
                self.attach_batch(transaction_id, receipt.batch_id).await?;
            }
            PendingAction::Reverse { .. } => {
                self.mark_reversed(transaction_id, receipt.batch_id).await?;
            }
        }
        Ok(())
    }

    async fn attach_batch(&self, id: TransactionId, batch_id: PostingBatchId) -> Result<Transaction, LedgerError> {
        retry_on_conflict::<_, LedgerError, _, _>(self.retry, "attach_batch", |_| async move {
            let mut transaction = self.load_transaction(id).await?;
            if transaction.posting_batch_id == Some(batch_id) {
                return Ok(transaction);
            }
            transaction.attach_batch(batch_id);
            Ok(self.transactions.update(transaction).await?)
        })
        .await
    }

    async fn mark_reversed(&self, id: TransactionId, reversal: PostingBatchId) -> Result<Transaction, LedgerError> {
        retry_on_conflict::<_, LedgerError, _, _>(self.retry, "mark_reversed", |_| async move {
            let mut transaction = self.load_transaction(id).await?;
            if transaction.reversal_batch_id == Some(reversal) {
                return Ok(transaction);
            }
            transaction.mark_reversed(reversal)?;
            Ok(self.transactions.update(transaction).await?)
        })
        .await
    }

    async fn cancel_unposted(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        retry_on_conflict::<_, LedgerError, _, _>(self.retry, "cancel_unposted", |_| async move {
            let mut transaction = self.load_transaction(id).await?;
            if transaction.lifecycle.is_deleted() {
                return Ok(transaction);
            }
            transaction.cancel_unposted()?;
            Ok(self.transactions.update(transaction).await?)
        })
        .await
    }

    async fn load_transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        match self.transactions.get(id).await {
            Ok(t) => Ok(t),
            Err(e) if e.is_not_found() => Err(LedgerError::TransactionNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_category(&self, id: CategoryId) -> Result<Category, LedgerError> {
        match self.categories.get(id).await {
            Ok(c) => Ok(c),
            Err(e) if e.is_not_found() => Err(LedgerError::CategoryNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{
        InMemoryCategoryRepository, InMemoryLedger, InMemoryPendingPostingStore, InMemoryTransactionRepository,
    };
    use rust_decimal_macros::dec;

    async fn poster() -> (TransactionPoster, Arc<InMemoryLedger>, PostingAccounts) {
        let ledger = Arc::new(InMemoryLedger::with_standard_chart(Currency::USD));
        let accounts = PostingAccounts::resolve(ledger.as_ref()).await.unwrap();
        let poster = TransactionPoster::new(
            ledger.clone(),
            Arc::new(InMemoryTransactionRepository::new()),
            Arc::new(InMemoryCategoryRepository::new()),
            Arc::new(InMemoryPendingPostingStore::new()),
            accounts,
        );
        (poster, ledger, accounts)
    }

    fn usd(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::USD)
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[tokio::test]
    async fn test_invoice_created_posting() {
        let (poster, ledger, accounts) = poster().await;

        let posted = poster
            .record_event(BusinessEvent::InvoiceCreated {
                invoice_id: InvoiceId::new(),
                reference: "INV-0001".to_string(),
                date: today(),
                subtotal: usd(dec!(450.00)),
                tax: usd(dec!(50.00)),
                total: usd(dec!(500.00)),
            })
            .await
            .unwrap();

        assert!(matches!(posted.ledger, LedgerOutcome::Posted { .. }));
        let tx = posted.transaction.unwrap();
        assert_eq!(tx.status, TransactionStatus::Posted);
        assert_eq!(tx.source_type, SourceType::Invoice);

        assert_eq!(ledger.account_balance(accounts.receivables, None).await.unwrap().amount(), dec!(500.00));
        assert_eq!(ledger.account_balance(accounts.sales_revenue, None).await.unwrap().amount(), dec!(450.00));
        assert_eq!(ledger.account_balance(accounts.tax_payable, None).await.unwrap().amount(), dec!(50.00));
    }

    #[tokio::test]
    async fn test_same_event_recorded_once() {
        let (poster, ledger, accounts) = poster().await;
        let event = BusinessEvent::PaymentReceived {
            invoice_id: InvoiceId::new(),
            payment_id: PaymentId::new(),
            amount: usd(dec!(300.00)),
            method: PaymentMethod::Cash,
            date: today(),
        };

        let first = poster.record_event(event.clone()).await.unwrap();
        let second = poster.record_event(event).await.unwrap();

        assert_eq!(first.ledger, second.ledger);
        assert_eq!(ledger.account_balance(accounts.cash, None).await.unwrap().amount(), dec!(300.00));
    }

    #[tokio::test]
    async fn test_manual_transaction_workflow() {
        let (poster, ledger, accounts) = poster().await;
        let category = poster.create_category("Rent", TransactionKind::Expense, None).await.unwrap();

        let draft = poster
            .create_transaction(NewTransaction {
                kind: TransactionKind::Expense,
                category_id: category.id,
                amount: usd(dec!(1200.00)),
                transaction_date: today(),
                payment_method: PaymentMethod::BankTransfer,
                description: "Office rent".to_string(),
            })
            .await
            .unwrap();
        assert!(ledger.account_balance(accounts.operating_expense, None).await.unwrap().is_zero());

        let posted = poster.post_transaction(draft.id).await.unwrap();
        let again = poster.post_transaction(draft.id).await.unwrap();
        assert_eq!(posted.ledger, again.ledger);
        assert_eq!(ledger.account_balance(accounts.operating_expense, None).await.unwrap().amount(), dec!(1200.00));
        assert_eq!(ledger.account_balance(accounts.bank, None).await.unwrap().amount(), dec!(-1200.00));

        assert!(matches!(poster.delete_transaction(draft.id).await, Err(LedgerError::AlreadyClosed(_))));

        let reversed = poster.reverse_transaction(draft.id, "wrong month").await.unwrap();
        assert!(reversed.is_reversed());
        assert!(ledger.account_balance(accounts.operating_expense, None).await.unwrap().is_zero());
        assert!(matches!(
            poster.reverse_transaction(draft.id, "again").await,
            Err(LedgerError::AlreadyClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_get_or_create_category_is_case_insensitive() {
        let (poster, _, _) = poster().await;
        let first = poster.get_or_create_category("Utilities", TransactionKind::Expense).await.unwrap();
        let second = poster.get_or_create_category("UTILITIES", TransactionKind::Expense).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(first.is_system_category);
        assert!(matches!(
            poster.rename_category(first.id, "Power").await,
            Err(LedgerError::SystemCategory(_))
        ));
        assert!(matches!(poster.delete_category(first.id).await, Err(LedgerError::SystemCategory(_))));
    }

    #[tokio::test]
    async fn test_unbalanced_journal_entry_rejected() {
        let (poster, ledger, accounts) = poster().await;
        let batch = PostingBatch::new("Manual JE", SourceType::JournalEntry, "JE-1")
            .debit(accounts.cash, usd(dec!(1000.00)))
            .credit(accounts.sales_revenue, usd(dec!(900.00)));

        let result = poster.post_journal_entry(batch).await;
        assert!(matches!(result, Err(LedgerError::UnbalancedPosting { .. })));
        assert!(ledger.account_balance(accounts.cash, None).await.unwrap().is_zero());
        assert!(ledger.trial_balance(None).await.unwrap().lines.is_empty());
    }
}
