//! Scenario tests for the ledger and the transaction poster
//!
//! Covers the pending queue when the ledger is unreachable, document
//! reversal, and balance invariants under random postings.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use core_kernel::{
    AccountId, Currency, DomainPort, GrnId, HealthCheckResult, HealthCheckable, InvoiceId, Money,
    PortError, PostingBatchId, SettlementMode,
};
use domain_ledger::{
    Account, BusinessEvent, GeneralLedgerEntry, InMemoryCategoryRepository, InMemoryLedger,
    InMemoryPendingPostingStore, InMemoryTransactionRepository, LedgerError, LedgerOutcome, LedgerPort,
    MoneyLedger, PendingAction, PendingPostingStore, PostingAccounts, PostingBatch, PostingReceipt, SourceType,
    StandardChartOfAccounts, TransactionPoster, TrialBalance,
};

/// Ledger that can be switched off to simulate an outage
struct FlakyLedger {
    inner: InMemoryLedger,
    down: AtomicBool,
}

impl FlakyLedger {
    fn new() -> Self {
        Self {
            inner: InMemoryLedger::with_standard_chart(Currency::USD),
            down: AtomicBool::new(false),
        }
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), LedgerError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(PortError::ServiceUnavailable {
                service: "ledger".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl DomainPort for FlakyLedger {}

#[async_trait]
impl HealthCheckable for FlakyLedger {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("flaky-ledger")
    }
}

#[async_trait]
impl LedgerPort for FlakyLedger {
    fn currency(&self) -> Currency {
        self.inner.currency()
    }

    async fn add_account(&self, account: Account) -> Result<Account, LedgerError> {
        self.check()?;
        self.inner.add_account(account).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.check()?;
        self.inner.get_account(id).await
    }

    async fn find_account_by_code(&self, code: &str) -> Result<Option<Account>, LedgerError> {
        self.check()?;
        self.inner.find_account_by_code(code).await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        self.check()?;
        self.inner.list_accounts().await
    }

    async fn change_account_code(&self, id: AccountId, new_code: &str) -> Result<Account, LedgerError> {
        self.check()?;
        self.inner.change_account_code(id, new_code).await
    }

    async fn deactivate_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.check()?;
        self.inner.deactivate_account(id).await
    }

    async fn post_batch(&self, batch: PostingBatch) -> Result<PostingReceipt, LedgerError> {
        self.check()?;
        self.inner.post_batch(batch).await
    }

    async fn reverse_batch(
        &self,
        batch_id: PostingBatchId,
        reason: &str,
        date: NaiveDate,
    ) -> Result<PostingReceipt, LedgerError> {
        self.check()?;
        self.inner.reverse_batch(batch_id, reason, date).await
    }

    async fn batch_entries(&self, batch_id: PostingBatchId) -> Result<Vec<GeneralLedgerEntry>, LedgerError> {
        self.check()?;
        self.inner.batch_entries(batch_id).await
    }

    async fn account_balance(&self, id: AccountId, as_of: Option<NaiveDate>) -> Result<Money, LedgerError> {
        self.inner.account_balance(id, as_of).await
    }

    async fn trial_balance(&self, as_of: Option<NaiveDate>) -> Result<TrialBalance, LedgerError> {
        self.inner.trial_balance(as_of).await
    }
}

async fn flaky_poster() -> (TransactionPoster, Arc<FlakyLedger>, PostingAccounts) {
    let ledger = Arc::new(FlakyLedger::new());
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

fn usd(amount: Decimal) -> Money {
    Money::new(amount, Currency::USD)
}

fn goods_received(total: Decimal) -> BusinessEvent {
    BusinessEvent::GoodsReceived {
        grn_id: GrnId::new(),
        reference: "GRN-0001".to_string(),
        date: Utc::now().date_naive(),
        total: usd(total),
        settlement: SettlementMode::OnAccount,
    }
}

#[tokio::test]
async fn test_outage_queues_posting_and_retry_drains_it() {
    let (poster, ledger, accounts) = flaky_poster().await;
    ledger.set_down(true);
    let posted = poster.record_event(goods_received(dec!(750.00))).await.unwrap();

    let key = match &posted.ledger {
        LedgerOutcome::Pending { key } => key.clone(),
        other => panic!("expected pending outcome, got {:?}", other),
    };
    assert!(posted.transaction.as_ref().unwrap().posting_batch_id.is_none());
    assert_eq!(poster.pending_postings().await.unwrap().len(), 1);
    assert!(ledger.account_balance(accounts.inventory, None).await.unwrap().is_zero());

    // Still down: nothing dropped, failure recorded
    let report = poster.retry_pending().await.unwrap();
    assert_eq!(report.still_pending, vec![key.clone()]);
    let queued = poster.pending_postings().await.unwrap();
    assert_eq!(queued[0].attempts, 2);

    ledger.set_down(false);
    let report = poster.retry_pending().await.unwrap();
    assert_eq!(report.posted, vec![key]);
    assert!(poster.pending_postings().await.unwrap().is_empty());
    assert_eq!(ledger.account_balance(accounts.inventory, None).await.unwrap().amount(), dec!(750.00));
    assert_eq!(ledger.account_balance(accounts.payables, None).await.unwrap().amount(), dec!(750.00));

    let tx_id = posted.transaction.unwrap().id;
    assert!(poster.get_transaction(tx_id).await.unwrap().posting_batch_id.is_some());

    // A second drain has nothing to do and does not double post
    let report = poster.retry_pending().await.unwrap();
    assert!(report.posted.is_empty());
    assert_eq!(ledger.account_balance(accounts.inventory, None).await.unwrap().amount(), dec!(750.00));
}

#[tokio::test]
async fn test_reverse_document_cancels_queued_posting() {
    let (poster, ledger, accounts) = flaky_poster().await;
    let invoice_id = InvoiceId::new();
    let event = BusinessEvent::InvoiceCreated {
        invoice_id,
        reference: "INV-7".to_string(),
        date: Utc::now().date_naive(),
        subtotal: usd(dec!(100)),
        tax: usd(dec!(0)),
        total: usd(dec!(100)),
    };

    ledger.set_down(true);
    poster.record_event(event.clone()).await.unwrap();

    let outcome = poster
        .reverse_document(SourceType::Invoice, &invoice_id.to_string(), "invoice deleted")
        .await
        .unwrap();
    assert_eq!(outcome, LedgerOutcome::NotRequired);
    assert!(poster.pending_postings().await.unwrap().is_empty());

    // The withdrawn invoice is not posted later
    ledger.set_down(false);
    let again = poster.record_event(event).await.unwrap();
    assert_eq!(again.ledger, LedgerOutcome::NotRequired);
    assert!(ledger.account_balance(accounts.receivables, None).await.unwrap().is_zero());
}

#[tokio::test]
async fn test_reverse_document_queues_reversal_during_outage() {
    let (poster, ledger, accounts) = flaky_poster().await;
    let invoice_id = InvoiceId::new();

    poster
        .record_event(BusinessEvent::InvoiceCreated {
            invoice_id,
            reference: "INV-8".to_string(),
            date: Utc::now().date_naive(),
            subtotal: usd(dec!(200)),
            tax: usd(dec!(20)),
            total: usd(dec!(220)),
        })
        .await
        .unwrap();

    ledger.set_down(true);
    let outcome = poster
        .reverse_document(SourceType::Invoice, &invoice_id.to_string(), "invoice deleted")
        .await
        .unwrap();
    assert!(matches!(outcome, LedgerOutcome::Pending { .. }));
    let queued = poster.pending_postings().await.unwrap();
    assert!(matches!(queued[0].action, PendingAction::Reverse { .. }));

    ledger.set_down(false);
    poster.retry_pending().await.unwrap();
    assert!(ledger.account_balance(accounts.receivables, None).await.unwrap().is_zero());
    assert!(ledger.account_balance(accounts.tax_payable, None).await.unwrap().is_zero());
}

#[tokio::test]
async fn test_rejected_posting_after_commit_is_queued_with_reason() {
    let ledger = Arc::new(InMemoryLedger::with_standard_chart(Currency::USD));
    let accounts = PostingAccounts::resolve(ledger.as_ref()).await.unwrap();
    ledger.deactivate_account(accounts.inventory).await.unwrap();

    let poster = TransactionPoster::new(
        ledger.clone(),
        Arc::new(InMemoryTransactionRepository::new()),
        Arc::new(InMemoryCategoryRepository::new()),
        Arc::new(InMemoryPendingPostingStore::new()),
        accounts,
    );

    let event = goods_received(dec!(10));
    let first = poster.post_after_commit(event.clone()).await;
    let key = match &first {
        LedgerOutcome::Pending { key } => key.clone(),
        other => panic!("expected pending outcome, got {:?}", other),
    };

    // Asking again reports the same queued posting, backed by a real entry
    let second = poster.post_after_commit(event).await;
    assert_eq!(second, LedgerOutcome::Pending { key: key.clone() });

    let queued = poster.pending_postings().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].key, key);
    assert!(queued[0].last_error.contains("inactive"));

    let report = poster.retry_pending().await.unwrap();
    assert_eq!(report.still_pending, vec![key]);
    assert!(ledger.account_balance(accounts.payables, None).await.unwrap().is_zero());
}

#[tokio::test]
async fn test_recorded_event_missing_from_ledger_and_queue_is_posted_again() {
    let ledger = Arc::new(FlakyLedger::new());
    let accounts = PostingAccounts::resolve(ledger.as_ref()).await.unwrap();
    let pending = Arc::new(InMemoryPendingPostingStore::new());
    let poster = TransactionPoster::new(
        ledger.clone(),
        Arc::new(InMemoryTransactionRepository::new()),
        Arc::new(InMemoryCategoryRepository::new()),
        pending.clone(),
        accounts,
    );

    let event = goods_received(dec!(40));
    ledger.set_down(true);
    let queued = poster.record_event(event.clone()).await.unwrap();
    let LedgerOutcome::Pending { key } = queued.ledger else {
        panic!("expected pending outcome");
    };

    // Queue entry lost: the transaction has no batch and nothing will retry it
    pending.remove(&key).await.unwrap();
    ledger.set_down(false);

    let repaired = poster.record_event(event).await.unwrap();
    assert!(matches!(repaired.ledger, LedgerOutcome::Posted { .. }));
    assert_eq!(repaired.transaction.unwrap().id, queued.transaction.unwrap().id);
    assert_eq!(ledger.account_balance(accounts.inventory, None).await.unwrap().amount(), dec!(40));
    assert!(poster.pending_postings().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_reversal_is_queued() {
    let ledger = Arc::new(InMemoryLedger::with_standard_chart(Currency::USD));
    let accounts = PostingAccounts::resolve(ledger.as_ref()).await.unwrap();
    let poster = TransactionPoster::new(
        ledger.clone(),
        Arc::new(InMemoryTransactionRepository::new()),
        Arc::new(InMemoryCategoryRepository::new()),
        Arc::new(InMemoryPendingPostingStore::new()),
        accounts,
    );

    let event = goods_received(dec!(25));
    let (_, grn_id) = event.source();
    poster.record_event(event).await.unwrap();
    ledger.deactivate_account(accounts.inventory).await.unwrap();

    let outcome = poster.reverse_after_commit(SourceType::Grn, &grn_id, "GRN withdrawn").await;
    assert!(matches!(outcome, LedgerOutcome::Pending { .. }));
    let queued = poster.pending_postings().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert!(matches!(queued[0].action, PendingAction::Reverse { .. }));
}

#[test]
fn test_standard_chart_is_resolvable() {
    let ledger = MoneyLedger::with_standard_chart(Currency::USD);
    for code in [
        StandardChartOfAccounts::CASH,
        StandardChartOfAccounts::BANK,
        StandardChartOfAccounts::ACCOUNTS_RECEIVABLE,
        StandardChartOfAccounts::INVENTORY,
        StandardChartOfAccounts::ACCOUNTS_PAYABLE,
        StandardChartOfAccounts::TAX_PAYABLE,
        StandardChartOfAccounts::SALES_REVENUE,
        StandardChartOfAccounts::OPERATING_EXPENSE,
    ] {
        assert!(ledger.find_account_by_code(code).is_some(), "missing {}", code);
    }
}

proptest! {
    /// Whatever mix of balanced batches is posted, the trial balance balances
    #[test]
    fn prop_trial_balance_always_balances(
        postings in prop::collection::vec((0usize..11, 0usize..11, 1i64..1_000_000i64), 1..30)
    ) {
        let mut ledger = MoneyLedger::with_standard_chart(Currency::USD);
        let accounts = ledger.accounts();

        for (from, to, cents) in postings {
            if from == to {
                continue;
            }
            let amount = Money::from_minor(cents, Currency::USD);
            let batch = PostingBatch::new("random", SourceType::Manual, "P")
                .debit(accounts[from].id, amount)
                .credit(accounts[to].id, amount);
            prop_assert!(ledger.post(batch).is_ok());
        }

        let tb = ledger.trial_balance(None);
        prop_assert!(tb.is_balanced);
        prop_assert_eq!(tb.total_debits, tb.total_credits);
    }

    /// Any batch whose debits and credits differ is rejected without effect
    #[test]
    fn prop_unbalanced_batches_leave_no_trace(debit in 1i64..1_000_000i64, delta in 1i64..1000i64) {
        let mut ledger = MoneyLedger::with_standard_chart(Currency::USD);
        let accounts = ledger.accounts();

        let batch = PostingBatch::new("bad", SourceType::JournalEntry, "JE")
            .debit(accounts[0].id, Money::from_minor(debit, Currency::USD))
            .credit(accounts[1].id, Money::from_minor(debit + delta, Currency::USD));

        let is_unbalanced = matches!(ledger.post(batch), Err(LedgerError::UnbalancedPosting { .. }));
        prop_assert!(is_unbalanced);
        prop_assert!(ledger.account_entries(&accounts[0].id).is_empty());
        prop_assert!(ledger.account_entries(&accounts[1].id).is_empty());
    }
}
