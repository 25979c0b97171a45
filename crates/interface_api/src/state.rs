//! Application state wiring
//!
//! Both backends end in the same set of trackers; only the ports differ.

use std::sync::Arc;

use tracing::info;

use core_kernel::Currency;
use domain_ledger::{
    CategoryRepository, InMemoryCategoryRepository, InMemoryLedger, InMemoryPendingPostingStore,
    InMemoryTransactionRepository, LedgerError, LedgerPort, PendingPostingStore, PostingAccounts, TransactionPoster,
    TransactionRepository,
};
use domain_purchase::{GrnPaymentTracker, InMemoryPurchaseRepository, PurchaseFulfillmentTracker, PurchaseRepository};
use domain_sales::{InMemoryInvoiceRepository, InvoicePaymentTracker, InvoiceRepository};
use infra_db::{
    DatabasePool, PostgresCategoryRepository, PostgresInvoiceRepository, PostgresLedgerAdapter,
    PostgresPendingPostingStore, PostgresPurchaseRepository, PostgresTransactionRepository,
};

use crate::config::ApiConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub invoices: Arc<InvoicePaymentTracker>,
    pub fulfillment: Arc<PurchaseFulfillmentTracker>,
    pub grn_payments: Arc<GrnPaymentTracker>,
    pub poster: Arc<TransactionPoster>,
    pub config: ApiConfig,
}

/// The ports one backend provides
pub struct Ports {
    pub ledger: Arc<dyn LedgerPort>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub pending: Arc<dyn PendingPostingStore>,
    pub invoices: Arc<dyn InvoiceRepository>,
    pub purchases: Arc<dyn PurchaseRepository>,
}

impl Ports {
    /// Process-local ports over a ledger seeded with the standard chart
    pub fn in_memory(currency: Currency) -> Self {
        Self {
            ledger: Arc::new(InMemoryLedger::with_standard_chart(currency)),
            transactions: Arc::new(InMemoryTransactionRepository::new()),
            categories: Arc::new(InMemoryCategoryRepository::new()),
            pending: Arc::new(InMemoryPendingPostingStore::new()),
            invoices: Arc::new(InMemoryInvoiceRepository::new()),
            purchases: Arc::new(InMemoryPurchaseRepository::new()),
        }
    }

    /// PostgreSQL ports; seeds any missing standard accounts
    pub async fn postgres(pool: DatabasePool, currency: Currency) -> Result<Self, LedgerError> {
        let ledger = PostgresLedgerAdapter::new(pool.clone(), currency);
        let seeded = ledger.seed_standard_chart().await?;
        if seeded > 0 {
            info!(seeded, "Standard chart of accounts seeded");
        }
        Ok(Self {
            ledger: Arc::new(ledger),
            transactions: Arc::new(PostgresTransactionRepository::new(pool.clone())),
            categories: Arc::new(PostgresCategoryRepository::new(pool.clone())),
            pending: Arc::new(PostgresPendingPostingStore::new(pool.clone())),
            invoices: Arc::new(PostgresInvoiceRepository::new(pool.clone())),
            purchases: Arc::new(PostgresPurchaseRepository::new(pool)),
        })
    }
}

impl AppState {
    /// Builds the trackers over `ports`
    pub async fn new(ports: Ports, config: ApiConfig) -> Result<Self, LedgerError> {
        let accounts = PostingAccounts::resolve(ports.ledger.as_ref()).await?;
        let retry = config.retry_policy();

        let poster = Arc::new(
            TransactionPoster::new(ports.ledger, ports.transactions, ports.categories, ports.pending, accounts)
                .with_retry_policy(retry),
        );
        let invoices = InvoicePaymentTracker::new(ports.invoices, poster.clone()).with_retry_policy(retry);
        let fulfillment =
            PurchaseFulfillmentTracker::new(ports.purchases.clone(), poster.clone()).with_retry_policy(retry);
        let grn_payments = GrnPaymentTracker::new(ports.purchases, poster.clone()).with_retry_policy(retry);

        Ok(Self {
            invoices: Arc::new(invoices),
            fulfillment: Arc::new(fulfillment),
            grn_payments: Arc::new(grn_payments),
            poster,
            config,
        })
    }

    /// State over in-memory ports
    pub async fn in_memory(config: ApiConfig) -> Result<Self, LedgerError> {
        let currency = config.ledger_currency()?;
        Self::new(Ports::in_memory(currency), config).await
    }

    /// Ledger currency documents must be in
    pub fn currency(&self) -> Currency {
        self.poster.currency()
    }
}
