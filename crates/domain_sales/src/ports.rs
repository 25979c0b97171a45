//! Sales Domain Ports
//!
//! `InvoiceRepository` loads and stores whole invoice aggregates, payments
//! included. `update` is compare-and-swap on the invoice version.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use core_kernel::{DomainPort, InvoiceId, PortError};

use crate::invoice::Invoice;

/// Storage for invoice aggregates
#[async_trait]
pub trait InvoiceRepository: DomainPort {
    /// Inserts a new invoice; a reused reference is `PortError::Duplicate`
    async fn insert(&self, invoice: &Invoice) -> Result<(), PortError>;

    /// Retrieves an invoice by ID, deleted invoices included
    async fn get(&self, id: InvoiceId) -> Result<Invoice, PortError>;

    /// Compare-and-swap update; returns the stored invoice
    async fn update(&self, invoice: Invoice) -> Result<Invoice, PortError>;
}

/// In-memory invoice repository
#[derive(Debug, Default)]
pub struct InMemoryInvoiceRepository {
    invoices: RwLock<HashMap<InvoiceId, Invoice>>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DomainPort for InMemoryInvoiceRepository {}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn insert(&self, invoice: &Invoice) -> Result<(), PortError> {
        let mut invoices = self.invoices.write().await;
        if invoices.values().any(|i| i.reference == invoice.reference) {
            return Err(PortError::duplicate("Invoice", &invoice.reference));
        }
        invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn get(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        self.invoices
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Invoice", id))
    }

    async fn update(&self, mut invoice: Invoice) -> Result<Invoice, PortError> {
        let mut invoices = self.invoices.write().await;
        let stored = invoices
            .get_mut(&invoice.id)
            .ok_or_else(|| PortError::not_found("Invoice", invoice.id))?;
        if stored.version != invoice.version {
            return Err(PortError::conflict("Invoice", invoice.id, invoice.version, stored.version));
        }
        invoice.version = invoice.version.next();
        *stored = invoice.clone();
        Ok(invoice)
    }
}
