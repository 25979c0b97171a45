//! Invoice payment tracker
//!
//! Every mutation is load → validate → compare-and-swap write, rerun from the
//! top on a version conflict. Two payments racing for the same balance can
//! therefore never both pass the overpayment check: the loser reloads, sees
//! the smaller balance and is rejected.
//!
//! The ledger posting happens after the invoice commit. A ledger failure never
//! undoes the commit; it shows up in the returned [`LedgerOutcome`].

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use core_kernel::{retry_on_conflict, InvoiceId, PortError, RetryPolicy};
use domain_ledger::{BusinessEvent, Committed, LedgerOutcome, SourceType, TransactionPoster};

use crate::error::SalesError;
use crate::invoice::{Invoice, NewInvoice, NewPayment, Payment, PaymentDetails};
use crate::ports::InvoiceRepository;

/// Owns invoice payment state
pub struct InvoicePaymentTracker {
    invoices: Arc<dyn InvoiceRepository>,
    poster: Arc<TransactionPoster>,
    retry: RetryPolicy,
}

impl InvoicePaymentTracker {
    pub fn new(invoices: Arc<dyn InvoiceRepository>, poster: Arc<TransactionPoster>) -> Self {
        Self {
            invoices,
            poster,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the version-conflict retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Creates an invoice and posts it to receivables
    pub async fn create_invoice(&self, input: NewInvoice) -> Result<Committed<Invoice>, SalesError> {
        if input.currency != self.poster.currency() {
            return Err(SalesError::Validation(format!(
                "invoice is in {}, ledger currency is {}",
                input.currency,
                self.poster.currency()
            )));
        }
        let invoice = Invoice::create(input)?;
        match self.invoices.insert(&invoice).await {
            Ok(()) => {}
            Err(PortError::Duplicate { .. }) => return Err(SalesError::DuplicateReference(invoice.reference)),
            Err(e) => return Err(e.into()),
        }
        info!(invoice_id = %invoice.id, reference = %invoice.reference, total = %invoice.total(), "Invoice created");

        let ledger = self
            .poster
            .post_after_commit(BusinessEvent::InvoiceCreated {
                invoice_id: invoice.id,
                reference: invoice.reference.clone(),
                date: invoice.invoice_date,
                subtotal: invoice.subtotal(),
                tax: invoice.tax,
                total: invoice.total(),
            })
            .await;
        Ok(Committed::new(invoice, ledger))
    }

    /// Retrieves an active invoice
    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, SalesError> {
        let invoice = self.load(id).await?;
        if invoice.is_deleted() {
            return Err(SalesError::InvoiceNotFound(id.to_string()));
        }
        Ok(invoice)
    }

    /// Records a payment against an invoice
    ///
    /// Rejected with [`SalesError::Overpayment`] when the amount exceeds the
    /// balance due at commit time.
    pub async fn record_payment(&self, id: InvoiceId, input: NewPayment) -> Result<Committed<Payment>, SalesError> {
        let (invoice, payment) = retry_on_conflict::<_, SalesError, _, _>(self.retry, "record_payment", |_| {
            let input = input.clone();
            async move {
                let mut invoice = self.load(id).await?;
                let payment = invoice.record_payment(input)?;
                let invoice = self.invoices.update(invoice).await?;
                Ok((invoice, payment))
            }
        })
        .await
        .inspect_err(|e| {
            if matches!(e, SalesError::Overpayment { .. } | SalesError::AlreadyClosed(_)) {
                warn!(invoice_id = %id, error = %e, "Payment rejected");
            }
        })?;

        info!(
            invoice_id = %id,
            payment_id = %payment.id,
            amount = %payment.amount,
            balance_due = %invoice.balance_due(),
            "Payment recorded"
        );

        let ledger = self
            .poster
            .post_after_commit(BusinessEvent::PaymentReceived {
                invoice_id: id,
                payment_id: payment.id,
                amount: payment.amount,
                method: payment.method,
                date: payment.paid_at.date_naive(),
            })
            .await;
        Ok(Committed::new(payment, ledger))
    }

    /// Current totals and status
    pub async fn get_payment_details(&self, id: InvoiceId) -> Result<PaymentDetails, SalesError> {
        let invoice = self.get_invoice(id).await?;
        Ok(invoice.payment_details(Utc::now().date_naive()))
    }

    /// Payments in the order they were recorded
    pub async fn list_payments(&self, id: InvoiceId) -> Result<Vec<Payment>, SalesError> {
        Ok(self.get_invoice(id).await?.payments)
    }

    /// Soft-deletes an unpaid invoice and reverses its posting
    pub async fn delete_invoice(&self, id: InvoiceId, reason: &str) -> Result<Committed<Invoice>, SalesError> {
        let invoice = retry_on_conflict::<_, SalesError, _, _>(self.retry, "delete_invoice", |_| async move {
            let mut invoice = self.load(id).await?;
            if let Err(e) = invoice.delete() {
                warn!(invoice_id = %id, error = %e, "Invoice delete rejected");
                return Err(e);
            }
            Ok(self.invoices.update(invoice).await?)
        })
        .await?;
        info!(invoice_id = %id, reference = %invoice.reference, reason, "Invoice deleted");

        let ledger = if invoice.total().is_zero() {
            LedgerOutcome::NotRequired
        } else {
            self.poster
                .reverse_after_commit(SourceType::Invoice, &id.to_string(), reason)
                .await
        };
        Ok(Committed::new(invoice, ledger))
    }

    async fn load(&self, id: InvoiceId) -> Result<Invoice, SalesError> {
        match self.invoices.get(id).await {
            Ok(invoice) => Ok(invoice),
            Err(e) if e.is_not_found() => Err(SalesError::InvoiceNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
