//! Vendor payments against received GRNs
//!
//! Same rules as customer payments on invoices, on the payable side: no
//! overpayment, append-only, status derived from the payment list.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use core_kernel::{retry_on_conflict, GrnId, RetryPolicy};
use domain_ledger::{BusinessEvent, Committed, TransactionPoster};

use crate::error::PurchaseError;
use crate::grn::{GoodsReceivedNote, GrnPayment, GrnPaymentDetails, NewGrnPayment};
use crate::ports::PurchaseRepository;

/// Owns GRN payment state
pub struct GrnPaymentTracker {
    purchases: Arc<dyn PurchaseRepository>,
    poster: Arc<TransactionPoster>,
    retry: RetryPolicy,
}

impl GrnPaymentTracker {
    pub fn new(purchases: Arc<dyn PurchaseRepository>, poster: Arc<TransactionPoster>) -> Self {
        Self {
            purchases,
            poster,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Records a vendor payment; the GRN must be received
    pub async fn record_payment(&self, id: GrnId, input: NewGrnPayment) -> Result<Committed<GrnPayment>, PurchaseError> {
        let (grn, payment) = retry_on_conflict::<_, PurchaseError, _, _>(self.retry, "record_grn_payment", |_| {
            let input = input.clone();
            async move {
                let mut grn = self.load(id).await?;
                let payment = grn.record_payment(input)?;
                let grn = self.purchases.update_grn(grn).await?;
                Ok((grn, payment))
            }
        })
        .await
        .inspect_err(|e| {
            if matches!(
                e,
                PurchaseError::Overpayment { .. } | PurchaseError::NotReceived(_) | PurchaseError::AlreadyClosed(_)
            ) {
                warn!(grn_id = %id, error = %e, "GRN payment rejected");
            }
        })?;

        info!(
            grn_id = %id,
            payment_id = %payment.id,
            amount = %payment.amount,
            balance_due = %grn.balance_due(),
            "GRN payment recorded"
        );

        let ledger = self
            .poster
            .post_after_commit(BusinessEvent::GrnPaid {
                grn_id: id,
                payment_id: payment.id,
                amount: payment.amount,
                method: payment.method,
                date: payment.paid_at.date_naive(),
            })
            .await;
        Ok(Committed::new(payment, ledger))
    }

    /// Current payable figures
    pub async fn get_payment_details(&self, id: GrnId) -> Result<GrnPaymentDetails, PurchaseError> {
        let grn = self.load_active(id).await?;
        Ok(grn.payment_details(Utc::now().date_naive()))
    }

    /// Payments in the order they were recorded
    pub async fn list_payments(&self, id: GrnId) -> Result<Vec<GrnPayment>, PurchaseError> {
        Ok(self.load_active(id).await?.payments)
    }

    async fn load_active(&self, id: GrnId) -> Result<GoodsReceivedNote, PurchaseError> {
        let grn = self.load(id).await?;
        if grn.is_deleted() {
            return Err(PurchaseError::GrnNotFound(id.to_string()));
        }
        Ok(grn)
    }

    async fn load(&self, id: GrnId) -> Result<GoodsReceivedNote, PurchaseError> {
        match self.purchases.get_grn(id).await {
            Ok(grn) => Ok(grn),
            Err(e) if e.is_not_found() => Err(PurchaseError::GrnNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
