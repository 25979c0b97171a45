//! Income/expense transaction records and their categories
//!
//! A [`Transaction`] is the business-level record of a financial event. Auto
//! events (invoice created, payments, goods received) are recorded already
//! Posted; manual income/expense starts as Draft and has no ledger effect
//! until it is posted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{
    AccountId, CategoryId, Lifecycle, Money, PaymentMethod, PostingBatchId, TransactionId, Version,
};

use crate::entry::SourceType;
use crate::error::LedgerError;

/// Direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Income,
    Expense,
}

/// Posting state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Editable; no ledger effect
    Draft,
    /// Immutable; has (or is queued for) a ledger posting
    Posted,
}

/// Input for a manual income/expense transaction
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub category_id: CategoryId,
    pub amount: Money,
    pub transaction_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub description: String,
}

/// A recorded income or expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub category_id: CategoryId,
    pub amount: Money,
    pub transaction_date: NaiveDate,
    /// How the money moved; absent for accruals such as invoicing
    pub payment_method: Option<PaymentMethod>,
    pub description: String,
    pub source_type: SourceType,
    pub source_id: Option<String>,
    pub status: TransactionStatus,
    /// Ledger batch once the posting reached the ledger
    pub posting_batch_id: Option<PostingBatchId>,
    /// Ledger batch that offset the posting
    pub reversal_batch_id: Option<PostingBatchId>,
    pub lifecycle: Lifecycle,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates a manual Draft transaction
    pub fn draft(input: NewTransaction) -> Result<Self, LedgerError> {
        if !input.amount.is_positive() {
            return Err(LedgerError::Validation(format!(
                "transaction amount must be positive, got {}",
                input.amount
            )));
        }
        if !input.amount.is_minor_unit_exact() {
            return Err(LedgerError::Validation(format!(
                "transaction amount {} has more precision than {} allows",
                input.amount.amount(),
                input.amount.currency()
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: TransactionId::new_v7(),
            kind: input.kind,
            category_id: input.category_id,
            amount: input.amount,
            transaction_date: input.transaction_date,
            payment_method: Some(input.payment_method),
            description: input.description,
            source_type: SourceType::Manual,
            source_id: None,
            status: TransactionStatus::Draft,
            posting_batch_id: None,
            reversal_batch_id: None,
            lifecycle: Lifecycle::Active,
            version: Version::initial(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Creates a record for an auto event; it starts Posted
    #[allow(clippy::too_many_arguments)]
    pub fn auto(
        kind: TransactionKind,
        category_id: CategoryId,
        amount: Money,
        transaction_date: NaiveDate,
        payment_method: Option<PaymentMethod>,
        description: impl Into<String>,
        source_type: SourceType,
        source_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new_v7(),
            kind,
            category_id,
            amount,
            transaction_date,
            payment_method,
            description: description.into(),
            source_type,
            source_id: Some(source_id.into()),
            status: TransactionStatus::Posted,
            posting_batch_id: None,
            reversal_batch_id: None,
            lifecycle: Lifecycle::Active,
            version: Version::initial(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true once the posting was offset by a reversal
    pub fn is_reversed(&self) -> bool {
        self.reversal_batch_id.is_some()
    }

    /// Idempotency key of the ledger posting for this transaction
    pub fn posting_key(&self) -> String {
        match &self.source_id {
            Some(source_id) if self.source_type != SourceType::Manual => {
                format!("{}:{}", self.source_type, source_id)
            }
            _ => format!("transaction:{}", self.id),
        }
    }

    fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.lifecycle.is_deleted() {
            return Err(LedgerError::AlreadyClosed(format!("transaction {} is deleted", self.id)));
        }
        Ok(())
    }

    /// Draft → Posted
    pub fn mark_posted(&mut self, batch_id: Option<PostingBatchId>) -> Result<(), LedgerError> {
        self.ensure_active()?;
        if self.status == TransactionStatus::Posted {
            return Err(LedgerError::AlreadyClosed(format!("transaction {} is already posted", self.id)));
        }
        self.status = TransactionStatus::Posted;
        self.posting_batch_id = batch_id;
        self.touch();
        Ok(())
    }

    /// Records the batch a queued posting finally landed in
    pub fn attach_batch(&mut self, batch_id: PostingBatchId) {
        self.posting_batch_id = Some(batch_id);
        self.touch();
    }

    /// Checks that the transaction can be reversed and returns its batch
    pub fn reversible_batch(&self) -> Result<PostingBatchId, LedgerError> {
        self.ensure_active()?;
        if self.status != TransactionStatus::Posted {
            return Err(LedgerError::Validation(format!(
                "transaction {} is a draft; delete it instead",
                self.id
            )));
        }
        if let Some(reversal) = self.reversal_batch_id {
            return Err(LedgerError::AlreadyClosed(format!(
                "transaction {} was already reversed by {}",
                self.id, reversal
            )));
        }
        self.posting_batch_id.ok_or_else(|| {
            LedgerError::AlreadyClosed(format!("transaction {} is still waiting for the ledger", self.id))
        })
    }

    /// Records the reversal batch
    pub fn mark_reversed(&mut self, reversal_batch_id: PostingBatchId) -> Result<(), LedgerError> {
        self.reversible_batch()?;
        self.reversal_batch_id = Some(reversal_batch_id);
        self.touch();
        Ok(())
    }

    /// Soft delete; only manual drafts qualify
    pub fn delete(&mut self) -> Result<(), LedgerError> {
        self.ensure_active()?;
        if self.status != TransactionStatus::Draft {
            return Err(LedgerError::AlreadyClosed(format!(
                "transaction {} is posted; reverse it instead",
                self.id
            )));
        }
        if self.source_type != SourceType::Manual {
            return Err(LedgerError::AlreadyClosed(format!(
                "transaction {} was generated from a {} and cannot be deleted",
                self.id, self.source_type
            )));
        }
        let now = Utc::now();
        self.lifecycle.delete(now)?;
        self.touch();
        Ok(())
    }

    /// Withdraws an auto transaction whose posting never reached the ledger
    pub fn cancel_unposted(&mut self) -> Result<(), LedgerError> {
        self.ensure_active()?;
        if let Some(batch_id) = self.posting_batch_id {
            return Err(LedgerError::AlreadyClosed(format!(
                "transaction {} is in ledger batch {}; reverse it instead",
                self.id, batch_id
            )));
        }
        self.lifecycle.delete(Utc::now())?;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A transaction category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub kind: TransactionKind,
    /// Created by the poster; user edits and deletes are refused
    pub is_system_category: bool,
    /// Account the income is credited to or the expense debited to
    pub account_id: Option<AccountId>,
}

impl Category {
    /// Creates a user category
    pub fn new(name: impl Into<String>, kind: TransactionKind) -> Self {
        Self {
            id: CategoryId::new(),
            name: name.into().trim().to_string(),
            kind,
            is_system_category: false,
            account_id: None,
        }
    }

    /// Creates a system category
    pub fn system(name: impl Into<String>, kind: TransactionKind) -> Self {
        Self {
            is_system_category: true,
            ..Self::new(name, kind)
        }
    }

    /// Sets the ledger account for the category
    pub fn with_account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Case-insensitive name comparison
    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }

    /// Refuses changes to system categories
    pub fn ensure_editable(&self) -> Result<(), LedgerError> {
        if self.is_system_category {
            return Err(LedgerError::SystemCategory(self.name.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    fn draft() -> Transaction {
        Transaction::draft(NewTransaction {
            kind: TransactionKind::Expense,
            category_id: CategoryId::new(),
            amount: Money::new(dec!(120.00), Currency::USD),
            transaction_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            payment_method: PaymentMethod::Cash,
            description: "Office supplies".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_draft_lifecycle() {
        let mut tx = draft();
        assert_eq!(tx.status, TransactionStatus::Draft);
        assert!(tx.reversible_batch().is_err());

        let batch = PostingBatchId::new();
        tx.mark_posted(Some(batch)).unwrap();
        assert!(matches!(tx.mark_posted(Some(batch)), Err(LedgerError::AlreadyClosed(_))));
        assert!(matches!(tx.delete(), Err(LedgerError::AlreadyClosed(_))));

        assert_eq!(tx.reversible_batch().unwrap(), batch);
        tx.mark_reversed(PostingBatchId::new()).unwrap();
        assert!(tx.is_reversed());
        assert!(matches!(tx.reversible_batch(), Err(LedgerError::AlreadyClosed(_))));
    }

    #[test]
    fn test_only_manual_drafts_delete() {
        let mut tx = draft();
        tx.delete().unwrap();
        assert!(tx.lifecycle.is_deleted());
        assert!(matches!(tx.delete(), Err(LedgerError::AlreadyClosed(_))));

        let mut auto = Transaction::auto(
            TransactionKind::Income,
            CategoryId::new(),
            Money::new(dec!(10), Currency::USD),
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            Some(PaymentMethod::Cash),
            "Payment",
            SourceType::Payment,
            "PAY-1",
        );
        assert!(matches!(auto.delete(), Err(LedgerError::AlreadyClosed(_))));
        assert_eq!(auto.posting_key(), "Payment:PAY-1");

        let mut landed = auto.clone();
        landed.attach_batch(PostingBatchId::new());
        assert!(matches!(landed.cancel_unposted(), Err(LedgerError::AlreadyClosed(_))));

        auto.cancel_unposted().unwrap();
        assert!(auto.lifecycle.is_deleted());
    }

    #[test]
    fn test_draft_rejects_non_positive() {
        let result = Transaction::draft(NewTransaction {
            kind: TransactionKind::Income,
            category_id: CategoryId::new(),
            amount: Money::zero(Currency::USD),
            transaction_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            payment_method: PaymentMethod::Cash,
            description: String::new(),
        });
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_category_guards() {
        let system = Category::system("Sales", TransactionKind::Income);
        assert!(system.has_name("  sales "));
        assert!(matches!(system.ensure_editable(), Err(LedgerError::SystemCategory(_))));
        assert!(Category::new("Rent", TransactionKind::Expense).ensure_editable().is_ok());
    }
}
