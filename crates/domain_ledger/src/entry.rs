//! Posting batches and general ledger entries
//!
//! A [`PostingBatch`] is what callers hand to the ledger: a description, a
//! source document and a set of debit/credit lines. Once accepted, each line
//! becomes one immutable [`GeneralLedgerEntry`] sharing the batch id.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{AccountId, Currency, EntryId, Money, PostingBatchId};

use crate::account::AccountType;
use crate::error::LedgerError;

/// Type of posting (debit or credit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingType {
    /// Debit posting
    Debit,
    /// Credit posting
    Credit,
}

impl PostingType {
    /// The opposite side, used when reversing
    pub fn flip(self) -> Self {
        match self {
            PostingType::Debit => PostingType::Credit,
            PostingType::Credit => PostingType::Debit,
        }
    }
}

/// Kind of document a posting originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    Grn,
    Invoice,
    Manual,
    Payment,
    JournalEntry,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Grn => "GRN",
            SourceType::Invoice => "Invoice",
            SourceType::Manual => "Manual",
            SourceType::Payment => "Payment",
            SourceType::JournalEntry => "JournalEntry",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GRN" => Ok(SourceType::Grn),
            "Invoice" => Ok(SourceType::Invoice),
            "Manual" => Ok(SourceType::Manual),
            "Payment" => Ok(SourceType::Payment),
            "JournalEntry" => Ok(SourceType::JournalEntry),
            other => Err(LedgerError::Validation(format!("Unknown source type: {}", other))),
        }
    }
}

/// Status of a general ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    /// Validated, not yet committed
    Pending,
    /// Committed; counts toward balances
    Posted,
    /// Offset by a later reversal batch; still counts toward balances
    Reversed,
    /// Refused by validation; never counts
    Rejected,
}

impl EntryStatus {
    /// Returns true if the entry contributes to account balances
    pub fn counts_toward_balance(&self) -> bool {
        matches!(self, EntryStatus::Posted | EntryStatus::Reversed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "Pending",
            EntryStatus::Posted => "Posted",
            EntryStatus::Reversed => "Reversed",
            EntryStatus::Rejected => "Rejected",
        }
    }
}

impl FromStr for EntryStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(EntryStatus::Pending),
            "Posted" => Ok(EntryStatus::Posted),
            "Reversed" => Ok(EntryStatus::Reversed),
            "Rejected" => Ok(EntryStatus::Rejected),
            other => Err(LedgerError::Validation(format!("Unknown entry status: {}", other))),
        }
    }
}

/// A single debit or credit line in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingLine {
    /// Account to post to
    pub account_id: AccountId,
    /// Debit or credit
    pub posting_type: PostingType,
    /// Amount (always positive)
    pub amount: Money,
    /// Optional description for this line
    pub description: Option<String>,
}

impl PostingLine {
    /// Creates a new debit line
    pub fn debit(account_id: AccountId, amount: Money) -> Self {
        Self {
            account_id,
            posting_type: PostingType::Debit,
            amount,
            description: None,
        }
    }

    /// Creates a new credit line
    pub fn credit(account_id: AccountId, amount: Money) -> Self {
        Self {
            account_id,
            posting_type: PostingType::Credit,
            amount,
            description: None,
        }
    }

    /// Adds a description to the line
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A balanced set of lines submitted to the ledger as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingBatch {
    /// Batch description
    pub description: String,
    /// Accounting date of every entry in the batch
    pub transaction_date: NaiveDate,
    /// Originating document kind
    pub source_type: SourceType,
    /// Originating document reference
    pub source_id: String,
    /// Replaying a batch with a committed key returns the first receipt
    pub idempotency_key: Option<String>,
    /// Lines
    pub lines: Vec<PostingLine>,
}

impl PostingBatch {
    /// Creates an empty batch dated today
    pub fn new(description: impl Into<String>, source_type: SourceType, source_id: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            transaction_date: Utc::now().date_naive(),
            source_type,
            source_id: source_id.into(),
            idempotency_key: None,
            lines: Vec::new(),
        }
    }

    /// Sets the transaction date
    pub fn dated(mut self, date: NaiveDate) -> Self {
        self.transaction_date = date;
        self
    }

    /// Sets the idempotency key
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Adds a debit line
    pub fn debit(mut self, account_id: AccountId, amount: Money) -> Self {
        self.lines.push(PostingLine::debit(account_id, amount));
        self
    }

    /// Adds a credit line
    pub fn credit(mut self, account_id: AccountId, amount: Money) -> Self {
        self.lines.push(PostingLine::credit(account_id, amount));
        self
    }

    /// Adds a credit line only when the amount is non-zero
    pub fn credit_if_nonzero(self, account_id: AccountId, amount: Money) -> Self {
        if amount.is_zero() {
            self
        } else {
            self.credit(account_id, amount)
        }
    }

    /// Adds a prepared line
    pub fn line(mut self, line: PostingLine) -> Self {
        self.lines.push(line);
        self
    }

    /// Batch offsetting `originals`, the committed entries of `batch_id`
    ///
    /// Every line is swapped debit for credit. The reversal is sourced as a
    /// `JournalEntry` on the original batch id and keyed so that it can only
    /// ever be committed once.
    pub fn reversal(batch_id: PostingBatchId, originals: &[GeneralLedgerEntry], reason: &str, date: NaiveDate) -> Self {
        let mut reversal = PostingBatch::new(
            format!("Reversal of {}: {}", batch_id, reason),
            SourceType::JournalEntry,
            batch_id.to_string(),
        )
        .dated(date)
        .with_idempotency_key(format!("reversal:{}", batch_id));
        for original in originals {
            reversal.lines.push(PostingLine {
                account_id: original.account_id,
                posting_type: original.posting_type().flip(),
                amount: original.amount(),
                description: Some(format!("Reversal: {}", reason)),
            });
        }
        reversal
    }

    /// Sum of debit and credit amounts
    ///
    /// Saturates rather than overflowing; `validate` caps every line at
    /// [`core_kernel::MAX_AMOUNT`], which keeps real sums far from the edge.
    pub fn totals(&self) -> (Decimal, Decimal) {
        self.lines.iter().fold((Decimal::ZERO, Decimal::ZERO), |(d, c), line| {
            match line.posting_type {
                PostingType::Debit => (d.saturating_add(line.amount.amount()), c),
                PostingType::Credit => (d, c.saturating_add(line.amount.amount())),
            }
        })
    }

    /// Checks if the batch is balanced
    pub fn is_balanced(&self) -> bool {
        let (debits, credits) = self.totals();
        debits == credits
    }

    /// Checks shape, currency, precision and balance
    ///
    /// Account existence is checked by the ledger, which owns the chart.
    pub fn validate(&self, currency: Currency) -> Result<(), LedgerError> {
        if self.lines.len() < 2 {
            return Err(LedgerError::InvalidPosting(format!(
                "a batch needs at least two lines, got {}",
                self.lines.len()
            )));
        }

        for line in &self.lines {
            if line.amount.currency() != currency {
                return Err(LedgerError::InvalidPosting(format!(
                    "line on {} is in {}, ledger currency is {}",
                    line.account_id,
                    line.amount.currency(),
                    currency
                )));
            }
            if !line.amount.is_positive() {
                return Err(LedgerError::InvalidPosting(format!(
                    "line on {} must be positive, got {}",
                    line.account_id,
                    line.amount.amount()
                )));
            }
            if !line.amount.is_minor_unit_exact() {
                return Err(LedgerError::InvalidPosting(format!(
                    "{} has more precision than {} allows",
                    line.amount.amount(),
                    currency
                )));
            }
            if let Err(e) = line.amount.within_limit() {
                return Err(LedgerError::InvalidPosting(format!("line on {}: {}", line.account_id, e)));
            }
        }

        let (debits, credits) = self.totals();
        if debits != credits {
            return Err(LedgerError::UnbalancedPosting { debits, credits });
        }

        Ok(())
    }
}

/// One committed line of the general ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralLedgerEntry {
    pub id: EntryId,
    pub batch_id: PostingBatchId,
    pub account_id: AccountId,
    pub transaction_date: NaiveDate,
    pub source_type: SourceType,
    pub source_id: String,
    /// Exactly one of `debit` and `credit` is non-zero
    pub debit: Money,
    pub credit: Money,
    pub status: EntryStatus,
    pub description: String,
    /// The entry this one offsets, for reversal batches
    pub reverses: Option<EntryId>,
    pub created_at: DateTime<Utc>,
}

impl GeneralLedgerEntry {
    /// Builds a Pending entry from a batch line
    pub fn from_line(batch_id: PostingBatchId, batch: &PostingBatch, line: &PostingLine, now: DateTime<Utc>) -> Self {
        let zero = Money::zero(line.amount.currency());
        let (debit, credit) = match line.posting_type {
            PostingType::Debit => (line.amount, zero),
            PostingType::Credit => (zero, line.amount),
        };
        Self {
            id: EntryId::new_v7(),
            batch_id,
            account_id: line.account_id,
            transaction_date: batch.transaction_date,
            source_type: batch.source_type,
            source_id: batch.source_id.clone(),
            debit,
            credit,
            status: EntryStatus::Pending,
            description: line.description.clone().unwrap_or_else(|| batch.description.clone()),
            reverses: None,
            created_at: now,
        }
    }

    /// Currency of the entry
    pub fn currency(&self) -> Currency {
        self.debit.currency()
    }

    /// Debit or credit side of this entry
    pub fn posting_type(&self) -> PostingType {
        if self.debit.is_zero() {
            PostingType::Credit
        } else {
            PostingType::Debit
        }
    }

    /// Non-zero amount of the entry
    pub fn amount(&self) -> Money {
        match self.posting_type() {
            PostingType::Debit => self.debit,
            PostingType::Credit => self.credit,
        }
    }

    /// Signed effect of this entry on an account of `account_type`
    pub fn natural_amount(&self, account_type: AccountType) -> Decimal {
        account_type.natural_change(self.debit.amount(), self.credit.amount())
    }
}

/// What the ledger returns for an accepted batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingReceipt {
    pub batch_id: PostingBatchId,
    pub entry_ids: Vec<EntryId>,
    /// Sum of debits (equal to the sum of credits)
    pub total: Money,
    pub posted_at: DateTime<Utc>,
    /// True when the batch was already committed under the same idempotency key
    pub replayed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd(amount: Decimal) -> Money {
        Money::new(amount, Currency::USD)
    }

    #[test]
    fn test_balanced_batch_validates() {
        let batch = PostingBatch::new("Cash sale", SourceType::Manual, "M-1")
            .debit(AccountId::new(), usd(dec!(100.00)))
            .credit(AccountId::new(), usd(dec!(60.00)))
            .credit(AccountId::new(), usd(dec!(40.00)));

        assert!(batch.is_balanced());
        assert!(batch.validate(Currency::USD).is_ok());
    }

    #[test]
    fn test_unbalanced_batch_reports_totals() {
        let batch = PostingBatch::new("JE", SourceType::JournalEntry, "JE-1")
            .debit(AccountId::new(), usd(dec!(1000.00)))
            .credit(AccountId::new(), usd(dec!(900.00)));

        match batch.validate(Currency::USD) {
            Err(LedgerError::UnbalancedPosting { debits, credits }) => {
                assert_eq!(debits, dec!(1000.00));
                assert_eq!(credits, dec!(900.00));
            }
            other => panic!("expected UnbalancedPosting, got {:?}", other),
        }
    }

    #[test]
    fn test_line_above_amount_ceiling_rejected() {
        let huge = usd(core_kernel::MAX_AMOUNT * dec!(10));
        let batch = PostingBatch::new("JE", SourceType::JournalEntry, "JE-1")
            .debit(AccountId::new(), huge)
            .credit(AccountId::new(), huge);
        assert!(matches!(batch.validate(Currency::USD), Err(LedgerError::InvalidPosting(_))));
    }

    #[test]
    fn test_single_line_rejected() {
        let batch = PostingBatch::new("JE", SourceType::JournalEntry, "JE-1")
            .debit(AccountId::new(), usd(dec!(10)));
        assert!(matches!(batch.validate(Currency::USD), Err(LedgerError::InvalidPosting(_))));
    }

    #[test]
    fn test_sub_cent_amount_rejected() {
        let batch = PostingBatch::new("JE", SourceType::JournalEntry, "JE-1")
            .debit(AccountId::new(), usd(dec!(10.005)))
            .credit(AccountId::new(), usd(dec!(10.005)));
        assert!(matches!(batch.validate(Currency::USD), Err(LedgerError::InvalidPosting(_))));
    }

    #[test]
    fn test_zero_and_foreign_lines_rejected() {
        let zero = PostingBatch::new("JE", SourceType::JournalEntry, "JE-1")
            .debit(AccountId::new(), usd(dec!(0)))
            .credit(AccountId::new(), usd(dec!(0)));
        assert!(matches!(zero.validate(Currency::USD), Err(LedgerError::InvalidPosting(_))));

        let foreign = PostingBatch::new("JE", SourceType::JournalEntry, "JE-1")
            .debit(AccountId::new(), Money::new(dec!(5), Currency::EUR))
            .credit(AccountId::new(), Money::new(dec!(5), Currency::EUR));
        assert!(matches!(foreign.validate(Currency::USD), Err(LedgerError::InvalidPosting(_))));
    }

    #[test]
    fn test_entry_from_credit_line() {
        let batch = PostingBatch::new("Receipt", SourceType::Grn, "GRN-1")
            .debit(AccountId::new(), usd(dec!(750)))
            .credit(AccountId::new(), usd(dec!(750)));
        let entry = GeneralLedgerEntry::from_line(PostingBatchId::new(), &batch, &batch.lines[1], Utc::now());

        assert_eq!(entry.posting_type(), PostingType::Credit);
        assert!(entry.debit.is_zero());
        assert_eq!(entry.amount().amount(), dec!(750));
        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.natural_amount(AccountType::Liability), dec!(750));
    }
}
