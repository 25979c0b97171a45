//! Double-entry ledger implementation
//!
//! This module provides the core ledger functionality, ensuring that
//! every committed batch is balanced and that balances are always a pure
//! sum of committed entries.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, warn};

use core_kernel::{AccountId, Currency, Money, PostingBatchId};

use crate::account::{Account, AccountType, StandardChartOfAccounts};
use crate::balance::AccountBalanceIndex;
use crate::entry::{EntryStatus, GeneralLedgerEntry, PostingBatch, PostingLine, PostingReceipt};
use crate::error::LedgerError;

/// The general ledger
///
/// The MoneyLedger enforces double-entry accounting rules: a batch is either
/// committed whole or not at all, and debits equal credits in every batch.
///
/// # Invariants
///
/// - Every committed batch balances exactly (no tolerance)
/// - Account balances are always consistent with committed entries
/// - Committed entries never change amounts; corrections are new batches
#[derive(Debug)]
pub struct MoneyLedger {
    /// Chart of accounts
    accounts: HashMap<AccountId, Account>,
    /// Committed entries in commit order
    entries: Vec<GeneralLedgerEntry>,
    /// Entry positions per batch
    batches: HashMap<PostingBatchId, Vec<usize>>,
    /// Receipts per idempotency key
    receipts_by_key: HashMap<String, PostingReceipt>,
    /// Batches that have been reversed, with the reversing batch
    reversed_by: HashMap<PostingBatchId, PostingBatchId>,
    /// Running balances
    balances: AccountBalanceIndex,
    /// Ledger currency
    currency: Currency,
}

impl MoneyLedger {
    /// Creates an empty ledger
    ///
    /// # Arguments
    ///
    /// * `currency` - The currency every posting must be in
    pub fn new(currency: Currency) -> Self {
        Self {
            accounts: HashMap::new(),
            entries: Vec::new(),
            batches: HashMap::new(),
            receipts_by_key: HashMap::new(),
            reversed_by: HashMap::new(),
            balances: AccountBalanceIndex::new(),
            currency,
        }
    }

    /// Creates a ledger seeded with the standard small-business chart
    pub fn with_standard_chart(currency: Currency) -> Self {
        let mut ledger = Self::new(currency);
        for account in StandardChartOfAccounts::create_standard_accounts(currency) {
            ledger.accounts.insert(account.id, account.clone());
            ledger.balances.register(&account);
        }
        ledger
    }

    /// Ledger currency
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Adds an account to the chart of accounts
    ///
    /// # Errors
    ///
    /// Returns error if the code is already used or the currency differs
    pub fn add_account(&mut self, account: Account) -> Result<(), LedgerError> {
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
        if self.find_account_by_code(&account.code).is_some() {
            return Err(LedgerError::AccountCodeExists(account.code));
        }

        info!(account_id = %account.id, code = %account.code, "Account added");
        self.balances.register(&account);
        self.accounts.insert(account.id, account);
        Ok(())
    }

    /// Gets an account by ID
    pub fn get_account(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// Finds an account by its code, including deactivated accounts
    pub fn find_account_by_code(&self, code: &str) -> Option<&Account> {
        self.accounts.values().find(|a| a.code == code)
    }

    /// All accounts ordered by code
    pub fn accounts(&self) -> Vec<Account> {
        let mut accounts: Vec<_> = self.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        accounts
    }

    /// Changes an account code; refused once any entry references the account
    pub fn change_account_code(&mut self, id: &AccountId, new_code: &str) -> Result<Account, LedgerError> {
        if !self.accounts.contains_key(id) {
            return Err(LedgerError::AccountNotFound(id.to_string()));
        }
        if self.entries.iter().any(|e| &e.account_id == id) {
            return Err(LedgerError::AccountHasPostings(id.to_string()));
        }
        if let Some(other) = self.find_account_by_code(new_code) {
            if &other.id != id {
                return Err(LedgerError::AccountCodeExists(new_code.to_string()));
            }
        }

        let account = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))?;
        account.code = new_code.to_string();
        Ok(account.clone())
    }

    /// Soft-deactivates an account; it stays in the chart and in reports
    pub fn deactivate_account(&mut self, id: &AccountId) -> Result<Account, LedgerError> {
        let account = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))?;
        account.lifecycle.delete(Utc::now())?;
        info!(account_id = %id, "Account deactivated");
        Ok(account.clone())
    }

    /// Posts a batch to the ledger
    ///
    /// The batch is validated as a whole; on any failure nothing is written.
    /// A batch whose idempotency key was already committed returns the
    /// original receipt with `replayed = true`.
    ///
    /// # Errors
    ///
    /// - `UnbalancedPosting` if debits differ from credits
    /// - `InvalidPosting` for fewer than two lines, non-positive or over-precise amounts
    /// - `AccountNotFound` / `AccountInactive` for unknown or deactivated accounts
    pub fn post(&mut self, batch: PostingBatch) -> Result<PostingReceipt, LedgerError> {
        if let Some(receipt) = batch
            .idempotency_key
            .as_ref()
            .and_then(|key| self.receipts_by_key.get(key))
        {
            info!(batch_id = %receipt.batch_id, "Idempotent replay of posting batch");
            return Ok(PostingReceipt {
                replayed: true,
                ..receipt.clone()
            });
        }

        if let Err(e) = batch.validate(self.currency) {
            if let LedgerError::UnbalancedPosting { debits, credits } = &e {
                error!(
                    source_type = %batch.source_type,
                    source_id = %batch.source_id,
                    %debits,
                    %credits,
                    "Rejected unbalanced posting"
                );
            }
            return Err(e);
        }
        self.ensure_accounts_postable(&batch.lines)?;

        Ok(self.commit(batch, None))
    }

    /// Reverses a committed batch
    ///
    /// Posts a new batch with debit and credit swapped on every line, source
    /// type `JournalEntry` and source id equal to the original batch id, and
    /// moves the original entries from Posted to Reversed.
    ///
    /// # Errors
    ///
    /// - `BatchNotFound` if the batch was never committed
    /// - `AlreadyClosed` if the batch was already reversed
    pub fn reverse(
        &mut self,
        batch_id: &PostingBatchId,
        reason: &str,
        date: NaiveDate,
    ) -> Result<PostingReceipt, LedgerError> {
        let positions = self
            .batches
            .get(batch_id)
            .cloned()
            .ok_or_else(|| LedgerError::BatchNotFound(batch_id.to_string()))?;

        if let Some(by) = self.reversed_by.get(batch_id) {
            warn!(batch_id = %batch_id, reversed_by = %by, "Batch already reversed");
            return Err(LedgerError::AlreadyClosed(format!(
                "batch {} was already reversed by {}",
                batch_id, by
            )));
        }

        let originals: Vec<GeneralLedgerEntry> = positions.iter().map(|&i| self.entries[i].clone()).collect();
        let reversal = PostingBatch::reversal(*batch_id, &originals, reason, date);
        self.ensure_accounts_postable(&reversal.lines)?;

        let reverses: Vec<_> = originals.iter().map(|e| e.id).collect();
        let receipt = self.commit(reversal, Some(reverses));

        for &i in &positions {
            self.entries[i].status = EntryStatus::Reversed;
        }
        self.reversed_by.insert(*batch_id, receipt.batch_id);

        info!(batch_id = %batch_id, reversal_batch_id = %receipt.batch_id, reason, "Batch reversed");
        Ok(receipt)
    }

    /// Balance of an account, optionally as of a date (inclusive)
    pub fn account_balance(&self, id: &AccountId, as_of: Option<NaiveDate>) -> Result<Money, LedgerError> {
        let balance = match as_of {
            Some(date) => self.balances.balance_as_of(id, date),
            None => self.balances.balance(id),
        };
        balance.ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))
    }

    /// Entries committed for a batch
    pub fn batch_entries(&self, batch_id: &PostingBatchId) -> Result<Vec<GeneralLedgerEntry>, LedgerError> {
        self.batches
            .get(batch_id)
            .map(|positions| positions.iter().map(|&i| self.entries[i].clone()).collect())
            .ok_or_else(|| LedgerError::BatchNotFound(batch_id.to_string()))
    }

    /// Entries touching an account, in commit order
    pub fn account_entries(&self, id: &AccountId) -> Vec<GeneralLedgerEntry> {
        self.entries.iter().filter(|e| &e.account_id == id).cloned().collect()
    }

    /// Generates a trial balance, optionally as of a date
    pub fn trial_balance(&self, as_of: Option<NaiveDate>) -> TrialBalance {
        let lines = self
            .accounts()
            .into_iter()
            .filter_map(|account| {
                let balance = match as_of {
                    Some(date) => self.balances.balance_as_of(&account.id, date),
                    None => self.balances.balance(&account.id),
                }?;
                Some((account, balance))
            })
            .collect::<Vec<_>>();
        TrialBalance::from_balances(self.currency, as_of, lines)
    }

    fn ensure_accounts_postable(&self, lines: &[PostingLine]) -> Result<(), LedgerError> {
        for line in lines {
            let account = self
                .accounts
                .get(&line.account_id)
                .ok_or_else(|| LedgerError::AccountNotFound(line.account_id.to_string()))?;
            if !account.is_active() {
                return Err(LedgerError::AccountInactive(account.code.clone()));
            }
        }
        Ok(())
    }

    /// Commits a validated batch: entries go Pending → Posted together
    fn commit(&mut self, batch: PostingBatch, reverses: Option<Vec<core_kernel::EntryId>>) -> PostingReceipt {
        let batch_id = PostingBatchId::new_v7();
        let now = Utc::now();

        let mut staged: Vec<GeneralLedgerEntry> = batch
            .lines
            .iter()
            .map(|line| GeneralLedgerEntry::from_line(batch_id, &batch, line, now))
            .collect();
        if let Some(reverses) = reverses {
            for (entry, original) in staged.iter_mut().zip(reverses) {
                entry.reverses = Some(original);
            }
        }
        for entry in &mut staged {
            entry.status = EntryStatus::Posted;
        }

        let (debits, _) = batch.totals();
        let receipt = PostingReceipt {
            batch_id,
            entry_ids: staged.iter().map(|e| e.id).collect(),
            total: Money::new(debits, self.currency),
            posted_at: now,
            replayed: false,
        };

        let start = self.entries.len();
        for entry in staged {
            self.balances.apply(&entry);
            self.entries.push(entry);
        }
        self.batches.insert(batch_id, (start..self.entries.len()).collect());
        if let Some(key) = batch.idempotency_key {
            self.receipts_by_key.insert(key, receipt.clone());
        }

        info!(
            batch_id = %batch_id,
            source_type = %batch.source_type,
            source_id = %batch.source_id,
            total = %receipt.total,
            "Posting batch committed"
        );
        receipt
    }
}

/// Trial balance report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialBalance {
    /// Date the report was computed as of, if any
    pub as_of: Option<NaiveDate>,
    /// Individual account lines (accounts with a non-zero balance)
    pub lines: Vec<TrialBalanceLine>,
    /// Total debits
    pub total_debits: Money,
    /// Total credits
    pub total_credits: Money,
    /// Whether the trial balance is balanced
    pub is_balanced: bool,
}

/// A single line in the trial balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialBalanceLine {
    pub account_id: AccountId,
    pub account_code: String,
    pub account_name: String,
    pub account_type: AccountType,
    pub debit: Money,
    pub credit: Money,
}

impl TrialBalance {
    /// Builds a trial balance from natural-side account balances
    ///
    /// A positive natural balance lands in the account's normal column; a
    /// negative one lands, as an absolute value, in the other column.
    pub fn from_balances(
        currency: Currency,
        as_of: Option<NaiveDate>,
        balances: impl IntoIterator<Item = (Account, Money)>,
    ) -> Self {
        let mut lines = Vec::new();
        let mut total_debits = Decimal::ZERO;
        let mut total_credits = Decimal::ZERO;

        for (account, balance) in balances {
            if balance.is_zero() {
                continue;
            }
            let normal_side_debit = account.account_type.is_debit_normal() == balance.is_positive();
            let amount = balance.amount().abs();
            let (debit, credit) = if normal_side_debit {
                (amount, Decimal::ZERO)
            } else {
                (Decimal::ZERO, amount)
            };
            total_debits = total_debits.saturating_add(debit);
            total_credits = total_credits.saturating_add(credit);
            lines.push(TrialBalanceLine {
                account_id: account.id,
                account_code: account.code,
                account_name: account.name,
                account_type: account.account_type,
                debit: Money::new(debit, currency),
                credit: Money::new(credit, currency),
            });
        }

        TrialBalance {
            as_of,
            lines,
            total_debits: Money::new(total_debits, currency),
            total_credits: Money::new(total_credits, currency),
            is_balanced: total_debits == total_credits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use crate::entry::SourceType;

    fn usd(amount: Decimal) -> Money {
        Money::new(amount, Currency::USD)
    }

    fn setup_ledger() -> (MoneyLedger, AccountId, AccountId) {
        let ledger = MoneyLedger::with_standard_chart(Currency::USD);
        let cash = ledger.find_account_by_code(StandardChartOfAccounts::CASH).unwrap().id;
        let revenue = ledger.find_account_by_code(StandardChartOfAccounts::SALES_REVENUE).unwrap().id;
        (ledger, cash, revenue)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_balanced_batch() {
        let (mut ledger, cash, revenue) = setup_ledger();

        let batch = PostingBatch::new("Cash sale", SourceType::Manual, "M-1")
            .debit(cash, usd(dec!(1000)))
            .credit(revenue, usd(dec!(1000)));

        let receipt = ledger.post(batch).unwrap();
        assert_eq!(receipt.entry_ids.len(), 2);
        assert_eq!(receipt.total.amount(), dec!(1000));
        assert_eq!(ledger.account_balance(&cash, None).unwrap().amount(), dec!(1000));
        assert_eq!(ledger.account_balance(&revenue, None).unwrap().amount(), dec!(1000));

        let entries = ledger.batch_entries(&receipt.batch_id).unwrap();
        assert!(entries.iter().all(|e| e.status == EntryStatus::Posted));
    }

    #[test]
    fn test_unbalanced_batch_writes_nothing() {
        let (mut ledger, cash, revenue) = setup_ledger();

        let batch = PostingBatch::new("JE", SourceType::JournalEntry, "JE-1")
            .debit(cash, usd(dec!(1000.00)))
            .credit(revenue, usd(dec!(900.00)));

        let result = ledger.post(batch);
        assert!(matches!(result, Err(LedgerError::UnbalancedPosting { .. })));
        assert!(ledger.account_entries(&cash).is_empty());
        assert!(ledger.account_balance(&cash, None).unwrap().is_zero());
    }

    #[test]
    fn test_unknown_account_rejects_whole_batch() {
        let (mut ledger, cash, _) = setup_ledger();

        let batch = PostingBatch::new("JE", SourceType::JournalEntry, "JE-1")
            .debit(cash, usd(dec!(10)))
            .credit(AccountId::new(), usd(dec!(10)));

        assert!(matches!(ledger.post(batch), Err(LedgerError::AccountNotFound(_))));
        assert!(ledger.account_entries(&cash).is_empty());
    }

    #[test]
    fn test_idempotency_key_replays_receipt() {
        let (mut ledger, cash, revenue) = setup_ledger();

        let batch = PostingBatch::new("Payment", SourceType::Payment, "PAY-1")
            .with_idempotency_key("payment:PAY-1")
            .debit(cash, usd(dec!(300)))
            .credit(revenue, usd(dec!(300)));

        let first = ledger.post(batch.clone()).unwrap();
        let second = ledger.post(batch).unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.batch_id, second.batch_id);
        assert_eq!(ledger.account_balance(&cash, None).unwrap().amount(), dec!(300));
    }

    #[test]
    fn test_reverse_swaps_lines_and_marks_original() {
        let (mut ledger, cash, revenue) = setup_ledger();

        let original = ledger
            .post(
                PostingBatch::new("Sale", SourceType::Invoice, "INV-1")
                    .dated(day(1))
                    .debit(cash, usd(dec!(250)))
                    .credit(revenue, usd(dec!(250))),
            )
            .unwrap();

        let reversal = ledger.reverse(&original.batch_id, "entered twice", day(2)).unwrap();

        for entry in ledger.batch_entries(&original.batch_id).unwrap() {
            assert_eq!(entry.status, EntryStatus::Reversed);
            assert_eq!(entry.amount().amount(), dec!(250));
        }
        let reversal_entries = ledger.batch_entries(&reversal.batch_id).unwrap();
        assert!(reversal_entries.iter().all(|e| e.source_type == SourceType::JournalEntry));
        assert!(reversal_entries.iter().all(|e| e.source_id == original.batch_id.to_string()));
        assert!(reversal_entries.iter().all(|e| e.reverses.is_some()));

        assert!(ledger.account_balance(&cash, None).unwrap().is_zero());
        assert_eq!(ledger.account_balance(&cash, Some(day(1))).unwrap().amount(), dec!(250));

        assert!(matches!(
            ledger.reverse(&original.batch_id, "again", day(3)),
            Err(LedgerError::AlreadyClosed(_))
        ));
    }

    #[test]
    fn test_code_change_blocked_after_posting() {
        let (mut ledger, cash, revenue) = setup_ledger();
        let bank = ledger.find_account_by_code(StandardChartOfAccounts::BANK).unwrap().id;

        assert_eq!(ledger.change_account_code(&bank, "1020").unwrap().code, "1020");
        assert!(matches!(
            ledger.change_account_code(&bank, StandardChartOfAccounts::CASH),
            Err(LedgerError::AccountCodeExists(_))
        ));

        ledger
            .post(
                PostingBatch::new("Sale", SourceType::Manual, "M")
                    .debit(cash, usd(dec!(1)))
                    .credit(revenue, usd(dec!(1))),
            )
            .unwrap();
        assert!(matches!(
            ledger.change_account_code(&cash, "1010"),
            Err(LedgerError::AccountHasPostings(_))
        ));
    }

    #[test]
    fn test_deactivated_account_rejects_postings() {
        let (mut ledger, cash, revenue) = setup_ledger();
        ledger.deactivate_account(&revenue).unwrap();

        let batch = PostingBatch::new("Sale", SourceType::Manual, "M")
            .debit(cash, usd(dec!(1)))
            .credit(revenue, usd(dec!(1)));
        assert!(matches!(ledger.post(batch), Err(LedgerError::AccountInactive(_))));
        assert!(ledger.get_account(&revenue).is_some());
    }

    #[test]
    fn test_trial_balance_columns() {
        let (mut ledger, cash, revenue) = setup_ledger();
        let expense = ledger.find_account_by_code(StandardChartOfAccounts::OPERATING_EXPENSE).unwrap().id;

        ledger
            .post(
                PostingBatch::new("Sale", SourceType::Manual, "M")
                    .debit(cash, usd(dec!(500)))
                    .credit(revenue, usd(dec!(500))),
            )
            .unwrap();
        ledger
            .post(
                PostingBatch::new("Rent", SourceType::Manual, "M")
                    .debit(expense, usd(dec!(700)))
                    .credit(cash, usd(dec!(700))),
            )
            .unwrap();

        let tb = ledger.trial_balance(None);
        assert!(tb.is_balanced);
        assert_eq!(tb.total_debits.amount(), dec!(700));
        assert_eq!(tb.lines.len(), 3);

        let cash_line = tb.lines.iter().find(|l| l.account_id == cash).unwrap();
        assert_eq!(cash_line.credit.amount(), dec!(200));
        assert!(cash_line.debit.is_zero());
    }

    #[test]
    fn test_opening_balance_counts() {
        let mut ledger = MoneyLedger::new(Currency::USD);
        let equity = Account::new("301", "Owner's Equity", AccountType::Equity, Currency::USD)
            .with_opening_balance(usd(dec!(5000)));
        let id = equity.id;
        ledger.add_account(equity).unwrap();

        assert_eq!(ledger.account_balance(&id, Some(day(1))).unwrap().amount(), dec!(5000));
        let dup = Account::new("301", "Dup", AccountType::Equity, Currency::USD);
        assert!(matches!(ledger.add_account(dup), Err(LedgerError::AccountCodeExists(_))));
    }
}
