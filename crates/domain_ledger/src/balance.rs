//! Running account balances derived from ledger postings
//!
//! The index keeps, per account, the opening balance plus the natural-side
//! net movement bucketed by transaction date. The current balance is a sum of
//! all buckets; a point-in-time balance sums the buckets dated on or before
//! the requested day.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use core_kernel::{AccountId, Money};

use crate::account::{Account, AccountType};
use crate::entry::GeneralLedgerEntry;

#[derive(Debug, Clone)]
struct AccountTrack {
    account_type: AccountType,
    opening: Money,
    daily: BTreeMap<NaiveDate, Decimal>,
    running: Decimal,
}

/// Per-account running balance, queryable at any date
#[derive(Debug, Clone, Default)]
pub struct AccountBalanceIndex {
    tracks: HashMap<AccountId, AccountTrack>,
}

impl AccountBalanceIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds an index from a chart and its committed entries
    pub fn rebuild<'a>(
        accounts: impl IntoIterator<Item = &'a Account>,
        entries: impl IntoIterator<Item = &'a GeneralLedgerEntry>,
    ) -> Self {
        let mut index = Self::new();
        for account in accounts {
            index.register(account);
        }
        for entry in entries {
            index.apply(entry);
        }
        index
    }

    /// Starts tracking an account; re-registering keeps existing movements
    pub fn register(&mut self, account: &Account) {
        self.tracks
            .entry(account.id)
            .and_modify(|track| {
                track.account_type = account.account_type;
                track.opening = account.opening_balance;
            })
            .or_insert_with(|| AccountTrack {
                account_type: account.account_type,
                opening: account.opening_balance,
                daily: BTreeMap::new(),
                running: Decimal::ZERO,
            });
    }

    /// Applies a committed entry; entries that do not count toward balances
    /// and entries on untracked accounts are ignored
    pub fn apply(&mut self, entry: &GeneralLedgerEntry) {
        if !entry.status.counts_toward_balance() {
            return;
        }
        if let Some(track) = self.tracks.get_mut(&entry.account_id) {
            let change = entry.natural_amount(track.account_type);
            let day = track.daily.entry(entry.transaction_date).or_insert(Decimal::ZERO);
            *day = day.saturating_add(change);
            track.running = track.running.saturating_add(change);
        }
    }

    /// Current balance including the opening balance
    pub fn balance(&self, account_id: &AccountId) -> Option<Money> {
        self.tracks
            .get(account_id)
            .map(|track| Money::new(track.opening.amount().saturating_add(track.running), track.opening.currency()))
    }

    /// Balance including every movement dated on or before `as_of`
    pub fn balance_as_of(&self, account_id: &AccountId, as_of: NaiveDate) -> Option<Money> {
        self.tracks.get(account_id).map(|track| {
            let moved = track
                .daily
                .range(..=as_of)
                .fold(Decimal::ZERO, |acc, (_, v)| acc.saturating_add(*v));
            Money::new(track.opening.amount().saturating_add(moved), track.opening.currency())
        })
    }

    /// Returns true if any movement was recorded for the account
    pub fn has_movements(&self, account_id: &AccountId) -> bool {
        self.tracks
            .get(account_id)
            .map(|track| !track.daily.is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryStatus, PostingBatch, SourceType};
    use chrono::Utc;
    use core_kernel::{Currency, PostingBatchId};
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn posted_entries(batch: &PostingBatch) -> Vec<GeneralLedgerEntry> {
        let batch_id = PostingBatchId::new();
        batch
            .lines
            .iter()
            .map(|line| {
                let mut e = GeneralLedgerEntry::from_line(batch_id, batch, line, Utc::now());
                e.status = EntryStatus::Posted;
                e
            })
            .collect()
    }

    #[test]
    fn test_point_in_time_balance() {
        let cash = Account::new("101", "Cash", AccountType::Asset, Currency::USD)
            .with_opening_balance(Money::new(dec!(50), Currency::USD));
        let revenue = Account::new("401", "Sales", AccountType::Revenue, Currency::USD);

        let mut index = AccountBalanceIndex::new();
        index.register(&cash);
        index.register(&revenue);

        let usd = |a| Money::new(a, Currency::USD);
        for (day, amount) in [(1, dec!(100)), (5, dec!(200))] {
            let batch = PostingBatch::new("Sale", SourceType::Manual, "S")
                .dated(date(day))
                .debit(cash.id, usd(amount))
                .credit(revenue.id, usd(amount));
            for entry in posted_entries(&batch) {
                index.apply(&entry);
            }
        }

        assert_eq!(index.balance(&cash.id).unwrap().amount(), dec!(350));
        assert_eq!(index.balance(&revenue.id).unwrap().amount(), dec!(300));
        assert_eq!(index.balance_as_of(&cash.id, date(3)).unwrap().amount(), dec!(150));
        assert_eq!(index.balance_as_of(&cash.id, date(1)).unwrap().amount(), dec!(150));
        assert_eq!(index.balance_as_of(&revenue.id, NaiveDate::from_ymd_opt(2024, 2, 28).unwrap()).unwrap().amount(), dec!(0));
        assert!(index.balance(&AccountId::new()).is_none());
    }

    #[test]
    fn test_pending_entries_ignored() {
        let cash = Account::new("101", "Cash", AccountType::Asset, Currency::USD);
        let mut index = AccountBalanceIndex::new();
        index.register(&cash);

        let batch = PostingBatch::new("x", SourceType::Manual, "x")
            .debit(cash.id, Money::new(dec!(10), Currency::USD))
            .credit(AccountId::new(), Money::new(dec!(10), Currency::USD));
        let mut entry = GeneralLedgerEntry::from_line(PostingBatchId::new(), &batch, &batch.lines[0], Utc::now());
        index.apply(&entry);
        assert!(!index.has_movements(&cash.id));

        entry.status = EntryStatus::Reversed;
        index.apply(&entry);
        assert_eq!(index.balance(&cash.id).unwrap().amount(), dec!(10));
    }
}
