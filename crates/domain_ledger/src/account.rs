//! Account types for the chart of accounts
//!
//! This module defines the account structure for double-entry bookkeeping.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{AccountId, Currency, Lifecycle, Money};

/// Types of accounts in the chart of accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    /// Asset accounts (debit normal balance)
    Asset,
    /// Liability accounts (credit normal balance)
    Liability,
    /// Equity accounts (credit normal balance)
    Equity,
    /// Revenue accounts (credit normal balance)
    Revenue,
    /// Expense accounts (debit normal balance)
    Expense,
}

impl AccountType {
    /// Returns true if this account type has a debit normal balance
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }

    /// Signed effect of a debit/credit pair on the account's natural balance
    ///
    /// - Asset & Expense accounts: `debit - credit`
    /// - Liability, Equity & Revenue accounts: `credit - debit`
    pub fn natural_change(&self, debit: Decimal, credit: Decimal) -> Decimal {
        if self.is_debit_normal() {
            debit.saturating_sub(credit)
        } else {
            credit.saturating_sub(debit)
        }
    }
}

/// Category of account used to locate the accounts auto-postings hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountCategory {
    Cash,
    Bank,
    Receivables,
    Inventory,
    Payables,
    TaxPayable,
    OwnersEquity,
    SalesRevenue,
    OtherIncome,
    CostOfGoodsSold,
    OperatingExpense,
    Other,
}

/// An account in the chart of accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: AccountId,
    /// Account code (e.g., "101"), unique across the chart
    pub code: String,
    /// Account name
    pub name: String,
    /// Account type
    pub account_type: AccountType,
    /// Optional finer-grained code within the account
    pub sub_code: Option<String>,
    /// Account category
    pub category: Option<AccountCategory>,
    /// Balance carried in before the first posting
    pub opening_balance: Money,
    /// Description
    pub description: Option<String>,
    /// Active or soft-deactivated
    pub lifecycle: Lifecycle,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new active account with a zero opening balance
    ///
    /// # Arguments
    ///
    /// * `code` - Account code
    /// * `name` - Account name
    /// * `account_type` - Type of account
    /// * `currency` - Currency the account is kept in
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        account_type: AccountType,
        currency: Currency,
    ) -> Self {
        Self {
            id: AccountId::new(),
            code: code.into(),
            name: name.into(),
            account_type,
            sub_code: None,
            category: None,
            opening_balance: Money::zero(currency),
            description: None,
            lifecycle: Lifecycle::Active,
            created_at: Utc::now(),
        }
    }

    /// Sets the account category
    pub fn with_category(mut self, category: AccountCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets the sub-code
    pub fn with_sub_code(mut self, sub_code: impl Into<String>) -> Self {
        self.sub_code = Some(sub_code.into());
        self
    }

    /// Sets the opening balance
    pub fn with_opening_balance(mut self, opening_balance: Money) -> Self {
        self.opening_balance = opening_balance;
        self
    }

    /// Sets the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Currency of the account
    pub fn currency(&self) -> Currency {
        self.opening_balance.currency()
    }

    /// Returns true if the account accepts postings
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }
}

/// Standard small-business chart of accounts
pub struct StandardChartOfAccounts;

impl StandardChartOfAccounts {
    pub const CASH: &'static str = "101";
    pub const BANK: &'static str = "102";
    pub const ACCOUNTS_RECEIVABLE: &'static str = "103";
    pub const INVENTORY: &'static str = "104";
    pub const ACCOUNTS_PAYABLE: &'static str = "201";
    pub const TAX_PAYABLE: &'static str = "202";
    pub const OWNERS_EQUITY: &'static str = "301";
    pub const SALES_REVENUE: &'static str = "401";
    pub const OTHER_INCOME: &'static str = "402";
    pub const COST_OF_GOODS_SOLD: &'static str = "501";
    pub const OPERATING_EXPENSE: &'static str = "502";

    /// Creates the standard accounts in `currency`
    pub fn create_standard_accounts(currency: Currency) -> Vec<Account> {
        vec![
            // Assets
            Account::new(Self::CASH, "Cash", AccountType::Asset, currency)
                .with_category(AccountCategory::Cash),
            Account::new(Self::BANK, "Bank", AccountType::Asset, currency)
                .with_category(AccountCategory::Bank),
            Account::new(Self::ACCOUNTS_RECEIVABLE, "Accounts Receivable", AccountType::Asset, currency)
                .with_category(AccountCategory::Receivables),
            Account::new(Self::INVENTORY, "Inventory", AccountType::Asset, currency)
                .with_category(AccountCategory::Inventory),

            // Liabilities
            Account::new(Self::ACCOUNTS_PAYABLE, "Accounts Payable", AccountType::Liability, currency)
                .with_category(AccountCategory::Payables),
            Account::new(Self::TAX_PAYABLE, "Tax Payable", AccountType::Liability, currency)
                .with_category(AccountCategory::TaxPayable),

            // Equity
            Account::new(Self::OWNERS_EQUITY, "Owner's Equity", AccountType::Equity, currency)
                .with_category(AccountCategory::OwnersEquity),

            // Revenue
            Account::new(Self::SALES_REVENUE, "Sales Revenue", AccountType::Revenue, currency)
                .with_category(AccountCategory::SalesRevenue),
            Account::new(Self::OTHER_INCOME, "Other Income", AccountType::Revenue, currency)
                .with_category(AccountCategory::OtherIncome),

            // Expenses
            Account::new(Self::COST_OF_GOODS_SOLD, "Cost of Goods Sold", AccountType::Expense, currency)
                .with_category(AccountCategory::CostOfGoodsSold),
            Account::new(Self::OPERATING_EXPENSE, "Operating Expense", AccountType::Expense, currency)
                .with_category(AccountCategory::OperatingExpense),
        ]
    }
}
