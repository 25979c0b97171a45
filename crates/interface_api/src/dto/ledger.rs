//! Ledger, transaction and category DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use core_kernel::{Currency, PaymentMethod};
use domain_ledger::{Account, AccountType, Transaction, TransactionKind, TransactionStatus};

use super::positive;

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "category_given"))]
pub struct CreateTransactionRequest {
    pub kind: TransactionKind,
    /// Existing category
    pub category_id: Option<Uuid>,
    /// Category looked up by name, created as a system category if missing
    #[validate(length(min = 1, max = 64))]
    pub category: Option<String>,
    #[validate(custom(function = "positive"))]
    pub amount: Decimal,
    pub currency: Option<String>,
    pub transaction_date: NaiveDate,
    pub payment_method: PaymentMethod,
    #[validate(length(min = 1, max = 256, message = "Description is required"))]
    pub description: String,
}

fn category_given(request: &CreateTransactionRequest) -> Result<(), ValidationError> {
    match (&request.category_id, &request.category) {
        (None, None) => Err(ValidationError::new("category_required")),
        (Some(_), Some(_)) => Err(ValidationError::new("category_ambiguous")),
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReverseRequest {
    #[validate(length(min = 1, max = 256, message = "Reason is required"))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct JournalEntryRequest {
    #[validate(length(min = 1, max = 256, message = "Description is required"))]
    pub description: String,
    /// Defaults to today
    pub transaction_date: Option<NaiveDate>,
    /// Source document number; a fresh id is used when absent
    #[validate(length(min = 1, max = 64))]
    pub reference: Option<String>,
    /// A repeated key returns the original receipt
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
    #[validate(length(min = 2, message = "A journal entry needs at least two lines"), nested)]
    pub lines: Vec<JournalLineRequest>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
#[validate(schema(function = "one_side_and_one_account"))]
pub struct JournalLineRequest {
    pub account_id: Option<Uuid>,
    /// Chart code such as "101"
    pub account_code: Option<String>,
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub description: Option<String>,
}

fn one_side_and_one_account(line: &JournalLineRequest) -> Result<(), ValidationError> {
    if line.account_id.is_some() == line.account_code.is_some() {
        return Err(ValidationError::new("exactly_one_of_account_id_or_account_code"));
    }
    if line.debit.is_some() == line.credit.is_some() {
        return Err(ValidationError::new("exactly_one_of_debit_or_credit"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    pub kind: TransactionKind,
    /// Account credited (income) or debited (expense) instead of the default
    pub account_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RenameCategoryRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub category_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub transaction_date: NaiveDate,
    pub payment_method: Option<PaymentMethod>,
    pub description: String,
    pub source_type: String,
    pub source_id: Option<String>,
    pub status: TransactionStatus,
    pub posting_batch_id: Option<Uuid>,
    pub reversal_batch_id: Option<Uuid>,
    pub deleted: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionResponse {
    fn from(transaction: &Transaction) -> Self {
        Self {
            id: transaction.id.into(),
            kind: transaction.kind,
            category_id: transaction.category_id.into(),
            amount: transaction.amount.amount(),
            currency: transaction.amount.currency(),
            transaction_date: transaction.transaction_date,
            payment_method: transaction.payment_method,
            description: transaction.description.clone(),
            source_type: transaction.source_type.to_string(),
            source_id: transaction.source_id.clone(),
            status: transaction.status,
            posting_batch_id: transaction.posting_batch_id.map(Into::into),
            reversal_batch_id: transaction.reversal_batch_id.map(Into::into),
            deleted: transaction.lifecycle.is_deleted(),
            version: transaction.version.value(),
            created_at: transaction.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub currency: Currency,
    pub as_of: Option<NaiveDate>,
}

impl BalanceResponse {
    pub fn new(account: &Account, balance: Decimal, currency: Currency, as_of: Option<NaiveDate>) -> Self {
        Self {
            account_id: account.id.into(),
            code: account.code.clone(),
            name: account.name.clone(),
            account_type: account.account_type,
            balance,
            currency,
            as_of,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(account_code: Option<&str>, debit: Option<Decimal>, credit: Option<Decimal>) -> JournalLineRequest {
        JournalLineRequest {
            account_id: None,
            account_code: account_code.map(str::to_string),
            debit,
            credit,
            description: None,
        }
    }

    #[test]
    fn test_journal_line_needs_exactly_one_side() {
        assert!(line(Some("101"), Some(dec!(10)), None).validate().is_ok());
        assert!(line(Some("101"), Some(dec!(10)), Some(dec!(10))).validate().is_err());
        assert!(line(Some("101"), None, None).validate().is_err());
    }

    #[test]
    fn test_journal_line_needs_exactly_one_account_reference() {
        assert!(line(None, Some(dec!(10)), None).validate().is_err());
        let mut both = line(Some("101"), Some(dec!(10)), None);
        both.account_id = Some(Uuid::new_v4());
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_journal_entry_needs_two_lines() {
        let entry = JournalEntryRequest {
            description: "Owner contribution".to_string(),
            transaction_date: None,
            reference: None,
            idempotency_key: None,
            lines: vec![line(Some("101"), Some(dec!(10)), None)],
        };
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_transaction_category_rules() {
        let request = |category_id: Option<Uuid>, category: Option<&str>| CreateTransactionRequest {
            kind: TransactionKind::Expense,
            category_id,
            category: category.map(str::to_string),
            amount: dec!(45.00),
            currency: None,
            transaction_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            payment_method: PaymentMethod::Cash,
            description: "Stationery".to_string(),
        };
        assert!(request(None, Some("Office")).validate().is_ok());
        assert!(request(Some(Uuid::new_v4()), None).validate().is_ok());
        assert!(request(None, None).validate().is_err());
        assert!(request(Some(Uuid::new_v4()), Some("Office")).validate().is_err());
    }
}
