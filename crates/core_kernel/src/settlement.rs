//! Settlement status shared by invoices (receivable side) and GRNs (payable side)
//!
//! Both documents derive their payment status from the same two stored
//! figures, the document total and the sum of recorded payments, so the
//! mapping lives here rather than in either domain crate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::money::Money;

/// Derived payment status of a payable or receivable document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementStatus {
    /// Nothing paid yet
    Unpaid,
    /// Some, but not all, of the total has been paid
    PartiallyPaid,
    /// Paid amount reached the total
    FullyPaid,
    /// Not fully paid and past its due date
    Overdue,
}

impl SettlementStatus {
    /// Maps paid and total amounts to a status
    ///
    /// `paid <= 0 → Unpaid; 0 < paid < total → PartiallyPaid; paid >= total → FullyPaid`.
    /// A zero-total document with nothing paid counts as fully paid.
    pub fn from_amounts(paid: &Money, total: &Money) -> Self {
        if paid.amount() >= total.amount() {
            SettlementStatus::FullyPaid
        } else if paid.amount() <= rust_decimal::Decimal::ZERO {
            SettlementStatus::Unpaid
        } else {
            SettlementStatus::PartiallyPaid
        }
    }

    /// Applies the time-based overdue overlay
    pub fn with_due_date(self, due_date: Option<NaiveDate>, today: NaiveDate) -> Self {
        match (self, due_date) {
            (SettlementStatus::Unpaid | SettlementStatus::PartiallyPaid, Some(due)) if due < today => {
                SettlementStatus::Overdue
            }
            (status, _) => status,
        }
    }

    /// Stable string used in API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Unpaid => "Unpaid",
            SettlementStatus::PartiallyPaid => "PartiallyPaid",
            SettlementStatus::FullyPaid => "FullyPaid",
            SettlementStatus::Overdue => "Overdue",
        }
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a payment was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash
    Cash,
    /// Bank transfer
    BankTransfer,
    /// Credit or debit card
    Card,
    /// Cheque
    Cheque,
    /// Mobile money wallet
    MobileMoney,
}

impl PaymentMethod {
    /// Returns true if the payment moves the Cash account rather than Bank
    pub fn settles_through_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

/// How a goods receipt is settled with the vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMode {
    /// Owed to the vendor; receipt credits Accounts Payable
    #[default]
    OnAccount,
    /// Paid at the door; receipt credits Cash
    CashOnDelivery,
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "bank_transfer" | "bank" => Ok(PaymentMethod::BankTransfer),
            "card" => Ok(PaymentMethod::Card),
            "cheque" | "check" => Ok(PaymentMethod::Cheque),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            other => Err(format!("Unknown payment method: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use rust_decimal_macros::dec;

    fn usd(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::USD)
    }

    #[test]
    fn test_status_mapping() {
        let total = usd(dec!(500.00));
        assert_eq!(SettlementStatus::from_amounts(&usd(dec!(0)), &total), SettlementStatus::Unpaid);
        assert_eq!(SettlementStatus::from_amounts(&usd(dec!(300)), &total), SettlementStatus::PartiallyPaid);
        assert_eq!(SettlementStatus::from_amounts(&usd(dec!(500)), &total), SettlementStatus::FullyPaid);
    }

    #[test]
    fn test_overdue_overlay() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let past = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let future = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();

        assert_eq!(SettlementStatus::Unpaid.with_due_date(Some(past), today), SettlementStatus::Overdue);
        assert_eq!(SettlementStatus::PartiallyPaid.with_due_date(Some(past), today), SettlementStatus::Overdue);
        assert_eq!(SettlementStatus::FullyPaid.with_due_date(Some(past), today), SettlementStatus::FullyPaid);
        assert_eq!(SettlementStatus::Unpaid.with_due_date(Some(future), today), SettlementStatus::Unpaid);
        assert_eq!(SettlementStatus::Unpaid.with_due_date(None, today), SettlementStatus::Unpaid);
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("Cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert!(PaymentMethod::Cash.settles_through_cash());
        assert!(!PaymentMethod::BankTransfer.settles_through_cash());
        assert!("barter".parse::<PaymentMethod>().is_err());
    }
}
