//! Custom Test Assertions
//!
//! Assertion helpers for the reconciliation invariants. They give more
//! meaningful failure messages than bare `assert_eq!` on nested figures.

use chrono::NaiveDate;
use core_kernel::{Money, SettlementStatus};
use domain_ledger::{GeneralLedgerEntry, TrialBalance};
use domain_purchase::{GoodsReceivedNote, PurchaseOrder};
use domain_sales::Invoice;
use rust_decimal::Decimal;

/// Asserts that a Money value has the given amount, whatever its scale
pub fn assert_money_eq(actual: &Money, expected: Decimal) {
    assert_eq!(
        actual.amount().normalize(),
        expected.normalize(),
        "Expected {} {}, got {} {}",
        actual.currency(),
        expected,
        actual.currency(),
        actual.amount()
    );
}

/// Asserts that money values sum to a total
pub fn assert_money_sum(parts: &[Money], total: &Money) {
    let sum = Money::sum(total.currency(), parts.iter())
        .unwrap_or_else(|e| panic!("Cannot sum parts: {}", e));
    assert_eq!(
        sum.amount(),
        total.amount(),
        "Parts sum to {}, expected {}",
        sum.amount(),
        total.amount()
    );
}

/// Asserts the payment figures of an invoice
///
/// Also checks that the paid amount is the sum of the recorded payments
/// and never exceeds the total.
pub fn assert_invoice_figures(invoice: &Invoice, paid: Decimal, balance_due: Decimal, status: SettlementStatus) {
    assert_money_eq(&invoice.paid_amount(), paid);
    assert_money_eq(&invoice.balance_due(), balance_due);
    assert_eq!(
        invoice.status(invoice.invoice_date),
        status,
        "Invoice {} has status {:?}, expected {:?}",
        invoice.reference,
        invoice.status(invoice.invoice_date),
        status
    );

    let payments: Vec<Money> = invoice.payments.iter().map(|p| p.amount).collect();
    assert_money_sum(&payments, &invoice.paid_amount());
    assert!(
        invoice.paid_amount().amount() <= invoice.total().amount(),
        "Invoice {} is overpaid: {} of {}",
        invoice.reference,
        invoice.paid_amount().amount(),
        invoice.total().amount()
    );
}

/// Asserts the payment figures of a GRN as of `today`
pub fn assert_grn_figures(grn: &GoodsReceivedNote, paid: Decimal, balance_due: Decimal, today: NaiveDate) {
    assert_money_eq(&grn.paid_amount(), paid);
    assert_money_eq(&grn.balance_due(), balance_due);
    assert!(
        grn.paid_amount().amount() <= grn.payable().amount(),
        "GRN {} is overpaid",
        grn.reference
    );
    if balance_due.is_zero() && !paid.is_zero() {
        assert_eq!(grn.status(today), SettlementStatus::FullyPaid);
    }
}

/// Asserts the received quantity of every line of a purchase order
///
/// `expected` pairs a line index with its received quantity. Every line is
/// also checked to stay within `0..=quantity_ordered`.
pub fn assert_received(order: &PurchaseOrder, expected: &[(usize, Decimal)]) {
    for (index, quantity) in expected {
        let line = &order.lines[*index];
        assert_eq!(
            line.received_quantity, *quantity,
            "PO {} line {} received {}, expected {}",
            order.reference, index, line.received_quantity, quantity
        );
    }
    for line in &order.lines {
        assert!(
            line.received_quantity >= Decimal::ZERO && line.received_quantity <= line.quantity_ordered,
            "PO {} item {} received {} of {}",
            order.reference,
            line.item_id,
            line.received_quantity,
            line.quantity_ordered
        );
    }
}

/// Asserts that a set of committed entries balances
pub fn assert_entries_balanced(entries: &[GeneralLedgerEntry]) {
    let debits: Decimal = entries.iter().map(|e| e.debit.amount()).sum();
    let credits: Decimal = entries.iter().map(|e| e.credit.amount()).sum();
    assert_eq!(debits, credits, "Entries unbalanced: debits {} != credits {}", debits, credits);
}

/// Asserts that the trial balance balances
pub fn assert_trial_balanced(trial: &TrialBalance) {
    assert!(
        trial.is_balanced && trial.total_debits == trial.total_credits,
        "Trial balance unbalanced: debits {} != credits {}",
        trial.total_debits.amount(),
        trial.total_credits.amount()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::MoneyFixtures;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_eq_ignores_scale() {
        assert_money_eq(&MoneyFixtures::usd(dec!(200.00)), dec!(200));
    }

    #[test]
    #[should_panic(expected = "Expected")]
    fn test_money_eq_fails_on_difference() {
        assert_money_eq(&MoneyFixtures::usd(dec!(200.00)), dec!(200.01));
    }

    #[test]
    fn test_money_sum() {
        let parts = vec![MoneyFixtures::usd(dec!(300)), MoneyFixtures::usd(dec!(200))];
        assert_money_sum(&parts, &MoneyFixtures::usd_500());
    }

    #[test]
    #[should_panic(expected = "Parts sum")]
    fn test_money_sum_fails() {
        let parts = vec![MoneyFixtures::usd(dec!(300))];
        assert_money_sum(&parts, &MoneyFixtures::usd_500());
    }
}
