//! Cross-domain scenarios over the in-memory back office
//!
//! Sales, purchasing and manual transactions all post to one ledger; these
//! tests check that the ledger stays balanced while the documents move.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{PaymentMethod, SettlementStatus};
use domain_ledger::{LedgerOutcome, LedgerPort, StandardChartOfAccounts, TransactionKind};
use domain_purchase::NewGrnPayment;
use domain_sales::{NewPayment, SalesError};
use test_utils::*;

async fn balance_of(backoffice: &InMemoryBackoffice, code: &str) -> Decimal {
    let account = backoffice.ledger.find_account_by_code(code).await.unwrap().unwrap();
    backoffice.ledger.account_balance(account.id, None).await.unwrap().amount()
}

#[tokio::test]
async fn test_sale_purchase_and_expense_keep_the_ledger_balanced() {
    let backoffice = InMemoryBackoffice::new().await.unwrap();

    let invoice = backoffice
        .invoices
        .create_invoice(InvoiceBuilder::for_total(dec!(500.00)))
        .await
        .unwrap()
        .document;
    backoffice
        .invoices
        .record_payment(invoice.id, NewPayment::new(MoneyFixtures::usd(dec!(300.00)), PaymentMethod::Cash))
        .await
        .unwrap();

    let order = backoffice
        .fulfillment
        .create_purchase_order(
            PurchaseOrderBuilder::new()
                .with_line(IdFixtures::item_id(), dec!(100), dec!(2.50))
                .build(),
        )
        .await
        .unwrap();
    let grn = backoffice
        .fulfillment
        .create_grn(
            GrnBuilder::against(order.id)
                .with_line(IdFixtures::item_id(), dec!(60), dec!(2.50))
                .build(),
        )
        .await
        .unwrap();
    let receipt = backoffice.fulfillment.receive_grn(grn.id).await.unwrap();
    assert!(matches!(receipt.ledger, LedgerOutcome::Posted { .. }));

    let category = backoffice
        .poster
        .get_or_create_category("Office Supplies", TransactionKind::Expense)
        .await
        .unwrap();
    let expense = backoffice
        .poster
        .create_transaction(TransactionBuilder::expense(category.id, dec!(45.00)).build())
        .await
        .unwrap();
    backoffice.poster.post_transaction(expense.id).await.unwrap();

    let trial = backoffice.ledger.trial_balance(None).await.unwrap();
    assert_trial_balanced(&trial);

    // 300 received less 45 spent
    assert_eq!(balance_of(&backoffice, StandardChartOfAccounts::CASH).await, dec!(255.00));
    assert_eq!(balance_of(&backoffice, StandardChartOfAccounts::ACCOUNTS_RECEIVABLE).await, dec!(200.00));
    assert_eq!(balance_of(&backoffice, StandardChartOfAccounts::INVENTORY).await, dec!(150.00));
    assert_eq!(balance_of(&backoffice, StandardChartOfAccounts::ACCOUNTS_PAYABLE).await, dec!(150.00));
}

#[tokio::test]
async fn test_invoice_walkthrough() {
    let backoffice = InMemoryBackoffice::new().await.unwrap();
    let invoice = backoffice
        .invoices
        .create_invoice(InvoiceBuilder::for_total(dec!(500.00)))
        .await
        .unwrap()
        .document;
    let pay = |amount: Decimal| NewPayment::new(MoneyFixtures::usd(amount), PaymentMethod::BankTransfer);

    backoffice.invoices.record_payment(invoice.id, pay(dec!(300.00))).await.unwrap();
    let current = backoffice.invoices.get_invoice(invoice.id).await.unwrap();
    assert_invoice_figures(&current, dec!(300), dec!(200), SettlementStatus::PartiallyPaid);

    backoffice.invoices.record_payment(invoice.id, pay(dec!(200.00))).await.unwrap();
    let current = backoffice.invoices.get_invoice(invoice.id).await.unwrap();
    assert_invoice_figures(&current, dec!(500), dec!(0), SettlementStatus::FullyPaid);

    let err = backoffice.invoices.record_payment(invoice.id, pay(dec!(0.01))).await.unwrap_err();
    assert!(matches!(err, SalesError::Overpayment { .. }));
}

#[tokio::test]
async fn test_grn_walkthrough() {
    let backoffice = InMemoryBackoffice::new().await.unwrap();
    let grn = backoffice
        .fulfillment
        .create_grn(
            GrnBuilder::standalone()
                .with_line(IdFixtures::item_id(), dec!(3), dec!(250.00))
                .build(),
        )
        .await
        .unwrap();
    let payment = NewGrnPayment::new(MoneyFixtures::usd_750(), PaymentMethod::BankTransfer);

    assert!(backoffice.grn_payments.record_payment(grn.id, payment.clone()).await.is_err());

    backoffice.fulfillment.receive_grn(grn.id).await.unwrap();
    backoffice.grn_payments.record_payment(grn.id, payment).await.unwrap();

    let grn = backoffice.fulfillment.get_grn(grn.id).await.unwrap();
    assert_grn_figures(&grn, dec!(750), dec!(0), DateFixtures::document_date());
    assert_eq!(balance_of(&backoffice, StandardChartOfAccounts::ACCOUNTS_PAYABLE).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_purchase_order_receipts_stop_at_ordered_quantity() {
    let backoffice = InMemoryBackoffice::new().await.unwrap();
    let order = backoffice
        .fulfillment
        .create_purchase_order(
            PurchaseOrderBuilder::new()
                .with_line(IdFixtures::item_id(), dec!(100), dec!(1.00))
                .build(),
        )
        .await
        .unwrap();

    for (quantity, accepted) in [(dec!(60), true), (dec!(50), false), (dec!(40), true)] {
        let grn = backoffice
            .fulfillment
            .create_grn(
                GrnBuilder::against(order.id)
                    .with_line(IdFixtures::item_id(), quantity, dec!(1.00))
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(backoffice.fulfillment.receive_grn(grn.id).await.is_ok(), accepted);
    }

    let order = backoffice.fulfillment.get_purchase_order(order.id).await.unwrap();
    assert_received(&order, &[(0, dec!(100))]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_paid_amount_never_exceeds_total((total, attempts) in payment_sequence_strategy()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let backoffice = InMemoryBackoffice::new().await.unwrap();
            let invoice = backoffice
                .invoices
                .create_invoice(InvoiceBuilder::for_total(total))
                .await
                .unwrap()
                .document;

            let mut accepted = Decimal::ZERO;
            for amount in attempts {
                let payment = NewPayment::new(MoneyFixtures::usd(amount), PaymentMethod::Cash);
                if backoffice.invoices.record_payment(invoice.id, payment).await.is_ok() {
                    accepted += amount;
                }
            }

            let invoice = backoffice.invoices.get_invoice(invoice.id).await.unwrap();
            assert_money_eq(&invoice.paid_amount(), accepted);
            assert!(accepted <= total);
            assert_trial_balanced(&backoffice.ledger.trial_balance(None).await.unwrap());
        });
    }

    #[test]
    fn test_received_quantity_stays_within_ordered((ordered, attempts) in receipt_sequence_strategy()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let backoffice = InMemoryBackoffice::new().await.unwrap();
            let order = backoffice
                .fulfillment
                .create_purchase_order(
                    PurchaseOrderBuilder::new()
                        .with_line(IdFixtures::item_id(), ordered, dec!(1.00))
                        .build(),
                )
                .await
                .unwrap();

            let mut received = Decimal::ZERO;
            for quantity in attempts {
                let grn = backoffice
                    .fulfillment
                    .create_grn(
                        GrnBuilder::against(order.id)
                            .with_line(IdFixtures::item_id(), quantity, dec!(1.00))
                            .build(),
                    )
                    .await
                    .unwrap();
                if backoffice.fulfillment.receive_grn(grn.id).await.is_ok() {
                    received += quantity;
                }
            }

            let order = backoffice.fulfillment.get_purchase_order(order.id).await.unwrap();
            assert_received(&order, &[(0, received)]);
        });
    }
}
