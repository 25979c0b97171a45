//! Scenario tests for invoice payment tracking

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::{Currency, Money, PaymentMethod, SettlementStatus};
use domain_ledger::{
    InMemoryCategoryRepository, InMemoryLedger, InMemoryPendingPostingStore, InMemoryTransactionRepository,
    LedgerPort, PostingAccounts, TransactionPoster,
};
use domain_sales::{
    InMemoryInvoiceRepository, Invoice, InvoiceLine, InvoicePaymentTracker, NewInvoice, NewPayment, SalesError,
};

fn usd(amount: Decimal) -> Money {
    Money::new(amount, Currency::USD)
}

fn new_invoice(reference: &str, total: Decimal) -> NewInvoice {
    NewInvoice {
        reference: reference.to_string(),
        invoice_date: Utc::now().date_naive(),
        due_date: None,
        customer_id: None,
        branch_id: None,
        currency: Currency::USD,
        lines: vec![InvoiceLine::new("Services", dec!(1), usd(total))],
        tax: Money::zero(Currency::USD),
        notes: None,
    }
}

async fn setup() -> (Arc<InvoicePaymentTracker>, Arc<InMemoryLedger>, PostingAccounts) {
    let ledger = Arc::new(InMemoryLedger::with_standard_chart(Currency::USD));
    let accounts = PostingAccounts::resolve(ledger.as_ref()).await.unwrap();
    let poster = Arc::new(TransactionPoster::new(
        ledger.clone(),
        Arc::new(InMemoryTransactionRepository::new()),
        Arc::new(InMemoryCategoryRepository::new()),
        Arc::new(InMemoryPendingPostingStore::new()),
        accounts,
    ));
    let tracker = InvoicePaymentTracker::new(Arc::new(InMemoryInvoiceRepository::new()), poster);
    (Arc::new(tracker), ledger, accounts)
}

mod invoice_500_tests {
    use super::*;

    #[tokio::test]
    async fn test_pay_300_then_200_then_one_cent() {
        let (tracker, _, _) = setup().await;
        let invoice = tracker.create_invoice(new_invoice("INV-500", dec!(500.00))).await.unwrap().document;

        tracker
            .record_payment(invoice.id, NewPayment::new(usd(dec!(300.00)), PaymentMethod::Cash))
            .await
            .unwrap();
        let details = tracker.get_payment_details(invoice.id).await.unwrap();
        assert_eq!(details.status, SettlementStatus::PartiallyPaid);
        assert_eq!(details.balance_due.amount(), dec!(200.00));

        tracker
            .record_payment(invoice.id, NewPayment::new(usd(dec!(200.00)), PaymentMethod::Cash))
            .await
            .unwrap();
        let details = tracker.get_payment_details(invoice.id).await.unwrap();
        assert_eq!(details.status, SettlementStatus::FullyPaid);
        assert_eq!(details.balance_due.amount(), dec!(0.00));

        let overpay = tracker
            .record_payment(invoice.id, NewPayment::new(usd(dec!(0.01)), PaymentMethod::Cash))
            .await;
        match overpay {
            Err(SalesError::Overpayment { balance_due, .. }) => assert!(balance_due.is_zero()),
            other => panic!("expected overpayment, got {:?}", other),
        }
        assert_eq!(tracker.list_payments(invoice.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_payment_leaves_no_ledger_trace() {
        let (tracker, ledger, accounts) = setup().await;
        let invoice = tracker.create_invoice(new_invoice("INV-501", dec!(500.00))).await.unwrap().document;

        let result = tracker
            .record_payment(invoice.id, NewPayment::new(usd(dec!(500.01)), PaymentMethod::Cash))
            .await;
        assert!(matches!(result, Err(SalesError::Overpayment { .. })));
        assert!(ledger.account_balance(accounts.cash, None).await.unwrap().is_zero());
        assert_eq!(ledger.account_balance(accounts.receivables, None).await.unwrap().amount(), dec!(500.00));
    }
}

mod oversized_invoice_tests {
    use super::*;

    #[tokio::test]
    async fn test_unrepresentable_total_rejected_before_anything_is_stored() {
        let (tracker, ledger, accounts) = setup().await;
        let mut input = new_invoice("INV-HUGE", dec!(1));
        input.lines = vec![InvoiceLine::new(
            "Bulk",
            dec!(100000000000000000000),
            usd(dec!(10000000000)),
        )];

        let result = tracker.create_invoice(input).await;
        assert!(matches!(result, Err(SalesError::Validation(_))));
        assert!(ledger.account_balance(accounts.receivables, None).await.unwrap().is_zero());

        // The reference was never taken
        let invoice = tracker.create_invoice(new_invoice("INV-HUGE", dec!(10.00))).await.unwrap().document;
        assert_eq!(invoice.total().amount(), dec!(10.00));
    }

    #[tokio::test]
    async fn test_total_above_amount_ceiling_rejected() {
        let (tracker, _, _) = setup().await;
        let input = new_invoice("INV-CEILING", dec!(2000000000000000));
        assert!(matches!(tracker.create_invoice(input).await, Err(SalesError::Validation(_))));
    }
}

mod concurrency_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_payments_exactly_one_succeeds() {
        let (tracker, _, _) = setup().await;
        let invoice = tracker.create_invoice(new_invoice("INV-RACE", dec!(500.00))).await.unwrap().document;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let tracker = tracker.clone();
            let id = invoice.id;
            handles.push(tokio::spawn(async move {
                tracker
                    .record_payment(id, NewPayment::new(usd(dec!(300.00)), PaymentMethod::Cash))
                    .await
            }));
        }

        let mut successes = 0;
        let mut overpayments = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(SalesError::Overpayment { balance_due, .. }) => {
                    assert_eq!(balance_due.amount(), dec!(200.00));
                    overpayments += 1;
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(overpayments, 1);

        let details = tracker.get_payment_details(invoice.id).await.unwrap();
        assert_eq!(details.paid_amount.amount(), dec!(300.00));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_small_payments_never_exceed_total() {
        let (tracker, ledger, accounts) = setup().await;
        let invoice = tracker.create_invoice(new_invoice("INV-MANY", dec!(100.00))).await.unwrap().document;

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let tracker = tracker.clone();
                let id = invoice.id;
                tokio::spawn(async move {
                    tracker
                        .record_payment(id, NewPayment::new(usd(dec!(10.00)), PaymentMethod::BankTransfer))
                        .await
                })
            })
            .collect();

        for handle in handles {
            let _ = handle.await.unwrap();
        }

        let details = tracker.get_payment_details(invoice.id).await.unwrap();
        assert!(details.paid_amount <= details.total);
        // Every committed payment was posted exactly once
        assert_eq!(
            ledger.account_balance(accounts.bank, None).await.unwrap().amount(),
            details.paid_amount.amount()
        );
    }
}

proptest! {
    /// paid == sum(payments) and paid <= total, whatever sequence is attempted
    #[test]
    fn prop_paid_never_exceeds_total(
        total_cents in 1i64..100_000i64,
        attempts in prop::collection::vec(1i64..50_000i64, 1..20)
    ) {
        let mut invoice = Invoice::create(new_invoice("INV-P", Decimal::new(total_cents, 2))).unwrap();

        for cents in attempts {
            let before = invoice.paid_amount();
            let result = invoice.record_payment(NewPayment::new(Money::from_minor(cents, Currency::USD), PaymentMethod::Cash));
            if result.is_err() {
                prop_assert_eq!(invoice.paid_amount(), before);
            }
            let sum: Decimal = invoice.payments.iter().map(|p| p.amount.amount()).sum();
            prop_assert_eq!(invoice.paid_amount().amount(), sum);
            prop_assert!(invoice.paid_amount() <= invoice.total());
        }
    }
}
