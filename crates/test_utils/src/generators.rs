//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating amounts, quantities and
//! payment sequences that respect the domain's precision rules.

use core_kernel::{Currency, Money, PaymentMethod};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for the currencies the ledger can be kept in
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::GBP),
        Just(Currency::INR),
    ]
}

/// Strategy for positive two-decimal amounts, 0.01 to 100,000.00
pub fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for positive USD Money
pub fn usd_money_strategy() -> impl Strategy<Value = Money> {
    amount_strategy().prop_map(|amount| Money::new(amount, Currency::USD))
}

/// Strategy for whole-unit quantities, 1 to 1,000
pub fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000i64).prop_map(Decimal::from)
}

/// Strategy for payment methods
pub fn payment_method_strategy() -> impl Strategy<Value = PaymentMethod> {
    prop_oneof![
        Just(PaymentMethod::Cash),
        Just(PaymentMethod::BankTransfer),
        Just(PaymentMethod::Card),
        Just(PaymentMethod::Cheque),
        Just(PaymentMethod::MobileMoney),
    ]
}

/// Strategy for a total and a sequence of attempted payments against it
///
/// Attempts are drawn up to the total each, so a sequence usually contains
/// both payments that fit and payments that would overpay.
pub fn payment_sequence_strategy() -> impl Strategy<Value = (Decimal, Vec<Decimal>)> {
    (100i64..1_000_000i64).prop_flat_map(|total_cents| {
        let total = Decimal::new(total_cents, 2);
        let attempts = prop::collection::vec((1i64..=total_cents).prop_map(|c| Decimal::new(c, 2)), 1..8);
        (Just(total), attempts)
    })
}

/// Strategy for an ordered quantity and a sequence of receipt attempts
pub fn receipt_sequence_strategy() -> impl Strategy<Value = (Decimal, Vec<Decimal>)> {
    (1i64..=500i64).prop_flat_map(|ordered| {
        let attempts = prop::collection::vec((1i64..=ordered).prop_map(Decimal::from), 1..6);
        (Just(Decimal::from(ordered)), attempts)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_amounts_are_positive_cents(amount in amount_strategy()) {
            prop_assert!(amount > Decimal::ZERO);
            prop_assert!(amount.scale() <= 2);
        }

        #[test]
        fn test_quantities_are_whole(quantity in quantity_strategy()) {
            prop_assert!(quantity >= Decimal::ONE);
            prop_assert_eq!(quantity.fract(), Decimal::ZERO);
        }

        #[test]
        fn test_payment_attempts_fit_within_total((total, attempts) in payment_sequence_strategy()) {
            prop_assert!(!attempts.is_empty());
            for attempt in attempts {
                prop_assert!(attempt > Decimal::ZERO && attempt <= total);
            }
        }

        #[test]
        fn test_receipt_attempts_fit_within_ordered((ordered, attempts) in receipt_sequence_strategy()) {
            for attempt in attempts {
                prop_assert!(attempt >= Decimal::ONE && attempt <= ordered);
            }
        }

        #[test]
        fn test_usd_money_is_usd(money in usd_money_strategy()) {
            prop_assert_eq!(money.currency(), Currency::USD);
            prop_assert!(money.is_positive());
        }
    }
}
