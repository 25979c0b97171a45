//! Tests for core_kernel error types

use core_kernel::error::CoreError;
use core_kernel::money::MoneyError;
use core_kernel::{PortError, Version};

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("Invalid input");

    match error {
        CoreError::Validation(msg) => assert_eq!(msg, "Invalid input"),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_core_error_invalid_state() {
    let error = CoreError::invalid_state("Cannot approve a closed order");
    assert!(matches!(error, CoreError::InvalidStateTransition(_)));
    assert!(error.to_string().contains("closed order"));
}

#[test]
fn test_money_error_converts() {
    let error: CoreError = MoneyError::Overflow.into();
    assert!(matches!(error, CoreError::Money(MoneyError::Overflow)));
}

#[test]
fn test_port_conflict_display() {
    let error = PortError::conflict("Grn", "GRN-1", Version::from_u64(3), Version::from_u64(4));
    assert!(error.is_conflict());
    assert_eq!(
        error.to_string(),
        "Version conflict on Grn GRN-1: expected 3, found 4"
    );
}

#[test]
fn test_core_error_kinds() {
    use core_kernel::ErrorKind;
    assert_eq!(CoreError::validation("x").kind(), ErrorKind::Validation);
    assert_eq!(CoreError::invalid_state("x").kind(), ErrorKind::AlreadyClosed);
    assert_eq!(CoreError::not_found("x").kind(), ErrorKind::NotFound);
}
