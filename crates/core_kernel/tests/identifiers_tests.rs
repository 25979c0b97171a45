//! Tests for strongly-typed identifiers

use core_kernel::{
    AccountId, GrnId, GrnPaymentId, InvoiceId, ItemId, PaymentId, PostingBatchId,
    PurchaseOrderId, TransactionId,
};
use uuid::Uuid;

#[test]
fn test_new_generates_unique_ids() {
    assert_ne!(InvoiceId::new(), InvoiceId::new());
}

#[test]
fn test_new_v7_generates_time_ordered_ids() {
    let id1 = PostingBatchId::new_v7();
    std::thread::sleep(std::time::Duration::from_millis(1));
    let id2 = PostingBatchId::new_v7();
    assert!(id1 < id2);
}

#[test]
fn test_prefixes() {
    assert_eq!(AccountId::prefix(), "ACC");
    assert_eq!(PurchaseOrderId::prefix(), "PO");
    assert_eq!(GrnId::prefix(), "GRN");
    assert_eq!(GrnPaymentId::prefix(), "GRNP");
    assert_eq!(TransactionId::prefix(), "TXN");
    assert_eq!(PaymentId::prefix(), "PAY");
}

#[test]
fn test_display_and_parse_round_trip() {
    let id = ItemId::new();
    let display = id.to_string();
    assert!(display.starts_with("ITM-"));
    assert_eq!(display.parse::<ItemId>().unwrap(), id);
}

#[test]
fn test_parse_rejects_garbage() {
    assert!("GRN-not-a-uuid".parse::<GrnId>().is_err());
}

#[test]
fn test_serde_is_transparent() {
    let uuid = Uuid::new_v4();
    let id = InvoiceId::from_uuid(uuid);
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{}\"", uuid));
}
