//! Purchasing Domain - Purchase Orders, Goods Receipt, and Vendor Payments
//!
//! # Document chain
//!
//! - **PurchaseOrder**: ordered quantities; received quantities accumulate
//!   across GRNs and never exceed what was ordered
//! - **GoodsReceivedNote**: physical receipt, standalone or against one PO;
//!   receiving it moves PO quantities, writes stock IN rows and posts
//!   Inventory against Accounts Payable (or Cash on delivery)
//! - **GrnPayment**: vendor payment against a received GRN
//!
//! # Example
//!
//! ```rust,ignore
//! let grn = fulfillment.create_grn(new_grn).await?;
//! let receipt = fulfillment.receive_grn(grn.id).await?;
//! payments.record_payment(grn.id, NewGrnPayment::new(amount, PaymentMethod::BankTransfer)).await?;
//! ```

pub mod purchase_order;
pub mod grn;
pub mod stock;
pub mod ports;
pub mod fulfillment;
pub mod grn_payment;
pub mod error;

pub use purchase_order::{PurchaseOrder, PurchaseOrderLine, NewPurchaseOrder, FulfillmentStatus, AppliedReceipt};
pub use grn::{GoodsReceivedNote, GrnLine, GrnPayment, NewGrn, NewGrnPayment, GrnPaymentDetails};
pub use stock::{StockTransaction, StockDirection};
pub use ports::{PurchaseRepository, InMemoryPurchaseRepository, ReceiptCommit};
pub use fulfillment::{PurchaseFulfillmentTracker, GrnReceipt};
pub use grn_payment::GrnPaymentTracker;
pub use error::PurchaseError;
