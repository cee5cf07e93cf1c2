//! Accounting services shared by the HTTP handlers and background jobs

pub mod adjustments;
pub mod invoicing;
pub mod ledger;
pub mod orders;
pub mod reports;
pub mod sequence;
pub mod settlement;
pub mod tracker;

pub use adjustments::AdjustmentService;
pub use invoicing::InvoicingService;
pub use ledger::Ledger;
pub use settlement::{PaymentDetails, SettlementService};
