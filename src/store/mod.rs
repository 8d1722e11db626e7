//! Persistence layer: the processed-id ledger.

pub mod ledger;

pub use ledger::ProcessedLedger;
