//! Transfer protocol: the only writer of paired balance changes.
//!
//! Every operation locks the accounts it touches (ascending id order), applies
//! the debit, the credit and the ledger append to working copies, and commits
//! only when all three succeed. One ledger entry on success, none on failure.

pub mod error;
pub mod service;

pub use error::{TransferError, TransferResult};
pub use service::{ConversionReceipt, DEFAULT_CONFLICT_RETRIES, Direction, TransferService};
