//! `safevault-fraud`
//!
//! **Responsibility:** fraud heuristics over a window of the ledger.
//!
//! This crate is intentionally side-effect free:
//! - It reads a [`ScanSnapshot`] captured by the caller.
//! - It never mutates accounts or writes notifications.
//! - It emits a [`Report`] of alerts; remediation is applied by the scan service in infra.

pub mod alert;
pub mod heuristics;
pub mod job;
pub mod report;
pub mod rules;
pub mod snapshot;

pub use alert::{Alert, AlertType};
pub use job::FraudScanJob;
pub use report::{Report, ScanError, ScanWindow, Summary};
pub use rules::FraudRules;
pub use snapshot::{AccountView, PriceTable, ScanSnapshot};
