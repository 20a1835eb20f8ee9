//! Infrastructure layer: configuration, scheduled jobs and wiring.
//!
//! The domain crates are pure; this crate owns the threads that run the fraud
//! scan and the retention sweep, and turns their failures into notifications.

pub mod config;
pub mod retention;
pub mod runner;
pub mod scan;
pub mod vault;

pub use config::{ConfigError, VaultConfig};
pub use retention::{RetentionSweeper, SweepStats};
pub use runner::{JobRunner, JobRunnerHandle, ScheduledJob};
pub use scan::{FraudScanService, ScanOutcome};
pub use vault::{SafeVault, VaultJobs, bootstrap};
