//! Process wiring: in-memory stores, services and background jobs built from
//! one [`VaultConfig`].

use std::io;
use std::sync::Arc;

use safevault_accounts::InMemoryAccountStore;
use safevault_core::Clock;
use safevault_ledger::InMemoryLedger;
use safevault_notifications::InMemoryNotificationStore;
use safevault_pricing::{CachedPriceFeed, PriceFeed};
use safevault_transfer::TransferService;

use crate::config::VaultConfig;
use crate::retention::RetentionSweeper;
use crate::runner::{JobRunner, JobRunnerHandle};
use crate::scan::FraudScanService;

pub type SharedPrices<F, C> = Arc<CachedPriceFeed<F, Arc<C>>>;

pub type VaultTransfers<F, C> =
    TransferService<Arc<InMemoryAccountStore>, Arc<InMemoryLedger>, SharedPrices<F, C>, Arc<C>>;

pub type VaultScanner<F, C> = FraudScanService<
    Arc<InMemoryAccountStore>,
    Arc<InMemoryLedger>,
    SharedPrices<F, C>,
    Arc<InMemoryNotificationStore>,
    Arc<C>,
>;

pub type VaultSweeper<C> = RetentionSweeper<
    Arc<InMemoryAccountStore>,
    Arc<InMemoryLedger>,
    Arc<InMemoryNotificationStore>,
    Arc<C>,
>;

/// Load configuration from the environment and install logging.
pub fn bootstrap() -> anyhow::Result<VaultConfig> {
    let config = VaultConfig::from_env()?;
    safevault_observability::init(config.log_format);
    tracing::info!(
        scan_interval_secs = config.scan_interval_secs,
        retention_days = config.retention_days,
        "configuration loaded"
    );
    Ok(config)
}

/// Every component, sharing one set of stores, clock and price cache.
pub struct SafeVault<F, C> {
    pub config: VaultConfig,
    pub accounts: Arc<InMemoryAccountStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub notifications: Arc<InMemoryNotificationStore>,
    pub prices: SharedPrices<F, C>,
    pub clock: Arc<C>,
    pub transfers: VaultTransfers<F, C>,
    pub scanner: Arc<VaultScanner<F, C>>,
    pub sweeper: Arc<VaultSweeper<C>>,
}

impl<F, C> SafeVault<F, C>
where
    F: PriceFeed + 'static,
    C: Clock + 'static,
{
    pub fn in_memory(config: VaultConfig, feed: F, clock: C) -> Self {
        let clock = Arc::new(clock);
        let accounts = InMemoryAccountStore::arc();
        let ledger = InMemoryLedger::arc();
        let notifications = InMemoryNotificationStore::arc();
        let prices = Arc::new(CachedPriceFeed::with_ttl(
            feed,
            clock.clone(),
            config.price_cache_ttl(),
        ));

        let transfers = TransferService::new(
            accounts.clone(),
            ledger.clone(),
            prices.clone(),
            clock.clone(),
        );
        let scanner = Arc::new(
            FraudScanService::new(
                accounts.clone(),
                ledger.clone(),
                prices.clone(),
                notifications.clone(),
                clock.clone(),
            )
            .with_rules(config.fraud.clone())
            .with_lookback(config.scan_lookback()),
        );
        let sweeper = Arc::new(
            RetentionSweeper::new(
                accounts.clone(),
                ledger.clone(),
                notifications.clone(),
                clock.clone(),
            )
            .with_retention(config.retention()),
        );

        Self {
            config,
            accounts,
            ledger,
            notifications,
            prices,
            clock,
            transfers,
            scanner,
            sweeper,
        }
    }

    /// Spawn the fraud scan and retention sweep on their configured intervals.
    pub fn start_jobs(&self) -> io::Result<VaultJobs> {
        let scan = JobRunner::every(self.config.scan_interval()).spawn(self.scanner.clone())?;
        let retention = match JobRunner::every(self.config.retention_sweep_interval())
            .spawn(self.sweeper.clone())
        {
            Ok(handle) => handle,
            Err(e) => {
                scan.shutdown();
                return Err(e);
            }
        };
        Ok(VaultJobs { scan, retention })
    }
}

/// Handles of the running background jobs.
#[derive(Debug)]
pub struct VaultJobs {
    scan: JobRunnerHandle,
    retention: JobRunnerHandle,
}

impl VaultJobs {
    /// Request a fraud scan now (e.g. from an administrator).
    pub fn trigger_scan(&self) {
        self.scan.trigger();
    }

    pub fn trigger_retention(&self) {
        self.retention.trigger();
    }

    pub fn shutdown(self) {
        self.scan.shutdown();
        self.retention.shutdown();
    }
}
