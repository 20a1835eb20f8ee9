//! Retention sweep: permanently removes records soft-deleted longer ago than
//! the retention window.

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use safevault_accounts::{AccountFilter, AccountStore, PurgeCascade};
use safevault_core::{AccountId, Clock, DomainResult, Severity};
use safevault_ledger::{Ledger, LedgerFilter};
use safevault_notifications::{Category, NewNotification, NotificationStore};

use crate::runner::ScheduledJob;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepStats {
    pub accounts: usize,
    /// Ledger entries, whether purged on their own or with their account.
    pub transactions: usize,
}

/// Purges an account's ledger entries before the account goes.
struct LedgerCascade<'a, L>(&'a L);

impl<L> PurgeCascade for LedgerCascade<'_, L>
where
    L: Ledger,
{
    fn purge_account_records(&self, account: AccountId) -> DomainResult<usize> {
        self.0.purge_account(account)
    }
}

pub struct RetentionSweeper<S, L, N, C> {
    accounts: S,
    ledger: L,
    notifications: N,
    clock: C,
    retention: Duration,
}

impl<S, L, N, C> RetentionSweeper<S, L, N, C>
where
    S: AccountStore,
    L: Ledger,
    N: NotificationStore,
    C: Clock,
{
    pub fn new(accounts: S, ledger: L, notifications: N, clock: C) -> Self {
        Self {
            accounts,
            ledger,
            notifications,
            clock,
            retention: Duration::days(30),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Purge everything soft-deleted before `now - retention`.
    ///
    /// Accounts go first so their entries are removed by the cascade; the
    /// remaining expired entries belong to live accounts.
    pub fn sweep(&self, now: DateTime<Utc>) -> anyhow::Result<SweepStats> {
        let cutoff = now - self.retention;
        let mut stats = SweepStats::default();

        let expired = self
            .accounts
            .find_by_filter(&AccountFilter::deleted_before(cutoff))
            .context("listing expired accounts")?;
        for account in expired {
            let id = account.id_typed();
            stats.transactions += self
                .accounts
                .purge(id, &LedgerCascade(&self.ledger))
                .with_context(|| format!("purging account {id}"))?;
            stats.accounts += 1;
        }

        let entries = self
            .ledger
            .scan(&LedgerFilter::deleted_before(cutoff))
            .context("listing expired ledger entries")?;
        for entry in entries {
            self.ledger
                .purge(entry.transaction_id)
                .with_context(|| format!("purging transaction {}", entry.transaction_id))?;
            stats.transactions += 1;
        }

        info!(
            cutoff = %cutoff,
            accounts = stats.accounts,
            transactions = stats.transactions,
            "retention sweep completed"
        );

        self.notifications
            .publish(
                NewNotification::new(
                    Category::System,
                    "Retention sweep completed",
                    format!(
                        "Purged {} account(s) and {} transaction(s) deleted before {}",
                        stats.accounts,
                        stats.transactions,
                        cutoff.to_rfc3339()
                    ),
                ),
                now,
            )
            .context("publishing sweep summary")?;

        Ok(stats)
    }

    /// Job boundary: failures are logged and written to the inbox.
    pub fn sweep_guarded(&self) -> Option<SweepStats> {
        let now = self.clock.now();
        match self.sweep(now) {
            Ok(stats) => Some(stats),
            Err(err) => {
                self.report_failure(&err, now);
                None
            }
        }
    }

    fn report_failure(&self, err: &anyhow::Error, now: DateTime<Utc>) {
        error!(error = ?err, "retention sweep failed");
        let published = self.notifications.publish(
            NewNotification::new(Category::Error, "Retention sweep failed", format!("{err:#}"))
                .with_severity(Severity::Medium),
            now,
        );
        if let Err(e) = published {
            error!(error = %e, "could not publish sweep failure notification");
        }
    }
}

impl<S, L, N, C> ScheduledJob for RetentionSweeper<S, L, N, C>
where
    S: AccountStore + 'static,
    L: Ledger + 'static,
    N: NotificationStore + 'static,
    C: Clock + 'static,
{
    fn name(&self) -> &'static str {
        "retention-sweep"
    }

    fn run_once(&self) -> anyhow::Result<()> {
        self.sweep(self.clock.now()).map(|_| ())
    }

    fn on_exhausted(&self, error: &anyhow::Error) {
        self.report_failure(error, self.clock.now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use safevault_accounts::{InMemoryAccountStore, NewAccount};
    use safevault_core::{Asset, ManualClock, TransactionId};
    use safevault_ledger::{EntryDraft, InMemoryLedger, PartySnapshot};
    use safevault_notifications::{InMemoryNotificationStore, NotificationFilter, PageRequest};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn open(accounts: &InMemoryAccountStore, name: &str) -> AccountId {
        accounts
            .create(
                NewAccount {
                    display_name: name.to_string(),
                    contact_email: format!("{name}@example.com"),
                },
                start(),
            )
            .unwrap()
            .id_typed()
    }

    fn deposit(ledger: &InMemoryLedger, accounts: &InMemoryAccountStore, to: AccountId) -> TransactionId {
        let receiver = PartySnapshot::of(&accounts.get(to).unwrap());
        ledger
            .append(EntryDraft::completed(
                PartySnapshot::cash_deposit(),
                receiver,
                dec!(100),
                Asset::Inr.into(),
                start(),
            ))
            .unwrap()
            .transaction_id
    }

    #[test]
    fn purges_only_what_is_past_retention() {
        let accounts = InMemoryAccountStore::arc();
        let ledger = InMemoryLedger::arc();
        let notifications = InMemoryNotificationStore::arc();
        let clock = Arc::new(ManualClock::new(start()));

        let gone = open(&accounts, "gone");
        let recent = open(&accounts, "recent");
        let live = open(&accounts, "live");
        let gone_entry = deposit(&ledger, &accounts, gone);
        let old_entry = deposit(&ledger, &accounts, live);
        let kept_entry = deposit(&ledger, &accounts, live);

        accounts.soft_delete(gone, start()).unwrap();
        ledger.soft_delete(old_entry, start()).unwrap();
        accounts.soft_delete(recent, start() + Duration::days(20)).unwrap();

        let sweeper = RetentionSweeper::new(
            accounts.clone(),
            ledger.clone(),
            notifications.clone(),
            clock.clone(),
        );
        let stats = sweeper.sweep(start() + Duration::days(31)).unwrap();

        assert_eq!(
            stats,
            SweepStats {
                accounts: 1,
                transactions: 2
            }
        );
        assert!(accounts.get_including_deleted(gone).is_err());
        assert!(ledger.get_including_deleted(gone_entry).is_err());
        assert!(ledger.get_including_deleted(old_entry).is_err());
        assert!(accounts.get_including_deleted(recent).is_ok());
        assert!(ledger.get(kept_entry).is_ok());

        let page = notifications
            .list(&NotificationFilter::category(Category::System), PageRequest::default())
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.items[0].body.starts_with("Purged 1 account(s) and 2 transaction(s)"));

        // Nothing left to do.
        clock.set(start() + Duration::days(32));
        assert_eq!(sweeper.sweep_guarded(), Some(SweepStats::default()));
    }

    #[test]
    fn exhausted_sweep_is_reported_as_a_medium_error() {
        let notifications = InMemoryNotificationStore::arc();
        let sweeper = RetentionSweeper::new(
            InMemoryAccountStore::arc(),
            InMemoryLedger::arc(),
            notifications.clone(),
            Arc::new(ManualClock::new(start())),
        );

        sweeper.on_exhausted(&anyhow::anyhow!("ledger unavailable"));

        let page = notifications
            .list(&NotificationFilter::category(Category::Error), PageRequest::default())
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].severity, Severity::Medium);
        assert!(page.items[0].body.contains("ledger unavailable"));
    }
}
