//! Fraud scan service: snapshot → pure scan → remediation → notification.

use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use safevault_accounts::{AccountStore, Actor, StatusCommand};
use safevault_core::{AccountId, Clock, DomainError, NotificationId, Severity};
use safevault_fraud::{Alert, FraudRules, FraudScanJob, Report, ScanSnapshot, ScanWindow};
use safevault_ledger::Ledger;
use safevault_notifications::{Category, NewNotification, NotificationStore};
use safevault_pricing::PriceFeed;

use crate::runner::ScheduledJob;

/// Result of one scan that made it through every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub report: Report,
    /// Accounts banned and flagged by this run (sorted).
    pub remediated: Vec<AccountId>,
    /// The fraud notification, if the report had alerts.
    pub notification: Option<NotificationId>,
}

/// Wraps [`FraudScanJob`] with the side effects the pure scan leaves out.
pub struct FraudScanService<S, L, P, N, C> {
    accounts: S,
    ledger: L,
    prices: P,
    notifications: N,
    clock: C,
    rules: FraudRules,
    lookback: Duration,
}

impl<S, L, P, N, C> FraudScanService<S, L, P, N, C>
where
    S: AccountStore,
    L: Ledger,
    P: PriceFeed,
    N: NotificationStore,
    C: Clock,
{
    pub fn new(accounts: S, ledger: L, prices: P, notifications: N, clock: C) -> Self {
        Self {
            accounts,
            ledger,
            prices,
            notifications,
            clock,
            rules: FraudRules::default(),
            lookback: Duration::hours(24),
        }
    }

    pub fn with_rules(mut self, rules: FraudRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn rules(&self) -> &FraudRules {
        &self.rules
    }

    /// Scan `window`, remediate, and publish a digest.
    pub fn run(&self, window: ScanWindow) -> anyhow::Result<ScanOutcome> {
        let now = self.clock.now();
        let snapshot = ScanSnapshot::capture(&self.accounts, &self.ledger, &self.prices, window, now)
            .context("capturing scan snapshot")?;
        let report = FraudScanJob::new(snapshot)
            .with_rules(self.rules.clone())
            .run()
            .context("running fraud heuristics")?;

        let remediated = self.remediate(&report, now)?;
        let notification = self.notify(&report, now)?;

        info!(
            from = %window.from,
            to = %window.to,
            transactions = report.scanned_transactions,
            alerts = report.summary.total_alerts,
            remediated = remediated.len(),
            "fraud scan completed"
        );

        Ok(ScanOutcome {
            report,
            remediated,
            notification,
        })
    }

    /// Scan the trailing lookback window ending now.
    pub fn run_trailing(&self) -> anyhow::Result<ScanOutcome> {
        let window = ScanWindow::trailing(self.clock.now(), self.lookback)?;
        self.run(window)
    }

    /// Job boundary: a failed scan is logged and becomes a `HIGH` error
    /// notification instead of an error for the caller.
    pub fn run_guarded(&self, window: ScanWindow) -> Option<ScanOutcome> {
        match self.run(window) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                self.report_failure(&err);
                None
            }
        }
    }

    fn report_failure(&self, err: &anyhow::Error) {
        error!(error = ?err, "fraud scan failed");
        let published = self.notifications.publish(
            NewNotification::new(Category::Error, "Fraud scan failed", format!("{err:#}"))
                .with_severity(Severity::High),
            self.clock.now(),
        );
        if let Err(e) = published {
            error!(error = %e, "could not publish scan failure notification");
        }
    }

    /// Ban + flag every account with an alert that calls for it, unless it is
    /// already banned. Each account is its own atomic unit.
    fn remediate(&self, report: &Report, now: DateTime<Utc>) -> anyhow::Result<Vec<AccountId>> {
        let mut targets: BTreeMap<AccountId, &Alert> = BTreeMap::new();
        for alert in report.alerts.iter().filter(|a| a.requires_remediation()) {
            if let Some(account) = alert.account {
                targets.entry(account).or_insert(alert);
            }
        }

        let mut remediated = Vec::with_capacity(targets.len());
        for (id, alert) in targets {
            let reason = format!("{}: {}", alert.alert_type, alert.description);
            let ban_hours = self.rules.ban_duration_hours;

            let applied = self
                .accounts
                .transact(&[id], |set| -> Result<bool, DomainError> {
                    // Deleted since the snapshot was taken.
                    if !set.contains(id) {
                        return Ok(false);
                    }
                    let account = set.get_mut(id)?;
                    account.lift_expired_ban(now);
                    if account.is_banned() {
                        return Ok(false);
                    }
                    account.apply_status(
                        StatusCommand::Ban {
                            reason: reason.clone(),
                            duration_hours: ban_hours,
                            actor: Actor::FraudScanner,
                        },
                        now,
                    )?;
                    account.apply_status(
                        StatusCommand::Flag {
                            reason: reason.clone(),
                            actor: Actor::FraudScanner,
                        },
                        now,
                    )?;
                    Ok(true)
                })
                .with_context(|| format!("remediating account {id}"))?;

            if applied {
                warn!(
                    account = %id,
                    alert_type = %alert.alert_type,
                    ban_hours,
                    "account banned and flagged by fraud scan"
                );
                remediated.push(id);
            }
        }
        Ok(remediated)
    }

    fn notify(&self, report: &Report, now: DateTime<Utc>) -> anyhow::Result<Option<NotificationId>> {
        let Some(severity) = report.alerts.iter().map(|a| a.severity).max() else {
            return Ok(None);
        };
        let subject = format!("Fraud scan: {} alert(s)", report.summary.total_alerts);
        let notification = self
            .notifications
            .publish(
                NewNotification::new(Category::FraudAlert, subject, report.render())
                    .with_severity(severity),
                now,
            )
            .context("publishing fraud report")?;
        Ok(Some(notification.id))
    }
}

impl<S, L, P, N, C> ScheduledJob for FraudScanService<S, L, P, N, C>
where
    S: AccountStore + 'static,
    L: Ledger + 'static,
    P: PriceFeed + 'static,
    N: NotificationStore + 'static,
    C: Clock + 'static,
{
    fn name(&self) -> &'static str {
        "fraud-scan"
    }

    fn run_once(&self) -> anyhow::Result<()> {
        self.run_trailing().map(|_| ())
    }

    fn on_exhausted(&self, error: &anyhow::Error) {
        self.report_failure(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use safevault_accounts::{AccountStatus, InMemoryAccountStore, NewAccount, StatusChangeKind};
    use safevault_core::{Asset, ManualClock};
    use safevault_ledger::{EntryDraft, InMemoryLedger, PartySnapshot};
    use safevault_notifications::{InMemoryNotificationStore, NotificationFilter, PageRequest};
    use safevault_pricing::StaticPriceFeed;

    type Service = FraudScanService<
        Arc<InMemoryAccountStore>,
        Arc<InMemoryLedger>,
        Arc<StaticPriceFeed>,
        Arc<InMemoryNotificationStore>,
        Arc<ManualClock>,
    >;

    struct Fixture {
        accounts: Arc<InMemoryAccountStore>,
        ledger: Arc<InMemoryLedger>,
        notifications: Arc<InMemoryNotificationStore>,
        clock: Arc<ManualClock>,
        service: Service,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let accounts = InMemoryAccountStore::arc();
        let ledger = InMemoryLedger::arc();
        let notifications = InMemoryNotificationStore::arc();
        let clock = Arc::new(ManualClock::new(start()));
        let prices = Arc::new(StaticPriceFeed::with_prices([(Asset::Btc, dec!(5000000))]));
        let service = FraudScanService::new(
            accounts.clone(),
            ledger.clone(),
            prices,
            notifications.clone(),
            clock.clone(),
        );
        Fixture {
            accounts,
            ledger,
            notifications,
            clock,
            service,
        }
    }

    fn open(f: &Fixture, name: &str, inr: rust_decimal::Decimal) -> AccountId {
        let account = f
            .accounts
            .create(
                NewAccount {
                    display_name: name.to_string(),
                    contact_email: format!("{name}@example.com"),
                },
                f.clock.now(),
            )
            .unwrap();
        let id = account.id_typed();
        if !inr.is_zero() {
            f.accounts.adjust_balance(id, Asset::Inr, inr).unwrap();
        }
        id
    }

    fn record(f: &Fixture, from: AccountId, to: AccountId, amount: rust_decimal::Decimal) {
        let sender = PartySnapshot::of(&f.accounts.get(from).unwrap());
        let receiver = PartySnapshot::of(&f.accounts.get(to).unwrap());
        f.ledger
            .append(EntryDraft::completed(
                sender,
                receiver,
                amount,
                Asset::Inr.into(),
                f.clock.now() - Duration::minutes(30),
            ))
            .unwrap();
    }

    #[test]
    fn high_alert_bans_flags_and_notifies() {
        let f = fixture();
        // Balance after the transfer: 50 left out of 1000 at the time.
        let alice = open(&f, "alice", dec!(1000));
        let bob = open(&f, "bob", dec!(0));
        f.accounts.adjust_balance(alice, Asset::Inr, dec!(-950)).unwrap();
        f.accounts.adjust_balance(bob, Asset::Inr, dec!(950)).unwrap();
        record(&f, alice, bob, dec!(950));

        let outcome = f.service.run_trailing().unwrap();

        assert_eq!(outcome.report.summary.total_alerts, 1);
        assert_eq!(outcome.remediated, vec![alice]);
        let account = f.accounts.get(alice).unwrap();
        assert_eq!(account.status(), AccountStatus::BannedFlagged);
        let ban = account.ban.as_ref().unwrap();
        assert_eq!(ban.actor, Actor::FraudScanner);
        assert_eq!(ban.duration_hours, 48);
        assert!(ban.reason.starts_with("LARGE_TRANSACTION: "));
        assert_eq!(f.accounts.get(bob).unwrap().status(), AccountStatus::Active);

        let id = outcome.notification.unwrap();
        let n = f.notifications.get(id).unwrap();
        assert_eq!(n.category, Category::FraudAlert);
        assert_eq!(n.severity, Severity::High);
        assert!(n.body.contains("LARGE_TRANSACTION: 1"));
    }

    #[test]
    fn rescanning_does_not_ban_twice() {
        let f = fixture();
        let alice = open(&f, "alice", dec!(50));
        let bob = open(&f, "bob", dec!(0));
        record(&f, alice, bob, dec!(950));

        assert_eq!(f.service.run_trailing().unwrap().remediated, vec![alice]);
        let again = f.service.run_trailing().unwrap();
        assert!(again.remediated.is_empty());
        // Still reported, so still notified.
        assert!(again.notification.is_some());

        let bans = f
            .accounts
            .get(alice)
            .unwrap()
            .history
            .iter()
            .filter(|c| c.kind == StatusChangeKind::Banned)
            .count();
        assert_eq!(bans, 1);
    }

    #[test]
    fn clean_scan_publishes_nothing() {
        let f = fixture();
        let alice = open(&f, "alice", dec!(1000));
        let bob = open(&f, "bob", dec!(0));
        record(&f, alice, bob, dec!(10));

        let outcome = f.service.run_trailing().unwrap();
        assert!(outcome.report.is_clean());
        assert!(outcome.notification.is_none());
        let page = f
            .notifications
            .list(&NotificationFilter::default(), PageRequest::default())
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn failures_become_error_notifications() {
        let f = fixture();
        let alice = open(&f, "alice", dec!(0));
        f.accounts.adjust_balance(alice, Asset::Doge, dec!(10)).unwrap();
        let bob = open(&f, "bob", dec!(0));
        record(&f, alice, bob, dec!(1));

        let window = ScanWindow::trailing(f.clock.now(), Duration::hours(24)).unwrap();
        assert!(f.service.run_guarded(window).is_none());

        // Scheduled attempts stay quiet until the runner gives up on them.
        let err = f.service.run_once().unwrap_err();
        let errors = || {
            f.notifications
                .list(&NotificationFilter::category(Category::Error), PageRequest::default())
                .unwrap()
        };
        assert_eq!(errors().total, 1);
        f.service.on_exhausted(&err);

        let errors = errors();
        assert_eq!(errors.total, 2);
        assert!(errors.items.iter().all(|n| n.severity == Severity::High));
        assert_eq!(f.accounts.get(alice).unwrap().status(), AccountStatus::Active);
    }
}
