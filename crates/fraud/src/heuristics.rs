//! The three fraud heuristics.
//!
//! Each takes the in-window entries of a snapshot and returns its alerts in a
//! deterministic order. They are independent; the job unions their output.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use safevault_core::{AccountId, Asset, Severity};
use safevault_ledger::LedgerEntry;
use safevault_pricing::Rates;

use crate::alert::{Alert, AlertType};
use crate::report::ScanError;
use crate::rules::FraudRules;
use crate::snapshot::ScanSnapshot;

/// An entry worth more than `ratio` of the sender's current portfolio.
///
/// The portfolio is valued at scan time, not at transaction time, so later
/// balance changes shift the ratio retroactively. Deposits are skipped because
/// their sender is the system account.
pub fn large_transactions(
    snapshot: &ScanSnapshot,
    entries: &[&LedgerEntry],
    rules: &FraudRules,
) -> Result<Vec<Alert>, ScanError> {
    let rates = Rates::new(snapshot.prices.clone());
    let mut portfolio: HashMap<AccountId, Decimal> = HashMap::new();
    let mut alerts = Vec::new();

    for entry in entries {
        let sender = entry.sender.account_id;
        if sender.is_system() {
            continue;
        }
        let Some(view) = snapshot.accounts.get(&sender) else {
            continue;
        };

        let total = match portfolio.get(&sender) {
            Some(total) => *total,
            None => {
                let total = rates.portfolio_value(&view.balances)?.total;
                portfolio.insert(sender, total);
                total
            }
        };
        let source = entry.asset_type.source();
        let value = rates.value_in_base(entry.amount, source)?;
        let threshold = rules.large_transaction_ratio * total;

        if value > threshold {
            alerts.push(Alert {
                alert_type: AlertType::LargeTransaction,
                severity: Severity::High,
                account: Some(sender),
                transaction: Some(entry.transaction_id),
                description: format!(
                    "{} moved {} {} (worth {value} {base}), more than {}% of a {total} {base} portfolio",
                    view.display_name,
                    entry.amount,
                    source,
                    rules.large_transaction_ratio * Decimal::ONE_HUNDRED,
                    base = Asset::BASE,
                ),
            });
        }
    }
    Ok(alerts)
}

/// Accounts with more than `max_daily_transactions` entries in the window.
pub fn frequent_transactions(
    snapshot: &ScanSnapshot,
    entries: &[&LedgerEntry],
    rules: &FraudRules,
) -> Vec<Alert> {
    timelines(entries)
        .into_iter()
        .filter(|(_, times)| times.len() > rules.max_daily_transactions)
        .map(|(account, times)| Alert {
            alert_type: AlertType::FrequentTransactions,
            severity: Severity::Medium,
            account: Some(account),
            transaction: None,
            description: format!(
                "{} made {} transactions in the scan window (limit {})",
                display_name(snapshot, account),
                times.len(),
                rules.max_daily_transactions
            ),
        })
        .collect()
}

/// Accounts whose entries crowd more than `max_rapid_transactions` into any
/// `rapid_window`. At most one alert per account.
pub fn rapid_transactions(
    snapshot: &ScanSnapshot,
    entries: &[&LedgerEntry],
    rules: &FraudRules,
) -> Vec<Alert> {
    let width = rules.rapid_window();
    let mut alerts = Vec::new();

    for (account, mut times) in timelines(entries) {
        times.sort_unstable();
        let mut left = 0;
        for right in 0..times.len() {
            while times[right] - times[left] > width {
                left += 1;
            }
            let burst = right - left + 1;
            if burst > rules.max_rapid_transactions {
                alerts.push(Alert {
                    alert_type: AlertType::RapidTransactions,
                    severity: Severity::High,
                    account: Some(account),
                    transaction: None,
                    description: format!(
                        "{} made {burst} transactions between {} and {} (limit {} per {} s)",
                        display_name(snapshot, account),
                        times[left].to_rfc3339(),
                        times[right].to_rfc3339(),
                        rules.max_rapid_transactions,
                        rules.rapid_window_secs,
                    ),
                });
                break;
            }
        }
    }
    alerts
}

/// Entry timestamps per non-system party. A conversion (sender == receiver)
/// counts once.
fn timelines(entries: &[&LedgerEntry]) -> BTreeMap<AccountId, Vec<DateTime<Utc>>> {
    let mut out: BTreeMap<AccountId, Vec<DateTime<Utc>>> = BTreeMap::new();
    for entry in entries {
        let sender = entry.sender.account_id;
        let receiver = entry.receiver.account_id;
        if !sender.is_system() {
            out.entry(sender).or_default().push(entry.timestamp);
        }
        if receiver != sender && !receiver.is_system() {
            out.entry(receiver).or_default().push(entry.timestamp);
        }
    }
    out
}

fn display_name(snapshot: &ScanSnapshot, account: AccountId) -> String {
    snapshot
        .accounts
        .get(&account)
        .map(|v| v.display_name.clone())
        .unwrap_or_else(|| account.to_string())
}
