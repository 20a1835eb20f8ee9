use crate::heuristics::{frequent_transactions, large_transactions, rapid_transactions};
use crate::report::{Report, ScanError};
use crate::rules::FraudRules;
use crate::snapshot::ScanSnapshot;

/// Deterministic fraud scan over a captured snapshot.
///
/// Model:
/// - Keep completed, live entries whose timestamp lies in the snapshot window.
/// - Run the large-transaction, frequency and rapid-succession heuristics.
/// - Union their alerts into one report.
///
/// Must not mutate state; remediation is the caller's job.
#[derive(Debug, Clone)]
pub struct FraudScanJob {
    snapshot: ScanSnapshot,
    rules: FraudRules,
}

impl FraudScanJob {
    pub fn new(snapshot: ScanSnapshot) -> Self {
        Self {
            snapshot,
            rules: FraudRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: FraudRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn snapshot(&self) -> &ScanSnapshot {
        &self.snapshot
    }

    pub fn rules(&self) -> &FraudRules {
        &self.rules
    }

    pub fn run(&self) -> Result<Report, ScanError> {
        self.rules.validate()?;

        let window = self.snapshot.window;
        let mut entries: Vec<_> = self
            .snapshot
            .entries
            .iter()
            .filter(|e| e.is_completed() && e.deleted_at.is_none() && window.contains(e.timestamp))
            .collect();
        entries.sort_by_key(|e| (e.timestamp, e.transaction_id));

        let mut alerts = large_transactions(&self.snapshot, &entries, &self.rules)?;
        alerts.extend(frequent_transactions(&self.snapshot, &entries, &self.rules));
        alerts.extend(rapid_transactions(&self.snapshot, &entries, &self.rules));

        let scanned_accounts = entries
            .iter()
            .flat_map(|e| [e.sender.account_id, e.receiver.account_id])
            .filter(|id| !id.is_system())
            .collect::<std::collections::BTreeSet<_>>()
            .len();

        Ok(Report::new(window, entries.len(), scanned_accounts, alerts))
    }
}
