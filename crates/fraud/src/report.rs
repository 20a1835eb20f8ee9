use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use safevault_core::{ErrorKind, Severity};
use safevault_pricing::RateError;

use crate::alert::{Alert, AlertType};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid scan window: {0}")]
    InvalidWindow(String),

    #[error("invalid fraud rules: {0}")]
    InvalidRules(String),

    #[error("pricing failed: {0}")]
    Pricing(#[from] RateError),

    #[error("snapshot failed: {0}")]
    Snapshot(String),
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::InvalidWindow(_) | ScanError::InvalidRules(_) => ErrorKind::Validation,
            ScanError::Pricing(_) => ErrorKind::RateUnavailable,
            ScanError::Snapshot(_) => ErrorKind::Internal,
        }
    }
}

/// Closed time interval `[from, to]` a scan looks at.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl ScanWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, ScanError> {
        if from > to {
            return Err(ScanError::InvalidWindow(format!(
                "window starts ({from}) after it ends ({to})"
            )));
        }
        Ok(Self { from, to })
    }

    /// `[now - lookback, now]`.
    pub fn trailing(now: DateTime<Utc>, lookback: Duration) -> Result<Self, ScanError> {
        if lookback <= Duration::zero() {
            return Err(ScanError::InvalidWindow("lookback must be positive".to_string()));
        }
        Self::new(now - lookback, now)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at <= self.to
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_alerts: usize,
    pub by_type: BTreeMap<AlertType, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
}

impl Summary {
    pub fn of(alerts: &[Alert]) -> Self {
        let mut summary = Summary {
            total_alerts: alerts.len(),
            ..Summary::default()
        };
        for alert in alerts {
            *summary.by_type.entry(alert.alert_type).or_default() += 1;
            *summary.by_severity.entry(alert.severity).or_default() += 1;
        }
        summary
    }

    pub fn count_type(&self, alert_type: AlertType) -> usize {
        self.by_type.get(&alert_type).copied().unwrap_or(0)
    }

    pub fn count_severity(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }
}

/// Output of one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub window: ScanWindow,
    pub scanned_transactions: usize,
    pub scanned_accounts: usize,
    pub alerts: Vec<Alert>,
    pub summary: Summary,
}

impl Report {
    pub fn new(
        window: ScanWindow,
        scanned_transactions: usize,
        scanned_accounts: usize,
        alerts: Vec<Alert>,
    ) -> Self {
        let summary = Summary::of(&alerts);
        Self {
            window,
            scanned_transactions,
            scanned_accounts,
            alerts,
            summary,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Human-readable digest used as the notification body.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Fraud scan {} .. {}: {} transaction(s), {} account(s), {} alert(s)\n",
            self.window.from.to_rfc3339(),
            self.window.to.to_rfc3339(),
            self.scanned_transactions,
            self.scanned_accounts,
            self.summary.total_alerts,
        );
        for alert_type in AlertType::ALL {
            out.push_str(&format!(
                "  {alert_type}: {}\n",
                self.summary.count_type(alert_type)
            ));
        }
        for severity in [Severity::High, Severity::Medium, Severity::Low] {
            out.push_str(&format!(
                "  {severity}: {}\n",
                self.summary.count_severity(severity)
            ));
        }
        for alert in &self.alerts {
            out.push_str(&format!(
                "- [{}] {}: {}\n",
                alert.severity, alert.alert_type, alert.description
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn alert(alert_type: AlertType, severity: Severity) -> Alert {
        Alert {
            alert_type,
            severity,
            account: None,
            transaction: None,
            description: "test".into(),
        }
    }

    #[test]
    fn summary_counts_by_type_and_severity() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let window = ScanWindow::trailing(now, Duration::hours(24)).unwrap();
        let report = Report::new(
            window,
            60,
            3,
            vec![
                alert(AlertType::LargeTransaction, Severity::High),
                alert(AlertType::LargeTransaction, Severity::High),
                alert(AlertType::FrequentTransactions, Severity::Medium),
            ],
        );

        assert_eq!(report.summary.total_alerts, 3);
        assert_eq!(report.summary.count_type(AlertType::LargeTransaction), 2);
        assert_eq!(report.summary.count_type(AlertType::RapidTransactions), 0);
        assert_eq!(report.summary.count_severity(Severity::Medium), 1);
        assert!(report.render().contains("LARGE_TRANSACTION: 2"));

        let json = serde_json::to_value(&report.summary).unwrap();
        assert_eq!(json["by_type"]["LARGE_TRANSACTION"], 2);
    }

    #[test]
    fn window_must_be_ordered() {
        let now = Utc::now();
        assert!(ScanWindow::new(now, now - Duration::seconds(1)).is_err());
        assert!(ScanWindow::trailing(now, Duration::zero()).is_err());
        let w = ScanWindow::new(now - Duration::hours(1), now).unwrap();
        assert!(w.contains(now));
        assert!(!w.contains(now + Duration::seconds(1)));
    }
}
