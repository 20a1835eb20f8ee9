use core::fmt;

use serde::{Deserialize, Serialize};

use safevault_core::{AccountId, Severity, TransactionId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    LargeTransaction,
    FrequentTransactions,
    RapidTransactions,
}

impl AlertType {
    pub const ALL: [AlertType; 3] = [
        AlertType::LargeTransaction,
        AlertType::FrequentTransactions,
        AlertType::RapidTransactions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::LargeTransaction => "LARGE_TRANSACTION",
            AlertType::FrequentTransactions => "FREQUENT_TRANSACTIONS",
            AlertType::RapidTransactions => "RAPID_TRANSACTIONS",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One suspicious finding. Ephemeral: folded into a report and a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub account: Option<AccountId>,
    pub transaction: Option<TransactionId>,
    pub description: String,
}

impl Alert {
    /// High severity alerts and every rapid-succession alert trigger ban + flag.
    pub fn requires_remediation(&self) -> bool {
        self.severity == Severity::High || self.alert_type == AlertType::RapidTransactions
    }
}
