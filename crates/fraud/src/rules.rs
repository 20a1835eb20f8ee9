use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use safevault_accounts::DEFAULT_BAN_HOURS;

use crate::report::ScanError;

/// Thresholds for the fraud heuristics and the auto-ban they trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudRules {
    /// Alert when one entry is worth more than this share of the sender's portfolio.
    pub large_transaction_ratio: Decimal,
    /// Alert when an account has more entries than this in the scan window.
    pub max_daily_transactions: usize,
    /// Width of the rapid-succession sliding window, in seconds.
    pub rapid_window_secs: u64,
    /// Alert when a sliding window holds more entries than this.
    pub max_rapid_transactions: usize,
    /// Duration of the automatic ban applied on remediation.
    pub ban_duration_hours: u32,
}

impl Default for FraudRules {
    fn default() -> Self {
        Self {
            large_transaction_ratio: dec!(0.9),
            max_daily_transactions: 50,
            rapid_window_secs: 5 * 60,
            max_rapid_transactions: 10,
            ban_duration_hours: DEFAULT_BAN_HOURS,
        }
    }
}

impl FraudRules {
    pub fn rapid_window(&self) -> Duration {
        i64::try_from(self.rapid_window_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.large_transaction_ratio <= Decimal::ZERO || self.large_transaction_ratio > Decimal::ONE {
            return Err(ScanError::InvalidRules(format!(
                "large_transaction_ratio must be in (0, 1] (got {})",
                self.large_transaction_ratio
            )));
        }
        if self.rapid_window_secs == 0 {
            return Err(ScanError::InvalidRules(
                "rapid_window_secs must be positive".to_string(),
            ));
        }
        if self.max_rapid_transactions == 0 || self.max_daily_transactions == 0 {
            return Err(ScanError::InvalidRules(
                "transaction thresholds must be positive".to_string(),
            ));
        }
        if self.ban_duration_hours == 0 {
            return Err(ScanError::InvalidRules(
                "ban_duration_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let rules = FraudRules::default();
        rules.validate().unwrap();
        assert_eq!(rules.rapid_window(), Duration::minutes(5));
        assert_eq!(rules.ban_duration_hours, 48);
    }

    #[test]
    fn rejects_nonsense() {
        let rules = FraudRules {
            large_transaction_ratio: dec!(1.5),
            ..FraudRules::default()
        };
        assert!(matches!(rules.validate(), Err(ScanError::InvalidRules(_))));

        let rules = FraudRules {
            rapid_window_secs: 0,
            ..FraudRules::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let rules: FraudRules = serde_json::from_str(r#"{"max_daily_transactions": 20}"#).unwrap();
        assert_eq!(rules.max_daily_transactions, 20);
        assert_eq!(rules.max_rapid_transactions, 10);
    }
}
