//! Configuration loading and representation.

use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use safevault_fraud::FraudRules;
use safevault_observability::LogFormat;
use safevault_pricing::DEFAULT_PRICE_TTL_SECS;

const DAY_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Inconsistent(String),
}

/// Process configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub fraud: FraudRules,
    pub scan_interval_secs: u64,
    pub scan_lookback_hours: u32,
    pub retention_days: u32,
    pub retention_sweep_interval_secs: u64,
    pub price_cache_ttl_secs: u64,
    pub log_format: LogFormat,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            fraud: FraudRules::default(),
            scan_interval_secs: DAY_SECS,
            scan_lookback_hours: 24,
            retention_days: 30,
            retention_sweep_interval_secs: DAY_SECS,
            price_cache_ttl_secs: DEFAULT_PRICE_TTL_SECS as u64,
            log_format: LogFormat::default(),
        }
    }
}

impl VaultConfig {
    /// Defaults overlaid with `SAFEVAULT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`VaultConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        overlay(&lookup, "SAFEVAULT_SCAN_INTERVAL_SECS", &mut cfg.scan_interval_secs)?;
        overlay(&lookup, "SAFEVAULT_SCAN_LOOKBACK_HOURS", &mut cfg.scan_lookback_hours)?;
        overlay(&lookup, "SAFEVAULT_RETENTION_DAYS", &mut cfg.retention_days)?;
        overlay(
            &lookup,
            "SAFEVAULT_RETENTION_SWEEP_INTERVAL_SECS",
            &mut cfg.retention_sweep_interval_secs,
        )?;
        overlay(&lookup, "SAFEVAULT_PRICE_CACHE_TTL_SECS", &mut cfg.price_cache_ttl_secs)?;
        overlay(&lookup, "SAFEVAULT_LOG_FORMAT", &mut cfg.log_format)?;

        let rules = &mut cfg.fraud;
        overlay(
            &lookup,
            "SAFEVAULT_FRAUD_LARGE_TRANSACTION_RATIO",
            &mut rules.large_transaction_ratio,
        )?;
        overlay(
            &lookup,
            "SAFEVAULT_FRAUD_MAX_DAILY_TRANSACTIONS",
            &mut rules.max_daily_transactions,
        )?;
        overlay(&lookup, "SAFEVAULT_FRAUD_RAPID_WINDOW_SECS", &mut rules.rapid_window_secs)?;
        overlay(
            &lookup,
            "SAFEVAULT_FRAUD_MAX_RAPID_TRANSACTIONS",
            &mut rules.max_rapid_transactions,
        )?;
        overlay(&lookup, "SAFEVAULT_FRAUD_BAN_HOURS", &mut rules.ban_duration_hours)?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fraud
            .validate()
            .map_err(|e| ConfigError::Inconsistent(e.to_string()))?;
        if self.scan_interval_secs == 0 || self.retention_sweep_interval_secs == 0 {
            return Err(ConfigError::Inconsistent(
                "job intervals must be positive".to_string(),
            ));
        }
        if self.scan_lookback_hours == 0 {
            return Err(ConfigError::Inconsistent(
                "scan lookback must be positive".to_string(),
            ));
        }
        if self.retention_days == 0 {
            return Err(ConfigError::Inconsistent(
                "retention must be at least one day".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.scan_interval_secs)
    }

    pub fn scan_lookback(&self) -> Duration {
        Duration::hours(i64::from(self.scan_lookback_hours))
    }

    pub fn retention(&self) -> Duration {
        Duration::days(i64::from(self.retention_days))
    }

    pub fn retention_sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.retention_sweep_interval_secs)
    }

    pub fn price_cache_ttl(&self) -> Duration {
        i64::try_from(self.price_cache_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }
}

fn overlay<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(var) else {
        return Ok(());
    };
    *slot = raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = VaultConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, VaultConfig::default());
        assert_eq!(cfg.scan_lookback(), Duration::hours(24));
        assert_eq!(cfg.retention(), Duration::days(30));
        assert_eq!(cfg.price_cache_ttl(), Duration::seconds(60));
        assert_eq!(cfg.fraud.large_transaction_ratio, dec!(0.9));
    }

    #[test]
    fn env_overrides_defaults() {
        let cfg = VaultConfig::from_lookup(lookup(&[
            ("SAFEVAULT_RETENTION_DAYS", "7"),
            ("SAFEVAULT_LOG_FORMAT", "pretty"),
            ("SAFEVAULT_FRAUD_LARGE_TRANSACTION_RATIO", "0.75"),
            ("SAFEVAULT_FRAUD_MAX_DAILY_TRANSACTIONS", " 20 "),
        ]))
        .unwrap();
        assert_eq!(cfg.retention_days, 7);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.fraud.large_transaction_ratio, dec!(0.75));
        assert_eq!(cfg.fraud.max_daily_transactions, 20);
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = VaultConfig::from_lookup(lookup(&[("SAFEVAULT_SCAN_INTERVAL_SECS", "daily")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "SAFEVAULT_SCAN_INTERVAL_SECS",
                ..
            }
        ));

        let err = VaultConfig::from_lookup(lookup(&[("SAFEVAULT_FRAUD_LARGE_TRANSACTION_RATIO", "2")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Inconsistent(_)));
    }

    #[test]
    fn deserializes_partial_documents() {
        let cfg: VaultConfig =
            serde_json::from_str(r#"{"retention_days": 90, "fraud": {"ban_duration_hours": 72}}"#)
                .unwrap();
        assert_eq!(cfg.retention_days, 90);
        assert_eq!(cfg.fraud.ban_duration_hours, 72);
        assert_eq!(cfg.fraud.max_rapid_transactions, 10);
        assert_eq!(cfg.scan_interval_secs, 86_400);
    }
}
