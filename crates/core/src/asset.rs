//! Assets held in custody and the numeric policy applied to their amounts.
//!
//! ## Rounding policy
//!
//! Every asset has a fixed scale (INR: 2 decimal places, crypto: 8). Amounts
//! entering the system must already fit that scale; amounts *produced* by the
//! system (conversion results) are truncated toward zero at the target scale.
//! Truncation means a conversion never credits more than the exact market
//! value, so an A→B→A round trip can lose at most the rounding epsilon of each
//! leg and can never gain value.

use core::fmt;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A custodied asset. `Inr` is the base (fiat) currency every other asset is priced in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Asset {
    #[serde(rename = "INR")]
    Inr,
    #[serde(rename = "BTC")]
    Btc,
    #[serde(rename = "ETH")]
    Eth,
    #[serde(rename = "DOGE")]
    Doge,
}

impl Asset {
    /// The base currency.
    pub const BASE: Asset = Asset::Inr;

    /// All supported assets, base first.
    pub const ALL: [Asset; 4] = [Asset::Inr, Asset::Btc, Asset::Eth, Asset::Doge];

    pub fn symbol(self) -> &'static str {
        match self {
            Asset::Inr => "INR",
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
            Asset::Doge => "DOGE",
        }
    }

    pub fn is_base(self) -> bool {
        self == Asset::BASE
    }

    /// Number of decimal places carried for this asset.
    pub fn scale(self) -> u32 {
        match self {
            Asset::Inr => 2,
            Asset::Btc | Asset::Eth | Asset::Doge => 8,
        }
    }

    /// Truncate toward zero at this asset's scale.
    pub fn round(self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.scale(), RoundingStrategy::ToZero)
    }

    /// Smallest representable amount of this asset.
    pub fn epsilon(self) -> Decimal {
        Decimal::new(1, self.scale())
    }

    /// Validate a caller-supplied amount: strictly positive and no finer than the asset scale.
    pub fn validate_amount(self, amount: Decimal) -> Result<Decimal, DomainError> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "amount must be greater than 0 (got {amount})"
            )));
        }
        if amount.normalize().scale() > self.scale() {
            return Err(DomainError::validation(format!(
                "{} amounts support at most {} decimal places (got {amount})",
                self.symbol(),
                self.scale()
            )));
        }
        Ok(amount)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Asset {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INR" => Ok(Asset::Inr),
            "BTC" | "BITCOIN" => Ok(Asset::Btc),
            "ETH" | "ETHEREUM" => Ok(Asset::Eth),
            "DOGE" | "DOGECOIN" => Ok(Asset::Doge),
            other => Err(DomainError::validation(format!("unknown asset: {other}"))),
        }
    }
}

/// What a ledger entry moved: one asset, or a conversion between two assets of
/// the same account. Conversions render as the composite `FROM_TO`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum AssetType {
    Single(Asset),
    Conversion { from: Asset, to: Asset },
}

impl AssetType {
    /// The asset the entry's `amount` is denominated in.
    pub fn source(&self) -> Asset {
        match self {
            AssetType::Single(a) => *a,
            AssetType::Conversion { from, .. } => *from,
        }
    }

    pub fn involves(&self, asset: Asset) -> bool {
        match self {
            AssetType::Single(a) => *a == asset,
            AssetType::Conversion { from, to } => *from == asset || *to == asset,
        }
    }

    pub fn is_conversion(&self) -> bool {
        matches!(self, AssetType::Conversion { .. })
    }
}

impl From<Asset> for AssetType {
    fn from(value: Asset) -> Self {
        AssetType::Single(value)
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetType::Single(a) => write!(f, "{a}"),
            AssetType::Conversion { from, to } => write!(f, "{from}_{to}"),
        }
    }
}

impl FromStr for AssetType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('_') {
            Some((from, to)) => {
                let from: Asset = from.parse()?;
                let to: Asset = to.parse()?;
                if from == to {
                    return Err(DomainError::validation(format!(
                        "conversion must involve two different assets: {s}"
                    )));
                }
                Ok(AssetType::Conversion { from, to })
            }
            None => Ok(AssetType::Single(s.parse()?)),
        }
    }
}

impl From<AssetType> for String {
    fn from(value: AssetType) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for AssetType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
