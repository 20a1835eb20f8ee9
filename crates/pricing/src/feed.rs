use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;
use thiserror::Error;

use safevault_core::{Asset, ErrorKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateError {
    #[error("rate unavailable for {asset}: {reason}")]
    Unavailable { asset: Asset, reason: String },

    #[error("no price source for {0}")]
    UnsupportedAsset(Asset),
}

impl RateError {
    pub fn unavailable(asset: Asset, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            asset,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::RateUnavailable
    }
}

/// Source of spot prices quoted in the base asset.
///
/// Implementations may block (e.g. remote fetch); callers wrap them in a
/// [`crate::CachedPriceFeed`] to bound how often that happens.
pub trait PriceFeed: Send + Sync {
    /// Price of one unit of `asset` in base currency. Must be positive.
    fn price_in_base(&self, asset: Asset) -> Result<Decimal, RateError>;
}

impl<F> PriceFeed for Arc<F>
where
    F: PriceFeed + ?Sized,
{
    fn price_in_base(&self, asset: Asset) -> Result<Decimal, RateError> {
        (**self).price_in_base(asset)
    }
}

/// Fixed prices, settable at runtime. The base asset is always 1.
#[derive(Debug, Default)]
pub struct StaticPriceFeed {
    prices: RwLock<HashMap<Asset, Decimal>>,
}

impl StaticPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(prices: impl IntoIterator<Item = (Asset, Decimal)>) -> Self {
        let feed = Self::new();
        for (asset, price) in prices {
            feed.set(asset, price);
        }
        feed
    }

    pub fn set(&self, asset: Asset, price: Decimal) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(asset, price);
        }
    }

    /// Make subsequent lookups of `asset` fail.
    pub fn remove(&self, asset: Asset) {
        if let Ok(mut prices) = self.prices.write() {
            prices.remove(&asset);
        }
    }
}

impl PriceFeed for StaticPriceFeed {
    fn price_in_base(&self, asset: Asset) -> Result<Decimal, RateError> {
        if asset.is_base() {
            return Ok(Decimal::ONE);
        }
        let prices = self
            .prices
            .read()
            .map_err(|_| RateError::unavailable(asset, "price table poisoned"))?;
        match prices.get(&asset) {
            Some(p) if *p > Decimal::ZERO => Ok(*p),
            Some(p) => Err(RateError::unavailable(asset, format!("non-positive price {p}"))),
            None => Err(RateError::UnsupportedAsset(asset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn base_is_always_one() {
        let feed = StaticPriceFeed::new();
        assert_eq!(feed.price_in_base(Asset::Inr).unwrap(), Decimal::ONE);
    }

    #[test]
    fn missing_and_bad_prices_fail() {
        let feed = StaticPriceFeed::with_prices([(Asset::Btc, dec!(0))]);
        assert!(matches!(
            feed.price_in_base(Asset::Btc),
            Err(RateError::Unavailable { .. })
        ));
        assert_eq!(
            feed.price_in_base(Asset::Eth),
            Err(RateError::UnsupportedAsset(Asset::Eth))
        );
        assert_eq!(
            RateError::UnsupportedAsset(Asset::Eth).kind(),
            ErrorKind::RateUnavailable
        );
    }
}
