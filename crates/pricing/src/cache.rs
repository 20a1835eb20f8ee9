use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use safevault_core::{Asset, Clock};

use crate::feed::{PriceFeed, RateError};

pub const DEFAULT_PRICE_TTL_SECS: i64 = 60;

/// TTL cache in front of a [`PriceFeed`].
///
/// Only successful lookups are cached. A failed refresh is returned to the
/// caller and the next call tries the inner feed again.
pub struct CachedPriceFeed<F, C> {
    inner: F,
    clock: C,
    ttl: Duration,
    entries: Mutex<HashMap<Asset, (Decimal, DateTime<Utc>)>>,
}

impl<F, C> CachedPriceFeed<F, C>
where
    F: PriceFeed,
    C: Clock,
{
    pub fn new(inner: F, clock: C) -> Self {
        Self::with_ttl(inner, clock, Duration::seconds(DEFAULT_PRICE_TTL_SECS))
    }

    pub fn with_ttl(inner: F, clock: C, ttl: Duration) -> Self {
        Self {
            inner,
            clock,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Drop every cached price.
    pub fn invalidate(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    fn cached(&self, asset: Asset, now: DateTime<Utc>) -> Option<Decimal> {
        let entries = self.entries.lock().ok()?;
        let (price, fetched_at) = entries.get(&asset)?;
        (now - *fetched_at < self.ttl).then_some(*price)
    }
}

impl<F, C> PriceFeed for CachedPriceFeed<F, C>
where
    F: PriceFeed,
    C: Clock,
{
    fn price_in_base(&self, asset: Asset) -> Result<Decimal, RateError> {
        if asset.is_base() {
            return Ok(Decimal::ONE);
        }
        let now = self.clock.now();
        if let Some(price) = self.cached(asset, now) {
            return Ok(price);
        }

        let price = self.inner.price_in_base(asset).inspect_err(|err| {
            tracing::warn!(asset = %asset, error = %err, "price refresh failed");
        })?;

        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(asset, (price, now));
        }
        tracing::debug!(asset = %asset, price = %price, "price refreshed");
        Ok(price)
    }
}
