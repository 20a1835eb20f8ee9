//! Conversion and valuation math.
//!
//! Rounding policy: a converted amount is computed as
//! `amount * price(from) / price(to)` and then truncated toward zero at the
//! target asset's scale. Truncation at every hop means an A -> B -> A round
//! trip can only lose value (at most a few units of A's epsilon), never gain it.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use safevault_core::Asset;

use crate::feed::{PriceFeed, RateError};

/// Value of a set of balances in the base asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
    pub total: Decimal,
    pub breakdown: BTreeMap<Asset, Decimal>,
}

/// Conversion helpers over a price feed.
#[derive(Debug, Clone)]
pub struct Rates<P> {
    feed: P,
}

impl<P: PriceFeed> Rates<P> {
    pub fn new(feed: P) -> Self {
        Self { feed }
    }

    pub fn feed(&self) -> &P {
        &self.feed
    }

    /// Units of `to` per unit of `from` (unrounded).
    pub fn rate(&self, from: Asset, to: Asset) -> Result<Decimal, RateError> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let from_price = self.feed.price_in_base(from)?;
        let to_price = self.feed.price_in_base(to)?;
        from_price
            .checked_div(to_price)
            .ok_or_else(|| RateError::unavailable(to, "rate out of range"))
    }

    /// Convert `amount` of `from` into `to`, truncated at `to`'s scale.
    pub fn convert(&self, amount: Decimal, from: Asset, to: Asset) -> Result<Decimal, RateError> {
        if from == to {
            return Ok(to.round(amount));
        }
        let from_price = self.feed.price_in_base(from)?;
        let to_price = self.feed.price_in_base(to)?;
        amount
            .checked_mul(from_price)
            .and_then(|base| base.checked_div(to_price))
            .map(|converted| to.round(converted))
            .ok_or_else(|| RateError::unavailable(to, "converted amount out of range"))
    }

    /// Value of `amount` of `asset` in base, truncated at the base scale.
    pub fn value_in_base(&self, amount: Decimal, asset: Asset) -> Result<Decimal, RateError> {
        self.convert(amount, asset, Asset::BASE)
    }

    /// Sum of every balance converted to base.
    pub fn portfolio_value(
        &self,
        balances: &BTreeMap<Asset, Decimal>,
    ) -> Result<Valuation, RateError> {
        let mut valuation = Valuation::default();
        for (&asset, &amount) in balances {
            if amount.is_zero() {
                continue;
            }
            let value = self.value_in_base(amount, asset)?;
            valuation.total = valuation
                .total
                .checked_add(value)
                .ok_or_else(|| RateError::unavailable(Asset::BASE, "portfolio value out of range"))?;
            valuation.breakdown.insert(asset, value);
        }
        Ok(valuation)
    }
}
