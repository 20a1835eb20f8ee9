//! Price feed contract, TTL cache and conversion math.
//!
//! Prices are always quoted in the base asset (INR). The feed is an injected
//! collaborator; nothing in this crate performs network IO.

pub mod cache;
pub mod convert;
pub mod feed;

pub use cache::{CachedPriceFeed, DEFAULT_PRICE_TTL_SECS};
pub use convert::{Rates, Valuation};
pub use feed::{PriceFeed, RateError, StaticPriceFeed};
