//! `safevault-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by every component of
//! the custodial ledger: identifiers, assets and their rounding policy, the
//! injectable clock, the severity scale and the store-level error model.
//! No infrastructure concerns live here.

pub mod asset;
pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod severity;

pub use asset::{Asset, AssetType};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{AccountId, AdminId, NotificationId, TransactionId};
pub use severity::Severity;
