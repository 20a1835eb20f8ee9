//! Account Store (custodial balances + ban/flag state machine).
//!
//! Leaf dependency of every other component: it owns the balance records and
//! is the only place a balance is written.

pub mod account;
pub mod store;

pub use account::{
    Account, AccountStatus, Actor, Ban, DEFAULT_BAN_HOURS, Flag, NewAccount, StatusChange,
    StatusChangeKind, StatusCommand,
};
pub use store::{
    AccountFilter, AccountSet, AccountStore, InMemoryAccountStore, PurgeCascade, StatusFilter,
};
