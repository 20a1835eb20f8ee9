//! Ledger: append-only log of every balance-affecting event.
//!
//! Entries are immutable once appended; the only later mutation is the
//! soft-delete marker. Reads exclude soft-deleted entries unless the filter
//! explicitly asks for them.

pub mod entry;
pub mod id_gen;
pub mod query;
pub mod store;

pub use entry::{EntryDraft, EntryKind, EntryStatus, LedgerEntry, PartySnapshot, SYSTEM_CONTACT};
pub use id_gen::{SequentialIdGenerator, TransactionIdGenerator, UuidV7Generator};
pub use query::{LedgerFilter, Pagination, PartyRole, SortOrder};
pub use store::{InMemoryLedger, Ledger};
