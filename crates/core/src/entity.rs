//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Accounts and ledger entries are entities: two records with the same id are
/// the same record, whatever their other fields say.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Whether the record is soft-deleted (hidden from standard reads, retained for audit).
    fn is_deleted(&self) -> bool {
        false
    }
}
