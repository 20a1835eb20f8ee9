//! Transaction id generation strategies.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use safevault_core::TransactionId;

/// Source of transaction ids. Implementations must never return the same id twice.
pub trait TransactionIdGenerator: Send + Sync {
    fn next_id(&self) -> TransactionId;
}

/// Time-ordered UUIDv7: 48-bit millisecond timestamp + 74 random bits.
///
/// Collisions between concurrent appends need two identical 74-bit draws in the
/// same millisecond.
#[derive(Debug, Default, Copy, Clone)]
pub struct UuidV7Generator;

impl TransactionIdGenerator for UuidV7Generator {
    fn next_id(&self) -> TransactionId {
        TransactionId::from_uuid(Uuid::now_v7())
    }
}

/// Deterministic ids (1, 2, 3, ...) for tests.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.saturating_sub(1)),
        }
    }
}

impl TransactionIdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> TransactionId {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        TransactionId::from_uuid(Uuid::from_u128(u128::from(n)))
    }
}
