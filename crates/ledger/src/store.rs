use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use safevault_accounts::PurgeCascade;
use safevault_core::{AccountId, DomainError, DomainResult, TransactionId};

use crate::entry::{EntryDraft, LedgerEntry};
use crate::id_gen::{TransactionIdGenerator, UuidV7Generator};
use crate::query::{LedgerFilter, Pagination, SortOrder};

/// Append-only ledger abstraction.
///
/// Implementations must never overwrite an existing transaction id and must
/// hide soft-deleted entries unless the filter opts in.
pub trait Ledger: Send + Sync {
    /// Assign a fresh transaction id and persist the entry.
    fn append(&self, draft: EntryDraft) -> DomainResult<LedgerEntry>;

    /// Fetch a live entry.
    fn get(&self, id: TransactionId) -> DomainResult<LedgerEntry>;

    /// Fetch an entry even if it has been soft-deleted.
    fn get_including_deleted(&self, id: TransactionId) -> DomainResult<LedgerEntry>;

    /// Matching entries ordered by timestamp (ties broken by transaction id).
    fn query(
        &self,
        filter: &LedgerFilter,
        sort: SortOrder,
        page: Pagination,
    ) -> DomainResult<Vec<LedgerEntry>>;

    /// Every matching entry, ascending, without pagination (scans and sweeps).
    fn scan(&self, filter: &LedgerFilter) -> DomainResult<Vec<LedgerEntry>>;

    fn count(&self, filter: &LedgerFilter) -> DomainResult<usize>;

    /// Mark an entry deleted. Deleting twice is a no-op that keeps the first timestamp.
    fn soft_delete(&self, id: TransactionId, now: DateTime<Utc>) -> DomainResult<()>;

    /// Permanently remove a soft-deleted entry. Live entries cannot be purged directly.
    fn purge(&self, id: TransactionId) -> DomainResult<()>;

    /// Permanently remove every entry in which `account` is sender or receiver.
    fn purge_account(&self, account: AccountId) -> DomainResult<usize>;
}

type TimelineKey = (DateTime<Utc>, TransactionId);

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<TransactionId, LedgerEntry>,
    /// (account, timestamp) index covering both parties of every entry.
    by_account: HashMap<AccountId, BTreeSet<TimelineKey>>,
}

impl Inner {
    fn index(&mut self, entry: &LedgerEntry) {
        let key = (entry.timestamp, entry.transaction_id);
        for party in [entry.sender.account_id, entry.receiver.account_id] {
            self.by_account.entry(party).or_default().insert(key);
        }
    }

    fn unindex(&mut self, entry: &LedgerEntry) {
        let key = (entry.timestamp, entry.transaction_id);
        for party in [entry.sender.account_id, entry.receiver.account_id] {
            if let Some(keys) = self.by_account.get_mut(&party) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.by_account.remove(&party);
                }
            }
        }
    }

    fn remove(&mut self, id: TransactionId) -> Option<LedgerEntry> {
        let entry = self.entries.remove(&id)?;
        self.unindex(&entry);
        Some(entry)
    }

    /// Matching entries in ascending timeline order.
    fn select(&self, filter: &LedgerFilter) -> Vec<&LedgerEntry> {
        match filter.account {
            Some(account) => self
                .by_account
                .get(&account)
                .into_iter()
                .flatten()
                .filter_map(|(_, id)| self.entries.get(id))
                .filter(|e| filter.matches(e))
                .collect(),
            None => {
                let mut hits: Vec<&LedgerEntry> =
                    self.entries.values().filter(|e| filter.matches(e)).collect();
                hits.sort_by_key(|e| (e.timestamp, e.transaction_id));
                hits
            }
        }
    }
}

/// In-memory ledger.
///
/// Intended for tests/dev. A single `RwLock` guards the entries; callers that
/// also hold account locks must take them first.
pub struct InMemoryLedger {
    inner: RwLock<Inner>,
    ids: Arc<dyn TransactionIdGenerator>,
}

impl core::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryLedger").finish_non_exhaustive()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::with_id_generator(Arc::new(UuidV7Generator))
    }

    pub fn with_id_generator(ids: Arc<dyn TransactionIdGenerator>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            ids,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> DomainResult<usize> {
        let inner = self.inner.read().map_err(|_| DomainError::lock_poisoned())?;
        Ok(inner.entries.len())
    }

    pub fn is_empty(&self) -> DomainResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl Ledger for InMemoryLedger {
    fn append(&self, draft: EntryDraft) -> DomainResult<LedgerEntry> {
        if draft.amount <= rust_decimal::Decimal::ZERO {
            return Err(DomainError::validation("ledger amount must be positive"));
        }

        let id = self.ids.next_id();
        let entry = LedgerEntry::from_draft(id, draft);

        let mut inner = self.inner.write().map_err(|_| DomainError::lock_poisoned())?;
        if inner.entries.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "transaction id {id} already exists"
            )));
        }
        inner.index(&entry);
        inner.entries.insert(id, entry.clone());

        tracing::debug!(
            transaction_id = %id,
            sender = %entry.sender.account_id,
            receiver = %entry.receiver.account_id,
            asset_type = %entry.asset_type,
            amount = %entry.amount,
            "ledger entry appended"
        );
        Ok(entry)
    }

    fn get(&self, id: TransactionId) -> DomainResult<LedgerEntry> {
        let entry = self.get_including_deleted(id)?;
        if entry.deleted_at.is_some() {
            return Err(DomainError::not_found(format!("transaction {id}")));
        }
        Ok(entry)
    }

    fn get_including_deleted(&self, id: TransactionId) -> DomainResult<LedgerEntry> {
        let inner = self.inner.read().map_err(|_| DomainError::lock_poisoned())?;
        inner
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("transaction {id}")))
    }

    fn query(
        &self,
        filter: &LedgerFilter,
        sort: SortOrder,
        page: Pagination,
    ) -> DomainResult<Vec<LedgerEntry>> {
        let inner = self.inner.read().map_err(|_| DomainError::lock_poisoned())?;
        let mut hits = inner.select(filter);
        if sort == SortOrder::Descending {
            hits.reverse();
        }
        let limit = page.limit.min(Pagination::MAX_LIMIT) as usize;
        Ok(hits
            .into_iter()
            .skip(page.offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    fn scan(&self, filter: &LedgerFilter) -> DomainResult<Vec<LedgerEntry>> {
        let inner = self.inner.read().map_err(|_| DomainError::lock_poisoned())?;
        Ok(inner.select(filter).into_iter().cloned().collect())
    }

    fn count(&self, filter: &LedgerFilter) -> DomainResult<usize> {
        let inner = self.inner.read().map_err(|_| DomainError::lock_poisoned())?;
        Ok(inner.select(filter).len())
    }

    fn soft_delete(&self, id: TransactionId, now: DateTime<Utc>) -> DomainResult<()> {
        let mut inner = self.inner.write().map_err(|_| DomainError::lock_poisoned())?;
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("transaction {id}")))?;
        if entry.deleted_at.is_none() {
            entry.deleted_at = Some(now);
            tracing::info!(transaction_id = %id, "ledger entry soft-deleted");
        }
        Ok(())
    }

    fn purge(&self, id: TransactionId) -> DomainResult<()> {
        let mut inner = self.inner.write().map_err(|_| DomainError::lock_poisoned())?;
        match inner.entries.get(&id) {
            None => return Err(DomainError::not_found(format!("transaction {id}"))),
            Some(entry) if entry.deleted_at.is_none() => {
                return Err(DomainError::validation(format!(
                    "transaction {id} must be soft-deleted before purge"
                )));
            }
            Some(_) => {}
        }
        inner.remove(id);
        tracing::info!(transaction_id = %id, "ledger entry purged");
        Ok(())
    }

    fn purge_account(&self, account: AccountId) -> DomainResult<usize> {
        let mut inner = self.inner.write().map_err(|_| DomainError::lock_poisoned())?;
        let ids: Vec<TransactionId> = inner
            .by_account
            .get(&account)
            .map(|keys| keys.iter().map(|(_, id)| *id).collect())
            .unwrap_or_default();
        for id in &ids {
            inner.remove(*id);
        }
        tracing::info!(account_id = %account, purged = ids.len(), "ledger entries purged for account");
        Ok(ids.len())
    }
}

impl PurgeCascade for InMemoryLedger {
    fn purge_account_records(&self, account: AccountId) -> DomainResult<usize> {
        self.purge_account(account)
    }
}

impl<L> Ledger for Arc<L>
where
    L: Ledger + ?Sized,
{
    fn append(&self, draft: EntryDraft) -> DomainResult<LedgerEntry> {
        (**self).append(draft)
    }

    fn get(&self, id: TransactionId) -> DomainResult<LedgerEntry> {
        (**self).get(id)
    }

    fn get_including_deleted(&self, id: TransactionId) -> DomainResult<LedgerEntry> {
        (**self).get_including_deleted(id)
    }

    fn query(
        &self,
        filter: &LedgerFilter,
        sort: SortOrder,
        page: Pagination,
    ) -> DomainResult<Vec<LedgerEntry>> {
        (**self).query(filter, sort, page)
    }

    fn scan(&self, filter: &LedgerFilter) -> DomainResult<Vec<LedgerEntry>> {
        (**self).scan(filter)
    }

    fn count(&self, filter: &LedgerFilter) -> DomainResult<usize> {
        (**self).count(filter)
    }

    fn soft_delete(&self, id: TransactionId, now: DateTime<Utc>) -> DomainResult<()> {
        (**self).soft_delete(id, now)
    }

    fn purge(&self, id: TransactionId) -> DomainResult<()> {
        (**self).purge(id)
    }

    fn purge_account(&self, account: AccountId) -> DomainResult<usize> {
        (**self).purge_account(account)
    }
}
