//! Account Store: the only owner of balance records.
//!
//! ## Serialization model
//!
//! Each account lives behind its own mutex. Multi-account work goes through
//! [`AccountStore::transact`], which locks every requested account in ascending
//! `AccountId` order (so mirror-image transfers cannot deadlock), hands the
//! closure *working copies*, and writes the copies back only if the closure
//! returns `Ok`. Anything the closure does after mutating a copy (e.g. a ledger
//! append) is therefore inside the same atomic unit: an `Err` discards every
//! balance change.
//!
//! Lock order across the crate graph is always: account cells, then the ledger.
//! The account map lock is never held while waiting for a cell.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use safevault_core::{AccountId, Asset, DomainError, DomainResult, Entity};

use crate::account::{Account, AccountStatus, NewAccount, StatusCommand};

/// Which status subset to return from [`AccountStore::find_by_filter`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Banned,
    Flagged,
    BannedOrFlagged,
    Active,
}

impl StatusFilter {
    pub fn matches(self, status: AccountStatus) -> bool {
        match self {
            StatusFilter::Banned => {
                matches!(status, AccountStatus::Banned | AccountStatus::BannedFlagged)
            }
            StatusFilter::Flagged => {
                matches!(status, AccountStatus::Flagged | AccountStatus::BannedFlagged)
            }
            StatusFilter::BannedOrFlagged => status != AccountStatus::Active,
            StatusFilter::Active => status == AccountStatus::Active,
        }
    }
}

/// Account query criteria. Soft-deleted accounts are excluded unless
/// `include_deleted` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFilter {
    pub status: Option<StatusFilter>,
    pub include_deleted: bool,
    /// Only soft-deleted accounts deleted strictly before this instant (retention sweep).
    pub deleted_before: Option<DateTime<Utc>>,
}

impl AccountFilter {
    pub fn with_status(status: StatusFilter) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn deleted_before(cutoff: DateTime<Utc>) -> Self {
        Self {
            status: None,
            include_deleted: true,
            deleted_before: Some(cutoff),
        }
    }

    pub fn matches(&self, account: &Account) -> bool {
        if account.is_deleted() && !self.include_deleted {
            return false;
        }
        if let Some(cutoff) = self.deleted_before {
            match account.deleted_at {
                Some(at) if at < cutoff => {}
                _ => return false,
            }
        }
        self.status.map_or(true, |s| s.matches(account.status()))
    }
}

/// Removes records that reference an account before the account itself is purged.
pub trait PurgeCascade: Send + Sync {
    /// Permanently remove every dependent record of `account`. All-or-nothing.
    fn purge_account_records(&self, account: AccountId) -> DomainResult<usize>;
}

/// Working copies of the accounts locked by [`AccountStore::transact`].
#[derive(Debug)]
pub struct AccountSet {
    accounts: Vec<Account>,
}

impl AccountSet {
    pub fn get(&self, id: AccountId) -> DomainResult<&Account> {
        self.accounts
            .iter()
            .find(|a| a.id_typed() == id)
            .ok_or_else(|| DomainError::not_found(format!("account {id}")))
    }

    pub fn get_mut(&mut self, id: AccountId) -> DomainResult<&mut Account> {
        self.accounts
            .iter_mut()
            .find(|a| a.id_typed() == id)
            .ok_or_else(|| DomainError::not_found(format!("account {id}")))
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.accounts.iter().any(|a| a.id_typed() == id)
    }
}

/// Account store abstraction.
pub trait AccountStore: Send + Sync {
    /// Register a new account. Contact emails are unique (case-insensitive).
    fn create(&self, new: NewAccount, now: DateTime<Utc>) -> DomainResult<Account>;

    /// Get a live (not soft-deleted) account.
    fn get(&self, id: AccountId) -> DomainResult<Account>;

    /// Get an account, optionally including soft-deleted ones.
    fn get_including_deleted(&self, id: AccountId) -> DomainResult<Account>;

    fn find_by_email(&self, email: &str) -> DomainResult<Account>;

    fn find_by_filter(&self, filter: &AccountFilter) -> DomainResult<Vec<Account>>;

    /// Atomically apply `delta` to one balance. Fails with `InsufficientFunds`
    /// if the result would be negative.
    fn adjust_balance(&self, id: AccountId, asset: Asset, delta: Decimal) -> DomainResult<Decimal>;

    fn set_status(
        &self,
        id: AccountId,
        command: StatusCommand,
        now: DateTime<Utc>,
    ) -> DomainResult<Account>;

    /// Authenticated-access hook: lifts an expired ban before returning the account.
    fn access(&self, id: AccountId, now: DateTime<Utc>) -> DomainResult<Account>;

    fn soft_delete(&self, id: AccountId, now: DateTime<Utc>) -> DomainResult<()>;

    fn restore(&self, id: AccountId) -> DomainResult<()>;

    /// Run `f` over working copies of `ids` (missing or deleted accounts are
    /// simply absent from the set) and commit the copies only if `f` succeeds.
    fn transact<T, E, F>(&self, ids: &[AccountId], f: F) -> Result<T, E>
    where
        F: FnOnce(&mut AccountSet) -> Result<T, E>,
        E: From<DomainError>;

    /// Permanently remove an account after `cascade` removed its dependent
    /// records. If the cascade fails nothing is removed.
    fn purge<C>(&self, id: AccountId, cascade: &C) -> DomainResult<usize>
    where
        C: PurgeCascade + ?Sized;
}

type Cell = Arc<Mutex<Option<Account>>>;

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<AccountId, Cell>,
    emails: HashMap<String, AccountId>,
}

/// In-memory account store with per-account locking.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    inner: RwLock<Inner>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn cell(&self, id: AccountId) -> DomainResult<Cell> {
        let inner = self.inner.read().map_err(|_| DomainError::lock_poisoned())?;
        inner
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("account {id}")))
    }

    fn cells(&self) -> DomainResult<Vec<Cell>> {
        let inner = self.inner.read().map_err(|_| DomainError::lock_poisoned())?;
        Ok(inner.accounts.values().cloned().collect())
    }

    /// Lock one account and mutate it in place (deleted accounts included only if asked).
    fn with_account<T>(
        &self,
        id: AccountId,
        include_deleted: bool,
        f: impl FnOnce(&mut Account) -> DomainResult<T>,
    ) -> DomainResult<T> {
        let cell = self.cell(id)?;
        let mut slot = cell.lock().map_err(|_| DomainError::lock_poisoned())?;
        match slot.as_mut() {
            Some(account) if include_deleted || !account.is_deleted() => f(account),
            _ => Err(DomainError::not_found(format!("account {id}"))),
        }
    }
}

impl AccountStore for InMemoryAccountStore {
    fn create(&self, new: NewAccount, now: DateTime<Utc>) -> DomainResult<Account> {
        let account = Account::open(AccountId::new(), new, now)?;
        let mut inner = self.inner.write().map_err(|_| DomainError::lock_poisoned())?;

        if inner.emails.contains_key(&account.contact_email) {
            return Err(DomainError::conflict(format!(
                "contact email already registered: {}",
                account.contact_email
            )));
        }

        let id = account.id_typed();
        inner.emails.insert(account.contact_email.clone(), id);
        inner
            .accounts
            .insert(id, Arc::new(Mutex::new(Some(account.clone()))));

        info!(account = %id, "account created");
        Ok(account)
    }

    fn get(&self, id: AccountId) -> DomainResult<Account> {
        self.with_account(id, false, |a| Ok(a.clone()))
    }

    fn get_including_deleted(&self, id: AccountId) -> DomainResult<Account> {
        self.with_account(id, true, |a| Ok(a.clone()))
    }

    fn find_by_email(&self, email: &str) -> DomainResult<Account> {
        let key = email.trim().to_ascii_lowercase();
        let id = {
            let inner = self.inner.read().map_err(|_| DomainError::lock_poisoned())?;
            inner
                .emails
                .get(&key)
                .copied()
                .ok_or_else(|| DomainError::not_found(format!("account with email {key}")))?
        };
        self.get(id)
    }

    fn find_by_filter(&self, filter: &AccountFilter) -> DomainResult<Vec<Account>> {
        let mut result = Vec::new();
        for cell in self.cells()? {
            let slot = cell.lock().map_err(|_| DomainError::lock_poisoned())?;
            if let Some(account) = slot.as_ref() {
                if filter.matches(account) {
                    result.push(account.clone());
                }
            }
        }
        result.sort_by_key(|a| (a.created_at, a.id_typed()));
        Ok(result)
    }

    fn adjust_balance(&self, id: AccountId, asset: Asset, delta: Decimal) -> DomainResult<Decimal> {
        self.transact(&[id], |set| set.get_mut(id)?.adjust(asset, delta))
    }

    fn set_status(
        &self,
        id: AccountId,
        command: StatusCommand,
        now: DateTime<Utc>,
    ) -> DomainResult<Account> {
        self.with_account(id, false, |account| {
            account.apply_status(command, now)?;
            info!(account = %id, status = ?account.status(), "account status changed");
            Ok(account.clone())
        })
    }

    fn access(&self, id: AccountId, now: DateTime<Utc>) -> DomainResult<Account> {
        self.with_account(id, false, |account| {
            if account.lift_expired_ban(now) {
                info!(account = %id, "expired ban lifted on access");
            }
            Ok(account.clone())
        })
    }

    fn soft_delete(&self, id: AccountId, now: DateTime<Utc>) -> DomainResult<()> {
        self.with_account(id, false, |account| {
            account.mark_deleted(now);
            debug!(account = %id, "account soft-deleted");
            Ok(())
        })
    }

    fn restore(&self, id: AccountId) -> DomainResult<()> {
        self.with_account(id, true, |account| {
            account.restore();
            Ok(())
        })
    }

    fn transact<T, E, F>(&self, ids: &[AccountId], f: F) -> Result<T, E>
    where
        F: FnOnce(&mut AccountSet) -> Result<T, E>,
        E: From<DomainError>,
    {
        let mut ordered = ids.to_vec();
        ordered.sort();
        ordered.dedup();

        let cells: Vec<Cell> = {
            let inner = self.inner.read().map_err(|_| DomainError::lock_poisoned())?;
            ordered
                .iter()
                .filter_map(|id| inner.accounts.get(id).cloned())
                .collect()
        };

        let mut guards = Vec::with_capacity(cells.len());
        for cell in &cells {
            guards.push(cell.lock().map_err(|_| DomainError::lock_poisoned())?);
        }

        let mut set = AccountSet {
            accounts: guards
                .iter()
                .filter_map(|slot| Option::as_ref(&**slot))
                .filter(|a| !a.is_deleted())
                .cloned()
                .collect(),
        };

        let out = f(&mut set)?;

        let mut updated: HashMap<AccountId, Account> = set
            .accounts
            .into_iter()
            .map(|a| (a.id_typed(), a))
            .collect();
        for slot in guards.iter_mut() {
            if let Some(current) = Option::as_mut(&mut **slot) {
                if let Some(next) = updated.remove(&current.id_typed()) {
                    *current = next;
                }
            }
        }

        Ok(out)
    }

    fn purge<C>(&self, id: AccountId, cascade: &C) -> DomainResult<usize>
    where
        C: PurgeCascade + ?Sized,
    {
        let cell = self.cell(id)?;
        let mut slot = cell.lock().map_err(|_| DomainError::lock_poisoned())?;
        let email = match slot.as_ref() {
            Some(account) => account.contact_email.clone(),
            None => return Err(DomainError::not_found(format!("account {id}"))),
        };

        let removed = cascade.purge_account_records(id)?;

        let mut inner = self.inner.write().map_err(|_| DomainError::lock_poisoned())?;
        inner.accounts.remove(&id);
        inner.emails.remove(&email);
        *slot = None;

        info!(account = %id, cascaded = removed, "account purged");
        Ok(removed)
    }
}

impl<S> AccountStore for Arc<S>
where
    S: AccountStore + ?Sized,
{
    fn create(&self, new: NewAccount, now: DateTime<Utc>) -> DomainResult<Account> {
        (**self).create(new, now)
    }

    fn get(&self, id: AccountId) -> DomainResult<Account> {
        (**self).get(id)
    }

    fn get_including_deleted(&self, id: AccountId) -> DomainResult<Account> {
        (**self).get_including_deleted(id)
    }

    fn find_by_email(&self, email: &str) -> DomainResult<Account> {
        (**self).find_by_email(email)
    }

    fn find_by_filter(&self, filter: &AccountFilter) -> DomainResult<Vec<Account>> {
        (**self).find_by_filter(filter)
    }

    fn adjust_balance(&self, id: AccountId, asset: Asset, delta: Decimal) -> DomainResult<Decimal> {
        (**self).adjust_balance(id, asset, delta)
    }

    fn set_status(
        &self,
        id: AccountId,
        command: StatusCommand,
        now: DateTime<Utc>,
    ) -> DomainResult<Account> {
        (**self).set_status(id, command, now)
    }

    fn access(&self, id: AccountId, now: DateTime<Utc>) -> DomainResult<Account> {
        (**self).access(id, now)
    }

    fn soft_delete(&self, id: AccountId, now: DateTime<Utc>) -> DomainResult<()> {
        (**self).soft_delete(id, now)
    }

    fn restore(&self, id: AccountId) -> DomainResult<()> {
        (**self).restore(id)
    }

    fn transact<T, E, F>(&self, ids: &[AccountId], f: F) -> Result<T, E>
    where
        F: FnOnce(&mut AccountSet) -> Result<T, E>,
        E: From<DomainError>,
    {
        (**self).transact(ids, f)
    }

    fn purge<C>(&self, id: AccountId, cascade: &C) -> DomainResult<usize>
    where
        C: PurgeCascade + ?Sized,
    {
        (**self).purge(id, cascade)
    }
}
