//! Ledger query model: filter, sort, pagination.
//!
//! Soft-deleted entries are excluded unless `include_deleted` is set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use safevault_core::{AccountId, Asset};

use crate::entry::{EntryKind, EntryStatus, LedgerEntry};

/// Pagination parameters for ledger queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of entries to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    /// 1-based page helper.
    pub fn page(page: u32, per_page: u32) -> Self {
        let per_page = per_page.clamp(1, Self::MAX_LIMIT);
        Self {
            limit: per_page,
            offset: page.saturating_sub(1).saturating_mul(per_page),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Which side of an entry the `account` filter matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    #[default]
    Either,
    Sender,
    Receiver,
}

/// Filter criteria for ledger queries. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFilter {
    pub account: Option<AccountId>,
    pub role: PartyRole,
    /// Matches simple entries in this asset and conversions from or to it.
    pub asset: Option<Asset>,
    pub kind: Option<EntryKind>,
    pub status: Option<EntryStatus>,
    /// Inclusive lower bound on `timestamp`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`.
    pub to: Option<DateTime<Utc>>,
    pub include_deleted: bool,
    /// Only entries soft-deleted strictly before this instant (retention sweep).
    pub deleted_before: Option<DateTime<Utc>>,
}

impl LedgerFilter {
    pub fn for_account(account: AccountId) -> Self {
        Self {
            account: Some(account),
            ..Self::default()
        }
    }

    /// Completed entries in `[from, to]`.
    pub fn completed_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            status: Some(EntryStatus::Completed),
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }

    pub fn deleted_before(cutoff: DateTime<Utc>) -> Self {
        Self {
            include_deleted: true,
            deleted_before: Some(cutoff),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.asset = Some(asset);
        self
    }

    pub fn with_role(mut self, role: PartyRole) -> Self {
        self.role = role;
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if entry.deleted_at.is_some() && !self.include_deleted {
            return false;
        }
        if let Some(cutoff) = self.deleted_before {
            match entry.deleted_at {
                Some(at) if at < cutoff => {}
                _ => return false,
            }
        }
        if let Some(account) = self.account {
            let hit = match self.role {
                PartyRole::Either => entry.involves(account),
                PartyRole::Sender => entry.sender.account_id == account,
                PartyRole::Receiver => entry.receiver.account_id == account,
            };
            if !hit {
                return false;
            }
        }
        if let Some(asset) = self.asset {
            if !entry.asset_type.involves(asset) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if entry.kind() != kind {
                return false;
            }
        }
        if let Some(status) = self.status {
            if entry.status != status {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.timestamp > to {
                return false;
            }
        }
        true
    }
}
