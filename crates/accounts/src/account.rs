use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use safevault_core::{AccountId, AdminId, Asset, DomainError, DomainResult, Entity};

/// Default ban length applied when none is given (hours).
pub const DEFAULT_BAN_HOURS: u32 = 48;

/// Who changed an account's status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Actor {
    Administrator(AdminId),
    FraudScanner,
    /// Automatic transitions (ban expiry).
    System,
}

/// An active ban. Expires `duration_hours` after `banned_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ban {
    pub reason: String,
    pub banned_at: DateTime<Utc>,
    pub duration_hours: u32,
    pub actor: Actor,
}

impl Ban {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.banned_at + Duration::hours(i64::from(self.duration_hours))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// Informational flag; does not block operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub reason: String,
    pub flagged_at: DateTime<Utc>,
    pub actor: Actor,
}

/// Derived account status. `flagged` is orthogonal to `banned`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Banned,
    Flagged,
    BannedFlagged,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusChangeKind {
    Banned,
    Unbanned,
    /// Ban reached its expiry and was lifted on access.
    BanLifted,
    Flagged,
    Unflagged,
}

/// One audited status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub kind: StatusChangeKind,
    pub actor: Actor,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Status mutation requested by an administrator or the fraud scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum StatusCommand {
    Ban {
        reason: String,
        duration_hours: u32,
        actor: Actor,
    },
    Unban {
        actor: Actor,
    },
    Flag {
        reason: String,
        actor: Actor,
    },
    Unflag {
        actor: Actor,
    },
}

/// Registration input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub display_name: String,
    pub contact_email: String,
}

/// Custodial account: identity, per-asset balances, ban/flag state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    pub display_name: String,
    pub contact_email: String,
    balances: BTreeMap<Asset, Decimal>,
    pub ban: Option<Ban>,
    pub flag: Option<Flag>,
    pub history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Account {
    pub fn open(id: AccountId, new: NewAccount, now: DateTime<Utc>) -> DomainResult<Self> {
        let display_name = new.display_name.trim().to_string();
        let contact_email = new.contact_email.trim().to_ascii_lowercase();
        if display_name.is_empty() {
            return Err(DomainError::validation("display name must not be empty"));
        }
        if !contact_email.contains('@') {
            return Err(DomainError::validation(format!(
                "invalid contact email: {contact_email}"
            )));
        }

        Ok(Self {
            id,
            display_name,
            contact_email,
            balances: Asset::ALL.iter().map(|a| (*a, Decimal::ZERO)).collect(),
            ban: None,
            flag: None,
            history: Vec::new(),
            created_at: now,
            deleted_at: None,
        })
    }

    pub fn id_typed(&self) -> AccountId {
        self.id
    }

    pub fn balance(&self, asset: Asset) -> Decimal {
        self.balances.get(&asset).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn balances(&self) -> &BTreeMap<Asset, Decimal> {
        &self.balances
    }

    /// Apply a signed delta; rejects any result below zero and leaves the balance untouched.
    ///
    /// The delta must be non-zero and no finer than the asset's scale.
    pub fn adjust(&mut self, asset: Asset, delta: Decimal) -> DomainResult<Decimal> {
        asset.validate_amount(delta.abs())?;
        let current = self.balance(asset);
        let next = current.checked_add(delta).ok_or_else(|| {
            DomainError::validation(format!("{asset} balance out of range ({current} + {delta})"))
        })?;
        if next < Decimal::ZERO {
            return Err(DomainError::InsufficientFunds {
                asset,
                available: current,
                requested: -delta,
            });
        }
        self.balances.insert(asset, next);
        Ok(next)
    }

    pub fn debit(&mut self, asset: Asset, amount: Decimal) -> DomainResult<Decimal> {
        self.adjust(asset, -amount)
    }

    pub fn credit(&mut self, asset: Asset, amount: Decimal) -> DomainResult<Decimal> {
        self.adjust(asset, amount)
    }

    pub fn is_banned(&self) -> bool {
        self.ban.is_some()
    }

    pub fn is_flagged(&self) -> bool {
        self.flag.is_some()
    }

    pub fn status(&self) -> AccountStatus {
        match (self.is_banned(), self.is_flagged()) {
            (false, false) => AccountStatus::Active,
            (true, false) => AccountStatus::Banned,
            (false, true) => AccountStatus::Flagged,
            (true, true) => AccountStatus::BannedFlagged,
        }
    }

    /// Time left on the current ban, if any and not yet expired.
    pub fn remaining_ban(&self, now: DateTime<Utc>) -> Option<Duration> {
        let ban = self.ban.as_ref()?;
        let left = ban.expires_at() - now;
        (left > Duration::zero()).then_some(left)
    }

    /// Lift an expired ban. Returns `true` if a lift happened (and was recorded).
    pub fn lift_expired_ban(&mut self, now: DateTime<Utc>) -> bool {
        match &self.ban {
            Some(ban) if ban.is_expired(now) => {
                let reason = format!("ban expired at {}", ban.expires_at().to_rfc3339());
                self.ban = None;
                self.record(StatusChangeKind::BanLifted, Actor::System, Some(reason), now);
                true
            }
            _ => false,
        }
    }

    /// Fails with `Suspended` while a ban is in force (after lazily lifting an expired one).
    pub fn ensure_not_suspended(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.lift_expired_ban(now);
        match &self.ban {
            Some(ban) => Err(DomainError::Suspended {
                reason: ban.reason.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn apply_status(&mut self, command: StatusCommand, now: DateTime<Utc>) -> DomainResult<()> {
        match command {
            StatusCommand::Ban {
                reason,
                duration_hours,
                actor,
            } => {
                if duration_hours == 0 {
                    return Err(DomainError::validation("ban duration must be at least one hour"));
                }
                self.ban = Some(Ban {
                    reason: reason.clone(),
                    banned_at: now,
                    duration_hours,
                    actor,
                });
                self.record(StatusChangeKind::Banned, actor, Some(reason), now);
            }
            StatusCommand::Unban { actor } => {
                if self.ban.take().is_some() {
                    self.record(StatusChangeKind::Unbanned, actor, None, now);
                }
            }
            StatusCommand::Flag { reason, actor } => {
                self.flag = Some(Flag {
                    reason: reason.clone(),
                    flagged_at: now,
                    actor,
                });
                self.record(StatusChangeKind::Flagged, actor, Some(reason), now);
            }
            StatusCommand::Unflag { actor } => {
                if self.flag.take().is_some() {
                    self.record(StatusChangeKind::Unflagged, actor, None, now);
                }
            }
        }
        Ok(())
    }

    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(now);
        }
    }

    pub fn restore(&mut self) {
        self.deleted_at = None;
    }

    fn record(
        &mut self,
        kind: StatusChangeKind,
        actor: Actor,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.history.push(StatusChange {
            kind,
            actor,
            reason,
            at,
        });
    }
}
