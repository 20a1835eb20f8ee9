use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use safevault_accounts::Account;
use safevault_core::{AccountId, AssetType, Entity, TransactionId};

/// Contact address used for the synthetic cash counterparty.
pub const SYSTEM_CONTACT: &str = "system@safevault.com";

/// Denormalized view of a party captured at transaction time.
///
/// Later renames or deletions of the account never alter this snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySnapshot {
    pub account_id: AccountId,
    pub display_name: String,
    pub contact_email: String,
}

impl PartySnapshot {
    pub fn of(account: &Account) -> Self {
        Self {
            account_id: account.id_typed(),
            display_name: account.display_name.clone(),
            contact_email: account.contact_email.clone(),
        }
    }

    pub fn cash_deposit() -> Self {
        Self::system("Cash Deposit")
    }

    pub fn cash_withdrawal() -> Self {
        Self::system("Cash Withdrawal")
    }

    pub fn is_system(&self) -> bool {
        self.account_id.is_system()
    }

    fn system(display_name: &str) -> Self {
        Self {
            account_id: AccountId::SYSTEM,
            display_name: display_name.to_string(),
            contact_email: SYSTEM_CONTACT.to_string(),
        }
    }
}

/// Settlement status. Synchronous operations only ever persist `Completed`;
/// `Pending`/`Failed` are reserved for asynchronous settlement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

/// What kind of movement an entry records (derived from its parties and asset type).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Transfer,
    Deposit,
    Withdrawal,
    Conversion,
}

/// An entry to be appended (the ledger assigns the transaction id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub sender: PartySnapshot,
    pub receiver: PartySnapshot,
    pub amount: Decimal,
    pub asset_type: AssetType,
    pub status: EntryStatus,
    pub timestamp: DateTime<Utc>,
}

impl EntryDraft {
    pub fn completed(
        sender: PartySnapshot,
        receiver: PartySnapshot,
        amount: Decimal,
        asset_type: AssetType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sender,
            receiver,
            amount,
            asset_type,
            status: EntryStatus::Completed,
            timestamp,
        }
    }
}

/// One immutable record of a balance-affecting event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub transaction_id: TransactionId,
    pub sender: PartySnapshot,
    pub receiver: PartySnapshot,
    pub amount: Decimal,
    pub asset_type: AssetType,
    pub status: EntryStatus,
    pub timestamp: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for LedgerEntry {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.transaction_id
    }

    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl LedgerEntry {
    pub fn from_draft(transaction_id: TransactionId, draft: EntryDraft) -> Self {
        Self {
            transaction_id,
            sender: draft.sender,
            receiver: draft.receiver,
            amount: draft.amount,
            asset_type: draft.asset_type,
            status: draft.status,
            timestamp: draft.timestamp,
            deleted_at: None,
        }
    }

    pub fn kind(&self) -> EntryKind {
        if self.asset_type.is_conversion() {
            EntryKind::Conversion
        } else if self.sender.is_system() {
            EntryKind::Deposit
        } else if self.receiver.is_system() {
            EntryKind::Withdrawal
        } else {
            EntryKind::Transfer
        }
    }

    pub fn involves(&self, account: AccountId) -> bool {
        self.sender.account_id == account || self.receiver.account_id == account
    }

    pub fn is_completed(&self) -> bool {
        self.status == EntryStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use safevault_core::Asset;

    fn party(name: &str) -> PartySnapshot {
        PartySnapshot {
            account_id: AccountId::new(),
            display_name: name.to_string(),
            contact_email: format!("{name}@example.com"),
        }
    }

    #[test]
    fn kind_is_derived_from_parties_and_asset_type() {
        let a = party("a");
        let b = party("b");
        let now = Utc::now();
        let id = TransactionId::new();

        let transfer = LedgerEntry::from_draft(
            id,
            EntryDraft::completed(a.clone(), b.clone(), dec!(1), Asset::Btc.into(), now),
        );
        assert_eq!(transfer.kind(), EntryKind::Transfer);

        let deposit = LedgerEntry::from_draft(
            id,
            EntryDraft::completed(PartySnapshot::cash_deposit(), a.clone(), dec!(1), Asset::Inr.into(), now),
        );
        assert_eq!(deposit.kind(), EntryKind::Deposit);

        let withdrawal = LedgerEntry::from_draft(
            id,
            EntryDraft::completed(a.clone(), PartySnapshot::cash_withdrawal(), dec!(1), Asset::Inr.into(), now),
        );
        assert_eq!(withdrawal.kind(), EntryKind::Withdrawal);

        let conversion = LedgerEntry::from_draft(
            id,
            EntryDraft::completed(
                a.clone(),
                a,
                dec!(1),
                AssetType::Conversion { from: Asset::Btc, to: Asset::Inr },
                now,
            ),
        );
        assert_eq!(conversion.kind(), EntryKind::Conversion);
    }

    #[test]
    fn serializes_composite_asset_type() {
        let a = party("a");
        let entry = LedgerEntry::from_draft(
            TransactionId::new(),
            EntryDraft::completed(
                a.clone(),
                a,
                dec!(0.5),
                AssetType::Conversion { from: Asset::Eth, to: Asset::Doge },
                Utc::now(),
            ),
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["asset_type"], "ETH_DOGE");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["amount"], "0.5");
    }
}
