use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use safevault_accounts::{Account, AccountStore};
use safevault_core::{AccountId, Asset, DomainError};
use safevault_ledger::{Ledger, LedgerEntry, LedgerFilter};
use safevault_pricing::{PriceFeed, RateError};

use crate::report::{ScanError, ScanWindow};

/// What the heuristics need to know about one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub id: AccountId,
    pub display_name: String,
    pub balances: BTreeMap<Asset, Decimal>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id_typed(),
            display_name: account.display_name.clone(),
            balances: account.balances().clone(),
        }
    }
}

/// Prices frozen at scan time so a scan is a pure function of its snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTable(pub BTreeMap<Asset, Decimal>);

impl PriceTable {
    pub fn insert(&mut self, asset: Asset, price: Decimal) {
        self.0.insert(asset, price);
    }
}

impl FromIterator<(Asset, Decimal)> for PriceTable {
    fn from_iter<I: IntoIterator<Item = (Asset, Decimal)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl PriceFeed for PriceTable {
    fn price_in_base(&self, asset: Asset) -> Result<Decimal, RateError> {
        if asset.is_base() {
            return Ok(Decimal::ONE);
        }
        self.0
            .get(&asset)
            .copied()
            .ok_or(RateError::UnsupportedAsset(asset))
    }
}

/// Ledger window + the accounts it touches + prices, as of `taken_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub window: ScanWindow,
    pub taken_at: DateTime<Utc>,
    pub entries: Vec<LedgerEntry>,
    pub accounts: HashMap<AccountId, AccountView>,
    pub prices: PriceTable,
}

impl ScanSnapshot {
    /// Read everything a scan needs. Performs no writes.
    ///
    /// Accounts that were soft-deleted since an entry was written are left out;
    /// entries referencing them are still counted by the frequency heuristics.
    pub fn capture<S, L, P>(
        accounts: &S,
        ledger: &L,
        prices: &P,
        window: ScanWindow,
        taken_at: DateTime<Utc>,
    ) -> Result<Self, ScanError>
    where
        S: AccountStore,
        L: Ledger,
        P: PriceFeed + ?Sized,
    {
        let entries = ledger
            .scan(&LedgerFilter::completed_between(window.from, window.to))
            .map_err(snapshot_error)?;

        let parties: BTreeSet<AccountId> = entries
            .iter()
            .flat_map(|e| [e.sender.account_id, e.receiver.account_id])
            .filter(|id| !id.is_system())
            .collect();

        let mut views = HashMap::with_capacity(parties.len());
        for id in parties {
            match accounts.get(id) {
                Ok(account) => {
                    views.insert(id, AccountView::from(&account));
                }
                Err(DomainError::NotFound(_)) => {}
                Err(err) => return Err(snapshot_error(err)),
            }
        }

        let mut needed: BTreeSet<Asset> = entries.iter().map(|e| e.asset_type.source()).collect();
        for view in views.values() {
            needed.extend(
                view.balances
                    .iter()
                    .filter(|(_, amount)| !amount.is_zero())
                    .map(|(asset, _)| *asset),
            );
        }
        let mut table = PriceTable::default();
        for asset in needed.into_iter().filter(|a| !a.is_base()) {
            table.insert(asset, prices.price_in_base(asset)?);
        }

        Ok(Self {
            window,
            taken_at,
            entries,
            accounts: views,
            prices: table,
        })
    }
}

fn snapshot_error(err: DomainError) -> ScanError {
    ScanError::Snapshot(err.to_string())
}
