use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use safevault_accounts::{AccountSet, AccountStore};
use safevault_core::{AccountId, Asset, AssetType, Clock};
use safevault_ledger::{EntryDraft, Ledger, LedgerEntry, PartySnapshot};
use safevault_pricing::{PriceFeed, Rates};

use crate::error::{TransferError, TransferResult};

/// How many times an operation is re-run after a ledger id conflict.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Deposit,
    Withdrawal,
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReceipt {
    pub entry: LedgerEntry,
    /// Amount credited in the target asset (truncated at its scale).
    pub converted_amount: Decimal,
}

/// Transfer protocol over an account store, a ledger and a price feed.
pub struct TransferService<S, L, P, C> {
    accounts: S,
    ledger: L,
    rates: Rates<P>,
    clock: C,
    conflict_retries: u32,
}

impl<S, L, P, C> TransferService<S, L, P, C>
where
    S: AccountStore,
    L: Ledger,
    P: PriceFeed,
    C: Clock,
{
    pub fn new(accounts: S, ledger: L, prices: P, clock: C) -> Self {
        Self {
            accounts,
            ledger,
            rates: Rates::new(prices),
            clock,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn accounts(&self) -> &S {
        &self.accounts
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn rates(&self) -> &Rates<P> {
        &self.rates
    }

    /// Move `amount` of `asset` from `sender` to `receiver`.
    pub fn transfer(
        &self,
        sender: AccountId,
        receiver: AccountId,
        asset: Asset,
        amount: Decimal,
    ) -> TransferResult<LedgerEntry> {
        let amount = asset.validate_amount(amount).map_err(TransferError::from)?;
        if sender == receiver {
            return Err(TransferError::SelfTransfer);
        }

        self.with_retry("transfer", || {
            let now = self.clock.now();
            self.accounts.transact(&[sender, receiver], |set| {
                require(set, sender, TransferError::AccountNotFound(sender))?;
                require(set, receiver, TransferError::ReceiverNotFound(receiver))?;

                set.get_mut(sender)?.ensure_not_suspended(now)?;

                let to = set.get_mut(receiver)?;
                to.lift_expired_ban(now);
                if to.is_banned() {
                    return Err(TransferError::ReceiverBanned(receiver));
                }

                let from = set.get_mut(sender)?;
                from.debit(asset, amount)?;
                let sender_snapshot = PartySnapshot::of(from);

                let to = set.get_mut(receiver)?;
                to.credit(asset, amount)?;
                let receiver_snapshot = PartySnapshot::of(to);

                Ok(self.ledger.append(EntryDraft::completed(
                    sender_snapshot,
                    receiver_snapshot,
                    amount,
                    asset.into(),
                    now,
                ))?)
            })
        })
        .inspect(|entry| {
            info!(
                transaction_id = %entry.transaction_id,
                sender = %sender,
                receiver = %receiver,
                asset = %asset,
                amount = %amount,
                "transfer completed"
            );
        })
    }

    /// Cash movement between `account` and the system counterparty.
    ///
    /// `asset` defaults to the base asset.
    pub fn deposit_or_withdraw(
        &self,
        account: AccountId,
        asset: Option<Asset>,
        amount: Decimal,
        direction: Direction,
    ) -> TransferResult<LedgerEntry> {
        let asset = asset.unwrap_or(Asset::BASE);
        let amount = asset.validate_amount(amount).map_err(TransferError::from)?;

        self.with_retry("cash movement", || {
            let now = self.clock.now();
            self.accounts.transact(&[account], |set| {
                require(set, account, TransferError::AccountNotFound(account))?;
                let holder = set.get_mut(account)?;
                holder.ensure_not_suspended(now)?;

                match direction {
                    Direction::Deposit => holder.credit(asset, amount)?,
                    Direction::Withdrawal => holder.debit(asset, amount)?,
                };
                let me = PartySnapshot::of(holder);
                let (sender, receiver) = match direction {
                    Direction::Deposit => (PartySnapshot::cash_deposit(), me),
                    Direction::Withdrawal => (me, PartySnapshot::cash_withdrawal()),
                };

                Ok(self.ledger.append(EntryDraft::completed(
                    sender,
                    receiver,
                    amount,
                    asset.into(),
                    now,
                ))?)
            })
        })
        .inspect(|entry| {
            info!(
                transaction_id = %entry.transaction_id,
                account = %account,
                asset = %asset,
                amount = %amount,
                direction = ?direction,
                "cash movement completed"
            );
        })
    }

    pub fn deposit(&self, account: AccountId, asset: Asset, amount: Decimal) -> TransferResult<LedgerEntry> {
        self.deposit_or_withdraw(account, Some(asset), amount, Direction::Deposit)
    }

    pub fn withdraw(&self, account: AccountId, asset: Asset, amount: Decimal) -> TransferResult<LedgerEntry> {
        self.deposit_or_withdraw(account, Some(asset), amount, Direction::Withdrawal)
    }

    /// Exchange `amount` of `from` for `to` on the same account at the current rate.
    ///
    /// The rate is read before any lock is taken; a feed failure aborts with
    /// nothing mutated.
    pub fn convert(
        &self,
        account: AccountId,
        amount: Decimal,
        from: Asset,
        to: Asset,
    ) -> TransferResult<ConversionReceipt> {
        let amount = from.validate_amount(amount).map_err(TransferError::from)?;
        if from == to {
            return Err(TransferError::SameAsset(from));
        }

        let converted = self.rates.convert(amount, from, to).inspect_err(|err| {
            debug!(account = %account, from = %from, to = %to, error = %err, "conversion rate unavailable");
        })?;
        if converted.is_zero() {
            return Err(TransferError::InvalidAmount(format!(
                "{amount} {from} is worth less than the smallest unit of {to}"
            )));
        }

        let entry = self.with_retry("conversion", || {
            let now = self.clock.now();
            self.accounts.transact(&[account], |set| {
                require(set, account, TransferError::AccountNotFound(account))?;
                let holder = set.get_mut(account)?;
                holder.ensure_not_suspended(now)?;
                holder.debit(from, amount)?;
                holder.credit(to, converted)?;
                let me = PartySnapshot::of(holder);

                Ok(self.ledger.append(EntryDraft::completed(
                    me.clone(),
                    me,
                    amount,
                    AssetType::Conversion { from, to },
                    now,
                ))?)
            })
        })?;

        info!(
            transaction_id = %entry.transaction_id,
            account = %account,
            from = %from,
            to = %to,
            amount = %amount,
            converted = %converted,
            "conversion completed"
        );
        Ok(ConversionReceipt {
            entry,
            converted_amount: converted,
        })
    }

    fn with_retry<T>(
        &self,
        op: &'static str,
        mut attempt: impl FnMut() -> TransferResult<T>,
    ) -> TransferResult<T> {
        let mut retries = 0;
        loop {
            match attempt() {
                Err(err) if err.is_retryable() && retries < self.conflict_retries => {
                    retries += 1;
                    warn!(op, retries, error = %err, "retrying after conflict");
                }
                Err(err) => {
                    debug!(op, error = %err, kind = ?err.kind(), "operation rejected");
                    return Err(err);
                }
                ok => return ok,
            }
        }
    }
}

fn require(set: &AccountSet, id: AccountId, missing: TransferError) -> TransferResult<()> {
    if set.contains(id) { Ok(()) } else { Err(missing) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use safevault_accounts::{
        Actor, InMemoryAccountStore, NewAccount, StatusChangeKind, StatusCommand,
    };
    use safevault_core::{ManualClock, TransactionId};
    use safevault_ledger::{
        EntryKind, InMemoryLedger, LedgerFilter, SYSTEM_CONTACT, TransactionIdGenerator,
    };
    use safevault_pricing::StaticPriceFeed;

    type Service = TransferService<
        Arc<InMemoryAccountStore>,
        Arc<InMemoryLedger>,
        Arc<StaticPriceFeed>,
        Arc<ManualClock>,
    >;

    struct Fixture {
        service: Arc<Service>,
        accounts: Arc<InMemoryAccountStore>,
        ledger: Arc<InMemoryLedger>,
        prices: Arc<StaticPriceFeed>,
        clock: Arc<ManualClock>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn fixture_with_ledger(ledger: Arc<InMemoryLedger>) -> Fixture {
        let accounts = InMemoryAccountStore::arc();
        let prices = Arc::new(StaticPriceFeed::with_prices([
            (Asset::Btc, dec!(5000000)),
            (Asset::Eth, dec!(250000)),
            (Asset::Doge, dec!(7.5)),
        ]));
        let clock = Arc::new(ManualClock::new(t0()));
        let service = Arc::new(TransferService::new(
            accounts.clone(),
            ledger.clone(),
            prices.clone(),
            clock.clone(),
        ));
        Fixture {
            service,
            accounts,
            ledger,
            prices,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_ledger(InMemoryLedger::arc())
    }

    impl Fixture {
        fn open(&self, name: &str, funds: &[(Asset, Decimal)]) -> AccountId {
            let account = self
                .accounts
                .create(
                    NewAccount {
                        display_name: name.to_string(),
                        contact_email: format!("{name}@example.com"),
                    },
                    t0(),
                )
                .unwrap();
            let id = account.id_typed();
            for &(asset, amount) in funds {
                self.accounts.adjust_balance(id, asset, amount).unwrap();
            }
            id
        }

        fn balance(&self, id: AccountId, asset: Asset) -> Decimal {
            self.accounts.get(id).unwrap().balance(asset)
        }

        fn entries(&self) -> usize {
            self.ledger.count(&LedgerFilter::default()).unwrap()
        }

        fn ban(&self, id: AccountId, hours: u32) {
            self.accounts
                .set_status(
                    id,
                    StatusCommand::Ban {
                        reason: "suspicious".into(),
                        duration_hours: hours,
                        actor: Actor::System,
                    },
                    self.clock.now(),
                )
                .unwrap();
        }
    }

    #[test]
    fn transfer_moves_funds_and_records_one_entry() {
        let f = fixture();
        let alice = f.open("alice", &[(Asset::Btc, dec!(1))]);
        let bob = f.open("bob", &[]);

        let entry = f
            .service
            .transfer(alice, bob, Asset::Btc, dec!(0.25))
            .unwrap();

        assert_eq!(f.balance(alice, Asset::Btc), dec!(0.75));
        assert_eq!(f.balance(bob, Asset::Btc), dec!(0.25));
        assert_eq!(f.entries(), 1);
        assert_eq!(entry.kind(), EntryKind::Transfer);
        assert_eq!(entry.sender.display_name, "alice");
        assert_eq!(entry.receiver.contact_email, "bob@example.com");
        assert!(entry.is_completed());
        assert_eq!(entry.timestamp, t0());
    }

    #[test]
    fn rejected_transfers_leave_no_trace() {
        let f = fixture();
        let alice = f.open("alice", &[(Asset::Inr, dec!(100))]);
        let bob = f.open("bob", &[(Asset::Inr, dec!(5))]);
        let banned = f.open("mallory", &[]);
        f.ban(banned, 48);

        let cases = [
            (f.service.transfer(alice, bob, Asset::Inr, dec!(0)), "zero"),
            (f.service.transfer(alice, bob, Asset::Inr, dec!(-3)), "negative"),
            (f.service.transfer(alice, bob, Asset::Inr, dec!(1.001)), "scale"),
            (f.service.transfer(alice, alice, Asset::Inr, dec!(1)), "self"),
            (f.service.transfer(alice, AccountId::new(), Asset::Inr, dec!(1)), "missing"),
            (f.service.transfer(alice, banned, Asset::Inr, dec!(1)), "banned"),
            (f.service.transfer(alice, bob, Asset::Inr, dec!(100.01)), "overdraft"),
            (f.service.transfer(banned, bob, Asset::Inr, dec!(1)), "suspended"),
        ];

        let kinds: Vec<_> = cases
            .iter()
            .map(|(res, label)| match res {
                Err(e) => (*label, e.clone()),
                Ok(_) => panic!("{label} should fail"),
            })
            .collect();

        assert!(matches!(kinds[0].1, TransferError::InvalidAmount(_)));
        assert!(matches!(kinds[1].1, TransferError::InvalidAmount(_)));
        assert!(matches!(kinds[2].1, TransferError::InvalidAmount(_)));
        assert_eq!(kinds[3].1, TransferError::SelfTransfer);
        assert!(matches!(kinds[4].1, TransferError::ReceiverNotFound(_)));
        assert_eq!(kinds[5].1, TransferError::ReceiverBanned(banned));
        assert!(matches!(kinds[6].1, TransferError::InsufficientFunds { .. }));
        assert!(matches!(kinds[7].1, TransferError::SenderSuspended { .. }));

        assert_eq!(f.balance(alice, Asset::Inr), dec!(100));
        assert_eq!(f.balance(bob, Asset::Inr), dec!(5));
        assert_eq!(f.entries(), 0);
    }

    #[test]
    fn expired_ban_is_lifted_on_next_operation() {
        let f = fixture();
        let alice = f.open("alice", &[(Asset::Inr, dec!(100))]);
        let bob = f.open("bob", &[]);
        f.ban(alice, 48);

        assert!(matches!(
            f.service.transfer(alice, bob, Asset::Inr, dec!(10)),
            Err(TransferError::SenderSuspended { .. })
        ));

        f.clock.advance(Duration::hours(49));
        f.service.transfer(alice, bob, Asset::Inr, dec!(10)).unwrap();

        let alice = f.accounts.get(alice).unwrap();
        assert!(!alice.is_banned());
        let last = alice.history.last().unwrap();
        assert_eq!(last.kind, StatusChangeKind::BanLifted);
        assert_eq!(last.actor, Actor::System);
    }

    #[test]
    fn deposit_and_withdraw_use_the_system_counterparty() {
        let f = fixture();
        let alice = f.open("alice", &[]);

        let deposit = f
            .service
            .deposit_or_withdraw(alice, None, dec!(500), Direction::Deposit)
            .unwrap();
        assert_eq!(deposit.asset_type, AssetType::Single(Asset::Inr));
        assert_eq!(deposit.kind(), EntryKind::Deposit);
        assert_eq!(deposit.sender.display_name, "Cash Deposit");
        assert_eq!(deposit.sender.contact_email, SYSTEM_CONTACT);

        let withdrawal = f.service.withdraw(alice, Asset::Inr, dec!(200)).unwrap();
        assert_eq!(withdrawal.kind(), EntryKind::Withdrawal);
        assert_eq!(withdrawal.receiver.display_name, "Cash Withdrawal");

        assert!(matches!(
            f.service.withdraw(alice, Asset::Inr, dec!(300.01)),
            Err(TransferError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            f.service.deposit(AccountId::new(), Asset::Inr, dec!(1)),
            Err(TransferError::AccountNotFound(_))
        ));
        assert_eq!(f.balance(alice, Asset::Inr), dec!(300));
        assert_eq!(f.entries(), 2);
    }

    #[test]
    fn convert_debits_source_and_credits_target_on_one_account() {
        let f = fixture();
        let alice = f.open("alice", &[(Asset::Btc, dec!(0.5))]);

        let receipt = f
            .service
            .convert(alice, dec!(0.1), Asset::Btc, Asset::Inr)
            .unwrap();

        assert_eq!(receipt.converted_amount, dec!(500000));
        assert_eq!(receipt.entry.amount, dec!(0.1));
        assert_eq!(receipt.entry.asset_type.to_string(), "BTC_INR");
        assert_eq!(receipt.entry.sender, receipt.entry.receiver);
        assert_eq!(f.balance(alice, Asset::Btc), dec!(0.4));
        assert_eq!(f.balance(alice, Asset::Inr), dec!(500000));
        assert_eq!(f.entries(), 1);
    }

    #[test]
    fn failed_conversions_mutate_nothing() {
        let f = fixture();
        let alice = f.open("alice", &[(Asset::Eth, dec!(2))]);

        assert_eq!(
            f.service.convert(alice, dec!(1), Asset::Eth, Asset::Eth),
            Err(TransferError::SameAsset(Asset::Eth))
        );
        assert!(matches!(
            f.service.convert(alice, dec!(3), Asset::Eth, Asset::Btc),
            Err(TransferError::InsufficientFunds { .. })
        ));

        f.prices.remove(Asset::Eth);
        let err = f
            .service
            .convert(alice, dec!(1), Asset::Eth, Asset::Inr)
            .unwrap_err();
        assert!(matches!(err, TransferError::RateUnavailable(_)));

        assert_eq!(f.balance(alice, Asset::Eth), dec!(2));
        assert_eq!(f.balance(alice, Asset::Inr), dec!(0));
        assert_eq!(f.entries(), 0);
    }

    #[test]
    fn deposit_past_the_balance_maximum_is_rejected_and_account_stays_usable() {
        let f = fixture();
        let whale = f.open("whale", &[]);
        f.service.deposit(whale, Asset::Inr, Decimal::MAX).unwrap();

        let err = f.service.deposit(whale, Asset::Inr, Decimal::ONE).unwrap_err();
        assert!(matches!(err, TransferError::InvalidAmount(_)));
        assert_eq!(f.balance(whale, Asset::Inr), Decimal::MAX);
        assert_eq!(f.entries(), 1);

        f.service.withdraw(whale, Asset::Inr, dec!(1)).unwrap();
        assert_eq!(f.balance(whale, Asset::Inr), Decimal::MAX - Decimal::ONE);
    }

    /// Always collides with the first id it handed out.
    struct CollidingIds(TransactionId);

    impl TransactionIdGenerator for CollidingIds {
        fn next_id(&self) -> TransactionId {
            self.0
        }
    }

    #[test]
    fn exhausted_conflict_retries_roll_back() {
        let ledger = Arc::new(InMemoryLedger::with_id_generator(Arc::new(CollidingIds(
            TransactionId::new(),
        ))));
        let f = fixture_with_ledger(ledger);
        let alice = f.open("alice", &[(Asset::Inr, dec!(100))]);
        let bob = f.open("bob", &[]);

        f.service.transfer(alice, bob, Asset::Inr, dec!(10)).unwrap();
        let err = f
            .service
            .transfer(alice, bob, Asset::Inr, dec!(10))
            .unwrap_err();

        assert!(matches!(err, TransferError::Conflict(_)));
        assert_eq!(f.balance(alice, Asset::Inr), dec!(90));
        assert_eq!(f.balance(bob, Asset::Inr), dec!(10));
        assert_eq!(f.entries(), 1);
    }

    #[test]
    fn concurrent_debits_never_overdraw() {
        let f = fixture();
        let alice = f.open("alice", &[(Asset::Inr, dec!(100))]);
        let receivers: Vec<_> = (0..4).map(|i| f.open(&format!("r{i}"), &[])).collect();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let service = f.service.clone();
                let to = receivers[i % receivers.len()];
                thread::spawn(move || service.transfer(alice, to, Asset::Inr, dec!(10)).is_ok())
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(accepted, 10);
        assert_eq!(f.balance(alice, Asset::Inr), dec!(0));
        let received: Decimal = receivers.iter().map(|r| f.balance(*r, Asset::Inr)).sum();
        assert_eq!(received, dec!(100));
        assert_eq!(f.entries(), 10);
    }

    #[test]
    fn mirror_image_transfers_do_not_deadlock() {
        let f = fixture();
        let a = f.open("a", &[(Asset::Doge, dec!(1000))]);
        let b = f.open("b", &[(Asset::Doge, dec!(1000))]);

        let spawn = |from: AccountId, to: AccountId| {
            let service = f.service.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    let _ = service.transfer(from, to, Asset::Doge, dec!(1));
                }
            })
        };
        let ab = spawn(a, b);
        let ba = spawn(b, a);
        ab.join().unwrap();
        ba.join().unwrap();

        assert_eq!(
            f.balance(a, Asset::Doge) + f.balance(b, Asset::Doge),
            dec!(2000)
        );
        assert_eq!(f.entries(), 1000);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Transfer { from: usize, to: usize, cents: i64 },
        Withdraw { who: usize, cents: i64 },
        Convert { who: usize, cents: i64 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..3, 0usize..3, -100i64..20_000)
                .prop_map(|(from, to, cents)| Op::Transfer { from, to, cents }),
            (0usize..3, 1i64..20_000).prop_map(|(who, cents)| Op::Withdraw { who, cents }),
            (0usize..3, 1i64..20_000).prop_map(|(who, cents)| Op::Convert { who, cents }),
        ]
    }

    fn snapshot(f: &Fixture, ids: &[AccountId]) -> Vec<(Decimal, Decimal)> {
        ids.iter()
            .map(|id| (f.balance(*id, Asset::Inr), f.balance(*id, Asset::Doge)))
            .collect()
    }

    proptest! {
        #[test]
        fn every_operation_commits_fully_or_not_at_all(ops in prop::collection::vec(op(), 1..40)) {
            let f = fixture();
            let ids: Vec<_> = (0..3)
                .map(|i| f.open(&format!("p{i}"), &[(Asset::Inr, dec!(100))]))
                .collect();

            for op in ops {
                let before = snapshot(&f, &ids);
                let entries_before = f.entries();

                let result = match op.clone() {
                    Op::Transfer { from, to, cents } => f
                        .service
                        .transfer(ids[from], ids[to], Asset::Inr, Decimal::new(cents, 2))
                        .map(|_| ()),
                    Op::Withdraw { who, cents } => f
                        .service
                        .withdraw(ids[who], Asset::Inr, Decimal::new(cents, 2))
                        .map(|_| ()),
                    Op::Convert { who, cents } => f
                        .service
                        .convert(ids[who], Decimal::new(cents, 2), Asset::Inr, Asset::Doge)
                        .map(|_| ()),
                };
                let after = snapshot(&f, &ids);

                match (&op, result) {
                    (_, Err(_)) => {
                        prop_assert_eq!(&before, &after);
                        prop_assert_eq!(f.entries(), entries_before);
                    }
                    (Op::Transfer { from, to, cents }, Ok(())) => {
                        let amount = Decimal::new(*cents, 2);
                        prop_assert_eq!(after[*from].0, before[*from].0 - amount);
                        prop_assert_eq!(after[*to].0, before[*to].0 + amount);
                        prop_assert_eq!(f.entries(), entries_before + 1);
                    }
                    (Op::Withdraw { who, cents }, Ok(())) => {
                        prop_assert_eq!(after[*who].0, before[*who].0 - Decimal::new(*cents, 2));
                        prop_assert_eq!(f.entries(), entries_before + 1);
                    }
                    (Op::Convert { who, cents }, Ok(())) => {
                        prop_assert_eq!(after[*who].0, before[*who].0 - Decimal::new(*cents, 2));
                        prop_assert!(after[*who].1 > before[*who].1);
                        prop_assert_eq!(f.entries(), entries_before + 1);
                    }
                }
                for (inr, doge) in &after {
                    prop_assert!(*inr >= Decimal::ZERO);
                    prop_assert!(*doge >= Decimal::ZERO);
                }
            }
        }
    }
}
