//! Money-moving operations under concurrency
//!
//! Exercises the gate, the pipeline and the event bus together through
//! `BettingOperations`, against both the in-memory and the RocksDB store.

use async_trait::async_trait;
use dicebank::{
    account::{Money, NewAccount, PlayerAccount},
    balance_topic,
    errors::StoreError,
    operations::{OperationError, PLAYER_BUSY},
    BalanceEvent, BalanceStore, DiceBankConfig, MemoryBalanceStore, PlayerId, RocksBalanceStore,
    Services,
};
use rust_decimal::Decimal;
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::sync::mpsc;

const ALICE: PlayerId = PlayerId(1);
const BOB: PlayerId = PlayerId(2);

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn config(processing_ms: u64, rigged: Option<u8>, multiplier: f64) -> DiceBankConfig {
    let mut config = DiceBankConfig::default();
    config.storage.in_memory = true;
    config.game.processing_duration_ms = processing_ms;
    config.game.rigged_dice_number = rigged;
    config.game.win_multiplier = multiplier;
    config
}

async fn services(config: DiceBankConfig) -> Services {
    Services::with_store(config, Arc::new(MemoryBalanceStore::new()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_concurrent_operations_on_one_player_are_serialized() {
    let services = services(config(200, Some(2), 1.0)).await;
    let ops = services.operations.clone();

    let first = {
        let ops = ops.clone();
        tokio::spawn(async move { ops.deposit(ALICE, dec("10")).await })
    };
    // Let the first operation take the gate
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = ops.place_bet(ALICE, Some("pair"), Some(dec("5"))).await;

    match second {
        Err(OperationError::GateBusy(message)) => assert_eq!(message, PLAYER_BUSY),
        other => panic!("expected gate-busy, got {:?}", other),
    }

    let receipt = first.await.unwrap().unwrap();
    assert_eq!(receipt.new_balance, dec("510"));

    // Only the deposit landed, and the gate is free again
    let alice = services.store.load_account(ALICE).await.unwrap();
    assert_eq!(alice.wallet, dec("510"));
    assert_eq!(alice.bet_balance, Decimal::ZERO);
    assert!(!alice.is_betting);
}

#[tokio::test]
async fn test_simultaneous_attempts_admit_exactly_one() {
    let services = services(config(100, Some(2), 1.0)).await;

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let ops = services.operations.clone();
            tokio::spawn(async move { ops.withdraw(BOB, dec("1")).await })
        })
        .collect();

    let mut admitted = 0;
    let mut busy = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(OperationError::GateBusy(_)) => busy += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(busy, 7);
    let bob = services.store.load_account(BOB).await.unwrap();
    assert_eq!(bob.wallet, dec("299"));
}

#[tokio::test]
async fn test_different_players_do_not_contend() {
    let services = services(config(100, Some(2), 1.0)).await;

    let (a, b) = tokio::join!(
        services.operations.deposit(ALICE, dec("1")),
        services.operations.deposit(BOB, dec("1")),
    );
    assert!(a.is_ok());
    assert!(b.is_ok());
}

#[tokio::test]
async fn test_winning_bet_scenario() {
    let services = services(config(0, Some(4), 2.0)).await;

    let result = services
        .operations
        .place_bet(BOB, Some("pair"), Some(dec("20")))
        .await
        .unwrap();
    assert!(result.player_win);
    assert_eq!(result.dice_number, 4);
    assert_eq!(result.winnings, dec("40"));

    let bob = services.store.load_account(BOB).await.unwrap();
    assert_eq!(bob.bet_balance, dec("50"));
    assert_eq!(bob.wallet, dec("300"));
}

#[tokio::test]
async fn test_losing_bet_scenario() {
    let services = services(config(0, Some(4), 2.0)).await;

    let result = services
        .operations
        .place_bet(BOB, Some("not pair"), Some(dec("20")))
        .await
        .unwrap();
    assert!(!result.player_win);
    assert_eq!(result.winnings, dec("-20"));

    let bob = services.store.load_account(BOB).await.unwrap();
    assert_eq!(bob.bet_balance, dec("10"));
    assert_eq!(bob.wallet, dec("300"));
}

#[tokio::test]
async fn test_cash_in_scenarios() {
    let services = services(config(0, None, 1.0)).await;

    let balances = services.operations.cash_in(BOB, Some(dec("15"))).await.unwrap();
    assert_eq!(balances.bet_balance, dec("15"));
    assert_eq!(balances.wallet, dec("315"));

    let err = services
        .operations
        .cash_in(BOB, Some(dec("50")))
        .await
        .unwrap_err();
    assert_eq!(
        err.messages(),
        vec!["Player does not have enough bet Balance to cash In"]
    );

    let bob = services.store.load_account(BOB).await.unwrap();
    assert_eq!(bob.bet_balance, dec("15"));
    assert_eq!(bob.wallet, dec("315"));
    assert!(!bob.is_betting);
}

#[tokio::test]
async fn test_deposit_withdraw_round_trip() {
    let services = services(config(0, None, 1.0)).await;

    for amount in ["0.01", "12.34", "999.99", "250"] {
        services.operations.deposit(ALICE, dec(amount)).await.unwrap();
        services.operations.withdraw(ALICE, dec(amount)).await.unwrap();
    }

    let alice = services.store.load_account(ALICE).await.unwrap();
    assert_eq!(alice.wallet, dec("500"));
}

#[tokio::test]
async fn test_boundary_amounts_never_touch_the_gate() {
    let services = services(config(0, None, 1.0)).await;
    let ops = &services.operations;

    for raw in ["0", "-1"] {
        let amount = dec(raw);
        let results = [
            ops.place_bet(ALICE, Some("pair"), Some(amount)).await.map(|_| ()),
            ops.cash_in(ALICE, Some(amount)).await.map(|_| ()),
            ops.deposit(ALICE, amount).await.map(|_| ()),
            ops.withdraw(ALICE, amount).await.map(|_| ()),
        ];
        for result in results {
            assert!(matches!(result, Err(OperationError::Rejected(_))));
        }
    }

    // The same validation applies to a player who is locked
    let charlie = PlayerId(3);
    assert!(matches!(
        ops.deposit(charlie, dec("0")).await,
        Err(OperationError::Rejected(_))
    ));

    assert!(matches!(
        ops.deposit(ALICE, dec("1000000.01")).await,
        Err(OperationError::Rejected(_))
    ));
    assert!(matches!(
        ops.withdraw(ALICE, dec("500.01")).await,
        Err(OperationError::InsufficientFunds(_))
    ));

    let alice = services.store.load_account(ALICE).await.unwrap();
    assert_eq!(alice.wallet, dec("500"));
    assert!(!alice.is_betting);
}

#[tokio::test]
async fn test_event_follows_durable_commit() {
    let services = services(config(0, Some(1), 1.0)).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let store = services.store.clone();
    services.bus.subscribe(balance_topic(BOB), move |event: BalanceEvent| {
        let tx = tx.clone();
        let store = store.clone();
        async move {
            let stored = store.load_account(BOB).await.unwrap();
            let _ = tx.send((event, stored));
        }
    });

    services.operations.cash_in(BOB, Some(dec("10"))).await.unwrap();

    let (event, stored) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.wallet, dec("310"));
    assert_eq!(event.bet_balance, dec("20"));
    assert_eq!(stored.wallet, event.wallet);
    assert_eq!(stored.bet_balance, event.bet_balance);
}

/// Delegates to a memory store but refuses balance writes
struct ReadOnlyBalances {
    inner: MemoryBalanceStore,
}

#[async_trait]
impl BalanceStore for ReadOnlyBalances {
    async fn load_account(&self, id: PlayerId) -> Result<PlayerAccount, StoreError> {
        self.inner.load_account(id).await
    }

    async fn is_betting(&self, id: PlayerId) -> Result<bool, StoreError> {
        self.inner.is_betting(id).await
    }

    async fn set_betting(&self, id: PlayerId, is_betting: bool) -> Result<(), StoreError> {
        self.inner.set_betting(id, is_betting).await
    }

    async fn update_balances(&self, _: PlayerId, _: Money, _: Money) -> Result<(), StoreError> {
        Err(StoreError::WriteFailed("disk full".to_string()))
    }

    async fn insert_account(&self, account: NewAccount) -> Result<PlayerId, StoreError> {
        self.inner.insert_account(account).await
    }

    async fn account_count(&self) -> Result<u64, StoreError> {
        self.inner.account_count().await
    }

    async fn release_all_betting_flags(&self) -> Result<u64, StoreError> {
        self.inner.release_all_betting_flags().await
    }
}

#[tokio::test]
async fn test_failed_commit_releases_gate_and_publishes_nothing() {
    let store = Arc::new(ReadOnlyBalances {
        inner: MemoryBalanceStore::new(),
    });
    let services = Services::with_store(config(0, None, 1.0), store)
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<BalanceEvent>();
    services.bus.subscribe(balance_topic(ALICE), move |event| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(event);
        }
    });

    let err = services.operations.deposit(ALICE, dec("5")).await.unwrap_err();
    assert_eq!(err.status_code(), 500);

    assert!(!services.store.is_betting(ALICE).await.unwrap());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err());

    // The player can transact again (and fails the same way)
    assert!(!matches!(
        services.operations.deposit(ALICE, dec("5")).await,
        Err(OperationError::GateBusy(_))
    ));
}

#[tokio::test]
async fn test_rocks_store_serializes_players() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RocksBalanceStore::open(dir.path()).unwrap());
    let mut config = config(100, Some(2), 1.0);
    config.storage.in_memory = false;
    let services = Services::with_store(config, store).await.unwrap();

    let (first, second) = tokio::join!(
        services.operations.deposit(BOB, dec("20")),
        async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            services.operations.withdraw(BOB, dec("20")).await
        }
    );
    assert!(first.is_ok());
    assert!(matches!(second, Err(OperationError::GateBusy(_))));

    let bob = services.store.load_account(BOB).await.unwrap();
    assert_eq!(bob.wallet, dec("320"));
    assert!(!bob.is_betting);
    services.shutdown().await.unwrap();
}
