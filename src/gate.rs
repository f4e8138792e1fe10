//! Betting gate
//!
//! Per-player mutual exclusion for money-moving operations. The gate keeps
//! two records in step:
//! - an in-process in-flight table, claimed atomically, which is what makes
//!   two concurrent `try_enter` calls for the same player disagree;
//! - the persisted `is_betting` flag on the account, which stays visible in
//!   storage and lets an operator lock a player out by hand.
//!
//! `enter` hands out a [`GatePass`]; dropping a pass without releasing it
//! still exits the gate, so a cancelled request cannot strand a player.

use crate::{account::PlayerId, errors::StoreError, storage::BalanceStore};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Advisory per-player lock
#[derive(Clone)]
pub struct BettingGate {
    store: Arc<dyn BalanceStore>,
    in_flight: Arc<DashMap<PlayerId, ()>>,
}

impl BettingGate {
    pub fn new(store: Arc<dyn BalanceStore>) -> Self {
        Self {
            store,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Try to take the gate for `player`.
    ///
    /// Returns `Ok(true)` when it is already held (by this process or by a
    /// persisted flag) and nothing was acquired. A store failure aborts
    /// without acquiring.
    pub async fn try_enter(&self, player: PlayerId) -> Result<bool, StoreError> {
        match self.in_flight.entry(player) {
            Entry::Occupied(_) => {
                debug!("Gate busy for player {} (in flight)", player);
                return Ok(true);
            }
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }

        let already_locked = match self.store.is_betting(player).await {
            Ok(flag) => flag,
            Err(e) => {
                self.in_flight.remove(&player);
                return Err(e);
            }
        };

        if already_locked {
            debug!("Gate busy for player {} (persisted flag)", player);
            self.in_flight.remove(&player);
            return Ok(true);
        }

        if let Err(e) = self.store.set_betting(player, true).await {
            self.in_flight.remove(&player);
            return Err(e);
        }

        Ok(false)
    }

    /// Release the gate for `player`
    pub async fn exit(&self, player: PlayerId) -> Result<(), StoreError> {
        let result = self.store.set_betting(player, false).await;
        self.in_flight.remove(&player);
        result
    }

    /// Take the gate and get a pass, or `None` when it is busy
    pub async fn enter(&self, player: PlayerId) -> Result<Option<GatePass>, StoreError> {
        if self.try_enter(player).await? {
            return Ok(None);
        }
        Ok(Some(GatePass {
            gate: self.clone(),
            player,
            released: false,
        }))
    }

    /// Whether this process currently holds the gate for `player`
    pub fn is_held(&self, player: PlayerId) -> bool {
        self.in_flight.contains_key(&player)
    }
}

/// Proof of holding the gate for one player
pub struct GatePass {
    gate: BettingGate,
    player: PlayerId,
    released: bool,
}

impl GatePass {
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Exit the gate. A failed flag write is logged; the in-flight slot is
    /// freed either way.
    pub async fn release(mut self) {
        if let Err(e) = self.gate.exit(self.player).await {
            error!("Failed to clear betting flag for player {}: {}", self.player, e);
        }
        self.released = true;
    }
}

impl Drop for GatePass {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let gate = self.gate.clone();
        let player = self.player;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Gate pass for player {} dropped without release", player);
                handle.spawn(async move {
                    if let Err(e) = gate.exit(player).await {
                        error!("Failed to clear betting flag for player {}: {}", player, e);
                    }
                });
            }
            Err(_) => {
                error!(
                    "Gate pass for player {} dropped outside a runtime; persisted flag left set",
                    player
                );
                gate.in_flight.remove(&player);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        account::NewAccount,
        storage::{seed_demo_players, MemoryBalanceStore},
    };
    use rust_decimal::Decimal;
    use std::time::Duration;

    async fn seeded_gate() -> (BettingGate, Arc<dyn BalanceStore>) {
        let store: Arc<dyn BalanceStore> = Arc::new(MemoryBalanceStore::new());
        seed_demo_players(store.as_ref()).await.unwrap();
        (BettingGate::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_enter_and_exit_toggle_persisted_flag() {
        let (gate, store) = seeded_gate().await;
        let bob = PlayerId(2);

        assert!(!gate.try_enter(bob).await.unwrap());
        assert!(store.is_betting(bob).await.unwrap());
        assert!(gate.is_held(bob));

        gate.exit(bob).await.unwrap();
        assert!(!store.is_betting(bob).await.unwrap());
        assert!(!gate.is_held(bob));
    }

    #[tokio::test]
    async fn test_second_entry_observes_busy() {
        let (gate, store) = seeded_gate().await;
        let bob = PlayerId(2);

        assert!(!gate.try_enter(bob).await.unwrap());
        assert!(gate.try_enter(bob).await.unwrap());
        // The failed attempt must not have released the holder
        assert!(store.is_betting(bob).await.unwrap());
        assert!(gate.is_held(bob));

        // Other players are unaffected
        assert!(!gate.try_enter(PlayerId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_persisted_flag_blocks_entry() {
        let (gate, store) = seeded_gate().await;
        let charlie = PlayerId(3);

        assert!(gate.try_enter(charlie).await.unwrap());
        assert!(!gate.is_held(charlie));
        assert!(store.is_betting(charlie).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_player_aborts_without_acquiring() {
        let (gate, _) = seeded_gate().await;
        let ghost = PlayerId(404);

        assert!(matches!(
            gate.try_enter(ghost).await,
            Err(StoreError::PlayerNotFound(_))
        ));
        assert!(!gate.is_held(ghost));
    }

    #[tokio::test]
    async fn test_pass_release() {
        let (gate, store) = seeded_gate().await;
        let alice = PlayerId(1);

        let pass = gate.enter(alice).await.unwrap().expect("gate free");
        assert_eq!(pass.player(), alice);
        assert!(gate.enter(alice).await.unwrap().is_none());

        pass.release().await;
        assert!(!store.is_betting(alice).await.unwrap());
        assert!(gate.enter(alice).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dropped_pass_still_exits() {
        let (gate, store) = seeded_gate().await;
        let id = store
            .insert_account(NewAccount::new("Dana", Decimal::ONE, Decimal::ZERO))
            .await
            .unwrap();

        let pass = gate.enter(id).await.unwrap().expect("gate free");
        drop(pass);

        // The exit runs on a spawned task
        for _ in 0..50 {
            if !gate.is_held(id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!gate.is_held(id));
        assert!(!store.is_betting(id).await.unwrap());
    }
}
