//! Balance mutation pipeline
//!
//! The only writer of monetary fields. A commit rounds, persists both
//! balances in one store write, then announces the committed values on the
//! player's balance topic.

use crate::{
    account::{round_currency, Money, PlayerId},
    errors::StoreError,
    events::{balance_topic, BalanceEvent, EventBus},
    metrics::Metrics,
    storage::BalanceStore,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum CommitError {
    #[error("refusing to commit negative balances for player {player} (wallet {wallet}, bet balance {bet_balance})")]
    NegativeBalance {
        player: PlayerId,
        wallet: Money,
        bet_balance: Money,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct BalanceMutationPipeline {
    store: Arc<dyn BalanceStore>,
    bus: Arc<EventBus<BalanceEvent>>,
    metrics: Arc<Metrics>,
}

impl BalanceMutationPipeline {
    pub fn new(
        store: Arc<dyn BalanceStore>,
        bus: Arc<EventBus<BalanceEvent>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { store, bus, metrics }
    }

    /// Persist new balances for `player` and publish them.
    ///
    /// Publication happens only after the write succeeded. Having nobody
    /// listening is not an error.
    pub async fn commit(
        &self,
        player: PlayerId,
        wallet: Money,
        bet_balance: Money,
    ) -> Result<BalanceEvent, CommitError> {
        let wallet = round_currency(wallet);
        let bet_balance = round_currency(bet_balance);

        if wallet < Decimal::ZERO || bet_balance < Decimal::ZERO {
            return Err(CommitError::NegativeBalance {
                player,
                wallet,
                bet_balance,
            });
        }

        if let Err(e) = self.store.update_balances(player, wallet, bet_balance).await {
            error!("Balance write failed for player {}: {}", player, e);
            return Err(e.into());
        }
        self.metrics.balance_commits.inc();

        let event = BalanceEvent { wallet, bet_balance };
        let delivered = self.bus.publish(&balance_topic(player), event);
        self.metrics.balance_events_dispatched.inc_by(delivered as u64);
        debug!(
            "Committed balances for player {}: wallet={} bet_balance={} ({} listeners)",
            player, wallet, bet_balance, delivered
        );

        Ok(event)
    }
}
