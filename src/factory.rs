//! Service construction
//!
//! Builds every long-lived component once at startup and hands them out
//! explicitly. Nothing here is global; the server and tests each own the
//! `Services` they build.

use crate::{
    auth::SignedTokenAuthority,
    config::DiceBankConfig,
    errors::{DiceBankResult, StoreError},
    events::{BalanceEvent, EventBus},
    games::RandomDice,
    gate::BettingGate,
    metrics::Metrics,
    operations::{BettingOperations, OperationRules},
    pipeline::BalanceMutationPipeline,
    storage::{seed_demo_players, BalanceStore, MemoryBalanceStore, RocksBalanceStore},
};
use std::sync::Arc;
use tracing::{info, warn};

/// Process-wide component graph
pub struct Services {
    pub config: DiceBankConfig,
    pub store: Arc<dyn BalanceStore>,
    pub bus: Arc<EventBus<BalanceEvent>>,
    pub gate: BettingGate,
    pub pipeline: Arc<BalanceMutationPipeline>,
    pub operations: Arc<BettingOperations>,
    pub auth: Arc<SignedTokenAuthority>,
    pub metrics: Arc<Metrics>,
}

impl Services {
    /// Validate `config`, open storage and wire the components together
    pub async fn build(config: DiceBankConfig) -> DiceBankResult<Self> {
        config.validate()?;

        let store = Self::open_store(&config)?;
        Self::with_store(config, store).await
    }

    /// Wire the components around an already opened store
    pub async fn with_store(
        config: DiceBankConfig,
        store: Arc<dyn BalanceStore>,
    ) -> DiceBankResult<Self> {
        if config.storage.seed_demo_players {
            seed_demo_players(store.as_ref()).await?;
        }

        if config.storage.release_stale_locks_on_start {
            let released = store.release_all_betting_flags().await?;
            if released > 0 {
                warn!("🔓 Released {} stale betting locks", released);
            }
        }

        let metrics = Arc::new(Metrics::new()?);
        let bus = Arc::new(EventBus::new());
        let gate = BettingGate::new(store.clone());
        let pipeline = Arc::new(BalanceMutationPipeline::new(
            store.clone(),
            bus.clone(),
            metrics.clone(),
        ));
        let dice = Arc::new(RandomDice::rigged(config.game.rigged_dice_number));
        if let Some(face) = dice.forced() {
            warn!("🎲 Dice rigged to always roll {}", face);
        }
        let operations = Arc::new(BettingOperations::new(
            store.clone(),
            gate.clone(),
            pipeline.clone(),
            dice,
            OperationRules::from_config(&config.game),
            metrics.clone(),
        ));
        let auth = Arc::new(SignedTokenAuthority::new(
            &config.auth.token_secret,
            config.auth.token_ttl(),
        ));

        info!(
            "✅ Services ready ({} accounts)",
            store.account_count().await?
        );

        Ok(Self {
            config,
            store,
            bus,
            gate,
            pipeline,
            operations,
            auth,
            metrics,
        })
    }

    fn open_store(config: &DiceBankConfig) -> Result<Arc<dyn BalanceStore>, StoreError> {
        if config.storage.in_memory {
            info!("📦 Using in-memory balance store");
            return Ok(Arc::new(MemoryBalanceStore::new()));
        }

        info!("📦 Opening balance store at {}", config.storage.data_directory);
        Ok(Arc::new(RocksBalanceStore::open(&config.storage.data_directory)?))
    }

    /// Flush storage before the process exits
    pub async fn shutdown(&self) -> DiceBankResult<()> {
        self.store.flush().await?;
        info!("🛑 Balance store flushed");
        Ok(())
    }
}
