//! Balance store
//!
//! Durable key→record storage for player monetary state. The store allows a
//! single writer at a time: every call queues on one async mutex before it
//! touches the database, which is what lets the persisted betting flag act
//! as an advisory lock.

use crate::{
    account::{demo_players, Money, NewAccount, PlayerAccount, PlayerId},
    errors::StoreError,
};
use async_trait::async_trait;
use rocksdb::{Options, WriteBatch, DB};
use std::{collections::HashMap, path::Path, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, info};

const NEXT_ID_KEY: &[u8] = b"players:next_id";

/// Storage interface for player accounts
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Load a full account record
    async fn load_account(&self, id: PlayerId) -> Result<PlayerAccount, StoreError>;

    /// Read the persisted betting flag
    async fn is_betting(&self, id: PlayerId) -> Result<bool, StoreError>;

    /// Write the persisted betting flag
    async fn set_betting(&self, id: PlayerId, is_betting: bool) -> Result<(), StoreError>;

    /// Write wallet and bet balance in one operation
    async fn update_balances(
        &self,
        id: PlayerId,
        wallet: Money,
        bet_balance: Money,
    ) -> Result<(), StoreError>;

    /// Create an account and return its id
    async fn insert_account(&self, account: NewAccount) -> Result<PlayerId, StoreError>;

    async fn account_count(&self) -> Result<u64, StoreError>;

    /// Clear every persisted betting flag, returning how many were set
    async fn release_all_betting_flags(&self) -> Result<u64, StoreError>;

    /// Flush pending writes to durable storage
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Insert the demo players when the store holds no accounts
pub async fn seed_demo_players(store: &dyn BalanceStore) -> Result<usize, StoreError> {
    if store.account_count().await? > 0 {
        return Ok(0);
    }

    let players = demo_players();
    let count = players.len();
    for player in players {
        let name = player.name.clone();
        let id = store.insert_account(player).await?;
        debug!("Seeded player {} with id {}", name, id);
    }

    info!("🌱 Inserted {} demo players", count);
    Ok(count)
}

/// RocksDB-backed balance store
pub struct RocksBalanceStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksBalanceStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }

    /// Run a database closure on the blocking pool while holding the writer.
    ///
    /// The guard travels with the closure: a caller dropped mid-call does
    /// not free the writer before the blocking work has finished.
    async fn with_db<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&DB) -> Result<T, StoreError> + Send + 'static,
    {
        let writer = self.writer.clone().lock_owned().await;
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let _writer = writer;
            f(&db)
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }
}

fn player_key(id: PlayerId) -> String {
    format!("player:{}", id)
}

fn name_key(name: &str) -> String {
    format!("player_name:{}", name)
}

fn read_account(db: &DB, id: PlayerId) -> Result<PlayerAccount, StoreError> {
    let bytes = db
        .get(player_key(id).as_bytes())
        .map_err(|e| StoreError::ReadFailed(e.to_string()))?
        .ok_or(StoreError::PlayerNotFound(id))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Corrupted(format!("player {}: {}", id, e)))
}

fn write_account(db: &DB, account: &PlayerAccount) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(account).map_err(|e| StoreError::WriteFailed(e.to_string()))?;
    db.put(player_key(account.id).as_bytes(), bytes)?;
    Ok(())
}

fn read_next_id(db: &DB) -> Result<u64, StoreError> {
    match db
        .get(NEXT_ID_KEY)
        .map_err(|e| StoreError::ReadFailed(e.to_string()))?
    {
        Some(bytes) => {
            let arr: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::Corrupted("Invalid id counter bytes".to_string()))?;
            Ok(u64::from_le_bytes(arr))
        }
        None => Ok(1),
    }
}

#[async_trait]
impl BalanceStore for RocksBalanceStore {
    async fn load_account(&self, id: PlayerId) -> Result<PlayerAccount, StoreError> {
        self.with_db(move |db| read_account(db, id)).await
    }

    async fn is_betting(&self, id: PlayerId) -> Result<bool, StoreError> {
        self.with_db(move |db| read_account(db, id).map(|acc| acc.is_betting))
            .await
    }

    async fn set_betting(&self, id: PlayerId, is_betting: bool) -> Result<(), StoreError> {
        self.with_db(move |db| {
            let mut account = read_account(db, id)?;
            account.is_betting = is_betting;
            write_account(db, &account)
        })
        .await
    }

    async fn update_balances(
        &self,
        id: PlayerId,
        wallet: Money,
        bet_balance: Money,
    ) -> Result<(), StoreError> {
        self.with_db(move |db| {
            let mut account = read_account(db, id)?;
            account.wallet = wallet;
            account.bet_balance = bet_balance;
            write_account(db, &account)
        })
        .await
    }

    async fn insert_account(&self, new: NewAccount) -> Result<PlayerId, StoreError> {
        self.with_db(move |db| {
            let name_key = name_key(&new.name);
            if db
                .get(name_key.as_bytes())
                .map_err(|e| StoreError::ReadFailed(e.to_string()))?
                .is_some()
            {
                return Err(StoreError::DuplicateName(new.name));
            }

            let id = PlayerId(read_next_id(db)?);
            let account = PlayerAccount {
                id,
                name: new.name,
                wallet: new.wallet,
                bet_balance: new.bet_balance,
                is_betting: new.is_betting,
            };
            let record =
                serde_json::to_vec(&account).map_err(|e| StoreError::WriteFailed(e.to_string()))?;

            let mut batch = WriteBatch::default();
            batch.put(player_key(id).as_bytes(), record);
            batch.put(name_key.as_bytes(), id.0.to_le_bytes());
            batch.put(NEXT_ID_KEY, (id.0 + 1).to_le_bytes());
            db.write(batch)?;
            Ok(id)
        })
        .await
    }

    async fn account_count(&self) -> Result<u64, StoreError> {
        self.with_db(|db| Ok(read_next_id(db)? - 1)).await
    }

    async fn release_all_betting_flags(&self) -> Result<u64, StoreError> {
        self.with_db(|db| {
            let last = read_next_id(db)?;
            let mut released = 0;
            for raw_id in 1..last {
                let mut account = match read_account(db, PlayerId(raw_id)) {
                    Ok(account) => account,
                    Err(StoreError::PlayerNotFound(_)) => continue,
                    Err(e) => return Err(e),
                };
                if account.is_betting {
                    account.is_betting = false;
                    write_account(db, &account)?;
                    released += 1;
                }
            }
            Ok(released)
        })
        .await
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.with_db(|db| db.flush().map_err(StoreError::from)).await
    }
}

/// In-memory balance store with the same single-writer contract
#[derive(Default)]
pub struct MemoryBalanceStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<PlayerId, PlayerAccount>,
    next_id: u64,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn load_account(&self, id: PlayerId) -> Result<PlayerAccount, StoreError> {
        let state = self.inner.lock().await;
        state
            .accounts
            .get(&id)
            .cloned()
            .ok_or(StoreError::PlayerNotFound(id))
    }

    async fn is_betting(&self, id: PlayerId) -> Result<bool, StoreError> {
        self.load_account(id).await.map(|acc| acc.is_betting)
    }

    async fn set_betting(&self, id: PlayerId, is_betting: bool) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::PlayerNotFound(id))?;
        account.is_betting = is_betting;
        Ok(())
    }

    async fn update_balances(
        &self,
        id: PlayerId,
        wallet: Money,
        bet_balance: Money,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::PlayerNotFound(id))?;
        account.wallet = wallet;
        account.bet_balance = bet_balance;
        Ok(())
    }

    async fn insert_account(&self, new: NewAccount) -> Result<PlayerId, StoreError> {
        let mut state = self.inner.lock().await;
        if state.accounts.values().any(|acc| acc.name == new.name) {
            return Err(StoreError::DuplicateName(new.name));
        }

        state.next_id += 1;
        let id = PlayerId(state.next_id);
        state.accounts.insert(
            id,
            PlayerAccount {
                id,
                name: new.name,
                wallet: new.wallet,
                bet_balance: new.bet_balance,
                is_betting: new.is_betting,
            },
        );
        Ok(id)
    }

    async fn account_count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().await.accounts.len() as u64)
    }

    async fn release_all_betting_flags(&self) -> Result<u64, StoreError> {
        let mut state = self.inner.lock().await;
        let mut released = 0;
        for account in state.accounts.values_mut().filter(|acc| acc.is_betting) {
            account.is_betting = false;
            released += 1;
        }
        Ok(released)
    }
}
