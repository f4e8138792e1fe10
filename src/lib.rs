//! Dicebank - Serialized Player Wallets with Live Balance Streaming
//!
//! Players hold a wallet and a bet balance, move funds between them, and
//! wager on a dice roll. Every money-moving request for a player passes the
//! betting gate, commits through the balance mutation pipeline, and the
//! committed balances are fanned out to every live wallet session.

pub mod account;
pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod events;
pub mod factory;
pub mod games;
pub mod gate;
pub mod metrics;
pub mod operations;
pub mod pipeline;
pub mod storage;

pub use account::{round_currency, Money, PlayerAccount, PlayerId};
pub use config::DiceBankConfig;
pub use errors::{DiceBankError, DiceBankResult};
pub use events::{balance_topic, BalanceEvent, EventBus, HandlerId};
pub use factory::Services;
pub use gate::BettingGate;
pub use operations::BettingOperations;
pub use pipeline::BalanceMutationPipeline;
pub use storage::{BalanceStore, MemoryBalanceStore, RocksBalanceStore};
