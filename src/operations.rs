//! Money-moving operations
//!
//! Place-bet, cash-in, deposit and withdraw share one shape:
//! validate the request without touching any state, take the betting gate,
//! load the account, compute the new balances, commit them through the
//! pipeline, hold for the settlement latency, then leave the gate.
//!
//! Business-rule failures on the request itself are collected into a single
//! rejection so the caller sees every problem at once.

use crate::{
    account::{round_currency, Money, PlayerAccount, PlayerId},
    config::GameConfig,
    errors::StoreError,
    events::BalanceEvent,
    games::{BetType, DiceRollResult, DiceRoller},
    gate::BettingGate,
    metrics::Metrics,
    pipeline::{BalanceMutationPipeline, CommitError},
    storage::BalanceStore,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const PLAYER_BUSY: &str = "Player already betting, please await the bet processing...";

/// The four money-moving operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    PlaceBet,
    CashIn,
    Deposit,
    Withdraw,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::PlaceBet => "place_bet",
            Operation::CashIn => "cash_in",
            Operation::Deposit => "deposit",
            Operation::Withdraw => "withdraw",
        }
    }

    fn busy_message(&self) -> &'static str {
        match self {
            Operation::PlaceBet | Operation::CashIn => PLAYER_BUSY,
            Operation::Deposit => "Cannot deposit while player is in Betting Process",
            Operation::Withdraw => "Cannot withdraw while player is in Betting Process",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum OperationError {
    /// Request failed validation; the gate was never touched
    #[error("request rejected: {}", .0.join("; "))]
    Rejected(Vec<String>),

    /// Another operation is in flight for this player
    #[error("{0}")]
    GateBusy(String),

    #[error("{0}")]
    InsufficientFunds(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Commit(#[from] CommitError),
}

impl OperationError {
    fn rejected(message: &str) -> Self {
        OperationError::Rejected(vec![message.to_string()])
    }

    /// Caller-facing messages, one per problem
    pub fn messages(&self) -> Vec<String> {
        match self {
            OperationError::Rejected(messages) => messages.clone(),
            other => vec![other.to_string()],
        }
    }

    /// HTTP-style status for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            OperationError::Rejected(_) | OperationError::InsufficientFunds(_) => 400,
            OperationError::GateBusy(_) => 409,
            OperationError::Store(StoreError::PlayerNotFound(_)) => 404,
            OperationError::Store(_) | OperationError::Commit(_) => 500,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            OperationError::Rejected(_) => "rejected",
            OperationError::GateBusy(_) => "busy",
            OperationError::InsufficientFunds(_) => "insufficient_funds",
            OperationError::Store(_) | OperationError::Commit(_) => "error",
        }
    }
}

/// Tunables applied to every operation
#[derive(Debug, Clone)]
pub struct OperationRules {
    pub win_multiplier: Money,
    /// Minimum wall-clock time between taking the gate and answering
    pub processing_duration: Duration,
    pub deposit_ceiling: Money,
}

impl OperationRules {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            win_multiplier: config.win_multiplier_decimal(),
            processing_duration: config.processing_duration(),
            deposit_ceiling: config.deposit_ceiling_decimal(),
        }
    }
}

impl Default for OperationRules {
    fn default() -> Self {
        Self::from_config(&GameConfig::default())
    }
}

/// Outcome of a deposit or withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletReceipt {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Money,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_balance: Money,
}

/// Validated place-bet request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetSlip {
    pub bet_type: BetType,
    pub amount: Money,
}

/// Check a place-bet request, collecting every problem.
///
/// A missing field reports both its type error and its range error.
/// Amounts are rounded to cents before the range check, so a sub-cent
/// stake that rounds to zero is refused.
pub fn validate_bet(bet_type: Option<&str>, amount: Option<Money>) -> Result<BetSlip, OperationError> {
    let mut errors = Vec::new();

    if bet_type.is_none() {
        errors.push("Invalid or missing betType".to_string());
    }
    let parsed_type = bet_type.and_then(BetType::parse);
    if parsed_type.is_none() {
        errors.push("betType must be 'pair' or 'not pair'".to_string());
    }

    if amount.is_none() {
        errors.push("Invalid or missing betAmount".to_string());
    }
    let amount = round_currency(amount.unwrap_or(Decimal::ZERO));
    if amount <= Decimal::ZERO {
        errors.push("betAmount must be greater than 0".to_string());
    }

    match parsed_type {
        Some(bet_type) if errors.is_empty() => Ok(BetSlip { bet_type, amount }),
        _ => Err(OperationError::Rejected(errors)),
    }
}

pub fn validate_cash_in(amount: Option<Money>) -> Result<Money, OperationError> {
    let mut errors = Vec::new();
    if amount.is_none() {
        errors.push("Invalid cashInAmount Type".to_string());
    }
    let amount = round_currency(amount.unwrap_or(Decimal::ZERO));
    if amount <= Decimal::ZERO {
        errors.push("Invalid cashInAmount, it must be more than zero".to_string());
    }

    if errors.is_empty() {
        Ok(amount)
    } else {
        Err(OperationError::Rejected(errors))
    }
}

pub fn validate_deposit(amount: Money, ceiling: Money) -> Result<Money, OperationError> {
    let amount = round_currency(amount);
    if amount <= Decimal::ZERO {
        return Err(OperationError::rejected("Deposit must be above 0"));
    }
    if amount > ceiling {
        return Err(OperationError::rejected(
            "Deposit must be below or equal to 1.000.000 (you can't be that rich!)",
        ));
    }
    Ok(amount)
}

pub fn validate_withdraw(amount: Money) -> Result<Money, OperationError> {
    let amount = round_currency(amount);
    if amount <= Decimal::ZERO {
        return Err(OperationError::rejected("Withdraw amount must be greater than 0"));
    }
    Ok(amount)
}

/// New balances computed from a loaded account, plus what to answer with
struct Settlement<T> {
    wallet: Money,
    bet_balance: Money,
    reply: T,
}

/// Entry point for every money-moving request
pub struct BettingOperations {
    store: Arc<dyn BalanceStore>,
    gate: BettingGate,
    pipeline: Arc<BalanceMutationPipeline>,
    dice: Arc<dyn DiceRoller>,
    rules: OperationRules,
    metrics: Arc<Metrics>,
}

impl BettingOperations {
    pub fn new(
        store: Arc<dyn BalanceStore>,
        gate: BettingGate,
        pipeline: Arc<BalanceMutationPipeline>,
        dice: Arc<dyn DiceRoller>,
        rules: OperationRules,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            gate,
            pipeline,
            dice,
            rules,
            metrics,
        }
    }

    pub fn rules(&self) -> &OperationRules {
        &self.rules
    }

    pub fn gate(&self) -> &BettingGate {
        &self.gate
    }

    /// Wager on the next dice roll.
    ///
    /// The stake comes out of the bet balance first and spills into the
    /// wallet. A win credits `amount × multiplier` to the bet balance only.
    pub async fn place_bet(
        &self,
        player: PlayerId,
        bet_type: Option<&str>,
        amount: Option<Money>,
    ) -> Result<DiceRollResult, OperationError> {
        let op = Operation::PlaceBet;
        let result: Result<DiceRollResult, OperationError> = async {
            let slip = validate_bet(bet_type, amount)?;
            let multiplier = self.rules.win_multiplier;

            self.settle(op, player, |account| {
                if slip.amount > account.total_funds() {
                    return Err(OperationError::InsufficientFunds(
                        "betAmount exceeds player's balance and bet balance".to_string(),
                    ));
                }
                let mut next = account.clone();
                next.deduct_bet(slip.amount);

                let roll = self.dice.roll();
                let result = DiceRollResult::settle(roll, slip.bet_type, slip.amount, multiplier);
                if result.player_win {
                    next.bet_balance += result.winnings;
                }
                debug!(
                    "Player {} bet {} on {}: rolled {} ({})",
                    player, slip.amount, slip.bet_type, roll, result.player_message
                );

                Ok(Settlement {
                    wallet: next.wallet,
                    bet_balance: next.bet_balance,
                    reply: result,
                })
            })
            .await
        }
        .await;
        self.track(op, player, result)
    }

    /// Move `amount` from the bet balance back into the wallet
    pub async fn cash_in(
        &self,
        player: PlayerId,
        amount: Option<Money>,
    ) -> Result<BalanceEvent, OperationError> {
        let op = Operation::CashIn;
        let result: Result<BalanceEvent, OperationError> = async {
            let amount = validate_cash_in(amount)?;

            self.settle(op, player, |account| {
                if account.bet_balance < amount {
                    return Err(OperationError::InsufficientFunds(
                        "Player does not have enough bet Balance to cash In".to_string(),
                    ));
                }
                let wallet = account.wallet + amount;
                let bet_balance = account.bet_balance - amount;
                Ok(Settlement {
                    wallet,
                    bet_balance,
                    reply: BalanceEvent { wallet, bet_balance },
                })
            })
            .await
        }
        .await;
        self.track(op, player, result)
    }

    pub async fn deposit(&self, player: PlayerId, amount: Money) -> Result<WalletReceipt, OperationError> {
        let op = Operation::Deposit;
        let result: Result<WalletReceipt, OperationError> = async {
            let amount = validate_deposit(amount, self.rules.deposit_ceiling)?;

            self.settle(op, player, |account| {
                let wallet = account.wallet + amount;
                Ok(Settlement {
                    wallet,
                    bet_balance: account.bet_balance,
                    reply: WalletReceipt {
                        amount,
                        new_balance: round_currency(wallet),
                    },
                })
            })
            .await
        }
        .await;
        self.track(op, player, result)
    }

    pub async fn withdraw(&self, player: PlayerId, amount: Money) -> Result<WalletReceipt, OperationError> {
        let op = Operation::Withdraw;
        let result: Result<WalletReceipt, OperationError> = async {
            let amount = validate_withdraw(amount)?;

            self.settle(op, player, |account| {
                if account.wallet < amount {
                    return Err(OperationError::InsufficientFunds(
                        "Insufficient funds for withdrawal".to_string(),
                    ));
                }
                let wallet = account.wallet - amount;
                Ok(Settlement {
                    wallet,
                    bet_balance: account.bet_balance,
                    reply: WalletReceipt {
                        amount,
                        new_balance: round_currency(wallet),
                    },
                })
            })
            .await
        }
        .await;
        self.track(op, player, result)
    }

    /// Run `compute` inside the gate and commit what it returns.
    ///
    /// The gate is left on every path. Successful operations are held until
    /// the processing duration has elapsed since the gate was taken.
    async fn settle<T, F>(&self, op: Operation, player: PlayerId, compute: F) -> Result<T, OperationError>
    where
        F: FnOnce(&PlayerAccount) -> Result<Settlement<T>, OperationError>,
    {
        let pass = match self.gate.enter(player).await? {
            Some(pass) => pass,
            None => {
                self.metrics.gate_rejections.inc();
                return Err(OperationError::GateBusy(op.busy_message().to_string()));
            }
        };
        let started = Instant::now();

        let result = self.commit_inside(player, compute).await;

        if result.is_ok() {
            tokio::time::sleep_until(started + self.rules.processing_duration).await;
        }
        pass.release().await;
        result
    }

    async fn commit_inside<T, F>(&self, player: PlayerId, compute: F) -> Result<T, OperationError>
    where
        F: FnOnce(&PlayerAccount) -> Result<Settlement<T>, OperationError>,
    {
        let account = self.store.load_account(player).await?;
        let settlement = compute(&account)?;
        self.pipeline
            .commit(player, settlement.wallet, settlement.bet_balance)
            .await?;
        Ok(settlement.reply)
    }

    fn track<T>(
        &self,
        op: Operation,
        player: PlayerId,
        result: Result<T, OperationError>,
    ) -> Result<T, OperationError> {
        match &result {
            Ok(_) => {
                info!("💰 {} completed for player {}", op, player);
                self.metrics.record_operation(op.as_str(), "success");
            }
            Err(e) => {
                match e {
                    OperationError::Store(_) | OperationError::Commit(_) => {
                        warn!("{} failed for player {}: {}", op, player, e)
                    }
                    _ => debug!("{} refused for player {}: {}", op, player, e),
                }
                self.metrics.record_operation(op.as_str(), e.outcome());
            }
        }
        result
    }
}
