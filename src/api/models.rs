//! API Models
//!
//! Request bodies, response bodies and WebSocket frames. Amounts travel as
//! JSON numbers and are held as decimals inside the service.

use crate::{
    account::{Money, PlayerAccount},
    events::BalanceEvent,
    games::DiceRollResult,
    operations::{OperationError, WalletReceipt},
};
use rust_decimal::{prelude::FromPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// POST /player/me/wallet/deposit body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub amount_to_deposit: f64,
}

/// POST /player/me/wallet/withdraw body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub amount_to_withdraw: f64,
}

/// Successful deposit or withdrawal
#[derive(Debug, Clone, Serialize)]
pub struct WalletResponse {
    pub message: String,
    #[serde(flatten)]
    pub receipt: WalletReceipt,
}

impl WalletResponse {
    pub fn deposit(receipt: WalletReceipt) -> Self {
        Self {
            message: "Deposit successful".to_string(),
            receipt,
        }
    }

    pub fn withdrawal(receipt: WalletReceipt) -> Self {
        Self {
            message: "Withdrawal successful".to_string(),
            receipt,
        }
    }
}

/// Convert a JSON number into a currency amount
pub fn money_from_f64(amount: f64) -> Option<Money> {
    Decimal::from_f64(amount)
}

/// Parse an inbound frame as a JSON object
pub fn parse_frame(text: &str) -> Result<Map<String, Value>, serde_json::Error> {
    serde_json::from_str(text)
}

fn amount_field(frame: &Map<String, Value>, key: &str) -> Option<Money> {
    frame.get(key).and_then(Value::as_f64).and_then(money_from_f64)
}

/// Inbound place-bet frame with every field optional
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceBetFrame {
    pub bet_type: Option<String>,
    pub bet_amount: Option<Money>,
}

impl PlaceBetFrame {
    pub fn from_frame(frame: &Map<String, Value>) -> Self {
        Self {
            bet_type: frame.get("betType").and_then(Value::as_str).map(str::to_string),
            bet_amount: amount_field(frame, "betAmount"),
        }
    }
}

/// Inbound cash-in frame
#[derive(Debug, Clone, PartialEq)]
pub struct CashInFrame {
    pub cash_in_amount: Option<Money>,
}

impl CashInFrame {
    pub fn from_frame(frame: &Map<String, Value>) -> Self {
        Self {
            cash_in_amount: amount_field(frame, "cashInAmount"),
        }
    }
}

/// Sent once when a wallet session opens
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSnapshot {
    pub message: String,
    pub status: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub wallet: Money,
    #[serde(with = "rust_decimal::serde::float")]
    pub bet_balance: Money,
}

impl From<&PlayerAccount> for WalletSnapshot {
    fn from(account: &PlayerAccount) -> Self {
        Self {
            message: "Wallet and bet balance retrieved with success!".to_string(),
            status: "success".to_string(),
            wallet: account.wallet,
            bet_balance: account.bet_balance,
        }
    }
}

/// Pushed to wallet sessions on every committed balance change
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancePush {
    pub code: u16,
    pub message: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub wallet: Money,
    #[serde(with = "rust_decimal::serde::float")]
    pub bet_balance: Money,
}

impl From<BalanceEvent> for BalancePush {
    fn from(event: BalanceEvent) -> Self {
        Self {
            code: 200,
            message: "Wallet / BetBalance Updated".to_string(),
            wallet: event.wallet,
            bet_balance: event.bet_balance,
        }
    }
}

/// Generic `{code, message, errorsList?}` frame
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFrame {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors_list: Option<Vec<String>>,
}

impl StatusFrame {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            code: 401,
            message: message.into(),
            errors_list: None,
        }
    }

    pub fn invalid_json() -> Self {
        Self {
            code: 400,
            message: "Invalid JSON".to_string(),
            errors_list: Some(vec!["Invalid JSON received".to_string()]),
        }
    }

    pub fn cash_in_success() -> Self {
        Self {
            code: 200,
            message: "Cash In Successful".to_string(),
            errors_list: None,
        }
    }

    pub fn failure(summary: &str, err: &OperationError) -> Self {
        Self {
            code: err.status_code(),
            message: summary.to_string(),
            errors_list: Some(err.messages()),
        }
    }
}

/// Reply to a place-bet frame
#[derive(Debug, Clone, Serialize)]
pub struct PlayReply {
    #[serde(flatten)]
    pub status: StatusFrame,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub result: Option<DiceRollResult>,
}

impl PlayReply {
    pub fn success(result: DiceRollResult) -> Self {
        Self {
            status: StatusFrame {
                code: 200,
                message: "Bet placed successfully".to_string(),
                errors_list: None,
            },
            result: Some(result),
        }
    }

    pub fn failure(err: &OperationError) -> Self {
        Self {
            status: StatusFrame::failure("Error creating bet, check error list", err),
            result: None,
        }
    }
}
