use crate::account::Money;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of faces on the die
pub const DICE_FACES: u8 = 6;

/// What the player wagers the roll will be
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BetType {
    #[serde(rename = "pair")]
    Pair,
    #[serde(rename = "not pair")]
    NotPair,
}

impl BetType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pair" => Some(BetType::Pair),
            "not pair" => Some(BetType::NotPair),
            _ => None,
        }
    }

    /// Whether `roll` wins this bet. Even faces are pairs.
    pub fn wins(self, roll: u8) -> bool {
        let even = roll % 2 == 0;
        match self {
            BetType::Pair => even,
            BetType::NotPair => !even,
        }
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetType::Pair => write!(f, "pair"),
            BetType::NotPair => write!(f, "not pair"),
        }
    }
}

/// Player-facing outcome line
pub const WIN_MESSAGE: &str = "You've Won :)";
pub const LOSS_MESSAGE: &str = "You've Lost :(";

/// Result of one settled bet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceRollResult {
    #[serde(rename = "DiceNumber")]
    pub dice_number: u8,
    #[serde(rename = "PlayerWin")]
    pub player_win: bool,
    #[serde(rename = "PlayerOriginalBet")]
    pub player_original_bet: BetType,
    #[serde(rename = "PlayerMessage")]
    pub player_message: String,
    /// Credited amount on a win, the negated stake on a loss
    #[serde(rename = "Winnings", with = "rust_decimal::serde::float")]
    pub winnings: Money,
}

impl DiceRollResult {
    pub fn settle(roll: u8, bet: BetType, amount: Money, multiplier: Money) -> Self {
        let player_win = bet.wins(roll);
        let (player_message, winnings) = if player_win {
            (WIN_MESSAGE, amount * multiplier)
        } else {
            (LOSS_MESSAGE, -amount)
        };
        Self {
            dice_number: roll,
            player_win,
            player_original_bet: bet,
            player_message: player_message.to_string(),
            winnings,
        }
    }
}
