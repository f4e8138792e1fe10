//! Dice game rules and outcome source

pub mod dice;
pub mod types;

pub use dice::{DiceRoller, RandomDice};
pub use types::*;
