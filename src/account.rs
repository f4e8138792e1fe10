//! Player monetary state
//!
//! The account record owned by the balance store and the currency helpers
//! shared by every component that reads or writes balances.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency-scaled amount
pub type Money = Decimal;

/// Fraction digits kept on every balance write
pub const CURRENCY_SCALE: u32 = 2;

/// Round to cents, half away from zero.
pub fn round_currency(amount: Money) -> Money {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Player identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PlayerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// One row per player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAccount {
    pub id: PlayerId,
    pub name: String,
    pub wallet: Money,
    pub bet_balance: Money,
    /// Persisted advisory lock flag
    pub is_betting: bool,
}

impl PlayerAccount {
    /// Funds available to a wager: bet balance plus wallet
    pub fn total_funds(&self) -> Money {
        self.wallet + self.bet_balance
    }

    /// Take a wager out of the balances, bet balance first.
    ///
    /// Whatever the bet balance cannot cover spills over into the wallet.
    /// Callers check `total_funds` beforehand; this never goes negative when
    /// they do.
    pub fn deduct_bet(&mut self, amount: Money) {
        if amount <= self.bet_balance {
            self.bet_balance -= amount;
        } else {
            let remaining = amount - self.bet_balance;
            self.bet_balance = Decimal::ZERO;
            self.wallet -= remaining;
        }
    }
}

/// Account creation request used by seeding
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub wallet: Money,
    pub bet_balance: Money,
    pub is_betting: bool,
}

impl NewAccount {
    pub fn new(name: impl Into<String>, wallet: Money, bet_balance: Money) -> Self {
        Self {
            name: name.into(),
            wallet,
            bet_balance,
            is_betting: false,
        }
    }

    pub fn locked(mut self) -> Self {
        self.is_betting = true;
        self
    }
}

/// Demo players inserted into an empty store
pub fn demo_players() -> Vec<NewAccount> {
    vec![
        NewAccount::new("Alice", Decimal::new(50000, 2), Decimal::ZERO),
        NewAccount::new("Bob", Decimal::new(30000, 2), Decimal::new(3000, 2)),
        NewAccount::new("Charlie", Decimal::new(70000, 2), Decimal::new(7000, 2)).locked(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn account(wallet: &str, bet: &str) -> PlayerAccount {
        PlayerAccount {
            id: PlayerId(1),
            name: "Bob".to_string(),
            wallet: dec(wallet),
            bet_balance: dec(bet),
            is_betting: false,
        }
    }

    #[test]
    fn test_round_currency_half_up() {
        assert_eq!(round_currency(dec("10.005")), dec("10.01"));
        assert_eq!(round_currency(dec("10.004")), dec("10.00"));
        assert_eq!(round_currency(dec("-0.125")), dec("-0.13"));
        assert_eq!(round_currency(dec("7")), dec("7"));
    }

    #[test]
    fn test_deduct_bet_within_bet_balance() {
        let mut acc = account("300", "30");
        acc.deduct_bet(dec("20"));
        assert_eq!(acc.bet_balance, dec("10"));
        assert_eq!(acc.wallet, dec("300"));
    }

    #[test]
    fn test_deduct_bet_spills_into_wallet() {
        let mut acc = account("300", "30");
        acc.deduct_bet(dec("50"));
        assert_eq!(acc.bet_balance, Decimal::ZERO);
        assert_eq!(acc.wallet, dec("280"));
    }

    #[test]
    fn test_total_funds() {
        assert_eq!(account("300", "30").total_funds(), dec("330"));
    }

    #[test]
    fn test_demo_players() {
        let players = demo_players();
        assert_eq!(players.len(), 3);
        assert!(players[2].is_betting);
        assert_eq!(players[1].bet_balance, dec("30"));
    }
}
