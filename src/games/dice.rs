//! Dice outcome source

use super::types::DICE_FACES;
use rand::Rng;

/// Produces dice rolls in `1..=6`
pub trait DiceRoller: Send + Sync {
    fn roll(&self) -> u8;
}

/// Uniform random die with an optional forced face for testing
#[derive(Debug, Clone, Default)]
pub struct RandomDice {
    forced: Option<u8>,
}

impl RandomDice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always roll `face` when set. Values outside the die are ignored.
    pub fn rigged(face: Option<u8>) -> Self {
        Self {
            forced: face.filter(|f| (1..=DICE_FACES).contains(f)),
        }
    }

    pub fn forced(&self) -> Option<u8> {
        self.forced
    }
}

impl DiceRoller for RandomDice {
    fn roll(&self) -> u8 {
        match self.forced {
            Some(face) => face,
            None => rand::thread_rng().gen_range(1..=DICE_FACES),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_rolls_stay_on_the_die() {
        let dice = RandomDice::new();
        for _ in 0..500 {
            let roll = dice.roll();
            assert!((1..=6).contains(&roll));
        }
    }

    #[test]
    fn test_rigged_die() {
        let dice = RandomDice::rigged(Some(3));
        assert!((0..20).all(|_| dice.roll() == 3));
        assert_eq!(RandomDice::rigged(Some(9)).forced(), None);
    }
}
