use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Card suit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

impl Suit {
    const ALL: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Suit::Clubs => "♣",
            Suit::Diamonds => "♦",
            Suit::Hearts => "♥",
            Suit::Spades => "♠",
        };
        write!(f, "{s}")
    }
}

/// Card rank. Ace is strictly high (value 14) except in the wheel straight,
/// where the five-high tiebreaker is produced by the evaluator, not by Rank itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rank {
    Two = 2,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn from_value(value: u8) -> Self {
        match value {
            2 => Rank::Two,
            3 => Rank::Three,
            4 => Rank::Four,
            5 => Rank::Five,
            6 => Rank::Six,
            7 => Rank::Seven,
            8 => Rank::Eight,
            9 => Rank::Nine,
            10 => Rank::Ten,
            11 => Rank::Jack,
            12 => Rank::Queen,
            13 => Rank::King,
            14 => Rank::Ace,
            _ => panic!("invalid rank value: {value}"),
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        };
        write!(f, "{s}")
    }
}

/// A single playing card. 52 distinct values of (rank, suit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckError {
    #[error("cannot deal {requested} cards, only {remaining} remain")]
    Underflow { requested: usize, remaining: usize },
}

/// Ordered sequence of cards. Deals remove cards from the front of the deck.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// Builds a fresh, unshuffled 52-card deck in a deterministic order.
    pub fn new() -> Self {
        let mut cards = Vec::with_capacity(52);
        for &suit in &Suit::ALL {
            for &rank in &Rank::ALL {
                cards.push(Card { rank, suit });
            }
        }
        Self { cards }
    }

    /// Rebuilds the deck back to all 52 cards in deterministic order.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Applies a uniform random permutation using the supplied RNG, so tests
    /// can inject a seeded or mock source.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.cards.shuffle(rng);
    }

    /// Removes and returns the first `n` cards.
    pub fn deal(&mut self, n: usize) -> Result<Vec<Card>, DeckError> {
        if n > self.cards.len() {
            return Err(DeckError::Underflow {
                requested: n,
                remaining: self.cards.len(),
            });
        }
        Ok(self.cards.drain(0..n).collect())
    }

    /// Deals a single card.
    pub fn deal_one(&mut self) -> Result<Card, DeckError> {
        Ok(self.deal(1)?.remove(0))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    #[test]
    fn fresh_deck_has_52_unique_cards() {
        let deck = Deck::new();
        assert_eq!(deck.len(), 52);
    }

    #[test]
    fn shuffle_then_deal_conserves_the_full_set() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut deck = Deck::new();
        deck.shuffle(&mut rng);
        let dealt = deck.deal(20).unwrap();

        let mut seen: HashSet<(Rank, Suit)> =
            dealt.iter().map(|c| (c.rank, c.suit)).collect();
        assert_eq!(seen.len(), 20);

        // remaining ∪ dealt is exactly the 52-card set with no duplicates
        let remaining = deck.deal(32).unwrap();
        for c in &remaining {
            assert!(seen.insert((c.rank, c.suit)));
        }
        assert_eq!(seen.len(), 52);
    }

    #[test]
    fn deal_more_than_remaining_is_underflow() {
        let mut deck = Deck::new();
        let err = deck.deal(53).unwrap_err();
        assert_eq!(
            err,
            DeckError::Underflow {
                requested: 53,
                remaining: 52
            }
        );
    }

    #[test]
    fn deal_one_is_deal_of_one() {
        let mut deck = Deck::new();
        let top = deck.deal_one().unwrap();
        assert_eq!(deck.len(), 51);
        assert!(!deck.is_empty());
        drop(top);
    }
}
