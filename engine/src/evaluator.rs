use crate::card::{Card, Rank};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Hand rank classes, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HandRank {
    HighCard = 0,
    Pair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
}

impl HandRank {
    pub fn name(&self) -> &'static str {
        match self {
            HandRank::HighCard => "High Card",
            HandRank::Pair => "Pair",
            HandRank::TwoPair => "Two Pair",
            HandRank::ThreeOfAKind => "Three of a Kind",
            HandRank::Straight => "Straight",
            HandRank::Flush => "Flush",
            HandRank::FullHouse => "Full House",
            HandRank::FourOfAKind => "Four of a Kind",
            HandRank::StraightFlush => "Straight Flush",
        }
    }
}

/// Result of evaluating exactly 5 cards: a rank class plus its tiebreaker
/// tuple, ordered first by class then lexicographically by tiebreakers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandResult {
    pub rank_class: HandRank,
    pub tiebreakers: Vec<Rank>,
    pub five_cards: Vec<Card>,
}

impl PartialOrd for HandResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HandResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_class
            .cmp(&other.rank_class)
            .then_with(|| self.tiebreakers.cmp(&other.tiebreakers))
    }
}

/// Evaluates exactly 5 cards. Panics if `cards.len() != 5` — callers
/// (`evaluate_best`) are responsible for that invariant.
pub fn evaluate_five(cards: &[Card]) -> HandResult {
    assert_eq!(cards.len(), 5, "evaluate_five requires exactly 5 cards");

    let mut rank_counts: HashMap<Rank, u8> = HashMap::new();
    for c in cards {
        *rank_counts.entry(c.rank).or_insert(0) += 1;
    }

    let is_flush = cards.iter().all(|c| c.suit == cards[0].suit);
    let (is_straight, straight_high) = check_straight(cards);

    let mut descending: Vec<Rank> = cards.iter().map(|c| c.rank).collect();
    descending.sort_by(|a, b| b.cmp(a));

    let five_cards = cards.to_vec();

    if is_flush && is_straight {
        return HandResult {
            rank_class: HandRank::StraightFlush,
            tiebreakers: vec![straight_high],
            five_cards,
        };
    }

    if let Some(quad) = rank_with_count(&rank_counts, 4) {
        let kicker = descending.iter().copied().find(|r| *r != quad).unwrap();
        return HandResult {
            rank_class: HandRank::FourOfAKind,
            tiebreakers: vec![quad, kicker],
            five_cards,
        };
    }

    if let Some(trip) = rank_with_count(&rank_counts, 3) {
        if let Some(pair) = ranks_with_count_at_least(&rank_counts, 2)
            .into_iter()
            .find(|r| *r != trip)
        {
            return HandResult {
                rank_class: HandRank::FullHouse,
                tiebreakers: vec![trip, pair],
                five_cards,
            };
        }
    }

    if is_flush {
        return HandResult {
            rank_class: HandRank::Flush,
            tiebreakers: descending,
            five_cards,
        };
    }

    if is_straight {
        return HandResult {
            rank_class: HandRank::Straight,
            tiebreakers: vec![straight_high],
            five_cards,
        };
    }

    if let Some(trip) = rank_with_count(&rank_counts, 3) {
        let kickers: Vec<Rank> = descending.iter().copied().filter(|r| *r != trip).collect();
        let mut tiebreakers = vec![trip];
        tiebreakers.extend(kickers.into_iter().take(2));
        return HandResult {
            rank_class: HandRank::ThreeOfAKind,
            tiebreakers,
            five_cards,
        };
    }

    let mut pairs: Vec<Rank> = ranks_with_count_at_least(&rank_counts, 2);
    pairs.sort_by(|a, b| b.cmp(a));
    if pairs.len() >= 2 {
        let high_pair = pairs[0];
        let low_pair = pairs[1];
        let kicker = descending
            .iter()
            .copied()
            .find(|r| *r != high_pair && *r != low_pair)
            .unwrap();
        return HandResult {
            rank_class: HandRank::TwoPair,
            tiebreakers: vec![high_pair, low_pair, kicker],
            five_cards,
        };
    }

    if let Some(pair) = rank_with_count(&rank_counts, 2) {
        let kickers: Vec<Rank> = descending.iter().copied().filter(|r| *r != pair).collect();
        let mut tiebreakers = vec![pair];
        tiebreakers.extend(kickers.into_iter().take(3));
        return HandResult {
            rank_class: HandRank::Pair,
            tiebreakers,
            five_cards,
        };
    }

    HandResult {
        rank_class: HandRank::HighCard,
        tiebreakers: descending,
        five_cards,
    }
}

fn rank_with_count(counts: &HashMap<Rank, u8>, n: u8) -> Option<Rank> {
    counts
        .iter()
        .filter(|(_, &c)| c == n)
        .map(|(r, _)| *r)
        .max()
}

fn ranks_with_count_at_least(counts: &HashMap<Rank, u8>, n: u8) -> Vec<Rank> {
    counts
        .iter()
        .filter(|(_, &c)| c >= n)
        .map(|(r, _)| *r)
        .collect()
}

/// Checks for a straight, including the wheel (A-2-3-4-5, ranked 5-high).
/// Returns `(is_straight, high_rank)`.
fn check_straight(cards: &[Card]) -> (bool, Rank) {
    let mut values: Vec<u8> = cards.iter().map(|c| c.rank.value()).collect();
    values.sort_unstable();
    values.dedup();

    if values.len() < 5 {
        return (false, Rank::Two);
    }

    // wheel: A,2,3,4,5 present
    if values == [2, 3, 4, 5, 14] {
        return (true, Rank::Five);
    }

    for window in values.windows(5) {
        if window[4] - window[0] == 4 {
            return (true, Rank::from_value(window[4]));
        }
    }

    (false, Rank::Two)
}

/// Evaluates the best 5-card hand out of 5..=7 cards by enumerating every
/// C(N,5) subset.
pub fn evaluate_best(cards: &[Card]) -> HandResult {
    assert!(
        (5..=7).contains(&cards.len()),
        "evaluate_best requires 5 to 7 cards, got {}",
        cards.len()
    );

    cards
        .iter()
        .copied()
        .combinations(5)
        .map(|five| evaluate_five(&five))
        .max()
        .expect("at least one 5-card combination exists")
}

/// Evaluates each hand (5..=7 cards) and returns the indices tied for best.
/// The result is permutation-invariant as a set and always has length >= 1.
pub fn compare_hands(hands: &[Vec<Card>]) -> Vec<usize> {
    assert!(!hands.is_empty(), "compare_hands requires at least one hand");

    let evaluations: Vec<HandResult> = hands.iter().map(|h| evaluate_best(h)).collect();
    let best = evaluations.iter().max().unwrap();

    evaluations
        .iter()
        .enumerate()
        .filter(|(_, e)| *e == best)
        .map(|(i, _)| i)
        .collect()
}
