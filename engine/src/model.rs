use crate::card::Card;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::config::{MAX_PLAYERS, STARTING_CHIPS};

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Active,
    Finished,
}

/// Betting-round progression within a hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BettingRound {
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
}

impl BettingRound {
    /// The round that follows this one, or `Showdown` if already there.
    pub fn next(self) -> Self {
        match self {
            BettingRound::Preflop => BettingRound::Flop,
            BettingRound::Flop => BettingRound::Turn,
            BettingRound::Turn => BettingRound::River,
            BettingRound::River | BettingRound::Showdown => BettingRound::Showdown,
        }
    }

    /// Number of community cards visible once this round is reached.
    pub fn community_card_count(self) -> usize {
        match self {
            BettingRound::Preflop => 0,
            BettingRound::Flop => 3,
            BettingRound::Turn => 4,
            BettingRound::River | BettingRound::Showdown => 5,
        }
    }
}

/// A player's seat within a room. Nicknames are the stable key used
/// throughout the hand state — no back-pointers into `Room`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub nickname: String,
    pub chips: i64,
    pub eliminated: bool,
    pub elimination_position: Option<u32>,
}

impl Player {
    pub fn new(nickname: String) -> Self {
        Self {
            nickname,
            chips: STARTING_CHIPS,
            eliminated: false,
            elimination_position: None,
        }
    }
}

/// A player's per-hand state: hole cards and this hand's betting progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerHand {
    pub hole_cards: [Card; 2],
    pub current_bet: i64,
    pub total_bet: i64,
    pub folded: bool,
    pub all_in: bool,
}

impl PlayerHand {
    pub fn new(hole_cards: [Card; 2]) -> Self {
        Self {
            hole_cards,
            current_bet: 0,
            total_bet: 0,
            folded: false,
            all_in: false,
        }
    }
}

/// A pot (main or side) and the nicknames eligible to win it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pot {
    pub amount: i64,
    pub eligible: Vec<String>,
}

impl Pot {
    pub fn new(eligible: Vec<String>) -> Self {
        Self {
            amount: 0,
            eligible,
        }
    }
}

/// Per-hand state: community cards, pots, betting progress, and the
/// nickname-keyed per-player hands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hand {
    pub hand_number: u32,
    pub dealer_position: usize,
    pub community_cards: Vec<Card>,
    pub pots: Vec<Pot>,
    pub current_bet: i64,
    pub min_raise: i64,
    pub betting_round: BettingRound,
    pub current_player_idx: usize,
    pub last_raiser: Option<String>,
    pub players_acted_this_round: HashSet<String>,
    pub player_hands: HashMap<String, PlayerHand>,
    /// Seat order frozen for this hand, so `can_act` projections are stable
    /// even as players are eliminated between hands.
    pub seat_order: Vec<String>,
}

impl Hand {
    pub fn new(hand_number: u32, dealer_position: usize, seat_order: Vec<String>) -> Self {
        Self {
            hand_number,
            dealer_position,
            community_cards: Vec::new(),
            pots: vec![Pot::new(seat_order.clone())],
            current_bet: 0,
            min_raise: crate::config::BIG_BLIND,
            betting_round: BettingRound::Preflop,
            current_player_idx: 0,
            last_raiser: None,
            players_acted_this_round: HashSet::new(),
            player_hands: HashMap::new(),
            seat_order,
        }
    }

    /// Players with a `PlayerHand` that is neither folded nor all-in, in
    /// frozen seat order. This is the projection `current_player_idx`
    /// indexes into.
    pub fn can_act(&self) -> Vec<&str> {
        self.seat_order
            .iter()
            .filter_map(|nick| {
                let ph = self.player_hands.get(nick)?;
                (!ph.folded && !ph.all_in).then_some(nick.as_str())
            })
            .collect()
    }

    /// Players still in the hand (not folded), in frozen seat order.
    pub fn players_in_hand(&self) -> Vec<&str> {
        self.seat_order
            .iter()
            .filter_map(|nick| {
                let ph = self.player_hands.get(nick)?;
                (!ph.folded).then_some(nick.as_str())
            })
            .collect()
    }

    /// The nickname of the current actor, or `None` if no actor exists
    /// (e.g. everyone is folded or all-in).
    pub fn current_actor(&self) -> Option<&str> {
        let can_act = self.can_act();
        if can_act.is_empty() {
            return None;
        }
        Some(can_act[self.current_player_idx % can_act.len()])
    }

    pub fn total_pot(&self) -> i64 {
        self.pots.iter().map(|p| p.amount).sum()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("nickname cannot be empty")]
    EmptyNickname,
    #[error("nickname '{0}' is already taken in this room")]
    DuplicateNickname(String),
    #[error("room is full")]
    RoomFull,
    #[error("room has already started")]
    AlreadyStarted,
}

/// A table of up to `MAX_PLAYERS` players, from lobby through showdown
/// elimination and final standings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub creator_nickname: String,
    pub status: RoomStatus,
    pub players: Vec<Player>,
    pub current_hand_num: u32,
    pub dealer_position: usize,
    pub elimination_order: Vec<String>,
    pub active_hand: Option<Hand>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(id: String, creator_nickname: String) -> Self {
        let creator_nickname = creator_nickname.trim().to_lowercase();
        Self {
            id,
            creator_nickname: creator_nickname.clone(),
            status: RoomStatus::Waiting,
            players: vec![Player::new(creator_nickname)],
            current_hand_num: 0,
            dealer_position: 0,
            elimination_order: Vec::new(),
            active_hand: None,
            created_at: Utc::now(),
        }
    }

    /// Adds a player, case-folding and trimming the nickname and enforcing
    /// the structural invariants: non-empty, unique (case-folded), room not
    /// full, room not yet started.
    pub fn add_player(&mut self, nickname: &str) -> Result<(), RoomError> {
        let nickname = nickname.trim().to_lowercase();
        if nickname.is_empty() {
            return Err(RoomError::EmptyNickname);
        }
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::AlreadyStarted);
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(RoomError::RoomFull);
        }
        if self.players.iter().any(|p| p.nickname == nickname) {
            return Err(RoomError::DuplicateNickname(nickname));
        }
        self.players.push(Player::new(nickname));
        Ok(())
    }

    pub fn active_players_count(&self) -> usize {
        self.players.iter().filter(|p| !p.eliminated).count()
    }

    pub fn active_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| !p.eliminated)
    }

    pub fn player_mut(&mut self, nickname: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.nickname == nickname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_player_case_folds_and_trims() {
        let mut room = Room::new("room-1".into(), "Alice".into());
        room.add_player("  Bob  ").unwrap();
        assert_eq!(room.players[1].nickname, "bob");
    }

    #[test]
    fn add_player_rejects_duplicate_case_insensitively() {
        let mut room = Room::new("room-1".into(), "alice".into());
        let err = room.add_player("ALICE").unwrap_err();
        assert_eq!(err, RoomError::DuplicateNickname("alice".into()));
    }

    #[test]
    fn add_player_rejects_empty_nickname() {
        let mut room = Room::new("room-1".into(), "alice".into());
        let err = room.add_player("   ").unwrap_err();
        assert_eq!(err, RoomError::EmptyNickname);
    }

    #[test]
    fn add_player_rejects_beyond_max_players() {
        let mut room = Room::new("room-1".into(), "p0".into());
        room.add_player("p1").unwrap();
        room.add_player("p2").unwrap();
        room.add_player("p3").unwrap();
        let err = room.add_player("p4").unwrap_err();
        assert_eq!(err, RoomError::RoomFull);
    }

    #[test]
    fn add_player_rejects_once_started() {
        let mut room = Room::new("room-1".into(), "alice".into());
        room.status = RoomStatus::Active;
        let err = room.add_player("bob").unwrap_err();
        assert_eq!(err, RoomError::AlreadyStarted);
    }

    #[test]
    fn can_act_excludes_folded_and_all_in() {
        let mut hand = Hand::new(1, 0, vec!["a".into(), "b".into(), "c".into()]);
        hand.player_hands.insert(
            "a".into(),
            PlayerHand::new([
                Card {
                    rank: crate::card::Rank::Ace,
                    suit: crate::card::Suit::Hearts,
                },
                Card {
                    rank: crate::card::Rank::King,
                    suit: crate::card::Suit::Hearts,
                },
            ]),
        );
        let mut b = PlayerHand::new([
            Card {
                rank: crate::card::Rank::Two,
                suit: crate::card::Suit::Clubs,
            },
            Card {
                rank: crate::card::Rank::Three,
                suit: crate::card::Suit::Clubs,
            },
        ]);
        b.folded = true;
        hand.player_hands.insert("b".into(), b);
        let mut c = PlayerHand::new([
            Card {
                rank: crate::card::Rank::Four,
                suit: crate::card::Suit::Diamonds,
            },
            Card {
                rank: crate::card::Rank::Five,
                suit: crate::card::Suit::Diamonds,
            },
        ]);
        c.all_in = true;
        hand.player_hands.insert("c".into(), c);

        assert_eq!(hand.can_act(), vec!["a"]);
        assert_eq!(hand.players_in_hand(), vec!["a", "c"]);
        assert_eq!(hand.current_actor(), Some("a"));
    }
}
