//! Wire protocol: inbound client messages and outbound server events, both
//! tagged JSON records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use holdem_engine::{BettingRound, Card, Player, Room, RoomStatus, ValidActions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Raise,
    AllIn,
}

/// Inbound message kinds: `start_game` and `action`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    StartGame,
    Action {
        action: ActionKind,
        amount: Option<i64>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub id: String,
    pub creator_nickname: String,
    pub player_count: usize,
    pub status: &'static str,
}

impl From<&Room> for RoomSummary {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id.clone(),
            creator_nickname: room.creator_nickname.clone(),
            player_count: room.players.len(),
            status: match room.status {
                holdem_engine::RoomStatus::Waiting => "waiting",
                holdem_engine::RoomStatus::Active => "active",
                holdem_engine::RoomStatus::Finished => "finished",
            },
        }
    }
}

/// A single player's per-hand state as seen by one viewer: hole cards are
/// present only for the viewer's own entry, never for anyone else's.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerHandView {
    pub hole_cards: Option<[Card; 2]>,
    pub current_bet: i64,
    pub total_bet: i64,
    pub folded: bool,
    pub all_in: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandView {
    pub hand_number: u32,
    pub dealer_position: usize,
    pub community_cards: Vec<Card>,
    pub current_bet: i64,
    pub min_raise: i64,
    pub betting_round: BettingRound,
    pub player_hands: HashMap<String, PlayerHandView>,
}

/// A room snapshot redacted for one specific viewer. Used for `game_joined`,
/// the one outbound event that hands a whole room snapshot to a single
/// connection that may be reconnecting mid-hand — every other event either
/// predates any dealt hand (`game_started`, `player_joined`) or is already
/// per-player (`hand_started`).
#[derive(Debug, Clone, Serialize)]
pub struct RoomView {
    pub id: String,
    pub creator_nickname: String,
    pub status: &'static str,
    pub players: Vec<Player>,
    pub current_hand_num: u32,
    pub dealer_position: usize,
    pub elimination_order: Vec<String>,
    pub active_hand: Option<HandView>,
}

impl RoomView {
    pub fn for_viewer(room: &Room, viewer: &str) -> Self {
        Self {
            id: room.id.clone(),
            creator_nickname: room.creator_nickname.clone(),
            status: match room.status {
                RoomStatus::Waiting => "waiting",
                RoomStatus::Active => "active",
                RoomStatus::Finished => "finished",
            },
            players: room.players.clone(),
            current_hand_num: room.current_hand_num,
            dealer_position: room.dealer_position,
            elimination_order: room.elimination_order.clone(),
            active_hand: room.active_hand.as_ref().map(|hand| HandView {
                hand_number: hand.hand_number,
                dealer_position: hand.dealer_position,
                community_cards: hand.community_cards.clone(),
                current_bet: hand.current_bet,
                min_raise: hand.min_raise,
                betting_round: hand.betting_round,
                player_hands: hand
                    .player_hands
                    .iter()
                    .map(|(nick, ph)| {
                        let hole_cards = (nick == viewer).then_some(ph.hole_cards);
                        (
                            nick.clone(),
                            PlayerHandView {
                                hole_cards,
                                current_bet: ph.current_bet,
                                total_bet: ph.total_bet,
                                folded: ph.folded,
                                all_in: ph.all_in,
                            },
                        )
                    })
                    .collect(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HandResultEntry {
    pub nickname: String,
    pub hole_cards: Option<[Card; 2]>,
    pub hand_rank_name: Option<String>,
    pub winnings: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    pub nickname: String,
    pub position: u32,
    pub points: u32,
}

/// Outbound event kinds. Events carrying hole cards are always sent to a
/// single recipient via `send_to`, never broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    LobbyUpdate {
        games: Vec<RoomSummary>,
    },
    GameJoined {
        game: RoomView,
    },
    PlayerJoined {
        nickname: String,
        game: Room,
    },
    PlayerConnected {
        nickname: String,
    },
    PlayerDisconnected {
        nickname: String,
    },
    GameStarted {
        game: Room,
    },
    HandStarted {
        hand_number: u32,
        dealer_position: usize,
        hole_cards: [Card; 2],
        your_position: usize,
    },
    BlindsPosted {
        small_blind: i64,
        big_blind: i64,
    },
    CommunityCards {
        cards: Vec<Card>,
        all_community_cards: Vec<Card>,
        betting_round: BettingRound,
    },
    Turn {
        current_player: String,
        valid_actions: ValidActions,
        time_remaining: u64,
        current_bet: i64,
        pot: i64,
    },
    PlayerAction {
        nickname: String,
        action: &'static str,
        amount: i64,
        pot: i64,
        player_chips: i64,
    },
    HandResult {
        results: Vec<HandResultEntry>,
        community_cards: Vec<Card>,
    },
    PlayerEliminated {
        nickname: String,
        position: u32,
    },
    GameEnded {
        placements: Vec<Placement>,
        total_hands: u32,
    },
    Error {
        message: String,
    },
}
