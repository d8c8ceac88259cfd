//! Per-room hand/game loop: one logical task per room, draining an action
//! channel and racing a precise per-turn timer against it via
//! `tokio::time::sleep` scoped to exactly the current turn.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use holdem_engine::{
    actions, config::TURN_TIMER_SECONDS, evaluator, Card, Deck, Hand, HandRank, PlayerHand, Room,
    RoomStatus,
};

use crate::broker::BroadcastSink;
use crate::events::{ActionKind, HandResultEntry, Placement, ServerEvent};
use crate::registry::RoomRegistry;
use crate::results::ResultsStore;

/// Messages a room's websocket handlers forward to its actor task.
pub enum RoomMsg {
    StartGame,
    Action {
        nick: String,
        action: ActionKind,
        amount: Option<i64>,
    },
}

/// Spawns the actor task for `room_id` and returns the channel used to feed
/// it inbound messages. The task exits once every sender is dropped.
pub fn spawn_room_actor<S: BroadcastSink + 'static>(
    room_id: String,
    registry: Arc<RoomRegistry>,
    sink: Arc<S>,
    results: Arc<ResultsStore>,
) -> mpsc::UnboundedSender<RoomMsg> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_room(room_id, registry, sink, results, rx));
    tx
}

async fn run_room<S: BroadcastSink>(
    room_id: String,
    registry: Arc<RoomRegistry>,
    sink: Arc<S>,
    results: Arc<ResultsStore>,
    mut rx: mpsc::UnboundedReceiver<RoomMsg>,
) {
    let (timeout_tx, mut timeout_rx) = mpsc::unbounded_channel::<(u64, String)>();
    let mut actor = RoomActor {
        room_id,
        registry,
        sink,
        results,
        deck: None,
        timer_generation: 0,
        timeout_tx,
    };

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(RoomMsg::StartGame) => actor.start_game().await,
                    Some(RoomMsg::Action { nick, action, amount }) => {
                        actor.handle_action(nick, action, amount).await
                    }
                    None => break,
                }
            }
            Some((generation, nick)) = timeout_rx.recv() => {
                if generation == actor.timer_generation {
                    actor.handle_timeout(nick).await;
                }
            }
        }
    }
}

struct RoomActor<S: BroadcastSink> {
    room_id: String,
    registry: Arc<RoomRegistry>,
    sink: Arc<S>,
    results: Arc<ResultsStore>,
    /// Owned by the actor for the lifetime of a hand, not by the shared
    /// `Room` — dealing is transient per-hand state, not table state.
    deck: Option<Deck>,
    timer_generation: u64,
    timeout_tx: mpsc::UnboundedSender<(u64, String)>,
}

fn active_seat_order(room: &Room) -> Vec<String> {
    room.active_players().map(|p| p.nickname.clone()).collect()
}

fn action_name(action: ActionKind) -> &'static str {
    match action {
        ActionKind::Fold => "fold",
        ActionKind::Check => "check",
        ActionKind::Call => "call",
        ActionKind::Raise => "raise",
        ActionKind::AllIn => "all_in",
    }
}

/// Posts blinds out of each player's stack, capping at their chips (a short
/// blind can happen if a player is down to a few chips). Sets `current_bet`
/// to the actual amount posted for the big blind, so a short big blind
/// doesn't invent chips nobody has. The blinds stay in each poster's
/// `current_bet` rather than being seeded into `pots[0]` directly; the
/// first `collect_bets_into_pot` call, at the end of the preflop round,
/// sweeps them in exactly once, alongside everyone else's preflop action.
fn post_blinds(room: &mut Room, hand: &mut Hand) -> (i64, i64) {
    let n = hand.seat_order.len();
    let (sb_idx, bb_idx) = if n == 2 {
        (hand.dealer_position, (hand.dealer_position + 1) % n)
    } else {
        (
            (hand.dealer_position + 1) % n,
            (hand.dealer_position + 2) % n,
        )
    };
    let sb_nick = hand.seat_order[sb_idx].clone();
    let bb_nick = hand.seat_order[bb_idx].clone();

    let sb_amount = post_blind(room, hand, &sb_nick, holdem_engine::config::SMALL_BLIND);
    let bb_amount = post_blind(room, hand, &bb_nick, holdem_engine::config::BIG_BLIND);

    hand.current_bet = bb_amount;
    (sb_amount, bb_amount)
}

fn post_blind(room: &mut Room, hand: &mut Hand, nick: &str, blind: i64) -> i64 {
    let player = room
        .players
        .iter_mut()
        .find(|p| p.nickname == nick)
        .expect("blind poster must be seated");
    let amount = blind.min(player.chips);
    player.chips -= amount;
    let went_all_in = player.chips == 0;

    let ph = hand
        .player_hands
        .get_mut(nick)
        .expect("blind poster must have a PlayerHand");
    ph.current_bet = amount;
    ph.total_bet = amount;
    if went_all_in {
        ph.all_in = true;
    }
    amount
}

/// Heads-up, the dealer (small blind) acts first preflop. Otherwise, first
/// to act is the seat after the big blind. Robust to either seat already
/// being folded or all-in on a short blind.
fn set_first_actor_preflop(hand: &mut Hand) {
    let n = hand.seat_order.len();
    let first_seat_idx = if n == 2 {
        hand.dealer_position
    } else {
        (hand.dealer_position + 3) % n
    };
    let can_act = hand.can_act();
    if can_act.is_empty() {
        hand.current_player_idx = 0;
        return;
    }
    for offset in 0..n {
        let seat_nick = &hand.seat_order[(first_seat_idx + offset) % n];
        if let Some(pos) = can_act.iter().position(|c| c == seat_nick) {
            hand.current_player_idx = pos;
            return;
        }
    }
    hand.current_player_idx = 0;
}

fn current_pot(room: &Room) -> i64 {
    room.active_hand
        .as_ref()
        .map(|h| {
            h.total_pot()
                + h.player_hands
                    .values()
                    .map(|ph| ph.current_bet)
                    .sum::<i64>()
        })
        .unwrap_or(0)
}

impl<S: BroadcastSink> RoomActor<S> {
    fn cancel_timer(&mut self) {
        self.timer_generation += 1;
    }

    async fn start_timer(&mut self, expected_nick: String) {
        self.timer_generation += 1;
        let generation = self.timer_generation;
        let tx = self.timeout_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(TURN_TIMER_SECONDS)).await;
            let _ = tx.send((generation, expected_nick));
        });
    }

    async fn start_game(&mut self) {
        let started = self
            .registry
            .with_room_mut(&self.room_id, |room| {
                if room.status != RoomStatus::Waiting {
                    return false;
                }
                if room.players.len() < holdem_engine::config::MIN_PLAYERS {
                    return false;
                }
                room.status = RoomStatus::Active;
                room.current_hand_num = 0;
                room.dealer_position = 0;
                true
            })
            .unwrap_or(false);
        if !started {
            if let Some(room) = self.registry.get(&self.room_id) {
                if room.status == RoomStatus::Waiting {
                    self.sink.broadcast_room(
                        &self.room_id,
                        &ServerEvent::Error {
                            message: format!(
                                "at least {} players are required to start",
                                holdem_engine::config::MIN_PLAYERS
                            ),
                        },
                        None,
                    );
                }
            }
            return;
        }

        if let Some(room) = self.registry.get(&self.room_id) {
            self.sink
                .broadcast_room(&self.room_id, &ServerEvent::GameStarted { game: room }, None);
        }

        self.start_hand().await;
    }

    async fn start_hand(&mut self) {
        let Some(room) = self.registry.get(&self.room_id) else {
            return;
        };
        if room.active_players_count() <= 1 || room.current_hand_num >= holdem_engine::config::HAND_LIMIT
        {
            self.end_game().await;
            return;
        }

        let seat_order = active_seat_order(&room);
        let n = seat_order.len();

        let mut deck = Deck::new();
        deck.shuffle(&mut rand::rng());

        let outcome = self.registry.with_room_mut(&self.room_id, |room| {
            room.current_hand_num += 1;
            if room.current_hand_num > 1 {
                room.dealer_position = (room.dealer_position + 1) % n;
            }
            let hand_number = room.current_hand_num;
            let dealer_position = room.dealer_position;

            let mut hand = Hand::new(hand_number, dealer_position, seat_order.clone());
            for nick in &seat_order {
                if let Ok(cards) = deck.deal(2) {
                    hand.player_hands
                        .insert(nick.clone(), PlayerHand::new([cards[0], cards[1]]));
                }
            }

            let (sb_amount, bb_amount) = post_blinds(room, &mut hand);
            set_first_actor_preflop(&mut hand);

            room.active_hand = Some(hand);
            (hand_number, dealer_position, sb_amount, bb_amount)
        });
        self.deck = Some(deck);

        let Some((hand_number, dealer_position, small_blind, big_blind)) = outcome else {
            return;
        };

        if let Some(room) = self.registry.get(&self.room_id) {
            for (position, player) in room.players.iter().enumerate() {
                let Some(hand) = room.active_hand.as_ref() else {
                    continue;
                };
                let Some(ph) = hand.player_hands.get(&player.nickname) else {
                    continue;
                };
                self.sink.send_to(
                    &self.room_id,
                    &player.nickname,
                    &ServerEvent::HandStarted {
                        hand_number,
                        dealer_position,
                        hole_cards: ph.hole_cards,
                        your_position: position,
                    },
                );
            }
            self.sink.broadcast_room(
                &self.room_id,
                &ServerEvent::BlindsPosted {
                    small_blind,
                    big_blind,
                },
                None,
            );
        }

        self.prompt_current_player().await;
    }

    async fn prompt_current_player(&mut self) {
        let Some(room) = self.registry.get(&self.room_id) else {
            return;
        };
        let Some(hand) = room.active_hand.as_ref() else {
            return;
        };
        if hand.current_actor().is_none() {
            self.resolve_hand().await;
            return;
        }

        let current = hand.current_actor().unwrap().to_string();
        let valid = actions::valid_actions(&room, &current);
        let pot = current_pot(&room);
        let current_bet = hand.current_bet;

        self.sink.broadcast_room(
            &self.room_id,
            &ServerEvent::Turn {
                current_player: current.clone(),
                valid_actions: valid,
                time_remaining: TURN_TIMER_SECONDS,
                current_bet,
                pot,
            },
            None,
        );

        self.start_timer(current).await;
    }

    async fn handle_action(&mut self, nick: String, action: ActionKind, amount: Option<i64>) {
        self.cancel_timer();

        let Some(room_before) = self.registry.get(&self.room_id) else {
            return;
        };
        if room_before.active_hand.is_none() {
            return;
        }
        let chips_before = room_before
            .players
            .iter()
            .find(|p| p.nickname == nick)
            .map(|p| p.chips)
            .unwrap_or(0);

        let result = self
            .registry
            .with_room_mut(&self.room_id, |room| apply_action(room, &nick, action, amount));

        match result {
            Some(Ok(())) => {
                if let Some(room) = self.registry.get(&self.room_id) {
                    let chips_after = room
                        .players
                        .iter()
                        .find(|p| p.nickname == nick)
                        .map(|p| p.chips)
                        .unwrap_or(0);
                    self.sink.broadcast_room(
                        &self.room_id,
                        &ServerEvent::PlayerAction {
                            nickname: nick.clone(),
                            action: action_name(action),
                            amount: chips_before - chips_after,
                            pot: current_pot(&room),
                            player_chips: chips_after,
                        },
                        None,
                    );
                }
                self.check_round_end().await;
            }
            Some(Err(err)) => {
                self.sink.send_to(
                    &self.room_id,
                    &nick,
                    &ServerEvent::Error {
                        message: err.to_string(),
                    },
                );
                self.prompt_current_player().await;
            }
            None => {}
        }
    }

    async fn handle_timeout(&mut self, nick: String) {
        let Some(room) = self.registry.get(&self.room_id) else {
            return;
        };
        let is_current_actor = room
            .active_hand
            .as_ref()
            .and_then(|h| h.current_actor())
            == Some(nick.as_str());
        if !is_current_actor {
            return;
        }

        let result = self
            .registry
            .with_room_mut(&self.room_id, |room| actions::fold(room, &nick));
        if let Some(Ok(())) = result {
            if let Some(room) = self.registry.get(&self.room_id) {
                let chips = room
                    .players
                    .iter()
                    .find(|p| p.nickname == nick)
                    .map(|p| p.chips)
                    .unwrap_or(0);
                self.sink.broadcast_room(
                    &self.room_id,
                    &ServerEvent::PlayerAction {
                        nickname: nick.clone(),
                        action: "fold",
                        amount: 0,
                        pot: current_pot(&room),
                        player_chips: chips,
                    },
                    None,
                );
            }
            self.check_round_end().await;
        }
    }

    async fn check_round_end(&mut self) {
        let Some(room) = self.registry.get(&self.room_id) else {
            return;
        };
        let Some(hand) = room.active_hand.as_ref() else {
            return;
        };

        if hand.players_in_hand().len() <= 1 {
            self.resolve_hand().await;
            return;
        }
        if hand.betting_round == holdem_engine::BettingRound::Showdown {
            self.resolve_hand().await;
            return;
        }

        let needed = hand.betting_round.community_card_count();
        if hand.community_cards.len() < needed {
            self.deal_community_cards(needed).await;
        }

        self.prompt_current_player().await;
    }

    async fn deal_community_cards(&mut self, needed: usize) {
        let Some(deck) = self.deck.as_mut() else {
            return;
        };
        let Some(room) = self.registry.get(&self.room_id) else {
            return;
        };
        let Some(already_dealt) = room.active_hand.as_ref().map(|h| h.community_cards.len()) else {
            return;
        };

        let _burn = deck.deal_one();
        let new_cards: Vec<Card> = deck.deal(needed - already_dealt).unwrap_or_default();

        self.registry.with_room_mut(&self.room_id, |room| {
            if let Some(hand) = room.active_hand.as_mut() {
                hand.community_cards.extend(new_cards.clone());
            }
        });

        if let Some(room) = self.registry.get(&self.room_id) {
            if let Some(hand) = room.active_hand.as_ref() {
                self.sink.broadcast_room(
                    &self.room_id,
                    &ServerEvent::CommunityCards {
                        cards: new_cards,
                        all_community_cards: hand.community_cards.clone(),
                        betting_round: hand.betting_round,
                    },
                    None,
                );
            }
        }
    }

    async fn resolve_hand(&mut self) {
        self.cancel_timer();

        let Some(room) = self.registry.get(&self.room_id) else {
            return;
        };
        let Some(hand) = room.active_hand.clone() else {
            return;
        };

        let players_in_hand = hand.players_in_hand();
        if players_in_hand.len() == 1 {
            let winner = players_in_hand[0].to_string();
            // Everyone-but-one-folds ends the hand without a round
            // transition, so this round's bets are still sitting in each
            // player's `current_bet` rather than swept into `hand.pots`.
            let uncollected: i64 = hand.player_hands.values().map(|ph| ph.current_bet).sum();
            let total = hand.total_pot() + uncollected;
            self.registry.with_room_mut(&self.room_id, |room| {
                if let Some(p) = room.player_mut(&winner) {
                    p.chips += total;
                }
                room.active_hand = None;
            });
            self.sink.broadcast_room(
                &self.room_id,
                &ServerEvent::HandResult {
                    results: vec![HandResultEntry {
                        nickname: winner,
                        hole_cards: None,
                        hand_rank_name: None,
                        winnings: total,
                    }],
                    community_cards: hand.community_cards.clone(),
                },
                None,
            );
        } else {
            self.resolve_showdown(&hand, &players_in_hand).await;
        }

        self.check_eliminations().await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        self.start_hand().await;
    }

    async fn resolve_showdown(&mut self, hand: &Hand, players_in_hand: &[&str]) {
        let any_all_in = hand.player_hands.values().any(|ph| ph.all_in);
        let pots = if any_all_in {
            actions::build_side_pots(hand)
        } else {
            hand.pots.clone()
        };

        let mut winnings: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
        let mut best_hand_names: std::collections::HashMap<String, HandRank> =
            std::collections::HashMap::new();

        for pot in &pots {
            if pot.eligible.is_empty() || pot.amount <= 0 {
                continue;
            }
            let contenders = &pot.eligible;
            let hands: Vec<Vec<Card>> = contenders
                .iter()
                .map(|nick| {
                    let ph = &hand.player_hands[nick];
                    let mut cards = ph.hole_cards.to_vec();
                    cards.extend(hand.community_cards.iter().copied());
                    cards
                })
                .collect();
            let winner_idxs = evaluator::compare_hands(&hands);
            let share = pot.amount / winner_idxs.len() as i64;
            let remainder = pot.amount % winner_idxs.len() as i64;

            for (order, &idx) in winner_idxs.iter().enumerate() {
                let nick = contenders[idx].clone();
                let extra = if (order as i64) < remainder { 1 } else { 0 };
                *winnings.entry(nick.clone()).or_insert(0) += share + extra;
                let best = evaluator::evaluate_best(&hands[idx]);
                best_hand_names.insert(nick, best.rank_class);
            }
        }

        let results: Vec<HandResultEntry> = players_in_hand
            .iter()
            .map(|nick| {
                let ph = &hand.player_hands[*nick];
                HandResultEntry {
                    nickname: nick.to_string(),
                    hole_cards: Some(ph.hole_cards),
                    hand_rank_name: best_hand_names.get(*nick).map(|r| r.name().to_string()),
                    winnings: *winnings.get(*nick).unwrap_or(&0),
                }
            })
            .collect();

        self.registry.with_room_mut(&self.room_id, |room| {
            for (nick, amount) in &winnings {
                if let Some(p) = room.player_mut(nick) {
                    p.chips += amount;
                }
            }
            room.active_hand = None;
        });

        self.sink.broadcast_room(
            &self.room_id,
            &ServerEvent::HandResult {
                results,
                community_cards: hand.community_cards.clone(),
            },
            None,
        );
    }

    /// Marks anyone now at or below zero chips eliminated, in seat order so
    /// simultaneous bust-outs within one hand get a deterministic ranking:
    /// `elimination_position = |players| - |elimination_order| + 1`, so the
    /// first player out is assigned the worst surviving rank.
    async fn check_eliminations(&mut self) {
        let newly_eliminated = self
            .registry
            .with_room_mut(&self.room_id, |room| {
                let total_players = room.players.len();
                let nicknames: Vec<String> =
                    room.players.iter().map(|p| p.nickname.clone()).collect();
                let mut newly = Vec::new();
                for nick in nicknames {
                    let busted = room
                        .players
                        .iter()
                        .find(|p| p.nickname == nick)
                        .map(|p| !p.eliminated && p.chips <= 0)
                        .unwrap_or(false);
                    if !busted {
                        continue;
                    }
                    room.elimination_order.push(nick.clone());
                    let position = (total_players - room.elimination_order.len() + 1) as u32;
                    if let Some(p) = room.player_mut(&nick) {
                        p.eliminated = true;
                        p.elimination_position = Some(position);
                    }
                    newly.push((nick, position));
                }
                newly
            })
            .unwrap_or_default();

        for (nickname, position) in newly_eliminated {
            self.sink.broadcast_room(
                &self.room_id,
                &ServerEvent::PlayerEliminated { nickname, position },
                None,
            );
        }
    }

    async fn end_game(&mut self) {
        let outcome = self.registry.with_room_mut(&self.room_id, |room| {
            room.status = RoomStatus::Finished;

            let mut survivor_idx: Vec<usize> = room
                .players
                .iter()
                .enumerate()
                .filter(|(_, p)| !p.eliminated)
                .map(|(i, _)| i)
                .collect();
            survivor_idx.sort_by_key(|&i| std::cmp::Reverse(room.players[i].chips));
            for (rank, &idx) in survivor_idx.iter().enumerate() {
                room.players[idx].elimination_position = Some((rank + 1) as u32);
            }

            let placements: Vec<Placement> = room
                .players
                .iter()
                .map(|p| {
                    let position = p.elimination_position.unwrap_or(0);
                    Placement {
                        nickname: p.nickname.clone(),
                        position,
                        points: holdem_engine::config::points_for_placement(position as usize),
                    }
                })
                .collect();

            (placements, room.current_hand_num)
        });
        let Some((placements, total_hands)) = outcome else {
            return;
        };

        if let Err(err) = self.results.save_result(&placements).await {
            tracing::error!(error = %err, room_id = %self.room_id, "failed to persist game results");
        }

        self.sink.broadcast_room(
            &self.room_id,
            &ServerEvent::GameEnded {
                placements,
                total_hands,
            },
            None,
        );
    }
}

fn apply_action(
    room: &mut Room,
    nick: &str,
    action: ActionKind,
    amount: Option<i64>,
) -> Result<(), actions::ActionError> {
    match action {
        ActionKind::Fold => actions::fold(room, nick),
        ActionKind::Check => actions::check(room, nick),
        ActionKind::Call => actions::call(room, nick),
        ActionKind::Raise => {
            let total = amount.ok_or(actions::ActionError::NonIncreasing)?;
            actions::raise_to(room, nick, total)
        }
        ActionKind::AllIn => actions::all_in(room, nick),
    }
}
