use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{BettingRound, Hand, Pot, Room};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionError {
    #[error("it is not your turn")]
    WrongTurn,
    #[error("cannot check, there is a bet to call")]
    CannotCheck,
    #[error("nothing to call")]
    NothingToCall,
    #[error("raise total must exceed your current bet")]
    NonIncreasing,
    #[error("insufficient chips for that amount")]
    Insufficient,
    #[error("raise is below the minimum legal raise")]
    BelowMinRaise,
    #[error("no chips remaining")]
    NoChips,
    #[error("unrecognized action")]
    UnknownAction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RaiseRange {
    pub min: i64,
    pub max: i64,
}

/// Legal actions and amount ranges for whichever player currently holds the
/// turn. All fields are empty/`None` if it is not `nick`'s turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidActions {
    pub can_fold: bool,
    pub can_check: bool,
    pub can_call: Option<i64>,
    pub can_raise: Option<RaiseRange>,
    pub can_all_in: bool,
}

fn validate_turn(hand: &Hand, nick: &str) -> Result<(), ActionError> {
    match hand.current_actor() {
        Some(current) if current == nick => Ok(()),
        _ => Err(ActionError::WrongTurn),
    }
}

/// Legal actions for the current player, or all-empty if `nick` does not
/// hold the turn, has folded, or is already all-in.
pub fn valid_actions(room: &Room, nick: &str) -> ValidActions {
    let Some(hand) = room.active_hand.as_ref() else {
        return ValidActions::default();
    };
    if hand.current_actor() != Some(nick) {
        return ValidActions::default();
    }
    let Some(ph) = hand.player_hands.get(nick) else {
        return ValidActions::default();
    };
    if ph.folded || ph.all_in {
        return ValidActions::default();
    }
    let Some(player) = room.players.iter().find(|p| p.nickname == nick) else {
        return ValidActions::default();
    };

    let to_call = hand.current_bet - ph.current_bet;
    let min_raise_additional = (hand.current_bet + hand.min_raise - ph.current_bet).min(player.chips);

    ValidActions {
        can_fold: true,
        can_check: to_call <= 0,
        can_call: (to_call > 0).then(|| to_call.min(player.chips)),
        can_raise: (player.chips > 0).then_some(RaiseRange {
            min: min_raise_additional,
            max: player.chips,
        }),
        can_all_in: player.chips > 0,
    }
}

pub fn fold(room: &mut Room, nick: &str) -> Result<(), ActionError> {
    let hand = room
        .active_hand
        .as_mut()
        .expect("fold requires an active hand");
    validate_turn(hand, nick)?;

    hand.player_hands
        .get_mut(nick)
        .expect("current actor must have a PlayerHand")
        .folded = true;
    hand.players_acted_this_round.insert(nick.to_string());

    advance_action(room);
    Ok(())
}

pub fn check(room: &mut Room, nick: &str) -> Result<(), ActionError> {
    let hand = room
        .active_hand
        .as_mut()
        .expect("check requires an active hand");
    validate_turn(hand, nick)?;

    let ph = hand
        .player_hands
        .get(nick)
        .expect("current actor must have a PlayerHand");
    if hand.current_bet - ph.current_bet > 0 {
        return Err(ActionError::CannotCheck);
    }

    hand.players_acted_this_round.insert(nick.to_string());
    advance_action(room);
    Ok(())
}

pub fn call(room: &mut Room, nick: &str) -> Result<(), ActionError> {
    let hand = room
        .active_hand
        .as_ref()
        .expect("call requires an active hand");
    validate_turn(hand, nick)?;

    let ph_current_bet = hand
        .player_hands
        .get(nick)
        .expect("current actor must have a PlayerHand")
        .current_bet;
    let to_call = hand.current_bet - ph_current_bet;
    if to_call <= 0 {
        return Err(ActionError::NothingToCall);
    }

    let player = room
        .players
        .iter_mut()
        .find(|p| p.nickname == nick)
        .expect("current actor must be a seated player");
    let actual = to_call.min(player.chips);
    player.chips -= actual;
    let chips_remaining = player.chips;

    let hand = room.active_hand.as_mut().unwrap();
    let ph = hand.player_hands.get_mut(nick).unwrap();
    ph.current_bet += actual;
    ph.total_bet += actual;
    if chips_remaining == 0 {
        ph.all_in = true;
    }
    hand.players_acted_this_round.insert(nick.to_string());

    advance_action(room);
    Ok(())
}

/// Raises to a total current-round bet of `total`. A short all-in raise (one
/// that cannot meet the full minimum-raise increment) is still accepted but
/// neither bumps `min_raise` nor reopens action for players who already
/// acted at the prior bet level.
pub fn raise_to(room: &mut Room, nick: &str, total: i64) -> Result<(), ActionError> {
    let hand = room
        .active_hand
        .as_ref()
        .expect("raise_to requires an active hand");
    validate_turn(hand, nick)?;

    let ph_current_bet = hand
        .player_hands
        .get(nick)
        .expect("current actor must have a PlayerHand")
        .current_bet;
    let old_current_bet = hand.current_bet;
    let min_raise = hand.min_raise;

    let additional = total - ph_current_bet;
    if additional <= 0 {
        return Err(ActionError::NonIncreasing);
    }

    let player_chips = room
        .players
        .iter()
        .find(|p| p.nickname == nick)
        .expect("current actor must be a seated player")
        .chips;
    if additional > player_chips {
        return Err(ActionError::Insufficient);
    }

    let is_all_in = additional == player_chips;
    let full_raise_min = old_current_bet + min_raise;
    if total < full_raise_min && !is_all_in {
        return Err(ActionError::BelowMinRaise);
    }
    let is_full_raise = total >= full_raise_min;

    let player = room
        .players
        .iter_mut()
        .find(|p| p.nickname == nick)
        .unwrap();
    player.chips -= additional;
    let chips_remaining = player.chips;

    let hand = room.active_hand.as_mut().unwrap();
    let ph = hand.player_hands.get_mut(nick).unwrap();
    ph.current_bet = total;
    ph.total_bet += additional;
    if chips_remaining == 0 {
        ph.all_in = true;
    }

    if is_full_raise {
        hand.min_raise = hand.min_raise.max(total - old_current_bet);
        hand.current_bet = total;
        hand.last_raiser = Some(nick.to_string());
        hand.players_acted_this_round.clear();
        hand.players_acted_this_round.insert(nick.to_string());
    } else {
        hand.current_bet = total;
        hand.players_acted_this_round.insert(nick.to_string());
    }

    advance_action(room);
    Ok(())
}

/// Commits all remaining chips. Resolves to the raise path if it increases
/// the amount to call, otherwise to a (possibly partial) call.
pub fn all_in(room: &mut Room, nick: &str) -> Result<(), ActionError> {
    let hand = room
        .active_hand
        .as_ref()
        .expect("all_in requires an active hand");
    validate_turn(hand, nick)?;

    let ph_current_bet = hand
        .player_hands
        .get(nick)
        .expect("current actor must have a PlayerHand")
        .current_bet;
    let current_bet = hand.current_bet;

    let player_chips = room
        .players
        .iter()
        .find(|p| p.nickname == nick)
        .expect("current actor must be a seated player")
        .chips;
    if player_chips == 0 {
        return Err(ActionError::NoChips);
    }

    let total = ph_current_bet + player_chips;
    if total > current_bet {
        raise_to(room, nick, total)
    } else {
        call(room, nick)
    }
}

/// Runs after every mutation: closes the betting round and advances the
/// hand, or moves the turn to the next player able to act.
pub fn advance_action(room: &mut Room) {
    let Some(hand) = room.active_hand.as_mut() else {
        return;
    };

    let players_in_hand = hand.players_in_hand();
    if players_in_hand.len() <= 1 {
        hand.betting_round = BettingRound::Showdown;
        return;
    }

    let can_act = hand.can_act();
    let all_acted = can_act
        .iter()
        .all(|n| hand.players_acted_this_round.contains(*n));
    let all_matched = players_in_hand.iter().all(|n| {
        let ph = hand.player_hands.get(*n).unwrap();
        ph.current_bet == hand.current_bet || ph.all_in
    });

    if all_acted && all_matched {
        advance_betting_round(hand);
    } else if !can_act.is_empty() {
        hand.current_player_idx = (hand.current_player_idx + 1) % can_act.len();
    }
}

fn advance_betting_round(hand: &mut Hand) {
    collect_bets_into_pot(hand);
    hand.players_acted_this_round.clear();
    hand.last_raiser = None;
    hand.current_bet = 0;
    hand.betting_round = hand.betting_round.next();
    if hand.betting_round != BettingRound::Showdown {
        set_first_actor_after_dealer(hand);
    }
}

/// Sums current-round bets into the running main pot and zeroes them.
/// The properly layered side-pot split is only built at showdown, by
/// [`build_side_pots`].
fn collect_bets_into_pot(hand: &mut Hand) {
    let collected: i64 = hand.player_hands.values().map(|ph| ph.current_bet).sum();
    if hand.pots.is_empty() {
        hand.pots.push(Pot::new(Vec::new()));
    }
    hand.pots[0].amount += collected;
    hand.pots[0].eligible = hand
        .players_in_hand()
        .into_iter()
        .map(String::from)
        .collect();

    for ph in hand.player_hands.values_mut() {
        ph.current_bet = 0;
    }
}

fn set_first_actor_after_dealer(hand: &mut Hand) {
    let can_act = hand.can_act();
    if can_act.is_empty() {
        hand.current_player_idx = 0;
        return;
    }
    let n = hand.seat_order.len();
    let start = (hand.dealer_position + 1) % n;
    for offset in 0..n {
        let seat_nick = &hand.seat_order[(start + offset) % n];
        if let Some(pos) = can_act.iter().position(|c| c == seat_nick) {
            hand.current_player_idx = pos;
            return;
        }
    }
    hand.current_player_idx = 0;
}

/// Constructs the correctly layered side-pot structure from each player's
/// cumulative hand total (`total_bet`), sorting contributors ascending and
/// peeling off one pot layer per distinct contribution level. Called at
/// showdown whenever any all-in occurred mid-hand; for a single surviving
/// player the whole of `hand.pots` is simply awarded without this step.
pub fn build_side_pots(hand: &Hand) -> Vec<Pot> {
    let mut contributors: Vec<(&str, i64, bool)> = hand
        .player_hands
        .iter()
        .filter(|(_, ph)| ph.total_bet > 0)
        .map(|(nick, ph)| (nick.as_str(), ph.total_bet, ph.folded))
        .collect();
    contributors.sort_by_key(|(_, total_bet, _)| *total_bet);

    let mut thresholds: Vec<i64> = contributors.iter().map(|(_, t, _)| *t).collect();
    thresholds.sort_unstable();
    thresholds.dedup();

    let mut pots = Vec::new();
    let mut prev = 0i64;
    for threshold in thresholds {
        let layer = threshold - prev;
        prev = threshold;
        if layer <= 0 {
            continue;
        }
        let contributing: Vec<&(&str, i64, bool)> = contributors
            .iter()
            .filter(|(_, t, _)| *t >= threshold)
            .collect();
        let amount = layer * contributing.len() as i64;
        let eligible: Vec<String> = contributing
            .iter()
            .filter(|(_, _, folded)| !folded)
            .map(|(nick, _, _)| nick.to_string())
            .collect();
        if !eligible.is_empty() && amount > 0 {
            pots.push(Pot { amount, eligible });
        }
    }
    pots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{Card, Rank, Suit};
    use crate::model::{PlayerHand, RoomStatus};

    fn card(rank: Rank, suit: Suit) -> Card {
        Card { rank, suit }
    }

    fn two_player_room() -> Room {
        let mut room = Room::new("r1".into(), "alice".into());
        room.add_player("bob").unwrap();
        room.status = RoomStatus::Active;

        let mut hand = Hand::new(1, 0, vec!["alice".into(), "bob".into()]);
        hand.current_bet = 20;
        hand.min_raise = 20;

        let mut alice_ph = PlayerHand::new([
            card(Rank::Ace, Suit::Hearts),
            card(Rank::King, Suit::Hearts),
        ]);
        alice_ph.current_bet = 10;
        alice_ph.total_bet = 10;
        hand.player_hands.insert("alice".into(), alice_ph);

        let mut bob_ph = PlayerHand::new([
            card(Rank::Two, Suit::Clubs),
            card(Rank::Seven, Suit::Diamonds),
        ]);
        bob_ph.current_bet = 20;
        bob_ph.total_bet = 20;
        hand.player_hands.insert("bob".into(), bob_ph);

        // The blinds stay in each player's `current_bet` (10 + 20 = 30
        // already reflected above) rather than being pre-seeded into the
        // pot; `collect_bets_into_pot` sweeps them in once, when the round
        // closes. Seeding `pots[0].amount` here too would double-count them.
        hand.current_player_idx = 0; // alice (SB) acts first heads-up preflop

        room.players[0].chips = 990;
        room.players[1].chips = 980;
        room.active_hand = Some(hand);
        room
    }

    #[test]
    fn fold_ends_hand_in_showdown_with_one_player_left() {
        let mut room = two_player_room();
        fold(&mut room, "alice").unwrap();
        let hand = room.active_hand.unwrap();
        assert_eq!(hand.betting_round, BettingRound::Showdown);
        assert!(hand.player_hands["alice"].folded);
    }

    #[test]
    fn fold_out_of_turn_is_rejected() {
        let mut room = two_player_room();
        let err = fold(&mut room, "bob").unwrap_err();
        assert_eq!(err, ActionError::WrongTurn);
    }

    #[test]
    fn check_with_a_bet_outstanding_is_rejected() {
        let mut room = two_player_room();
        let err = check(&mut room, "alice").unwrap_err();
        assert_eq!(err, ActionError::CannotCheck);
    }

    #[test]
    fn call_matches_the_bet_and_advances_the_round() {
        let mut room = two_player_room();
        call(&mut room, "alice").unwrap();
        assert_eq!(room.players[0].chips, 980);
        // Heads-up preflop, the BB still gets to act after a call that
        // merely matches — the round does not close until bob does too.
        let hand = room.active_hand.as_ref().unwrap();
        assert_eq!(hand.betting_round, BettingRound::Preflop);
        assert_eq!(hand.current_actor(), Some("bob"));

        check(&mut room, "bob").unwrap();
        let hand = room.active_hand.as_ref().unwrap();
        assert_eq!(hand.betting_round, BettingRound::Flop);
        assert_eq!(hand.current_bet, 0);
        assert_eq!(hand.pots[0].amount, 40);
    }

    #[test]
    fn raise_below_minimum_is_rejected_unless_all_in() {
        let mut room = two_player_room();
        let err = raise_to(&mut room, "alice", 25).unwrap_err();
        assert_eq!(err, ActionError::BelowMinRaise);
    }

    #[test]
    fn full_raise_resets_acted_set_and_bumps_min_raise() {
        let mut room = two_player_room();
        raise_to(&mut room, "alice", 40).unwrap();
        let hand = room.active_hand.as_ref().unwrap();
        assert_eq!(hand.current_bet, 40);
        assert_eq!(hand.min_raise, 20);
        assert_eq!(hand.last_raiser.as_deref(), Some("alice"));
        assert_eq!(room.players[0].chips, 960);
    }

    #[test]
    fn short_all_in_raise_does_not_reopen_action() {
        let mut room = two_player_room();
        room.players[0].chips = 15; // alice can only raise to 25 total, below min-raise of 40
        raise_to(&mut room, "alice", 25).unwrap();
        let hand = room.active_hand.as_ref().unwrap();
        assert_eq!(hand.current_bet, 25);
        assert_eq!(hand.min_raise, 20, "short all-in must not bump min_raise");
        assert!(hand.player_hands["alice"].all_in);
    }

    #[test]
    fn all_in_for_less_than_current_bet_behaves_like_a_call() {
        let mut room = two_player_room();
        room.players[0].chips = 5;
        all_in(&mut room, "alice").unwrap();
        let hand = room.active_hand.as_ref().unwrap();
        assert!(hand.player_hands["alice"].all_in);
        assert_eq!(hand.player_hands["alice"].current_bet, 15);
    }

    #[test]
    fn valid_actions_is_empty_off_turn() {
        let room = two_player_room();
        let actions = valid_actions(&room, "bob");
        assert!(!actions.can_fold);
        assert!(actions.can_call.is_none());
    }

    #[test]
    fn valid_actions_reports_call_and_raise_range_on_turn() {
        let room = two_player_room();
        let actions = valid_actions(&room, "alice");
        assert!(actions.can_fold);
        assert_eq!(actions.can_call, Some(10));
        let range = actions.can_raise.unwrap();
        assert_eq!(range.min, 30);
        assert_eq!(range.max, 990);
    }

    #[test]
    fn side_pots_are_layered_by_ascending_total_bet() {
        let mut room = Room::new("r1".into(), "a".into());
        room.add_player("b").unwrap();
        room.add_player("c").unwrap();

        let mut hand = Hand::new(1, 0, vec!["a".into(), "b".into(), "c".into()]);
        let mut a = PlayerHand::new([
            card(Rank::Ace, Suit::Hearts),
            card(Rank::King, Suit::Hearts),
        ]);
        a.total_bet = 100;
        a.all_in = true;
        hand.player_hands.insert("a".into(), a);

        let mut b = PlayerHand::new([
            card(Rank::Two, Suit::Clubs),
            card(Rank::Three, Suit::Clubs),
        ]);
        b.total_bet = 300;
        hand.player_hands.insert("b".into(), b);

        let mut c = PlayerHand::new([
            card(Rank::Four, Suit::Diamonds),
            card(Rank::Five, Suit::Diamonds),
        ]);
        c.total_bet = 300;
        hand.player_hands.insert("c".into(), c);

        let pots = build_side_pots(&hand);
        assert_eq!(pots.len(), 2);
        assert_eq!(pots[0].amount, 300); // 100 * 3 contributors
        assert_eq!(pots[0].eligible.len(), 3);
        assert_eq!(pots[1].amount, 400); // (300-100) * 2 contributors
        assert_eq!(pots[1].eligible.len(), 2);
    }

    #[test]
    fn side_pots_exclude_folded_players_from_eligibility() {
        let mut hand = Hand::new(1, 0, vec!["a".into(), "b".into()]);
        let mut a = PlayerHand::new([
            card(Rank::Ace, Suit::Hearts),
            card(Rank::King, Suit::Hearts),
        ]);
        a.total_bet = 50;
        a.folded = true;
        hand.player_hands.insert("a".into(), a);

        let mut b = PlayerHand::new([
            card(Rank::Two, Suit::Clubs),
            card(Rank::Three, Suit::Clubs),
        ]);
        b.total_bet = 50;
        hand.player_hands.insert("b".into(), b);

        let pots = build_side_pots(&hand);
        assert_eq!(pots.len(), 1);
        assert_eq!(pots[0].amount, 100);
        assert_eq!(pots[0].eligible, vec!["b".to_string()]);
    }
}
