//! End-to-end wiring tests: the real `RoomRegistry` + `ConnectionBroker` +
//! room actor + in-memory `ResultsStore`, observed the way a real websocket
//! client would — by reading JSON-encoded `ServerEvent`s off an `mpsc`
//! channel `connect_room` attached. Distinct from `room_loop`'s own
//! `#[cfg(test)]` module, which mocks the broker out entirely.
//!
//! `ServerEvent` is serialize-only (it never needs to round-trip back in),
//! so these tests inspect the raw JSON's `"type"` tag instead of
//! deserializing into the enum.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use holdem_server::broker::ConnectionBroker;
use holdem_server::events::{ActionKind, ServerEvent};
use holdem_server::registry::RoomRegistry;
use holdem_server::results::ResultsStore;
use holdem_server::room_loop::{spawn_room_actor, RoomMsg};
use serde_json::Value;
use tokio::sync::mpsc;

async fn wire_two_player_room() -> (
    Arc<RoomRegistry>,
    Arc<ConnectionBroker>,
    mpsc::UnboundedReceiver<Message>,
    mpsc::UnboundedReceiver<Message>,
    mpsc::UnboundedSender<RoomMsg>,
) {
    let registry = Arc::new(RoomRegistry::new());
    registry.create_room("r1".into(), "alice").unwrap();
    registry.join_room("r1", "bob").unwrap().unwrap();

    let broker = Arc::new(ConnectionBroker::new());
    broker.ensure_room("r1");

    let room = registry.get("r1").unwrap();
    let (alice_tx, alice_rx) = mpsc::unbounded_channel();
    let (bob_tx, bob_rx) = mpsc::unbounded_channel();
    broker.connect_room(&room, "alice", alice_tx).unwrap();
    broker.connect_room(&room, "bob", bob_tx).unwrap();

    let results = Arc::new(ResultsStore::in_memory().await.unwrap());
    let room_tx = spawn_room_actor("r1".into(), registry.clone(), broker.clone(), results);

    (registry, broker, alice_rx, bob_rx, room_tx)
}

async fn recv_json(rx: &mut mpsc::UnboundedReceiver<Message>) -> Value {
    let msg = tokio::time::timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("channel closed unexpectedly");
    let Message::Text(text) = msg else {
        panic!("expected a text frame, got {msg:?}");
    };
    serde_json::from_str(&text).expect("event must be valid JSON")
}

fn event_type(event: &Value) -> &str {
    event["type"].as_str().expect("every ServerEvent carries a type tag")
}

async fn drain_until_type(rx: &mut mpsc::UnboundedReceiver<Message>, tag: &str) -> Value {
    loop {
        let event = recv_json(rx).await;
        if event_type(&event) == tag {
            return event;
        }
    }
}

#[tokio::test]
async fn connect_room_rejects_a_nickname_not_seated_at_the_table() {
    let registry = Arc::new(RoomRegistry::new());
    registry.create_room("r1".into(), "alice").unwrap();
    let broker = ConnectionBroker::new();
    broker.ensure_room("r1");
    let room = registry.get("r1").unwrap();

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = broker.connect_room(&room, "mallory", tx).unwrap_err();
    assert_eq!(err.to_string(), "nickname is not a player in this room");
}

#[tokio::test]
async fn starting_a_game_reaches_both_connected_players_with_a_turn_prompt() {
    let (registry, _broker, mut alice_rx, mut bob_rx, room_tx) = wire_two_player_room().await;

    room_tx.send(RoomMsg::StartGame).unwrap();

    let alice_turn = drain_until_type(&mut alice_rx, "turn").await;
    let bob_turn = drain_until_type(&mut bob_rx, "turn").await;
    assert_eq!(
        alice_turn["current_player"], bob_turn["current_player"],
        "both players see the same broadcast turn event"
    );

    let room = registry.get("r1").unwrap();
    assert!(room.active_hand.is_some());
}

#[tokio::test]
async fn a_private_send_reaches_only_its_named_recipient() {
    let (_registry, broker, mut alice_rx, mut bob_rx, _room_tx) = wire_two_player_room().await;

    broker.send_to(
        "r1",
        "alice",
        &ServerEvent::Error {
            message: "malformed message".to_string(),
        },
    );

    let event = recv_json(&mut alice_rx).await;
    assert_eq!(event_type(&event), "error");
    assert_eq!(event["message"], "malformed message");
    assert!(
        bob_rx.try_recv().is_err(),
        "send_to must not leak to other connections in the room"
    );
}

#[tokio::test]
async fn folding_ends_the_hand_and_both_viewers_see_the_result() {
    let (registry, _broker, mut alice_rx, mut bob_rx, room_tx) = wire_two_player_room().await;

    room_tx.send(RoomMsg::StartGame).unwrap();
    drain_until_type(&mut alice_rx, "turn").await;

    let current = registry
        .get("r1")
        .unwrap()
        .active_hand
        .unwrap()
        .current_actor()
        .unwrap()
        .to_string();

    room_tx
        .send(RoomMsg::Action {
            nick: current,
            action: ActionKind::Fold,
            amount: None,
        })
        .unwrap();

    drain_until_type(&mut alice_rx, "hand_result").await;
    drain_until_type(&mut bob_rx, "hand_result").await;
}
