//! Connection broker: per-room registry of player channels, serialized
//! best-effort fan-out, and per-viewer `send_to` for private events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use axum::extract::ws::Message;
use tokio::sync::mpsc;

use crate::error::BrokerError;
use crate::events::ServerEvent;
use holdem_engine::Room;

pub type ConnTx = mpsc::UnboundedSender<Message>;

fn encode(event: &ServerEvent) -> Message {
    Message::Text(serde_json::to_string(event).expect("ServerEvent always serializes"))
}

/// The seam between the room loop and the broker. Production code uses
/// [`ConnectionBroker`]; tests can supply a recording stand-in.
pub trait BroadcastSink: Send + Sync {
    fn send_to(&self, room_id: &str, nick: &str, event: &ServerEvent);
    fn broadcast_room(&self, room_id: &str, event: &ServerEvent, exclude_nick: Option<&str>);
}

/// Maintains `lobby_subscribers` and `room_connections` as specified in
/// §4.6. All sends are best-effort: a failed send marks its connection dead
/// and the broker drops it.
pub struct ConnectionBroker {
    lobby_subscribers: Mutex<HashMap<u64, ConnTx>>,
    next_lobby_id: AtomicU64,
    room_connections: Mutex<HashMap<String, HashMap<String, ConnTx>>>,
}

impl Default for ConnectionBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionBroker {
    pub fn new() -> Self {
        Self {
            lobby_subscribers: Mutex::new(HashMap::new()),
            next_lobby_id: AtomicU64::new(0),
            room_connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn connect_lobby(&self, tx: ConnTx) -> u64 {
        let id = self.next_lobby_id.fetch_add(1, Ordering::Relaxed);
        self.lobby_subscribers.lock().unwrap().insert(id, tx);
        id
    }

    pub fn disconnect_lobby(&self, id: u64) {
        self.lobby_subscribers.lock().unwrap().remove(&id);
    }

    /// Registers a room with the broker (called at room creation) so a
    /// later `connect_room` has somewhere to attach. Idempotent.
    pub fn ensure_room(&self, room_id: &str) {
        self.room_connections
            .lock()
            .unwrap()
            .entry(room_id.to_string())
            .or_default();
    }

    pub fn remove_room(&self, room_id: &str) {
        self.room_connections.lock().unwrap().remove(room_id);
    }

    /// Fails `NoSuchRoom` if the broker doesn't know the room, `NotAPlayer`
    /// if `nick` isn't in its roster. Replaces any prior connection under
    /// the same nickname.
    pub fn connect_room(&self, room: &Room, nick: &str, tx: ConnTx) -> Result<(), BrokerError> {
        let mut rooms = self.room_connections.lock().unwrap();
        let conns = rooms.get_mut(&room.id).ok_or(BrokerError::NoSuchRoom)?;
        if !room.players.iter().any(|p| p.nickname == nick) {
            return Err(BrokerError::NotAPlayer);
        }
        conns.insert(nick.to_string(), tx);
        Ok(())
    }

    pub fn disconnect_room(&self, room_id: &str, nick: &str) {
        if let Some(conns) = self.room_connections.lock().unwrap().get_mut(room_id) {
            conns.remove(nick);
        }
    }

    pub fn broadcast_lobby(&self, event: &ServerEvent) {
        let msg = encode(event);
        self.lobby_subscribers
            .lock()
            .unwrap()
            .retain(|_, tx| tx.send(msg.clone()).is_ok());
    }
}

impl BroadcastSink for ConnectionBroker {
    fn send_to(&self, room_id: &str, nick: &str, event: &ServerEvent) {
        let msg = encode(event);
        let mut rooms = self.room_connections.lock().unwrap();
        if let Some(conns) = rooms.get_mut(room_id) {
            let dead = matches!(conns.get(nick), Some(tx) if tx.send(msg).is_err());
            if dead {
                conns.remove(nick);
            }
        }
    }

    fn broadcast_room(&self, room_id: &str, event: &ServerEvent, exclude_nick: Option<&str>) {
        let msg = encode(event);
        let mut rooms = self.room_connections.lock().unwrap();
        if let Some(conns) = rooms.get_mut(room_id) {
            conns.retain(|nick, tx| {
                if Some(nick.as_str()) == exclude_nick {
                    return true;
                }
                tx.send(msg.clone()).is_ok()
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdem_engine::Room;

    #[test]
    fn connect_room_rejects_unknown_room() {
        let broker = ConnectionBroker::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let room = Room::new("r1".into(), "alice".into());
        let err = broker.connect_room(&room, "alice", tx).unwrap_err();
        assert_eq!(err, BrokerError::NoSuchRoom);
    }

    #[test]
    fn connect_room_rejects_non_player_nickname() {
        let broker = ConnectionBroker::new();
        broker.ensure_room("r1");
        let (tx, _rx) = mpsc::unbounded_channel();
        let room = Room::new("r1".into(), "alice".into());
        let err = broker.connect_room(&room, "mallory", tx).unwrap_err();
        assert_eq!(err, BrokerError::NotAPlayer);
    }

    #[test]
    fn broadcast_prunes_dead_connections() {
        let broker = ConnectionBroker::new();
        broker.ensure_room("r1");
        let room = Room::new("r1".into(), "alice".into());
        let (tx, rx) = mpsc::unbounded_channel();
        broker.connect_room(&room, "alice", tx).unwrap();
        drop(rx); // simulate a dead connection

        broker.broadcast_room("r1", &ServerEvent::Error { message: "x".into() }, None);

        let rooms = broker.room_connections.lock().unwrap();
        assert!(!rooms["r1"].contains_key("alice"));
    }

    #[test]
    fn broadcast_room_excludes_named_nickname() {
        let broker = ConnectionBroker::new();
        broker.ensure_room("r1");
        let room = {
            let mut r = Room::new("r1".into(), "alice".into());
            r.add_player("bob").unwrap();
            r
        };
        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        broker.connect_room(&room, "alice", alice_tx).unwrap();
        broker.connect_room(&room, "bob", bob_tx).unwrap();

        broker.broadcast_room(
            "r1",
            &ServerEvent::Error { message: "hi".into() },
            Some("alice"),
        );

        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_ok());
    }
}
