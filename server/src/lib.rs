//! Process-wide wiring for the room/hand server: the per-room actor loop,
//! the connection broker, and the HTTP/WS surface and results store.
//! [`build_router`] is the single seam between this and `main.rs`, so tests
//! can mount the same router against an in-memory [`AppState`] without a
//! listening socket.

pub mod broker;
pub mod config;
pub mod error;
pub mod events;
pub mod registry;
pub mod results;
pub mod room_loop;

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use broker::ConnectionBroker;
use error::AppError;
use events::{ClientAction, RoomSummary, RoomView, ServerEvent};
use holdem_engine::Room;
use registry::RoomRegistry;
use results::ResultsStore;
use room_loop::{spawn_room_actor, RoomMsg};

/// Process-wide singletons, injected into every handler rather than held
/// globally so tests can supply their own instances.
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub broker: Arc<ConnectionBroker>,
    pub results: Arc<ResultsStore>,
    room_actors: Mutex<HashMap<String, mpsc::UnboundedSender<RoomMsg>>>,
}

impl AppState {
    pub fn new(results: ResultsStore) -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new()),
            broker: Arc::new(ConnectionBroker::new()),
            results: Arc::new(results),
            room_actors: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the room's actor channel, spawning its task on first use.
    fn room_actor(self: &Arc<Self>, room_id: &str) -> mpsc::UnboundedSender<RoomMsg> {
        let mut actors = self.room_actors.lock().unwrap();
        actors
            .entry(room_id.to_string())
            .or_insert_with(|| {
                spawn_room_actor(
                    room_id.to_string(),
                    self.registry.clone(),
                    self.broker.clone(),
                    self.results.clone(),
                )
            })
            .clone()
    }

    fn lobby_snapshot(&self) -> ServerEvent {
        ServerEvent::LobbyUpdate {
            games: self.registry.list_waiting().iter().map(RoomSummary::from).collect(),
        }
    }
}

/// Builds the full axum router: the lobby/room HTTP CRUD surface and the
/// `/ws/lobby` + `/ws/game/{id}` channels.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/games", get(list_games).post(create_game))
        .route("/api/games/:id", get(get_game))
        .route("/api/games/:id/join", post(join_game))
        .route("/api/leaderboard", get(leaderboard))
        .route("/ws/lobby", get(ws_lobby_handler))
        .route("/ws/game/:id", get(ws_game_handler))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    database: &'static str,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthBody> {
    let database = if state.results.ping().await.is_ok() {
        "connected"
    } else {
        "unavailable"
    };
    Json(HealthBody {
        status: "ok",
        database,
    })
}

async fn list_games(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummary>> {
    Json(state.registry.list_waiting().iter().map(RoomSummary::from).collect())
}

#[derive(Deserialize)]
struct NicknameBody {
    nickname: String,
}

async fn create_game(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NicknameBody>,
) -> Result<Json<Room>, AppError> {
    let id = Uuid::new_v4().to_string();
    state.registry.create_room(id.clone(), &body.nickname)?;
    state.broker.ensure_room(&id);

    let room = state.registry.get(&id).ok_or(AppError::NotFound)?;
    state.broker.broadcast_lobby(&state.lobby_snapshot());
    Ok(Json(room))
}

async fn get_game(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Room>, AppError> {
    state.registry.get(&id).map(Json).ok_or(AppError::NotFound)
}

async fn join_game(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<NicknameBody>,
) -> Result<Json<Room>, AppError> {
    let room = match state.registry.join_room(&id, &body.nickname) {
        Some(Ok(room)) => room,
        Some(Err(err)) => return Err(AppError::Room(err)),
        None => return Err(AppError::NotFound),
    };

    state.broker.broadcast_lobby(&state.lobby_snapshot());
    state.broker.broadcast_room(
        &id,
        &ServerEvent::PlayerJoined {
            nickname: body.nickname.trim().to_lowercase(),
            game: room.clone(),
        },
        None,
    );
    Ok(Json(room))
}

#[derive(Serialize)]
struct LeaderboardEntry {
    nickname: String,
    points: i64,
}

async fn leaderboard(State(state): State<Arc<AppState>>) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let rows = state
        .results
        .leaderboard()
        .await
        .map_err(|err| AppError::Internal(err.to_string()))?;
    Ok(Json(
        rows.into_iter()
            .map(|(nickname, points)| LeaderboardEntry { nickname, points })
            .collect(),
    ))
}

async fn ws_lobby_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_lobby_socket(socket, state))
}

async fn handle_lobby_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let initial = serde_json::to_string(&state.lobby_snapshot()).expect("ServerEvent always serializes");
    let _ = tx.send(Message::Text(initial));

    let lobby_id = state.broker.connect_lobby(tx);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Lobby is push-only: the client has nothing to send, we just drain
    // reads until it disconnects so a close handshake is observed.
    while ws_rx.next().await.is_some() {}

    state.broker.disconnect_lobby(lobby_id);
    let _ = writer.await;
}

#[derive(Deserialize)]
struct GameQuery {
    nickname: String,
}

async fn ws_game_handler(
    Path(room_id): Path<String>,
    Query(query): Query<GameQuery>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    let nickname = query.nickname.trim().to_lowercase();
    ws.on_upgrade(move |socket| handle_game_socket(socket, state, room_id, nickname))
}

async fn send_close(ws_tx: &mut SplitSink<WebSocket, Message>, code: u16, reason: &str) {
    let _ = ws_tx
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        })))
        .await;
}

async fn handle_game_socket(socket: WebSocket, state: Arc<AppState>, room_id: String, nickname: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let Some(room) = state.registry.get(&room_id) else {
        send_close(&mut ws_tx, 4000, "no such room").await;
        return;
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    if let Err(err) = state.broker.connect_room(&room, &nickname, tx) {
        send_close(&mut ws_tx, 4000, &err.to_string()).await;
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    state.broker.send_to(
        &room_id,
        &nickname,
        &ServerEvent::GameJoined {
            game: RoomView::for_viewer(&room, &nickname),
        },
    );
    state.broker.broadcast_room(
        &room_id,
        &ServerEvent::PlayerConnected {
            nickname: nickname.clone(),
        },
        Some(&nickname),
    );

    let room_tx = state.room_actor(&room_id);

    while let Some(Ok(msg)) = ws_rx.next().await {
        let Message::Text(text) = msg else { continue };
        match serde_json::from_str::<ClientAction>(&text) {
            Ok(ClientAction::StartGame) => {
                let _ = room_tx.send(RoomMsg::StartGame);
            }
            Ok(ClientAction::Action { action, amount }) => {
                let _ = room_tx.send(RoomMsg::Action {
                    nick: nickname.clone(),
                    action,
                    amount,
                });
            }
            Err(_) => {
                state.broker.send_to(
                    &room_id,
                    &nickname,
                    &ServerEvent::Error {
                        message: "malformed message".to_string(),
                    },
                );
            }
        }
    }

    state.broker.disconnect_room(&room_id, &nickname);
    state
        .broker
        .broadcast_room(&room_id, &ServerEvent::PlayerDisconnected { nickname }, None);
    let _ = writer.await;
}
