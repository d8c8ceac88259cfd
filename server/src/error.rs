use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use holdem_engine::RoomError;

/// Broker-level failures, surfaced when a websocket connection tries to
/// attach to a room.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("no such room")]
    NoSuchRoom,
    #[error("nickname is not a player in this room")]
    NotAPlayer,
}

/// Top-level HTTP/WS error, wrapping the engine's structural `RoomError`
/// and the broker's connection errors behind one `IntoResponse` impl.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error(transparent)]
    Room(#[from] RoomError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("room not found")]
    NotFound,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Room(RoomError::EmptyNickname) => StatusCode::BAD_REQUEST,
            AppError::Room(RoomError::DuplicateNickname(_)) => StatusCode::BAD_REQUEST,
            AppError::Room(RoomError::RoomFull) => StatusCode::BAD_REQUEST,
            AppError::Room(RoomError::AlreadyStarted) => StatusCode::BAD_REQUEST,
            AppError::Broker(BrokerError::NoSuchRoom) => StatusCode::NOT_FOUND,
            AppError::Broker(BrokerError::NotAPlayer) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
