//! HTTP API for multiplayer rooms.
//!
//! Every route except the room lookup needs an `X-User-Id` header. The
//! `{room}` path segment is the room code for lookup and join, and the room
//! id everywhere else.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GameError;
use crate::identity::UserIdentity;
use crate::room::RoomService;
use crate::types::{
    AnswerResult, GameRoom, QuestionView, RoomAnswer, RoomPlayer, RoomQuestion, RoomSettings,
    RoomSnapshot,
};

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let status = match &self {
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::NotHost => StatusCode::FORBIDDEN,
            GameError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            GameError::InvalidTransition(_) | GameError::Conflict(_) | GameError::RoomFull => {
                StatusCode::CONFLICT
            }
            GameError::ContentUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GameError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GameError::Content(_) => StatusCode::BAD_GATEWAY,
            GameError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            error: self.to_string(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, GameError>;

pub fn router(service: Arc<RoomService>) -> Router {
    Router::new()
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/{room}", get(get_room))
        .route("/api/rooms/{room}/join", post(join_room))
        .route("/api/rooms/{room}/ready", post(set_ready))
        .route("/api/rooms/{room}/start", post(start_game))
        .route("/api/rooms/{room}/questions/{round}", get(get_question))
        .route("/api/rooms/{room}/answers", post(submit_answer))
        .route("/api/rooms/{room}/advance", post(advance_round))
        .route("/api/rooms/{room}/players/me", delete(leave_room))
        .route("/api/rooms/{room}/rounds/{round}/answers", get(round_answers))
        .route("/api/rooms/{room}/rounds/{round}/question", get(revealed_question))
        .route("/ws", get(crate::ws::ws_handler))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateRoomRequest {
    pub username: Option<String>,
    pub settings: Option<RoomSettings>,
}

/// POST /api/rooms
///
/// Creates a room with the caller as host and returns it.
pub async fn create_room(
    State(service): State<Arc<RoomService>>,
    user: UserIdentity,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<GameRoom>), GameError> {
    let username = user.display_name(req.username.as_deref());
    let settings = req.settings.unwrap_or(service.config().room);
    let room = service.create_room(&user.id, &username, settings).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// GET /api/rooms/{code}
pub async fn get_room(
    State(service): State<Arc<RoomService>>,
    Path(code): Path<String>,
) -> ApiResult<RoomSnapshot> {
    let room = service.room_by_code(&code).await?;
    Ok(Json(service.snapshot(&room.id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinRequest {
    pub username: Option<String>,
}

/// POST /api/rooms/{code}/join
pub async fn join_room(
    State(service): State<Arc<RoomService>>,
    Path(code): Path<String>,
    user: UserIdentity,
    Json(req): Json<JoinRequest>,
) -> ApiResult<GameRoom> {
    let username = user.display_name(req.username.as_deref());
    Ok(Json(service.join_room(&code, &user.id, &username).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReadyRequest {
    pub ready: bool,
}

/// POST /api/rooms/{room_id}/ready
pub async fn set_ready(
    State(service): State<Arc<RoomService>>,
    Path(room_id): Path<String>,
    user: UserIdentity,
    Json(req): Json<ReadyRequest>,
) -> ApiResult<RoomPlayer> {
    Ok(Json(service.toggle_ready(&room_id, &user.id, req.ready).await?))
}

/// POST /api/rooms/{room_id}/start
pub async fn start_game(
    State(service): State<Arc<RoomService>>,
    Path(room_id): Path<String>,
    user: UserIdentity,
) -> ApiResult<GameRoom> {
    Ok(Json(service.start_game(&room_id, &user.id).await?))
}

/// GET /api/rooms/{room_id}/questions/{round}
///
/// Options only; the answer is withheld while the round is open.
pub async fn get_question(
    State(service): State<Arc<RoomService>>,
    Path((room_id, round)): Path<(String, u32)>,
    _user: UserIdentity,
) -> ApiResult<QuestionView> {
    Ok(Json(service.question(&room_id, round).await?))
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub round: u32,
    pub answer: Option<String>,
    pub time_ms: u64,
}

/// POST /api/rooms/{room_id}/answers
pub async fn submit_answer(
    State(service): State<Arc<RoomService>>,
    Path(room_id): Path<String>,
    user: UserIdentity,
    Json(req): Json<AnswerRequest>,
) -> ApiResult<AnswerResult> {
    let result = service
        .submit_answer(
            &room_id,
            &user.id,
            req.round,
            req.answer.as_deref(),
            req.time_ms,
        )
        .await?;
    Ok(Json(result))
}

/// POST /api/rooms/{room_id}/advance
///
/// Host only. Returns the room after the move; `finished` once past the last round.
pub async fn advance_round(
    State(service): State<Arc<RoomService>>,
    Path(room_id): Path<String>,
    user: UserIdentity,
) -> ApiResult<GameRoom> {
    Ok(Json(service.advance_round(&room_id, &user.id).await?))
}

/// DELETE /api/rooms/{room_id}/players/me
pub async fn leave_room(
    State(service): State<Arc<RoomService>>,
    Path(room_id): Path<String>,
    user: UserIdentity,
) -> Result<StatusCode, GameError> {
    service.leave_room(&room_id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/rooms/{room_id}/rounds/{round}/answers
///
/// Members only, after the round is over
pub async fn round_answers(
    State(service): State<Arc<RoomService>>,
    Path((room_id, round)): Path<(String, u32)>,
    user: UserIdentity,
) -> ApiResult<Vec<RoomAnswer>> {
    Ok(Json(service.round_answers(&room_id, &user.id, round).await?))
}

/// GET /api/rooms/{room_id}/rounds/{round}/question
pub async fn revealed_question(
    State(service): State<Arc<RoomService>>,
    Path((room_id, round)): Path<(String, u32)>,
    _user: UserIdentity,
) -> ApiResult<RoomQuestion> {
    Ok(Json(service.revealed_question(&room_id, round).await?))
}
