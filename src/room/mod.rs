//! Multiplayer rooms: the shared store contract, the server-side room
//! operations, and the per-player client that mirrors a room locally.

pub mod client;
pub mod memory;
pub mod service;
#[cfg(test)]
pub(crate) mod testing;

pub use client::{ClientPhase, ClientState, RoomClient};
pub use memory::MemoryRoomStore;
pub use service::RoomService;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::broadcast;

use crate::types::{
    GameRoom, RoomAnswer, RoomChange, RoomPlayer, RoomQuestion, RoomSettings, RoomStatus,
};

const CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 6;

/// Random 6-character room code without look-alike characters
pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    UniqueViolation(String),

    /// A conditional update did not match the current row
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct NewRoom {
    pub code: String,
    pub host_id: String,
    pub settings: RoomSettings,
}

#[derive(Debug, Clone)]
pub struct NewPlayer {
    pub room_id: String,
    pub user_id: String,
    pub username: String,
    pub is_host: bool,
    pub is_ready: bool,
}

/// Partial room update. With `expected_status` set the update only applies
/// if the room is still in that status.
#[derive(Debug, Clone, Default)]
pub struct RoomUpdate {
    pub expected_status: Option<RoomStatus>,
    pub status: Option<RoomStatus>,
    pub current_round: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct PlayerUpdate {
    pub score: Option<u32>,
    pub is_ready: Option<bool>,
}

/// Shared relational store behind every room. Implementations must keep
/// room codes, `(room, user)` players, `(room, round)` questions and
/// `(room, user, round)` answers unique, and publish a [`RoomChange`] after
/// every successful write.
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn insert_room(&self, room: NewRoom) -> StoreResult<GameRoom>;
    async fn delete_room(&self, room_id: &str) -> StoreResult<()>;
    async fn room(&self, room_id: &str) -> StoreResult<GameRoom>;
    async fn room_by_code(&self, code: &str) -> StoreResult<GameRoom>;
    /// Apply a partial update; status never moves backwards
    async fn update_room(&self, room_id: &str, update: RoomUpdate) -> StoreResult<GameRoom>;

    async fn insert_player(&self, player: NewPlayer) -> StoreResult<RoomPlayer>;
    async fn delete_player(&self, room_id: &str, user_id: &str) -> StoreResult<()>;
    async fn player(&self, room_id: &str, user_id: &str) -> StoreResult<Option<RoomPlayer>>;
    /// Highest score first
    async fn players(&self, room_id: &str) -> StoreResult<Vec<RoomPlayer>>;
    async fn count_players(&self, room_id: &str) -> StoreResult<usize>;
    async fn update_player(
        &self,
        room_id: &str,
        user_id: &str,
        update: PlayerUpdate,
    ) -> StoreResult<RoomPlayer>;

    /// Swap in a room's whole question set in one write. Refused with
    /// [`StoreError::Conflict`] unless the room is still in the lobby.
    async fn replace_questions(&self, room_id: &str, questions: Vec<RoomQuestion>)
        -> StoreResult<()>;
    /// Lobby only, like [`RoomStore::replace_questions`]
    async fn delete_questions(&self, room_id: &str) -> StoreResult<()>;
    async fn question(&self, room_id: &str, round: u32) -> StoreResult<Option<RoomQuestion>>;

    async fn insert_answer(&self, answer: RoomAnswer) -> StoreResult<RoomAnswer>;
    async fn answer(
        &self,
        room_id: &str,
        user_id: &str,
        round: u32,
    ) -> StoreResult<Option<RoomAnswer>>;
    /// Earliest answer first
    async fn answers(&self, room_id: &str, round: u32) -> StoreResult<Vec<RoomAnswer>>;
    async fn count_correct_answers(&self, room_id: &str, round: u32) -> StoreResult<usize>;
    /// Sum of `points_earned` over every answer the user gave in the room
    async fn total_points(&self, room_id: &str, user_id: &str) -> StoreResult<u32>;

    /// Change feed for all rooms; consumers filter by room id
    fn subscribe(&self) -> broadcast::Receiver<RoomChange>;
}
