//! Store wrapper for tests that need slow or failing writes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{
    MemoryRoomStore, NewPlayer, NewRoom, PlayerUpdate, RoomStore, RoomUpdate, StoreError,
    StoreResult,
};
use crate::types::{GameRoom, RoomAnswer, RoomChange, RoomPlayer, RoomQuestion};

/// Delegates to a [`MemoryRoomStore`] with injectable faults
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryRoomStore,
    /// Correct-answer counts always read zero, as when two submissions race
    /// between the count and the insert
    pub hide_correct_answers: bool,
    /// Added before every room and question write
    pub write_delay: Duration,
    /// Number of score updates left to fail
    pub failing_score_updates: AtomicUsize,
    /// Number of question reads left to fail
    pub failing_question_reads: AtomicUsize,
}

impl FaultyStore {
    async fn slow_write(&self) {
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
    }
}

/// Counts down one injected failure; true while any were left
fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl RoomStore for FaultyStore {
    async fn insert_room(&self, room: NewRoom) -> StoreResult<GameRoom> {
        self.inner.insert_room(room).await
    }
    async fn delete_room(&self, room_id: &str) -> StoreResult<()> {
        self.inner.delete_room(room_id).await
    }
    async fn room(&self, room_id: &str) -> StoreResult<GameRoom> {
        self.inner.room(room_id).await
    }
    async fn room_by_code(&self, code: &str) -> StoreResult<GameRoom> {
        self.inner.room_by_code(code).await
    }
    async fn update_room(&self, room_id: &str, update: RoomUpdate) -> StoreResult<GameRoom> {
        self.slow_write().await;
        self.inner.update_room(room_id, update).await
    }
    async fn insert_player(&self, player: NewPlayer) -> StoreResult<RoomPlayer> {
        self.inner.insert_player(player).await
    }
    async fn delete_player(&self, room_id: &str, user_id: &str) -> StoreResult<()> {
        self.inner.delete_player(room_id, user_id).await
    }
    async fn player(&self, room_id: &str, user_id: &str) -> StoreResult<Option<RoomPlayer>> {
        self.inner.player(room_id, user_id).await
    }
    async fn players(&self, room_id: &str) -> StoreResult<Vec<RoomPlayer>> {
        self.inner.players(room_id).await
    }
    async fn count_players(&self, room_id: &str) -> StoreResult<usize> {
        self.inner.count_players(room_id).await
    }
    async fn update_player(
        &self,
        room_id: &str,
        user_id: &str,
        update: PlayerUpdate,
    ) -> StoreResult<RoomPlayer> {
        if update.score.is_some() && take_failure(&self.failing_score_updates) {
            return Err(StoreError::Backend("score write lost".to_string()));
        }
        self.inner.update_player(room_id, user_id, update).await
    }
    async fn replace_questions(
        &self,
        room_id: &str,
        questions: Vec<RoomQuestion>,
    ) -> StoreResult<()> {
        self.slow_write().await;
        self.inner.replace_questions(room_id, questions).await
    }
    async fn delete_questions(&self, room_id: &str) -> StoreResult<()> {
        self.slow_write().await;
        self.inner.delete_questions(room_id).await
    }
    async fn question(&self, room_id: &str, round: u32) -> StoreResult<Option<RoomQuestion>> {
        if take_failure(&self.failing_question_reads) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inner.question(room_id, round).await
    }
    async fn insert_answer(&self, answer: RoomAnswer) -> StoreResult<RoomAnswer> {
        self.inner.insert_answer(answer).await
    }
    async fn answer(
        &self,
        room_id: &str,
        user_id: &str,
        round: u32,
    ) -> StoreResult<Option<RoomAnswer>> {
        self.inner.answer(room_id, user_id, round).await
    }
    async fn answers(&self, room_id: &str, round: u32) -> StoreResult<Vec<RoomAnswer>> {
        self.inner.answers(room_id, round).await
    }
    async fn count_correct_answers(&self, room_id: &str, round: u32) -> StoreResult<usize> {
        if self.hide_correct_answers {
            return Ok(0);
        }
        self.inner.count_correct_answers(room_id, round).await
    }
    async fn total_points(&self, room_id: &str, user_id: &str) -> StoreResult<u32> {
        self.inner.total_points(room_id, user_id).await
    }
    fn subscribe(&self) -> broadcast::Receiver<RoomChange> {
        self.inner.subscribe()
    }
}
