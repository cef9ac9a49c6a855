use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;

use super::{
    generate_room_code, normalize_code, NewPlayer, NewRoom, PlayerUpdate, RoomStore, RoomUpdate,
    StoreError, StoreResult,
};
use crate::config::GameConfig;
use crate::content::{build_options, ContentProvider};
use crate::error::{with_timeout, GameError, GameResult};
use crate::redact::redact_excerpt;
use crate::scoring::{multiplayer_points, FIRST_CORRECT_BONUS};
use crate::types::{
    AnswerResult, GameRoom, QuestionView, RoomAnswer, RoomChange, RoomPlayer, RoomQuestion,
    RoomSettings, RoomSnapshot, RoomStatus, WikiTopic,
};

/// Articles drawn per round: the answer and three wrong options
const ARTICLES_PER_ROUND: u32 = 4;
const MAX_ROUNDS: u32 = 20;
const MAX_PLAYERS: u32 = 16;
const TIME_PER_ROUND_RANGE: (u32, u32) = (5, 120);

/// Server-side room operations. Every store and content call is bounded by
/// the configured timeouts; host-only actions are checked here.
pub struct RoomService {
    store: Arc<dyn RoomStore>,
    content: Arc<dyn ContentProvider>,
    config: GameConfig,
}

impl RoomService {
    pub fn new(
        store: Arc<dyn RoomStore>,
        content: Arc<dyn ContentProvider>,
        config: GameConfig,
    ) -> Self {
        Self {
            store,
            content,
            config,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomChange> {
        self.store.subscribe()
    }

    async fn query<T, F>(&self, operation: &'static str, fut: F) -> GameResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        with_timeout(self.config.query_timeout, operation, fut).await
    }

    /// Like [`Self::query`] but hands back the raw store result for callers
    /// that react to specific store errors
    async fn query_raw<T, F>(&self, operation: &'static str, fut: F) -> GameResult<StoreResult<T>>
    where
        F: Future<Output = StoreResult<T>>,
    {
        with_timeout(self.config.query_timeout, operation, async {
            Ok::<_, GameError>(fut.await)
        })
        .await
    }

    // ========== Lobby ==========

    /// Create a room with the caller as host. Retries on room code collisions.
    pub async fn create_room(
        &self,
        host_id: &str,
        username: &str,
        settings: RoomSettings,
    ) -> GameResult<GameRoom> {
        let settings = RoomSettings {
            total_rounds: settings.total_rounds.clamp(1, MAX_ROUNDS),
            time_per_round: settings
                .time_per_round
                .clamp(TIME_PER_ROUND_RANGE.0, TIME_PER_ROUND_RANGE.1),
            max_players: settings.max_players.clamp(1, MAX_PLAYERS),
        };

        for attempt in 1..=self.config.room_code_attempts {
            let new_room = NewRoom {
                code: generate_room_code(),
                host_id: host_id.to_string(),
                settings,
            };
            let room = match self
                .query_raw("Room creation", self.store.insert_room(new_room))
                .await?
            {
                Ok(room) => room,
                Err(StoreError::UniqueViolation(_)) => {
                    tracing::debug!("Room code collision (attempt {})", attempt);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let host = NewPlayer {
                room_id: room.id.clone(),
                user_id: host_id.to_string(),
                username: username.to_string(),
                is_host: true,
                is_ready: true,
            };
            if let Err(e) = self
                .query("Adding host to room", self.store.insert_player(host))
                .await
            {
                tracing::warn!("Failed to add host to room {}: {}", room.code, e);
                if let Err(cleanup) = self
                    .query("Room cleanup", self.store.delete_room(&room.id))
                    .await
                {
                    tracing::error!("Failed to remove room {}: {}", room.code, cleanup);
                }
                return Err(e);
            }

            tracing::info!("Room {} created by {}", room.code, host_id);
            return Ok(room);
        }

        Err(GameError::Conflict(
            "Could not generate a unique room code".to_string(),
        ))
    }

    /// Join by code. Joining a room one is already in returns it unchanged.
    pub async fn join_room(&self, code: &str, user_id: &str, username: &str) -> GameResult<GameRoom> {
        let room = self.room_by_code(code).await?;

        if self
            .query("Existing player check", self.store.player(&room.id, user_id))
            .await?
            .is_some()
        {
            return Ok(room);
        }

        if room.status != RoomStatus::Lobby {
            return Err(GameError::InvalidTransition(
                "Game already in progress".to_string(),
            ));
        }

        let count = self
            .query("Player count check", self.store.count_players(&room.id))
            .await?;
        if count >= room.max_players as usize {
            return Err(GameError::RoomFull);
        }

        let player = NewPlayer {
            room_id: room.id.clone(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            is_host: false,
            is_ready: false,
        };
        match self
            .query_raw("Joining room", self.store.insert_player(player))
            .await?
        {
            // A concurrent join for the same user got there first
            Ok(_) | Err(StoreError::UniqueViolation(_)) => {
                tracing::info!("{} joined room {}", user_id, room.code);
                Ok(room)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the caller from the room. Room status is left alone.
    pub async fn leave_room(&self, room_id: &str, user_id: &str) -> GameResult<()> {
        match self
            .query_raw("Leaving room", self.store.delete_player(room_id, user_id))
            .await?
        {
            Ok(()) | Err(StoreError::NotFound(_)) => {
                tracing::info!("{} left room {}", user_id, room_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn toggle_ready(
        &self,
        room_id: &str,
        user_id: &str,
        ready: bool,
    ) -> GameResult<RoomPlayer> {
        self.query(
            "Updating ready state",
            self.store.update_player(
                room_id,
                user_id,
                PlayerUpdate {
                    is_ready: Some(ready),
                    ..Default::default()
                },
            ),
        )
        .await
    }

    // ========== Reads ==========

    pub async fn room_by_code(&self, code: &str) -> GameResult<GameRoom> {
        self.query("Room lookup", self.store.room_by_code(&normalize_code(code)))
            .await
    }

    pub async fn room(&self, room_id: &str) -> GameResult<GameRoom> {
        self.query("Room lookup", self.store.room(room_id)).await
    }

    pub async fn players(&self, room_id: &str) -> GameResult<Vec<RoomPlayer>> {
        self.query("Getting room players", self.store.players(room_id))
            .await
    }

    /// Room and players, read in that order
    pub async fn snapshot(&self, room_id: &str) -> GameResult<RoomSnapshot> {
        let room = self.room(room_id).await?;
        let players = self.players(room_id).await?;
        Ok(RoomSnapshot { room, players })
    }

    /// Question for a round that has been opened, without its answer
    pub async fn question(&self, room_id: &str, round: u32) -> GameResult<QuestionView> {
        let room = self.room(room_id).await?;
        if room.status == RoomStatus::Lobby || round == 0 || round > room.current_round {
            return Err(GameError::NotFound("Question".to_string()));
        }
        self.stored_question(room_id, round)
            .await
            .map(|q| q.view())
    }

    /// Full question including the answer, once its round is over
    pub async fn revealed_question(&self, room_id: &str, round: u32) -> GameResult<RoomQuestion> {
        let room = self.room(room_id).await?;
        let over = match room.status {
            RoomStatus::Lobby => false,
            RoomStatus::Playing => round < room.current_round,
            RoomStatus::Finished => round <= room.total_rounds,
        };
        if !over {
            return Err(GameError::NotFound("Question".to_string()));
        }
        self.stored_question(room_id, round).await
    }

    async fn stored_question(&self, room_id: &str, round: u32) -> GameResult<RoomQuestion> {
        self.query("Getting question", self.store.question(room_id, round))
            .await?
            .ok_or_else(|| GameError::NotFound("Question".to_string()))
    }

    /// Answers for one round, earliest first. Members only, once the round
    /// is over.
    pub async fn round_answers(
        &self,
        room_id: &str,
        user_id: &str,
        round: u32,
    ) -> GameResult<Vec<RoomAnswer>> {
        let room = self.room(room_id).await?;
        if self
            .query("Player lookup", self.store.player(room_id, user_id))
            .await?
            .is_none()
        {
            return Err(GameError::NotFound("Player".to_string()));
        }
        let over = match room.status {
            RoomStatus::Lobby => false,
            RoomStatus::Playing => round < room.current_round,
            RoomStatus::Finished => true,
        };
        if !over {
            return Err(GameError::InvalidTransition(format!(
                "Round {} is still open",
                round
            )));
        }
        self.query("Getting round answers", self.store.answers(room_id, round))
            .await
    }

    // ========== Game flow ==========

    /// Host only. Generates every round's question up front and opens round
    /// 1. Any failure leaves the room in the lobby with no questions. The
    /// store refuses question writes once the room has left the lobby, so an
    /// overlapping start can neither wipe nor replace the winner's questions.
    pub async fn start_game(&self, room_id: &str, user_id: &str) -> GameResult<GameRoom> {
        let room = self.room(room_id).await?;
        if room.host_id != user_id {
            return Err(GameError::NotHost);
        }
        if room.status != RoomStatus::Lobby {
            return Err(GameError::InvalidTransition(
                "Game already started".to_string(),
            ));
        }

        let needed = (room.total_rounds * ARTICLES_PER_ROUND) as usize;
        let articles = with_timeout(
            self.config.content_timeout,
            "Article fetch",
            self.content.fetch_random_articles(needed),
        )
        .await?;
        let questions = build_room_questions(&room, articles)?;

        self.query(
            "Storing questions",
            self.store.replace_questions(room_id, questions),
        )
        .await?;

        let update = RoomUpdate {
            expected_status: Some(RoomStatus::Lobby),
            status: Some(RoomStatus::Playing),
            current_round: Some(1),
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        match self
            .query("Starting game", self.store.update_room(room_id, update))
            .await
        {
            Ok(room) => {
                tracing::info!("Room {} started with {} rounds", room.code, room.total_rounds);
                Ok(room)
            }
            Err(e) => {
                tracing::warn!("Failed to start room {}: {}", room.code, e);
                match self
                    .query_raw("Clearing questions", self.store.delete_questions(room_id))
                    .await
                {
                    Ok(Ok(())) => {}
                    // Another start won; its questions stay
                    Ok(Err(StoreError::Conflict(_))) => {
                        tracing::debug!("Room {} already started elsewhere", room.code);
                    }
                    Ok(Err(cleanup)) => {
                        tracing::error!("Failed to clear questions of {}: {}", room.code, cleanup);
                    }
                    Err(cleanup) => {
                        tracing::error!("Failed to clear questions of {}: {}", room.code, cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    /// Score and record an answer for the open round. A repeated submission
    /// gets the originally recorded result back. The player's score is always
    /// rewritten from the answer log, so a retry after a failed score write
    /// still lands the points.
    pub async fn submit_answer(
        &self,
        room_id: &str,
        user_id: &str,
        round: u32,
        answer: Option<&str>,
        time_ms: u64,
    ) -> GameResult<AnswerResult> {
        let room = self.room(room_id).await?;
        if room.status != RoomStatus::Playing || round != room.current_round {
            return Err(GameError::InvalidTransition(format!(
                "Round {} is not open",
                round
            )));
        }

        let Some(player) = self
            .query("Player lookup", self.store.player(room_id, user_id))
            .await?
        else {
            return Err(GameError::NotFound("Player".to_string()));
        };

        if let Some(existing) = self
            .query("Answer lookup", self.store.answer(room_id, user_id, round))
            .await?
        {
            self.sync_score(&player).await?;
            return Ok(recorded_result(&existing));
        }

        let question = self.stored_question(room_id, round).await?;
        let is_correct = answer == Some(question.correct_answer.as_str());

        let mut points = multiplayer_points(is_correct, time_ms);
        if is_correct {
            // Check-then-insert: two simultaneous first answers can both get it
            let correct_so_far = self
                .query(
                    "Counting correct answers",
                    self.store.count_correct_answers(room_id, round),
                )
                .await?;
            if correct_so_far == 0 {
                points += FIRST_CORRECT_BONUS;
            }
        }

        let record = RoomAnswer {
            id: ulid::Ulid::new().to_string(),
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            round_number: round,
            answer: answer.map(str::to_string),
            is_correct,
            time_ms: Some(time_ms),
            points_earned: points,
            answered_at: Utc::now(),
        };
        match self
            .query_raw("Submitting answer", self.store.insert_answer(record))
            .await?
        {
            Ok(_) => {}
            Err(StoreError::UniqueViolation(_)) => {
                let existing = self
                    .query("Answer lookup", self.store.answer(room_id, user_id, round))
                    .await?
                    .ok_or_else(|| GameError::NotFound("Answer".to_string()))?;
                self.sync_score(&player).await?;
                return Ok(recorded_result(&existing));
            }
            Err(e) => return Err(e.into()),
        }

        self.sync_score(&player).await?;

        tracing::debug!(
            "{} answered round {} of {}: correct={} points={}",
            user_id,
            round,
            room.code,
            is_correct,
            points
        );
        Ok(AnswerResult { points, is_correct })
    }

    /// Set the player's score to the sum of their recorded answers
    async fn sync_score(&self, player: &RoomPlayer) -> GameResult<()> {
        let total = self
            .query(
                "Summing points",
                self.store.total_points(&player.room_id, &player.user_id),
            )
            .await?;
        if total == player.score {
            return Ok(());
        }
        self.query(
            "Updating score",
            self.store.update_player(
                &player.room_id,
                &player.user_id,
                PlayerUpdate {
                    score: Some(total),
                    ..Default::default()
                },
            ),
        )
        .await?;
        Ok(())
    }

    /// Host only. Opens the next round, or finishes the game after the last.
    pub async fn advance_round(&self, room_id: &str, user_id: &str) -> GameResult<GameRoom> {
        let room = self.room(room_id).await?;
        if room.host_id != user_id {
            return Err(GameError::NotHost);
        }

        let update = match room.status {
            RoomStatus::Lobby => {
                return Err(GameError::InvalidTransition(
                    "Game has not started".to_string(),
                ))
            }
            RoomStatus::Finished => return Ok(room),
            RoomStatus::Playing if room.current_round >= room.total_rounds => RoomUpdate {
                expected_status: Some(RoomStatus::Playing),
                status: Some(RoomStatus::Finished),
                finished_at: Some(Utc::now()),
                ..Default::default()
            },
            RoomStatus::Playing => RoomUpdate {
                expected_status: Some(RoomStatus::Playing),
                current_round: Some(room.current_round + 1),
                ..Default::default()
            },
        };

        let updated = self
            .query("Advancing round", self.store.update_room(room_id, update))
            .await?;
        if updated.status == RoomStatus::Finished {
            tracing::info!("Room {} finished", updated.code);
        } else {
            tracing::info!("Room {} on round {}", updated.code, updated.current_round);
        }
        Ok(updated)
    }
}

fn recorded_result(answer: &RoomAnswer) -> AnswerResult {
    AnswerResult {
        points: answer.points_earned,
        is_correct: answer.is_correct,
    }
}

/// One question per round. Articles with an excerpt become answers; every
/// other title is used as a wrong option.
fn build_room_questions(room: &GameRoom, articles: Vec<WikiTopic>) -> GameResult<Vec<RoomQuestion>> {
    let rounds = room.total_rounds as usize;
    let needed = rounds * ARTICLES_PER_ROUND as usize;

    let mut seen = HashSet::new();
    let articles: Vec<WikiTopic> = articles
        .into_iter()
        .filter(|a| seen.insert(a.title.clone()))
        .collect();

    let (with_excerpt, without): (Vec<_>, Vec<_>) =
        articles.into_iter().partition(|a| !a.excerpt.is_empty());
    let available = with_excerpt.len() + without.len();
    if with_excerpt.len() < rounds || available < needed {
        return Err(GameError::ContentUnavailable { needed, available });
    }

    let mut with_excerpt = with_excerpt.into_iter();
    let answers: Vec<WikiTopic> = with_excerpt.by_ref().take(rounds).collect();
    let wrong: Vec<String> = with_excerpt.chain(without).map(|a| a.title).collect();
    let per_round = (ARTICLES_PER_ROUND - 1) as usize;

    let mut rng = rand::rng();
    answers
        .into_iter()
        .zip(wrong.chunks(per_round))
        .enumerate()
        .map(|(i, (topic, wrong_titles))| {
            let options = build_options(&topic.title, wrong_titles, &mut rng)?;
            Ok(RoomQuestion {
                id: ulid::Ulid::new().to_string(),
                room_id: room.id.clone(),
                round_number: i as u32 + 1,
                topic_excerpt: Some(redact_excerpt(&topic.excerpt, &topic.title)),
                topic_image_url: topic.image_url,
                topic_page_url: Some(topic.page_url),
                options,
                correct_answer: topic.title.clone(),
                topic_title: topic.title,
            })
        })
        .collect::<Result<Vec<_>, crate::content::ContentError>>()
        .map_err(|e| {
            tracing::warn!("Could not build questions for {}: {}", room.code, e);
            GameError::ContentUnavailable { needed, available }
        })
}
