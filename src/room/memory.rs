use super::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::{ChangeKind, RoomId, UserId};

/// In-process [`RoomStore`], used by the server binary and by tests
#[derive(Clone)]
pub struct MemoryRoomStore {
    rooms: Arc<RwLock<HashMap<RoomId, GameRoom>>>,
    players: Arc<RwLock<HashMap<(RoomId, UserId), RoomPlayer>>>,
    questions: Arc<RwLock<HashMap<(RoomId, u32), RoomQuestion>>>,
    /// Append-only, in insertion order
    answers: Arc<RwLock<Vec<RoomAnswer>>>,
    changes: broadcast::Sender<RoomChange>,
}

impl Default for MemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(256);
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            players: Arc::new(RwLock::new(HashMap::new())),
            questions: Arc::new(RwLock::new(HashMap::new())),
            answers: Arc::new(RwLock::new(Vec::new())),
            changes,
        }
    }

    fn notify(&self, room_id: &str, kind: ChangeKind) {
        // No receivers is fine
        let _ = self.changes.send(RoomChange {
            room_id: room_id.to_string(),
            kind,
        });
    }

    async fn ensure_room(&self, room_id: &str) -> StoreResult<()> {
        if self.rooms.read().await.contains_key(room_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound("Room".to_string()))
        }
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn insert_room(&self, room: NewRoom) -> StoreResult<GameRoom> {
        let mut rooms = self.rooms.write().await;
        if rooms.values().any(|r| r.code == room.code) {
            return Err(StoreError::UniqueViolation(format!("Room code {}", room.code)));
        }

        let record = GameRoom {
            id: ulid::Ulid::new().to_string(),
            code: room.code,
            host_id: room.host_id,
            status: RoomStatus::Lobby,
            current_round: 0,
            total_rounds: room.settings.total_rounds,
            time_per_round: room.settings.time_per_round,
            max_players: room.settings.max_players,
            version: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        rooms.insert(record.id.clone(), record.clone());
        drop(rooms);

        self.notify(&record.id, ChangeKind::Room);
        Ok(record)
    }

    async fn delete_room(&self, room_id: &str) -> StoreResult<()> {
        if self.rooms.write().await.remove(room_id).is_none() {
            return Err(StoreError::NotFound("Room".to_string()));
        }
        self.players.write().await.retain(|(r, _), _| r != room_id);
        self.questions.write().await.retain(|(r, _), _| r != room_id);
        self.answers.write().await.retain(|a| a.room_id != room_id);

        self.notify(room_id, ChangeKind::Room);
        Ok(())
    }

    async fn room(&self, room_id: &str) -> StoreResult<GameRoom> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Room".to_string()))
    }

    async fn room_by_code(&self, code: &str) -> StoreResult<GameRoom> {
        self.rooms
            .read()
            .await
            .values()
            .find(|r| r.code == code)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Room".to_string()))
    }

    async fn update_room(&self, room_id: &str, update: RoomUpdate) -> StoreResult<GameRoom> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| StoreError::NotFound("Room".to_string()))?;

        if let Some(expected) = update.expected_status {
            if room.status != expected {
                return Err(StoreError::Conflict(format!(
                    "Room is {:?}, expected {:?}",
                    room.status, expected
                )));
            }
        }
        if let Some(status) = update.status {
            if status < room.status {
                return Err(StoreError::Conflict(format!(
                    "Room cannot go from {:?} back to {:?}",
                    room.status, status
                )));
            }
        }
        if let Some(round) = update.current_round {
            if round < room.current_round {
                return Err(StoreError::Conflict(format!(
                    "Round cannot go from {} back to {}",
                    room.current_round, round
                )));
            }
        }

        if let Some(status) = update.status {
            room.status = status;
        }
        if let Some(round) = update.current_round {
            room.current_round = round;
        }
        if update.started_at.is_some() {
            room.started_at = update.started_at;
        }
        if update.finished_at.is_some() {
            room.finished_at = update.finished_at;
        }
        room.version += 1;

        let updated = room.clone();
        drop(rooms);

        self.notify(room_id, ChangeKind::Room);
        Ok(updated)
    }

    async fn insert_player(&self, player: NewPlayer) -> StoreResult<RoomPlayer> {
        self.ensure_room(&player.room_id).await?;

        let key = (player.room_id.clone(), player.user_id.clone());
        let mut players = self.players.write().await;
        if players.contains_key(&key) {
            return Err(StoreError::UniqueViolation("Player".to_string()));
        }

        let record = RoomPlayer {
            id: ulid::Ulid::new().to_string(),
            room_id: player.room_id,
            user_id: player.user_id,
            username: player.username,
            score: 0,
            is_ready: player.is_ready,
            is_host: player.is_host,
            joined_at: Utc::now(),
        };
        players.insert(key, record.clone());
        drop(players);

        self.notify(&record.room_id, ChangeKind::Players);
        Ok(record)
    }

    async fn delete_player(&self, room_id: &str, user_id: &str) -> StoreResult<()> {
        let removed = self
            .players
            .write()
            .await
            .remove(&(room_id.to_string(), user_id.to_string()));
        if removed.is_none() {
            return Err(StoreError::NotFound("Player".to_string()));
        }
        self.notify(room_id, ChangeKind::Players);
        Ok(())
    }

    async fn player(&self, room_id: &str, user_id: &str) -> StoreResult<Option<RoomPlayer>> {
        Ok(self
            .players
            .read()
            .await
            .get(&(room_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn players(&self, room_id: &str) -> StoreResult<Vec<RoomPlayer>> {
        let mut players: Vec<RoomPlayer> = self
            .players
            .read()
            .await
            .values()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect();
        players.sort_by(|a, b| b.score.cmp(&a.score).then(a.joined_at.cmp(&b.joined_at)));
        Ok(players)
    }

    async fn count_players(&self, room_id: &str) -> StoreResult<usize> {
        Ok(self
            .players
            .read()
            .await
            .keys()
            .filter(|(r, _)| r == room_id)
            .count())
    }

    async fn update_player(
        &self,
        room_id: &str,
        user_id: &str,
        update: PlayerUpdate,
    ) -> StoreResult<RoomPlayer> {
        let mut players = self.players.write().await;
        let player = players
            .get_mut(&(room_id.to_string(), user_id.to_string()))
            .ok_or_else(|| StoreError::NotFound("Player".to_string()))?;

        if let Some(score) = update.score {
            player.score = score;
        }
        if let Some(ready) = update.is_ready {
            player.is_ready = ready;
        }
        let updated = player.clone();
        drop(players);

        self.notify(room_id, ChangeKind::Players);
        Ok(updated)
    }

    async fn replace_questions(
        &self,
        room_id: &str,
        questions: Vec<RoomQuestion>,
    ) -> StoreResult<()> {
        // Held across the write so the room cannot start underneath it
        let rooms = self.rooms.read().await;
        ensure_lobby(&rooms, room_id)?;
        if let Some(stray) = questions.iter().find(|q| q.room_id != room_id) {
            return Err(StoreError::Backend(format!(
                "Question {} belongs to room {}",
                stray.id, stray.room_id
            )));
        }

        let mut stored = self.questions.write().await;
        stored.retain(|(r, _), _| r != room_id);
        for question in questions {
            stored.insert((question.room_id.clone(), question.round_number), question);
        }
        drop(stored);
        drop(rooms);

        self.notify(room_id, ChangeKind::Questions);
        Ok(())
    }

    async fn delete_questions(&self, room_id: &str) -> StoreResult<()> {
        let rooms = self.rooms.read().await;
        ensure_lobby(&rooms, room_id)?;
        self.questions.write().await.retain(|(r, _), _| r != room_id);
        drop(rooms);

        self.notify(room_id, ChangeKind::Questions);
        Ok(())
    }

    async fn question(&self, room_id: &str, round: u32) -> StoreResult<Option<RoomQuestion>> {
        Ok(self
            .questions
            .read()
            .await
            .get(&(room_id.to_string(), round))
            .cloned())
    }

    async fn insert_answer(&self, answer: RoomAnswer) -> StoreResult<RoomAnswer> {
        self.ensure_room(&answer.room_id).await?;

        let mut answers = self.answers.write().await;
        if answers.iter().any(|a| {
            a.room_id == answer.room_id
                && a.user_id == answer.user_id
                && a.round_number == answer.round_number
        }) {
            return Err(StoreError::UniqueViolation("Answer".to_string()));
        }
        answers.push(answer.clone());
        drop(answers);

        self.notify(&answer.room_id, ChangeKind::Answers);
        Ok(answer)
    }

    async fn answer(
        &self,
        room_id: &str,
        user_id: &str,
        round: u32,
    ) -> StoreResult<Option<RoomAnswer>> {
        Ok(self
            .answers
            .read()
            .await
            .iter()
            .find(|a| a.room_id == room_id && a.user_id == user_id && a.round_number == round)
            .cloned())
    }

    async fn answers(&self, room_id: &str, round: u32) -> StoreResult<Vec<RoomAnswer>> {
        let mut answers: Vec<RoomAnswer> = self
            .answers
            .read()
            .await
            .iter()
            .filter(|a| a.room_id == room_id && a.round_number == round)
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.answered_at);
        Ok(answers)
    }

    async fn count_correct_answers(&self, room_id: &str, round: u32) -> StoreResult<usize> {
        Ok(self
            .answers
            .read()
            .await
            .iter()
            .filter(|a| a.room_id == room_id && a.round_number == round && a.is_correct)
            .count())
    }

    async fn total_points(&self, room_id: &str, user_id: &str) -> StoreResult<u32> {
        Ok(self
            .answers
            .read()
            .await
            .iter()
            .filter(|a| a.room_id == room_id && a.user_id == user_id)
            .map(|a| a.points_earned)
            .sum())
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomChange> {
        self.changes.subscribe()
    }
}

/// Questions are only written before the game starts
fn ensure_lobby(rooms: &HashMap<RoomId, GameRoom>, room_id: &str) -> StoreResult<()> {
    match rooms.get(room_id) {
        None => Err(StoreError::NotFound("Room".to_string())),
        Some(room) if room.status != RoomStatus::Lobby => Err(StoreError::Conflict(format!(
            "Room is {:?}, questions are fixed",
            room.status
        ))),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn room_with_host(store: &MemoryRoomStore) -> GameRoom {
        let room = store
            .insert_room(NewRoom {
                code: "ABC234".to_string(),
                host_id: "host".to_string(),
                settings: RoomSettings::default(),
            })
            .await
            .unwrap();
        store
            .insert_player(NewPlayer {
                room_id: room.id.clone(),
                user_id: "host".to_string(),
                username: "Host".to_string(),
                is_host: true,
                is_ready: true,
            })
            .await
            .unwrap();
        room
    }

    fn question(room_id: &str, round: u32, title: &str) -> RoomQuestion {
        RoomQuestion {
            id: ulid::Ulid::new().to_string(),
            room_id: room_id.to_string(),
            round_number: round,
            topic_title: title.to_string(),
            topic_excerpt: None,
            topic_image_url: None,
            topic_page_url: None,
            options: vec![title.to_string(), "Other".to_string()],
            correct_answer: title.to_string(),
        }
    }

    fn answer(room_id: &str, user: &str, round: u32, correct: bool) -> RoomAnswer {
        RoomAnswer {
            id: ulid::Ulid::new().to_string(),
            room_id: room_id.to_string(),
            user_id: user.to_string(),
            round_number: round,
            answer: Some("x".to_string()),
            is_correct: correct,
            time_ms: Some(1_000),
            points_earned: 0,
            answered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_room_code_is_unique() {
        let store = MemoryRoomStore::new();
        room_with_host(&store).await;
        let err = store
            .insert_room(NewRoom {
                code: "ABC234".to_string(),
                host_id: "other".to_string(),
                settings: RoomSettings::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_status_never_regresses_and_version_bumps() {
        let store = MemoryRoomStore::new();
        let room = room_with_host(&store).await;

        let playing = store
            .update_room(
                &room.id,
                RoomUpdate {
                    expected_status: Some(RoomStatus::Lobby),
                    status: Some(RoomStatus::Playing),
                    current_round: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(playing.version, 1);

        let err = store
            .update_room(
                &room.id,
                RoomUpdate {
                    status: Some(RoomStatus::Lobby),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Conditional update no longer matches
        let err = store
            .update_room(
                &room.id,
                RoomUpdate {
                    expected_status: Some(RoomStatus::Lobby),
                    status: Some(RoomStatus::Playing),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.room(&room.id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_answers_first_write_wins() {
        let store = MemoryRoomStore::new();
        let room = room_with_host(&store).await;

        store.insert_answer(answer(&room.id, "host", 1, true)).await.unwrap();
        let err = store
            .insert_answer(answer(&room.id, "host", 1, false))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));

        assert_eq!(store.count_correct_answers(&room.id, 1).await.unwrap(), 1);
        assert_eq!(store.count_correct_answers(&room.id, 2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_questions_fixed_once_playing() {
        let store = MemoryRoomStore::new();
        let room = room_with_host(&store).await;

        store
            .replace_questions(&room.id, vec![question(&room.id, 1, "Old")])
            .await
            .unwrap();
        store
            .replace_questions(
                &room.id,
                vec![question(&room.id, 1, "Paris"), question(&room.id, 2, "Rome")],
            )
            .await
            .unwrap();
        assert_eq!(
            store.question(&room.id, 1).await.unwrap().unwrap().correct_answer,
            "Paris"
        );

        store
            .update_room(
                &room.id,
                RoomUpdate {
                    expected_status: Some(RoomStatus::Lobby),
                    status: Some(RoomStatus::Playing),
                    current_round: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = store
            .replace_questions(&room.id, vec![question(&room.id, 1, "Berlin")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        let err = store.delete_questions(&room.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        assert_eq!(
            store.question(&room.id, 1).await.unwrap().unwrap().correct_answer,
            "Paris"
        );
        assert!(store.question(&room.id, 2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_total_points_sums_answer_log() {
        let store = MemoryRoomStore::new();
        let room = room_with_host(&store).await;

        let mut first = answer(&room.id, "host", 1, true);
        first.points_earned = 250;
        let mut second = answer(&room.id, "host", 2, true);
        second.points_earned = 120;
        store.insert_answer(first).await.unwrap();
        store.insert_answer(second).await.unwrap();
        store.insert_answer(answer(&room.id, "guest", 1, false)).await.unwrap();

        assert_eq!(store.total_points(&room.id, "host").await.unwrap(), 370);
        assert_eq!(store.total_points(&room.id, "guest").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_writes_are_published() {
        let store = MemoryRoomStore::new();
        let mut changes = store.subscribe();
        let room = room_with_host(&store).await;

        assert_eq!(
            changes.recv().await.unwrap(),
            RoomChange {
                room_id: room.id.clone(),
                kind: ChangeKind::Room
            }
        );
        assert_eq!(changes.recv().await.unwrap().kind, ChangeKind::Players);
    }

    #[tokio::test]
    async fn test_delete_room_cascades() {
        let store = MemoryRoomStore::new();
        let room = room_with_host(&store).await;
        store.insert_answer(answer(&room.id, "host", 1, true)).await.unwrap();

        store.delete_room(&room.id).await.unwrap();
        assert!(store.players(&room.id).await.unwrap().is_empty());
        assert!(store.answers(&room.id, 1).await.unwrap().is_empty());
        assert!(matches!(
            store.room_by_code("ABC234").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_players_sorted_by_score() {
        let store = MemoryRoomStore::new();
        let room = room_with_host(&store).await;
        store
            .insert_player(NewPlayer {
                room_id: room.id.clone(),
                user_id: "guest".to_string(),
                username: "Guest".to_string(),
                is_host: false,
                is_ready: false,
            })
            .await
            .unwrap();
        store
            .update_player(
                &room.id,
                "guest",
                PlayerUpdate {
                    score: Some(250),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let players = store.players(&room.id).await.unwrap();
        assert_eq!(players[0].user_id, "guest");
        assert_eq!(store.count_players(&room.id).await.unwrap(), 2);
    }
}
