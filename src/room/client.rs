use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use super::RoomService;
use crate::error::GameResult;
use crate::types::{
    AnswerResult, GameRoom, QuestionView, RoomChange, RoomPlayer, RoomSnapshot, RoomStatus,
    UserId,
};

/// Pause between attempts to load a round's question
const QUESTION_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Where this player is in the room, as seen locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Loading,
    Lobby,
    Countdown,
    Playing,
    Results,
    Finished,
}

/// Local mirror of a room. Room and players come from the shared store;
/// the round timer and answer flags are per client.
#[derive(Debug, Clone)]
pub struct ClientState {
    pub room: Option<GameRoom>,
    pub players: Vec<RoomPlayer>,
    pub question: Option<QuestionView>,
    pub phase: ClientPhase,
    pub time_remaining_ms: u64,
    pub round_started_at: Option<Instant>,
    pub has_answered: bool,
    pub last_answer: Option<AnswerResult>,
    /// Last failed question load or answer submission
    pub error: Option<String>,
    /// Last failed room refresh; cleared by the next successful one
    pub sync_error: Option<String>,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            room: None,
            players: Vec::new(),
            question: None,
            phase: ClientPhase::Loading,
            time_remaining_ms: 0,
            round_started_at: None,
            has_answered: false,
            last_answer: None,
            error: None,
            sync_error: None,
        }
    }
}

impl ClientState {
    pub fn current_round(&self) -> u32 {
        self.room.as_ref().map_or(0, |r| r.current_round)
    }

    pub fn is_host(&self, user_id: &str) -> bool {
        self.room.as_ref().is_some_and(|r| r.host_id == user_id)
    }
}

/// What the client has to do after a snapshot was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotEffect {
    None,
    /// A new round is open; `countdown` is false when joining mid-game
    EnterRound { round: u32, countdown: bool },
    /// Stop whatever round is running locally
    Stop,
}

/// Fold a fetched snapshot into the local state. Snapshots older than what
/// is already shown are dropped, so out-of-order fetches are harmless.
pub fn apply_snapshot(state: &mut ClientState, snapshot: RoomSnapshot) -> SnapshotEffect {
    let RoomSnapshot { room, players } = snapshot;

    let previous = state.room.as_ref();
    if let Some(prev) = previous {
        if prev.id != room.id || room.version < prev.version || room.status < prev.status {
            return SnapshotEffect::None;
        }
    }
    let prev_round = previous
        .filter(|p| p.status == RoomStatus::Playing)
        .map(|p| p.current_round);
    let first_load = state.phase == ClientPhase::Loading && previous.is_none();

    let effect = match room.status {
        RoomStatus::Lobby => {
            state.phase = ClientPhase::Lobby;
            SnapshotEffect::None
        }
        RoomStatus::Finished => {
            let was_finished = state.phase == ClientPhase::Finished;
            state.phase = ClientPhase::Finished;
            if was_finished {
                SnapshotEffect::None
            } else {
                SnapshotEffect::Stop
            }
        }
        RoomStatus::Playing if room.current_round > 0 && prev_round != Some(room.current_round) => {
            state.question = None;
            state.has_answered = false;
            state.last_answer = None;
            state.round_started_at = None;
            state.time_remaining_ms = 0;
            if first_load {
                // Mid-game join: straight into the round once the question is in
                SnapshotEffect::EnterRound {
                    round: room.current_round,
                    countdown: false,
                }
            } else {
                state.phase = ClientPhase::Countdown;
                SnapshotEffect::EnterRound {
                    round: room.current_round,
                    countdown: true,
                }
            }
        }
        RoomStatus::Playing => SnapshotEffect::None,
    };

    state.room = Some(room);
    state.players = players;
    effect
}

struct Inner {
    service: Arc<RoomService>,
    user_id: UserId,
    room_id: String,
    state: RwLock<ClientState>,
    round_task: Mutex<Option<JoinHandle<()>>>,
    /// Bumped whenever the local round changes or stops
    round_epoch: AtomicU64,
}

impl Inner {
    fn is_current(&self, epoch: u64) -> bool {
        self.round_epoch.load(Ordering::SeqCst) == epoch
    }

    async fn refresh(self: &Arc<Self>) -> GameResult<()> {
        let snapshot = self.service.snapshot(&self.room_id).await?;
        let effect = {
            let mut state = self.state.write().await;
            state.sync_error = None;
            apply_snapshot(&mut state, snapshot)
        };
        match effect {
            SnapshotEffect::None => {}
            SnapshotEffect::EnterRound { round, countdown } => self.enter_round(round, countdown),
            SnapshotEffect::Stop => self.stop_round(),
        }
        Ok(())
    }

    /// Fetch the question (retrying until it loads or the round moves on),
    /// count down, then run the local round timer
    fn enter_round(self: &Arc<Self>, round: u32, countdown: bool) {
        let epoch = self.round_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = self.clone();
        tracing::debug!("{} entering round {} of {}", self.user_id, round, self.room_id);

        let handle = tokio::spawn(async move {
            let question = loop {
                match inner.service.question(&inner.room_id, round).await {
                    Ok(q) => break q,
                    Err(e) => {
                        tracing::warn!("Failed to load question {}: {}", round, e);
                        {
                            let mut state = inner.state.write().await;
                            if !inner.is_current(epoch) {
                                return;
                            }
                            state.error = Some(e.to_string());
                        }
                        tokio::time::sleep(QUESTION_RETRY_DELAY).await;
                    }
                }
            };
            {
                let mut state = inner.state.write().await;
                if !inner.is_current(epoch) {
                    return;
                }
                state.question = Some(question);
                state.error = None;
            }

            if countdown {
                tokio::time::sleep(inner.service.config().countdown).await;
            }

            let limit_ms = {
                let mut state = inner.state.write().await;
                if !inner.is_current(epoch) {
                    return;
                }
                let limit_ms =
                    u64::from(state.room.as_ref().map_or(0, |r| r.time_per_round)) * 1000;
                state.phase = ClientPhase::Playing;
                state.round_started_at = Some(Instant::now());
                state.time_remaining_ms = limit_ms;
                limit_ms
            };

            let started = Instant::now();
            let mut ticker = tokio::time::interval(inner.service.config().tick_interval);
            loop {
                ticker.tick().await;
                let mut state = inner.state.write().await;
                if !inner.is_current(epoch) || state.phase != ClientPhase::Playing {
                    break;
                }
                let elapsed = started.elapsed().as_millis() as u64;
                state.time_remaining_ms = limit_ms.saturating_sub(elapsed);
                if state.time_remaining_ms == 0 {
                    state.phase = ClientPhase::Results;
                    break;
                }
            }
        });

        let previous = self
            .round_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn stop_round(&self) {
        self.round_epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self
            .round_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

/// One player's view of a room. Re-fetches on every change notification for
/// the room and on a fixed interval, and runs the round countdown locally.
pub struct RoomClient {
    inner: Arc<Inner>,
    background: Vec<JoinHandle<()>>,
}

impl RoomClient {
    /// Attach to the room with this code. The caller must already be a member.
    pub async fn connect(service: Arc<RoomService>, code: &str, user_id: &str) -> GameResult<Self> {
        // Subscribe before the first fetch so no change falls in between
        let changes = service.subscribe();
        let room = service.room_by_code(code).await?;
        let reconcile_interval = service.config().reconcile_interval;

        let inner = Arc::new(Inner {
            service,
            user_id: user_id.to_string(),
            room_id: room.id,
            state: RwLock::new(ClientState::default()),
            round_task: Mutex::new(None),
            round_epoch: AtomicU64::new(0),
        });
        inner.refresh().await?;

        let background = vec![
            tokio::spawn(watch_changes(inner.clone(), changes)),
            tokio::spawn(reconcile(inner.clone(), reconcile_interval)),
        ];
        tracing::info!("{} connected to room {}", user_id, code);

        Ok(Self { inner, background })
    }

    pub fn room_id(&self) -> &str {
        &self.inner.room_id
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub async fn state(&self) -> ClientState {
        self.inner.state.read().await.clone()
    }

    pub async fn phase(&self) -> ClientPhase {
        self.inner.state.read().await.phase
    }

    pub async fn refresh(&self) -> GameResult<()> {
        self.inner.refresh().await
    }

    /// Submit an answer for the open round. `None` when not playing or
    /// already answered this round.
    pub async fn answer(&self, answer: &str) -> GameResult<Option<AnswerResult>> {
        let (round, time_ms) = {
            let mut state = self.inner.state.write().await;
            if state.phase != ClientPhase::Playing || state.has_answered {
                return Ok(None);
            }
            state.has_answered = true;
            let time_ms = state
                .round_started_at
                .map_or(0, |t| t.elapsed().as_millis() as u64);
            (state.current_round(), time_ms)
        };

        let result = self
            .inner
            .service
            .submit_answer(
                &self.inner.room_id,
                &self.inner.user_id,
                round,
                Some(answer),
                time_ms,
            )
            .await;

        let mut state = self.inner.state.write().await;
        let same_round = state.current_round() == round;
        match result {
            Ok(result) => {
                if same_round {
                    state.last_answer = Some(result);
                }
                Ok(Some(result))
            }
            Err(e) => {
                if same_round {
                    state.has_answered = false;
                    state.error = Some(e.to_string());
                }
                Err(e)
            }
        }
    }

    pub async fn start_game(&self) -> GameResult<()> {
        self.inner
            .service
            .start_game(&self.inner.room_id, &self.inner.user_id)
            .await?;
        self.inner.refresh().await
    }

    /// Host only: open the next round or finish the game
    pub async fn advance_round(&self) -> GameResult<()> {
        self.inner
            .service
            .advance_round(&self.inner.room_id, &self.inner.user_id)
            .await?;
        self.inner.refresh().await
    }

    pub async fn set_ready(&self, ready: bool) -> GameResult<()> {
        self.inner
            .service
            .toggle_ready(&self.inner.room_id, &self.inner.user_id, ready)
            .await?;
        self.inner.refresh().await
    }

    /// Leave the room and stop all local activity
    pub async fn leave(mut self) -> GameResult<()> {
        self.shutdown();
        self.inner
            .service
            .leave_room(&self.inner.room_id, &self.inner.user_id)
            .await
    }

    fn shutdown(&mut self) {
        self.inner.stop_round();
        for task in self.background.drain(..) {
            task.abort();
        }
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn watch_changes(inner: Arc<Inner>, mut changes: broadcast::Receiver<RoomChange>) {
    loop {
        match changes.recv().await {
            Ok(change) if change.room_id == inner.room_id => {
                if let Err(e) = inner.refresh().await {
                    tracing::warn!("Refresh after change failed: {}", e);
                    inner.state.write().await.sync_error = Some(e.to_string());
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Change feed lagged by {}, refreshing", skipped);
                if let Err(e) = inner.refresh().await {
                    tracing::warn!("Refresh after lag failed: {}", e);
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn reconcile(inner: Arc<Inner>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // First tick completes immediately; connect already fetched
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(e) = inner.refresh().await {
            tracing::warn!("Periodic refresh of {} failed: {}", inner.room_id, e);
            inner.state.write().await.sync_error = Some(e.to_string());
        }
    }
}
