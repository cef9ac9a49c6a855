use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use super::{RoundOutcome, Session};
use crate::clock::Clock;
use crate::config::GameConfig;
use crate::content::{compose_rounds, ContentProvider};
use crate::error::{GameError, GameResult};
use crate::types::{Difficulty, SessionPhase};

/// Notifications for whoever renders the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    RoundStarted { round_number: u32, time_limit_ms: u64 },
    RoundEnded(RoundOutcome),
    Finished { score: u32 },
    Reset,
}

/// Drives one [`Session`]: fetches content, runs the round timer, and
/// serializes every state change behind one lock.
pub struct GameSession {
    state: Arc<RwLock<Session>>,
    provider: Arc<dyn ContentProvider>,
    clock: Arc<dyn Clock>,
    config: GameConfig,
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Bumped whenever the running timer must stop; ticks from an older
    /// epoch are ignored
    timer_epoch: Arc<AtomicU64>,
    loading: AtomicBool,
    /// Bumped by every reset; a start that began under an older value is void
    generation: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

impl GameSession {
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        clock: Arc<dyn Clock>,
        config: GameConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Arc::new(RwLock::new(Session::new(config.total_rounds))),
            provider,
            clock,
            config,
            timer: Mutex::new(None),
            timer_epoch: Arc::new(AtomicU64::new(0)),
            loading: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> Session {
        self.state.read().await.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.read().await.phase()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Fetch content for every round and open the first one. On any failure
    /// the session stays where it was.
    pub async fn start_game(&self, difficulty: Difficulty) -> GameResult<()> {
        if !self.state.read().await.can_start() {
            return Err(GameError::InvalidTransition(
                "a game is already in progress".to_string(),
            ));
        }
        if self.loading.swap(true, Ordering::SeqCst) {
            return Err(GameError::InvalidTransition(
                "a game is already starting".to_string(),
            ));
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let result = self.load_and_begin(difficulty, generation).await;
        self.loading.store(false, Ordering::SeqCst);

        if let Err(e) = &result {
            tracing::warn!("Failed to start {:?} game: {}", difficulty, e);
        }
        result
    }

    async fn load_and_begin(&self, difficulty: Difficulty, generation: u64) -> GameResult<()> {
        let mut rng = StdRng::from_os_rng();
        let rounds = compose_rounds(
            self.provider.as_ref(),
            difficulty,
            self.config.total_rounds,
            self.config.content_timeout,
            &mut rng,
        )
        .await?;

        let mut session = self.state.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(GameError::InvalidTransition(
                "the session was reset while loading".to_string(),
            ));
        }
        session.begin(difficulty, rounds, self.clock.now_ms())?;
        self.announce_round(&session);
        self.start_timer();
        Ok(())
    }

    /// Resolve the active round with a guess. `None` if no round is open.
    pub async fn submit_guess(&self, guess: &str) -> Option<RoundOutcome> {
        let mut session = self.state.write().await;
        let outcome = session.submit_guess(guess, self.clock.now_ms())?;
        self.cancel_timer();
        let _ = self.events.send(SessionEvent::RoundEnded(outcome.clone()));
        Some(outcome)
    }

    pub async fn next_round(&self) -> GameResult<SessionPhase> {
        let mut session = self.state.write().await;
        let phase = session.next_round(self.clock.now_ms())?;
        match phase {
            SessionPhase::Playing => {
                self.announce_round(&session);
                self.start_timer();
            }
            SessionPhase::Finished => {
                let _ = self.events.send(SessionEvent::Finished {
                    score: session.score(),
                });
            }
            _ => {}
        }
        Ok(phase)
    }

    /// Back to selection from any phase; no tick fires afterwards
    pub async fn reset(&self) {
        self.cancel_timer();
        let mut session = self.state.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        session.reset();
        drop(session);
        tracing::debug!("Session reset");
        let _ = self.events.send(SessionEvent::Reset);
    }

    fn announce_round(&self, session: &Session) {
        if let Some(round) = session.current() {
            let _ = self.events.send(SessionEvent::RoundStarted {
                round_number: round.round_number,
                time_limit_ms: session.difficulty().time_limit_ms(),
            });
        }
    }

    fn start_timer(&self) {
        let epoch = self.timer_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let current_epoch = self.timer_epoch.clone();
        let state = self.state.clone();
        let clock = self.clock.clone();
        let events = self.events.clone();
        let tick = self.config.tick_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            loop {
                ticker.tick().await;
                let mut session = state.write().await;
                if current_epoch.load(Ordering::SeqCst) != epoch {
                    break;
                }
                if let Some(outcome) = session.tick(clock.now_ms()) {
                    let _ = events.send(SessionEvent::RoundEnded(outcome));
                    break;
                }
                if session.phase() != SessionPhase::Playing {
                    break;
                }
            }
        });

        let previous = self
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn cancel_timer(&self) {
        self.timer_epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}

impl Drop for GameSession {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::content::{ContentError, ContentResult, QuestionPool};
    use crate::types::{Category, QuestionRecord, WikiTopic};
    use async_trait::async_trait;
    use std::time::Duration;

    struct EmptyProvider;

    #[async_trait]
    impl ContentProvider for EmptyProvider {
        async fn fetch_questions(
            &self,
            _category: Category,
            count: usize,
        ) -> ContentResult<Vec<QuestionRecord>> {
            Err(ContentError::InsufficientSupply {
                requested: count,
                available: 0,
            })
        }

        async fn fetch_random_articles(&self, _count: usize) -> ContentResult<Vec<WikiTopic>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "empty"
        }
    }

    /// The builtin pool, answering only after a delay
    struct SlowProvider {
        inner: QuestionPool,
        delay: Duration,
    }

    #[async_trait]
    impl ContentProvider for SlowProvider {
        async fn fetch_questions(
            &self,
            category: Category,
            count: usize,
        ) -> ContentResult<Vec<QuestionRecord>> {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch_questions(category, count).await
        }

        async fn fetch_random_articles(&self, count: usize) -> ContentResult<Vec<WikiTopic>> {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch_random_articles(count).await
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn session_with(provider: Arc<dyn ContentProvider>) -> (GameSession, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let session = GameSession::new(provider, clock.clone(), GameConfig::default());
        (session, clock)
    }

    fn pool() -> Arc<dyn ContentProvider> {
        Arc::new(QuestionPool::builtin().unwrap())
    }

    #[tokio::test]
    async fn test_start_failure_stays_selecting() {
        let (session, _) = session_with(Arc::new(EmptyProvider));
        let err = session.start_game(Difficulty::Easy).await.unwrap_err();
        assert!(matches!(err, GameError::ContentUnavailable { .. }));
        assert!(err.is_retryable());
        assert_eq!(session.phase().await, SessionPhase::Selecting);
        assert!(!session.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_times_out_round() {
        let (session, clock) = session_with(pool());
        let mut events = session.subscribe();
        session.start_game(Difficulty::Hard).await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::RoundStarted {
                round_number: 1,
                time_limit_ms: 20_000
            }
        ));

        clock.advance(5_000);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(session.snapshot().await.time_remaining_ms(), 15_000);

        clock.advance(15_000);
        match events.recv().await.unwrap() {
            SessionEvent::RoundEnded(outcome) => {
                assert!(outcome.timed_out);
                assert_eq!(outcome.points_earned, 0);
            }
            other => panic!("unexpected event {:?}", other),
        }
        let state = session.snapshot().await;
        assert_eq!(state.phase(), SessionPhase::BetweenRounds);
        assert_eq!(state.streak(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_guess_or_reset() {
        let (session, clock) = session_with(pool());
        session.start_game(Difficulty::Expert).await.unwrap();

        let answer = session.snapshot().await.current().unwrap().correct_answer.clone();
        clock.advance(1_000);
        let outcome = session.submit_guess(&answer).await.unwrap();
        assert!(outcome.is_correct);

        // Long past the limit: the stopped timer must not touch the round
        clock.advance(60_000);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let state = session.snapshot().await;
        assert_eq!(state.rounds()[0].is_correct, Some(true));
        assert_eq!(state.score(), outcome.points_earned);

        session.next_round().await.unwrap();
        session.reset().await;
        clock.advance(60_000);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let state = session.snapshot().await;
        assert_eq!(state.phase(), SessionPhase::Selecting);
        assert!(state.rounds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_while_loading_cancels_start() {
        let provider = SlowProvider {
            inner: QuestionPool::builtin().unwrap(),
            delay: Duration::from_millis(200),
        };
        let (session, _) = session_with(Arc::new(provider));
        let mut events = session.subscribe();

        let (started, _) = tokio::join!(session.start_game(Difficulty::Medium), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            session.reset().await;
        });

        assert!(matches!(started, Err(GameError::InvalidTransition(_))));
        assert!(!session.is_loading());
        let state = session.snapshot().await;
        assert_eq!(state.phase(), SessionPhase::Selecting);
        assert!(state.rounds().is_empty());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Reset);
        assert!(events.try_recv().is_err());

        // A fresh start afterwards goes through
        session.start_game(Difficulty::Medium).await.unwrap();
        assert_eq!(session.phase().await, SessionPhase::Playing);
    }

    #[tokio::test]
    async fn test_cannot_start_twice() {
        let (session, _) = session_with(pool());
        session.start_game(Difficulty::Easy).await.unwrap();
        let err = session.start_game(Difficulty::Hard).await.unwrap_err();
        assert!(matches!(err, GameError::InvalidTransition(_)));
        assert_eq!(session.snapshot().await.difficulty(), Difficulty::Easy);
    }

    #[tokio::test]
    async fn test_guess_outside_round_is_noop() {
        let (session, _) = session_with(pool());
        assert!(session.submit_guess("anything").await.is_none());
        assert!(session.next_round().await.is_err());
    }
}
