//! Single-player play-through.
//!
//! [`Session`] is the state machine itself: no I/O and no timers, driven by
//! explicit timestamps. [`GameSession`] wraps it with content fetching and
//! the repeating round timer.

mod runner;

pub use runner::{GameSession, SessionEvent};

use serde::{Deserialize, Serialize};

use crate::answer::check_answer;
use crate::error::{GameError, GameResult};
use crate::progress::GameStats;
use crate::scoring::calculate_score;
use crate::types::{Difficulty, Millis, Round, ScoreBreakdown, SessionPhase};

/// How a round was resolved, as reported to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round_number: u32,
    pub guess: Option<String>,
    pub correct_answer: String,
    pub is_correct: bool,
    pub timed_out: bool,
    pub time_taken_ms: u64,
    pub points_earned: u32,
    pub breakdown: Option<ScoreBreakdown>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    difficulty: Difficulty,
    phase: SessionPhase,
    rounds: Vec<Round>,
    current_round: usize,
    total_rounds: usize,
    score: u32,
    streak: u32,
    longest_streak: u32,
    time_remaining_ms: u64,
    last_breakdown: Option<ScoreBreakdown>,
}

impl Session {
    pub fn new(total_rounds: usize) -> Self {
        Self {
            difficulty: Difficulty::default(),
            phase: SessionPhase::Selecting,
            rounds: Vec::new(),
            current_round: 0,
            total_rounds,
            score: 0,
            streak: 0,
            longest_streak: 0,
            time_remaining_ms: 0,
            last_breakdown: None,
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn current_round(&self) -> usize {
        self.current_round
    }

    pub fn total_rounds(&self) -> usize {
        self.total_rounds
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn longest_streak(&self) -> u32 {
        self.longest_streak
    }

    pub fn time_remaining_ms(&self) -> u64 {
        self.time_remaining_ms
    }

    /// Breakdown of the last correct answer, cleared when the next round starts
    pub fn last_breakdown(&self) -> Option<&ScoreBreakdown> {
        self.last_breakdown.as_ref()
    }

    /// The active round, if any
    pub fn current(&self) -> Option<&Round> {
        match self.phase {
            SessionPhase::Selecting => None,
            _ => self.rounds.get(self.current_round),
        }
    }

    /// Whether a new game may be started from here
    pub fn can_start(&self) -> bool {
        matches!(self.phase, SessionPhase::Selecting | SessionPhase::Finished)
    }

    /// Install pre-built rounds and open the first one
    pub fn begin(&mut self, difficulty: Difficulty, rounds: Vec<Round>, now: Millis) -> GameResult<()> {
        if !self.can_start() {
            return Err(GameError::InvalidTransition(format!(
                "cannot start a game while {:?}",
                self.phase
            )));
        }
        if rounds.len() != self.total_rounds {
            return Err(GameError::ContentUnavailable {
                needed: self.total_rounds,
                available: rounds.len(),
            });
        }

        *self = Self {
            difficulty,
            rounds,
            ..Self::new(self.total_rounds)
        };
        self.open_round(0, now);
        tracing::info!(
            "Session started on {:?} with {} rounds",
            difficulty,
            self.total_rounds
        );
        Ok(())
    }

    fn open_round(&mut self, index: usize, now: Millis) {
        self.current_round = index;
        self.phase = SessionPhase::Playing;
        self.last_breakdown = None;
        self.time_remaining_ms = self.difficulty.time_limit_ms();
        if let Some(round) = self.rounds.get_mut(index) {
            round.started_at = Some(now);
        }
    }

    fn elapsed_ms(&self, now: Millis) -> u64 {
        self.current()
            .and_then(|r| r.started_at)
            .map_or(0, |started| (now - started).max(0) as u64)
    }

    /// Update the countdown. Resolves the round as timed out once no time is
    /// left; returns the outcome only on that transition.
    pub fn tick(&mut self, now: Millis) -> Option<RoundOutcome> {
        if self.phase != SessionPhase::Playing {
            return None;
        }
        let limit = self.difficulty.time_limit_ms();
        self.time_remaining_ms = limit.saturating_sub(self.elapsed_ms(now));
        if self.time_remaining_ms == 0 {
            return self.time_out(now);
        }
        None
    }

    fn time_out(&mut self, now: Millis) -> Option<RoundOutcome> {
        let limit = self.difficulty.time_limit_ms();
        let round = self.rounds.get_mut(self.current_round)?;
        if round.is_resolved() {
            return None;
        }

        round.ended_at = Some(now);
        round.guess = None;
        round.is_correct = Some(false);
        round.time_taken_ms = Some(limit);
        round.points_earned = Some(0);

        let outcome = RoundOutcome {
            round_number: round.round_number,
            guess: None,
            correct_answer: round.correct_answer.clone(),
            is_correct: false,
            timed_out: true,
            time_taken_ms: limit,
            points_earned: 0,
            breakdown: None,
        };

        self.streak = 0;
        self.time_remaining_ms = 0;
        self.last_breakdown = None;
        self.phase = SessionPhase::BetweenRounds;
        tracing::debug!("Round {} timed out", outcome.round_number);
        Some(outcome)
    }

    /// Resolve the active round with a guess. No-op (returns `None`) unless
    /// a round is being played. A guess arriving after the limit counts as
    /// a timeout.
    pub fn submit_guess(&mut self, guess: &str, now: Millis) -> Option<RoundOutcome> {
        if self.phase != SessionPhase::Playing {
            return None;
        }

        let time_taken = self.elapsed_ms(now);
        let limit = self.difficulty.time_limit_ms();
        if time_taken >= limit {
            return self.time_out(now);
        }

        let prior_streak = self.streak;
        let difficulty = self.difficulty;
        let round = self.rounds.get_mut(self.current_round)?;
        if round.is_resolved() {
            return None;
        }

        let is_correct = if round.category.uses_fuzzy_matching() {
            check_answer(guess, &round.correct_answer)
        } else {
            guess == round.correct_answer
        };

        let breakdown =
            is_correct.then(|| calculate_score(time_taken, round.time_limit, prior_streak, difficulty));
        let points = breakdown.map_or(0, |b| b.total_points);

        round.ended_at = Some(now);
        round.guess = Some(guess.to_string());
        round.is_correct = Some(is_correct);
        round.time_taken_ms = Some(time_taken);
        round.points_earned = Some(points);

        let outcome = RoundOutcome {
            round_number: round.round_number,
            guess: Some(guess.to_string()),
            correct_answer: round.correct_answer.clone(),
            is_correct,
            timed_out: false,
            time_taken_ms: time_taken,
            points_earned: points,
            breakdown,
        };

        self.score += points;
        self.streak = if is_correct { prior_streak + 1 } else { 0 };
        self.longest_streak = self.longest_streak.max(self.streak);
        self.last_breakdown = breakdown;
        self.phase = SessionPhase::BetweenRounds;

        tracing::debug!(
            "Round {} answered: correct={} points={} streak={}",
            outcome.round_number,
            is_correct,
            points,
            self.streak
        );
        Some(outcome)
    }

    /// Open the next round, or finish after the last one
    pub fn next_round(&mut self, now: Millis) -> GameResult<SessionPhase> {
        if self.phase != SessionPhase::BetweenRounds {
            return Err(GameError::InvalidTransition(format!(
                "no round to advance from while {:?}",
                self.phase
            )));
        }

        let next = self.current_round + 1;
        if next >= self.total_rounds {
            self.phase = SessionPhase::Finished;
            tracing::info!("Session finished with score {}", self.score);
        } else {
            self.open_round(next, now);
        }
        Ok(self.phase)
    }

    /// Back to difficulty selection, from any phase
    pub fn reset(&mut self) {
        *self = Self::new(self.total_rounds);
    }

    /// Stats of the play-through so far, for achievements
    pub fn summary(&self) -> GameStats {
        let answered = self.rounds.iter().filter(|r| r.is_resolved());
        let correct: Vec<&Round> = answered.filter(|r| r.is_correct == Some(true)).collect();

        GameStats {
            correct_count: correct.len() as u32,
            total_rounds: self.total_rounds as u32,
            fastest_answer_ms: correct.iter().filter_map(|r| r.time_taken_ms).min(),
            longest_streak: self.longest_streak,
        }
    }
}
