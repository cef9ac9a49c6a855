use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for readability
pub type RoomId = String;
pub type UserId = String;
pub type QuestionId = String;
pub type AnswerId = String;

/// Epoch milliseconds as reported by a [`crate::clock::Clock`]
pub type Millis = i64;

// ========== Difficulty ==========

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
    Expert,
}

/// Fixed per-difficulty rules: timing, score scaling, and how much of the
/// clue is revealed.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct DifficultyConfig {
    /// Seconds per round
    pub time_limit: u32,
    pub multiplier: f64,
    pub show_image: bool,
    pub show_excerpt: bool,
    pub show_categories: bool,
    /// Characters of excerpt shown before redaction
    pub excerpt_length: usize,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::Expert,
    ];

    pub const fn config(self) -> DifficultyConfig {
        match self {
            Difficulty::Easy => DifficultyConfig {
                time_limit: 45,
                multiplier: 1.0,
                show_image: true,
                show_excerpt: true,
                show_categories: true,
                excerpt_length: 300,
            },
            Difficulty::Medium => DifficultyConfig {
                time_limit: 30,
                multiplier: 1.5,
                show_image: true,
                show_excerpt: true,
                show_categories: false,
                excerpt_length: 150,
            },
            Difficulty::Hard => DifficultyConfig {
                time_limit: 20,
                multiplier: 2.0,
                show_image: false,
                show_excerpt: true,
                show_categories: false,
                excerpt_length: 100,
            },
            // Excerpt still shown, but heavily redacted
            Difficulty::Expert => DifficultyConfig {
                time_limit: 15,
                multiplier: 3.0,
                show_image: false,
                show_excerpt: true,
                show_categories: false,
                excerpt_length: 100,
            },
        }
    }

    /// Round time limit in milliseconds
    pub const fn time_limit_ms(self) -> u64 {
        self.config().time_limit as u64 * 1000
    }
}

// ========== Questions ==========

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Guess the Wikipedia article from clues
    WikiWhat,
    /// Find the item that doesn't belong
    OddWikiOut,
    /// Guess the year of a historical event
    WhenInWiki,
    /// Is this statement true or false?
    WikiOrFiction,
    /// What connects these articles?
    WikiLinks,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::WikiWhat,
        Category::OddWikiOut,
        Category::WhenInWiki,
        Category::WikiOrFiction,
        Category::WikiLinks,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Category::WikiWhat => "Wiki What?",
            Category::OddWikiOut => "Odd Wiki Out",
            Category::WhenInWiki => "When in Wiki?",
            Category::WikiOrFiction => "Wiki or Fiction?",
            Category::WikiLinks => "Wiki Links",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            Category::WikiWhat => "What is this Wikipedia article about?",
            Category::OddWikiOut => "Which one doesn't belong?",
            Category::WhenInWiki => "When did this happen?",
            Category::WikiOrFiction => "Is this fact true or false?",
            Category::WikiLinks => "What connects these topics?",
        }
    }

    /// Free-text categories are checked with fuzzy matching instead of exact equality
    pub fn uses_fuzzy_matching(self) -> bool {
        matches!(self, Category::WikiWhat)
    }
}

/// A Wikipedia article as supplied by the content provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WikiTopic {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub page_url: String,
}

/// Category-specific question payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum QuestionData {
    WikiWhat {
        topic: WikiTopic,
        /// Distractor titles
        #[serde(default)]
        wrong_options: Vec<String>,
    },
    OddWikiOut {
        /// 3 items belong together, 1 is the impostor
        items: Vec<String>,
        impostor_index: usize,
        connection: String,
        #[serde(default)]
        topic: String,
    },
    WhenInWiki {
        event: String,
        correct_year: i32,
        year_options: Vec<i32>,
        #[serde(default)]
        topic: String,
    },
    WikiOrFiction {
        statement: String,
        is_true: bool,
        /// Shown after answering
        #[serde(default)]
        explanation: String,
        #[serde(default)]
        topic: String,
    },
    WikiLinks {
        titles: Vec<String>,
        connection: String,
        #[serde(default)]
        connection_options: Vec<String>,
        #[serde(default)]
        topic: String,
    },
}

impl QuestionData {
    pub fn category(&self) -> Category {
        match self {
            QuestionData::WikiWhat { .. } => Category::WikiWhat,
            QuestionData::OddWikiOut { .. } => Category::OddWikiOut,
            QuestionData::WhenInWiki { .. } => Category::WhenInWiki,
            QuestionData::WikiOrFiction { .. } => Category::WikiOrFiction,
            QuestionData::WikiLinks { .. } => Category::WikiLinks,
        }
    }
}

/// One question as supplied by the content provider. The id is unique within
/// a provider and is used to keep a session from reusing a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionRecord {
    pub id: QuestionId,
    #[serde(flatten)]
    pub data: QuestionData,
}

impl QuestionRecord {
    pub fn category(&self) -> Category {
        self.data.category()
    }
}

// ========== Single-player session ==========

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPhase {
    Selecting,
    Playing,
    BetweenRounds,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    /// 1-based, for display
    pub round_number: u32,
    pub category: Category,
    pub question_id: QuestionId,
    pub data: QuestionData,
    /// Player-facing clue for `wiki_what` rounds (already redacted)
    pub topic: Option<WikiTopic>,
    pub options: Vec<String>,
    pub correct_answer: String,
    /// Seconds
    pub time_limit: u32,
    pub started_at: Option<Millis>,
    pub ended_at: Option<Millis>,
    pub guess: Option<String>,
    pub is_correct: Option<bool>,
    pub time_taken_ms: Option<u64>,
    pub points_earned: Option<u32>,
}

impl Round {
    /// Result fields are written once, when the round ends
    pub fn is_resolved(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Derived point breakdown for one correct answer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub base_points: u32,
    pub time_bonus: u32,
    pub streak_multiplier: f64,
    pub difficulty_multiplier: f64,
    pub total_points: u32,
}

// ========== Multiplayer ==========

/// Room lifecycle. Ordered: a room never moves to an earlier status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Lobby,
    Playing,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameRoom {
    pub id: RoomId,
    pub code: String,
    pub host_id: UserId,
    pub status: RoomStatus,
    pub current_round: u32,
    pub total_rounds: u32,
    /// Seconds
    pub time_per_round: u32,
    pub max_players: u32,
    /// Incremented by the store on every update
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Host-chosen settings for a new room
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RoomSettings {
    pub total_rounds: u32,
    pub time_per_round: u32,
    pub max_players: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            total_rounds: 5,
            time_per_round: 30,
            max_players: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomPlayer {
    pub id: String,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub username: String,
    pub score: u32,
    pub is_ready: bool,
    pub is_host: bool,
    pub joined_at: DateTime<Utc>,
}

/// Pre-generated question for one room round. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomQuestion {
    pub id: QuestionId,
    pub room_id: RoomId,
    pub round_number: u32,
    pub topic_title: String,
    pub topic_excerpt: Option<String>,
    pub topic_image_url: Option<String>,
    pub topic_page_url: Option<String>,
    pub options: Vec<String>,
    pub correct_answer: String,
}

/// Question as shown to players while a round is open (no answer)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionView {
    pub round_number: u32,
    pub topic_excerpt: Option<String>,
    pub topic_image_url: Option<String>,
    pub options: Vec<String>,
}

impl RoomQuestion {
    pub fn view(&self) -> QuestionView {
        QuestionView {
            round_number: self.round_number,
            topic_excerpt: self.topic_excerpt.clone(),
            topic_image_url: self.topic_image_url.clone(),
            options: self.options.clone(),
        }
    }
}

/// Append-only answer log entry, one per (room, user, round)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomAnswer {
    pub id: AnswerId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub round_number: u32,
    pub answer: Option<String>,
    pub is_correct: bool,
    pub time_ms: Option<u64>,
    pub points_earned: u32,
    pub answered_at: DateTime<Utc>,
}

/// What the answering player gets back from a submission
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerResult {
    pub points: u32,
    pub is_correct: bool,
}

/// Room plus its players, as fetched in one reconciliation pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomSnapshot {
    pub room: GameRoom,
    pub players: Vec<RoomPlayer>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Room,
    Players,
    Answers,
    Questions,
}

/// Notification pushed by the store after a write. Carries no payload:
/// receivers re-fetch, so lost or reordered notifications only delay updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomChange {
    pub room_id: RoomId,
    pub kind: ChangeKind,
}
