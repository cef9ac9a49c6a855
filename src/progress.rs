//! Player progression: XP levels and achievement rules

use serde::{Deserialize, Serialize};

/// XP needed to reach levels 1 through 30 (index = level - 1)
const LEVEL_THRESHOLDS: [u64; 30] = [
    0, 100, 250, 450, 700, 1000, 1400, 1900, 2500, 3200, 4000, 5000, 6200, 7600, 9200, 11000,
    13000, 15200, 17600, 20200, 23000, 26000, 29200, 32600, 36200, 40000, 44000, 48200, 52600,
    57200,
];
/// Past the table every level costs the same
const XP_PER_LEVEL_AFTER_TABLE: u64 = 5000;

pub fn calculate_level(xp: u64) -> u32 {
    let table_max = LEVEL_THRESHOLDS[LEVEL_THRESHOLDS.len() - 1];
    if xp >= table_max {
        return LEVEL_THRESHOLDS.len() as u32 + ((xp - table_max) / XP_PER_LEVEL_AFTER_TABLE) as u32;
    }
    LEVEL_THRESHOLDS
        .iter()
        .rposition(|threshold| xp >= *threshold)
        .map(|idx| idx as u32 + 1)
        .unwrap_or(1)
}

/// XP at which a level starts
pub fn xp_for_level(level: u32) -> u64 {
    if level == 0 {
        return 0;
    }
    let table_len = LEVEL_THRESHOLDS.len() as u32;
    if level <= table_len {
        return LEVEL_THRESHOLDS[level as usize - 1];
    }
    LEVEL_THRESHOLDS[LEVEL_THRESHOLDS.len() - 1]
        + u64::from(level - table_len) * XP_PER_LEVEL_AFTER_TABLE
}

/// Percent of the way from the current level to the next, 0-100
pub fn level_progress(xp: u64) -> u32 {
    let level = calculate_level(xp);
    let current = xp_for_level(level);
    let next = xp_for_level(level + 1);
    let into_level = (xp - current) as f64;
    let needed = (next - current) as f64;
    ((into_level / needed) * 100.0).round() as u32
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentTier {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
    Master,
}

pub fn content_tier(level: u32) -> ContentTier {
    match level {
        0..=5 => ContentTier::Beginner,
        6..=10 => ContentTier::Intermediate,
        11..=20 => ContentTier::Advanced,
        21..=30 => ContentTier::Expert,
        _ => ContentTier::Master,
    }
}

// ========== Achievements ==========

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AchievementId {
    FirstWin,
    PerfectGame,
    SpeedDemon,
    #[serde(rename = "streak_5")]
    Streak5,
    #[serde(rename = "streak_10")]
    Streak10,
    #[serde(rename = "games_10")]
    Games10,
    #[serde(rename = "games_50")]
    Games50,
    #[serde(rename = "score_1000")]
    Score1000,
    #[serde(rename = "score_10000")]
    Score10000,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Achievement {
    pub id: AchievementId,
    pub name: &'static str,
    pub description: &'static str,
}

pub const ACHIEVEMENTS: &[Achievement] = &[
    Achievement {
        id: AchievementId::FirstWin,
        name: "First Blood",
        description: "Get your first correct answer",
    },
    Achievement {
        id: AchievementId::PerfectGame,
        name: "Perfect Game",
        description: "Get every answer correct in one game",
    },
    Achievement {
        id: AchievementId::SpeedDemon,
        name: "Speed Demon",
        description: "Answer correctly in under 5 seconds",
    },
    Achievement {
        id: AchievementId::Streak5,
        name: "On Fire",
        description: "Get a 5-answer streak",
    },
    Achievement {
        id: AchievementId::Streak10,
        name: "Unstoppable",
        description: "Get a 10-answer streak",
    },
    Achievement {
        id: AchievementId::Games10,
        name: "Regular",
        description: "Play 10 games",
    },
    Achievement {
        id: AchievementId::Games50,
        name: "Dedicated",
        description: "Play 50 games",
    },
    Achievement {
        id: AchievementId::Score1000,
        name: "Rising Star",
        description: "Reach 1,000 total points",
    },
    Achievement {
        id: AchievementId::Score10000,
        name: "Champion",
        description: "Reach 10,000 total points",
    },
];

pub fn achievement(id: AchievementId) -> Option<&'static Achievement> {
    ACHIEVEMENTS.iter().find(|a| a.id == id)
}

/// Stats from one finished game
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GameStats {
    pub correct_count: u32,
    pub total_rounds: u32,
    /// Fastest correct answer, if any
    pub fastest_answer_ms: Option<u64>,
    pub longest_streak: u32,
}

/// Lifetime stats, already including the game just played
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileStats {
    pub games_played: u32,
    pub total_score: u64,
    pub longest_streak: u32,
}

/// Achievements earned by this game that are not already unlocked
pub fn evaluate_achievements(
    game: &GameStats,
    profile: &ProfileStats,
    unlocked: &[AchievementId],
) -> Vec<AchievementId> {
    let checks = [
        (AchievementId::FirstWin, game.correct_count >= 1),
        (
            AchievementId::PerfectGame,
            game.total_rounds > 0 && game.correct_count == game.total_rounds,
        ),
        (
            AchievementId::SpeedDemon,
            game.fastest_answer_ms.is_some_and(|ms| ms < 5000),
        ),
        (AchievementId::Streak5, profile.longest_streak >= 5),
        (AchievementId::Streak10, profile.longest_streak >= 10),
        (AchievementId::Games10, profile.games_played >= 10),
        (AchievementId::Games50, profile.games_played >= 50),
        (AchievementId::Score1000, profile.total_score >= 1000),
        (AchievementId::Score10000, profile.total_score >= 10000),
    ];

    checks
        .into_iter()
        .filter(|(id, earned)| *earned && !unlocked.contains(id))
        .map(|(id, _)| id)
        .collect()
}
