//! Point calculation for single-player and multiplayer answers

use crate::types::{Difficulty, ScoreBreakdown};

pub const BASE_POINTS: u32 = 100;
pub const MAX_TIME_BONUS: u32 = 50;
/// Added to the streak multiplier per prior consecutive correct answer
pub const STREAK_INCREMENT: f64 = 0.25;
pub const MAX_STREAK_MULTIPLIER: f64 = 3.0;

/// Multiplayer speed bonus is measured against this window regardless of round length
pub const MULTIPLAYER_SPEED_WINDOW_MS: u64 = 30_000;
pub const FIRST_CORRECT_BONUS: u32 = 100;

/// Points for a correct single-player answer.
///
/// `prior_streak` is the streak before this answer is counted. The time bonus
/// decays linearly from [`MAX_TIME_BONUS`] at 0ms to nothing at the limit.
pub fn calculate_score(
    time_taken_ms: u64,
    time_limit_secs: u32,
    prior_streak: u32,
    difficulty: Difficulty,
) -> ScoreBreakdown {
    let time_limit_ms = f64::from(time_limit_secs) * 1000.0;
    let time_ratio = if time_limit_ms > 0.0 {
        (1.0 - time_taken_ms as f64 / time_limit_ms).max(0.0)
    } else {
        0.0
    };
    let time_bonus = (f64::from(MAX_TIME_BONUS) * time_ratio).round() as u32;

    let streak_multiplier =
        (1.0 + f64::from(prior_streak) * STREAK_INCREMENT).min(MAX_STREAK_MULTIPLIER);
    let difficulty_multiplier = difficulty.config().multiplier;

    let total_points = (f64::from(BASE_POINTS + time_bonus)
        * streak_multiplier
        * difficulty_multiplier)
        .round() as u32;

    ScoreBreakdown {
        base_points: BASE_POINTS,
        time_bonus,
        streak_multiplier,
        difficulty_multiplier,
        total_points,
    }
}

/// Points for a multiplayer answer, before the first-correct bonus is decided.
/// One bonus point per 600ms left in the 30s window, capped at 50.
pub fn multiplayer_points(is_correct: bool, time_ms: u64) -> u32 {
    if !is_correct {
        return 0;
    }
    let speed_bonus = MULTIPLAYER_SPEED_WINDOW_MS.saturating_sub(time_ms) / 600;
    BASE_POINTS + speed_bonus.min(u64::from(MAX_TIME_BONUS)) as u32
}

/// Share of the time bonus still available, 0-100
pub fn time_bonus_percentage(time_taken_ms: u64, time_limit_ms: u64) -> u32 {
    if time_limit_ms == 0 {
        return 0;
    }
    let pct = (1.0 - time_taken_ms as f64 / time_limit_ms as f64) * 100.0;
    pct.round().max(0.0) as u32
}

/// Whole seconds left, rounded up so "0" only shows when time is really up
pub fn format_time_remaining(ms: u64) -> String {
    ms.div_ceil(1000).to_string()
}

/// Flame count shown next to a streak
pub fn streak_tier(streak: u32) -> u8 {
    match streak {
        s if s >= 10 => 3,
        s if s >= 5 => 2,
        s if s >= 2 => 1,
        _ => 0,
    }
}

/// Title awarded for a final score
pub fn rank_for_score(score: u32) -> &'static str {
    match score {
        s if s >= 2000 => "Wiki Mastermind",
        s if s >= 1500 => "Expert Scholar",
        s if s >= 1000 => "Knowledge Seeker",
        s if s >= 500 => "Curious Mind",
        _ => "Beginner",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_easy_first_answer_after_one_second() {
        let score = calculate_score(1000, 45, 0, Difficulty::Easy);
        assert_eq!(score.base_points, 100);
        assert_eq!(score.time_bonus, 49);
        assert_eq!(score.streak_multiplier, 1.0);
        assert_eq!(score.difficulty_multiplier, 1.0);
        assert_eq!(score.total_points, 149);
    }

    #[test]
    fn test_time_bonus_is_zero_at_and_past_limit() {
        assert_eq!(calculate_score(30_000, 30, 0, Difficulty::Medium).time_bonus, 0);
        assert_eq!(calculate_score(99_000, 30, 0, Difficulty::Medium).time_bonus, 0);
        assert_eq!(calculate_score(0, 30, 0, Difficulty::Medium).time_bonus, 50);
    }

    #[test]
    fn test_streak_multiplier_caps_at_three() {
        assert_eq!(calculate_score(0, 20, 7, Difficulty::Hard).streak_multiplier, 2.75);
        for streak in 8..20 {
            let score = calculate_score(0, 20, streak, Difficulty::Hard);
            assert_eq!(score.streak_multiplier, MAX_STREAK_MULTIPLIER);
        }
    }

    #[test]
    fn test_total_non_decreasing_in_streak() {
        for difficulty in Difficulty::ALL {
            let limit = difficulty.config().time_limit;
            let mut previous = 0;
            for streak in 0..15 {
                let total = calculate_score(0, limit, streak, difficulty).total_points;
                assert!(total >= previous, "{:?} streak {}", difficulty, streak);
                previous = total;
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let a = calculate_score(7_321, 15, 3, Difficulty::Expert);
        let b = calculate_score(7_321, 15, 3, Difficulty::Expert);
        assert_eq!(a, b);
    }

    #[test]
    fn test_expert_max_score() {
        // (100 + 50) * 3.0 * 3.0
        assert_eq!(calculate_score(0, 15, 10, Difficulty::Expert).total_points, 1350);
    }

    #[test]
    fn test_multiplayer_points() {
        assert_eq!(multiplayer_points(false, 0), 0);
        assert_eq!(multiplayer_points(true, 0), 150);
        assert_eq!(multiplayer_points(true, 6_000), 140);
        assert_eq!(multiplayer_points(true, 29_999), 100);
        assert_eq!(multiplayer_points(true, 45_000), 100);
    }

    #[test]
    fn test_display_helpers() {
        assert_eq!(format_time_remaining(0), "0");
        assert_eq!(format_time_remaining(1), "1");
        assert_eq!(format_time_remaining(4_001), "5");
        assert_eq!(time_bonus_percentage(15_000, 30_000), 50);
        assert_eq!(time_bonus_percentage(40_000, 30_000), 0);
        assert_eq!(streak_tier(1), 0);
        assert_eq!(streak_tier(5), 2);
        assert_eq!(rank_for_score(1499), "Knowledge Seeker");
        assert_eq!(rank_for_score(2000), "Wiki Mastermind");
    }
}
