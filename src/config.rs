use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::RoomSettings;

/// Timing and sizing knobs shared by the session and room components
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Rounds per single-player session
    pub total_rounds: usize,
    /// Timer resolution for round countdowns
    pub tick_interval: Duration,
    /// Local delay between a multiplayer round being announced and it opening
    pub countdown: Duration,
    /// Upper bound for every store call
    pub query_timeout: Duration,
    /// Upper bound for every content provider call
    pub content_timeout: Duration,
    /// How often a room client re-fetches state regardless of push notifications
    pub reconcile_interval: Duration,
    /// Defaults for newly created rooms
    pub room: RoomSettings,
    /// Attempts at finding an unused room code
    pub room_code_attempts: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            total_rounds: 5,
            tick_interval: Duration::from_millis(100),
            countdown: Duration::from_secs(3),
            query_timeout: Duration::from_secs(15),
            content_timeout: Duration::from_secs(5),
            reconcile_interval: Duration::from_secs(5),
            room: RoomSettings::default(),
            room_code_attempts: 5,
        }
    }
}

/// Read a trimmed, non-empty env var and parse it
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, trimmed);
            None
        }
    }
}

impl GameConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            total_rounds: env_parse::<usize>("WIKIGUESS_TOTAL_ROUNDS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.total_rounds),
            tick_interval: env_parse("WIKIGUESS_TICK_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            countdown: env_parse("WIKIGUESS_COUNTDOWN_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.countdown),
            query_timeout: env_parse("WIKIGUESS_QUERY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.query_timeout),
            content_timeout: env_parse("WIKIGUESS_CONTENT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.content_timeout),
            reconcile_interval: env_parse("WIKIGUESS_RECONCILE_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconcile_interval),
            room: RoomSettings {
                total_rounds: env_parse::<u32>("WIKIGUESS_ROOM_ROUNDS")
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.room.total_rounds),
                time_per_round: env_parse::<u32>("WIKIGUESS_TIME_PER_ROUND")
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.room.time_per_round),
                max_players: env_parse::<u32>("WIKIGUESS_MAX_PLAYERS")
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.room.max_players),
            },
            room_code_attempts: defaults.room_code_attempts,
        }
    }
}

/// Server-only settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub wikipedia_api_base: String,
    pub wikipedia_action_api: String,
    /// Deadline for Wikipedia before falling back to the question pool.
    /// Kept below [`GameConfig::content_timeout`].
    pub wikipedia_timeout: Duration,
    /// Curated question pool to use instead of the built-in one
    pub question_pool: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            wikipedia_api_base: "https://en.wikipedia.org/api/rest_v1".to_string(),
            wikipedia_action_api: "https://en.wikipedia.org/w/api.php".to_string(),
            wikipedia_timeout: Duration::from_secs(3),
            question_pool: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: env_parse("WIKIGUESS_BIND").unwrap_or(defaults.bind),
            wikipedia_api_base: env_parse("WIKIPEDIA_API_BASE")
                .unwrap_or(defaults.wikipedia_api_base),
            wikipedia_action_api: env_parse("WIKIPEDIA_ACTION_API")
                .unwrap_or(defaults.wikipedia_action_api),
            wikipedia_timeout: env_parse("WIKIPEDIA_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.wikipedia_timeout),
            question_pool: env_parse("WIKIGUESS_QUESTION_POOL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = GameConfig::default();
        assert_eq!(config.total_rounds, 5);
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(config.countdown, Duration::from_secs(3));
        assert_eq!(config.query_timeout, Duration::from_secs(15));
        assert_eq!(config.content_timeout, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_from_env_overrides_and_ignores_garbage() {
        std::env::set_var("WIKIGUESS_TOTAL_ROUNDS", " 7 ");
        std::env::set_var("WIKIGUESS_COUNTDOWN_MS", "not-a-number");
        std::env::set_var("WIKIGUESS_MAX_PLAYERS", "");

        let config = GameConfig::from_env();
        assert_eq!(config.total_rounds, 7);
        assert_eq!(config.countdown, Duration::from_secs(3));
        assert_eq!(config.room.max_players, 8);

        std::env::remove_var("WIKIGUESS_TOTAL_ROUNDS");
        std::env::remove_var("WIKIGUESS_COUNTDOWN_MS");
        std::env::remove_var("WIKIGUESS_MAX_PLAYERS");
    }

    #[test]
    #[serial]
    fn test_server_config_bind_from_env() {
        std::env::set_var("WIKIGUESS_BIND", "127.0.0.1:9000");
        let config = ServerConfig::from_env();
        assert_eq!(config.bind, SocketAddr::from(([127, 0, 0, 1], 9000)));
        std::env::remove_var("WIKIGUESS_BIND");
    }
}
