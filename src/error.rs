//! Error taxonomy shared by the session and room APIs

use std::future::Future;
use std::time::Duration;

use crate::content::ContentError;
use crate::room::StoreError;

pub type GameResult<T> = Result<T, GameError>;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum GameError {
    /// The content provider could not supply enough questions. Retryable.
    #[error("Not enough content available (needed {needed}, got {available})")]
    ContentUnavailable { needed: usize, available: usize },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Action not valid in the current phase; state was left untouched
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Only the host can do that")]
    NotHost,

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Room is full")]
    RoomFull,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Content provider error: {0}")]
    Content(String),
}

impl GameError {
    /// Whether retrying the same action later can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GameError::ContentUnavailable { .. }
                | GameError::Timeout { .. }
                | GameError::Store(_)
                | GameError::Content(_)
        )
    }
}

impl From<ContentError> for GameError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::InsufficientSupply { requested, available } => {
                GameError::ContentUnavailable {
                    needed: requested,
                    available,
                }
            }
            ContentError::Timeout(after) => GameError::Timeout {
                operation: "Content request",
                after,
            },
            ContentError::Transient(msg) | ContentError::Invalid(msg) => GameError::Content(msg),
        }
    }
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => GameError::NotFound(what),
            StoreError::UniqueViolation(what) => GameError::Conflict(format!("{} already exists", what)),
            StoreError::Conflict(msg) => GameError::Conflict(msg),
            StoreError::Backend(msg) => GameError::Store(msg),
        }
    }
}

/// Run an external call with an upper time bound. Elapsed calls become
/// [`GameError::Timeout`]; the call's own error is converted into the taxonomy.
pub async fn with_timeout<T, E, F>(limit: Duration, operation: &'static str, fut: F) -> GameResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<GameError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::warn!("{} timed out after {:?}", operation, limit);
            Err(GameError::Timeout {
                operation,
                after: limit,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_converts_elapsed_call() {
        let result: GameResult<()> = with_timeout(
            Duration::from_secs(5),
            "Slow call",
            std::future::pending::<Result<(), StoreError>>(),
        )
        .await;

        assert_eq!(
            result,
            Err(GameError::Timeout {
                operation: "Slow call",
                after: Duration::from_secs(5)
            })
        );
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through_errors() {
        let result: GameResult<()> = with_timeout(Duration::from_secs(5), "Lookup", async {
            Err(StoreError::NotFound("Room".to_string()))
        })
        .await;

        assert_eq!(result, Err(GameError::NotFound("Room".to_string())));
    }

    #[test]
    fn test_insufficient_supply_maps_to_content_unavailable() {
        let err: GameError = ContentError::InsufficientSupply {
            requested: 5,
            available: 2,
        }
        .into();
        assert_eq!(
            err,
            GameError::ContentUnavailable {
                needed: 5,
                available: 2
            }
        );
        assert!(err.is_retryable());
        assert!(!GameError::NotHost.is_retryable());
    }
}
