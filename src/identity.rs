//! Caller identity: who is playing, as reported by the identity provider
//! or by request headers on the room API.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

const MAX_NAME_LEN: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub email: Option<String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: id.into(),
            email,
        }
    }

    /// Name shown in a room: the requested name if usable, else the email's
    /// local part, else a name derived from the id
    pub fn display_name(&self, requested: Option<&str>) -> String {
        if let Some(name) = requested.map(str::trim).filter(|n| !n.is_empty()) {
            return name.chars().take(MAX_NAME_LEN).collect();
        }
        if let Some(local) = self
            .email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|l| !l.is_empty())
        {
            return local.chars().take(MAX_NAME_LEN).collect();
        }
        let tag: String = self.id.chars().take(4).collect();
        format!("Player-{}", tag)
    }
}

/// Black-box source of the signed-in user
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Option<UserIdentity>;
}

/// Fixed identity, for tests and single-user tools
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(pub Option<UserIdentity>);

impl StaticIdentity {
    pub fn signed_in(id: impl Into<String>) -> Self {
        Self(Some(UserIdentity::new(id, None)))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Option<UserIdentity> {
        self.0.clone()
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Room API callers identify themselves with `X-User-Id` (and optionally
/// `X-User-Email`), set by the fronting auth layer
impl<S> FromRequestParts<S> for UserIdentity
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(id) = header_value(parts, USER_ID_HEADER) else {
            tracing::debug!("Rejecting request without {}", USER_ID_HEADER);
            return Err((StatusCode::UNAUTHORIZED, "Not signed in"));
        };
        Ok(UserIdentity {
            id,
            email: header_value(parts, USER_EMAIL_HEADER),
        })
    }
}
