//! User-facing collaborator contracts.
//!
//! Accounts live in the surrounding application. The call core only needs to
//! verify who is on a connection and to resolve the small public profile that
//! is shown on an incoming-call screen.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::call::UserId;
use crate::shared::error::AppError;

/// Coarse presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Offline,
    Online,
    Away,
    Busy,
    Invisible,
}

impl UserStatus {
    /// Convert from its wire representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "offline" => Some(Self::Offline),
            "online" => Some(Self::Online),
            "away" => Some(Self::Away),
            "busy" => Some(Self::Busy),
            "invisible" => Some(Self::Invisible),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Online => "online",
            Self::Away => "away",
            Self::Busy => "busy",
            Self::Invisible => "invisible",
        }
    }

    /// Status as reported to other users. Invisible users look offline.
    pub fn visible(&self) -> Self {
        match self {
            Self::Invisible => Self::Offline,
            other => *other,
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Public profile attached to `call:incoming`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub avatar: Option<String>,
}

/// Resolves user identities to profiles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user's public profile. `None` when the user does not exist.
    async fn find_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, AppError>;
}

/// Verifies the bearer credential presented by a connection.
pub trait IdentityProvider: Send + Sync {
    /// Return the verified user id, or `AppError::Unauthorized`.
    fn verify(&self, token: &str) -> Result<UserId, AppError>;
}
