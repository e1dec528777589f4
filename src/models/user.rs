//! User model. Accounts are owned by another subsystem; this core reads
//! them for credential checks and token claims only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User state codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserState {
    Active,
    Suspended,
    Deactivated,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::Active => "active",
            UserState::Suspended => "suspended",
            UserState::Deactivated => "deactivated",
        }
    }
}

/// User entity as seen by the security core.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub user_state_code: String,
    pub created_utc: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, password_hash: String, roles: Vec<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email,
            password_hash,
            roles,
            permissions: Vec::new(),
            user_state_code: UserState::Active.as_str().to_string(),
            created_utc: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.user_state_code == UserState::Active.as_str()
    }
}
