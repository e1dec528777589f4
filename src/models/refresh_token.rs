//! Refresh token model. The server stores only a one-way hash of the
//! opaque client-held secret; the raw value is never recoverable.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub token_hash_text: String,
    pub device_id: Option<String>,
    pub expiry_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl RefreshToken {
    pub fn new(
        user_id: Uuid,
        secret: &str,
        device_id: Option<String>,
        ttl_days: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id: Uuid::new_v4(),
            user_id,
            token_hash_text: Self::hash_secret(secret),
            device_id,
            expiry_utc: now + Duration::days(ttl_days),
            revoked_utc: None,
            created_utc: now,
        }
    }

    /// SHA-256 hex digest of the opaque secret.
    pub fn hash_secret(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_utc <= now
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_utc.is_some()
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}

/// Token pair returned to the client after a successful issue or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenPair {
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_one_way() {
        let a = RefreshToken::hash_secret("secret-value");
        let b = RefreshToken::hash_secret("secret-value");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, RefreshToken::hash_secret("other-value"));
    }

    #[test]
    fn validity_window() {
        let now = Utc::now();
        let token = RefreshToken::new(Uuid::new_v4(), "s", None, 7, now);
        assert!(token.is_valid(now));
        assert!(token.is_expired(now + Duration::days(8)));

        let mut revoked = token.clone();
        revoked.revoked_utc = Some(now);
        assert!(!revoked.is_valid(now));
    }
}
