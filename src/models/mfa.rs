//! TOTP multi-factor method model.
//!
//! Lifecycle: NotSetup -> Pending (secret generated, not enabled) ->
//! Enabled (verified). Disable clears the secret and backup codes and
//! returns to NotSetup.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MfaState {
    NotSetup,
    Pending,
    Enabled,
}

#[derive(Debug, Clone, FromRow)]
pub struct MfaMethod {
    pub user_id: Uuid,
    pub method_code: String,
    /// Base32 TOTP secret; present only while Pending or Enabled.
    pub secret_base32: Option<String>,
    /// SHA-256 hex digests of the unconsumed single-use backup codes.
    pub backup_code_hashes: Vec<String>,
    pub is_enabled: bool,
    pub is_verified: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl MfaMethod {
    pub fn pending(
        user_id: Uuid,
        secret_base32: String,
        backup_code_hashes: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            method_code: "totp".to_string(),
            secret_base32: Some(secret_base32),
            backup_code_hashes,
            is_enabled: false,
            is_verified: false,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn state(&self) -> MfaState {
        if self.is_enabled {
            MfaState::Enabled
        } else if self.secret_base32.is_some() {
            MfaState::Pending
        } else {
            MfaState::NotSetup
        }
    }

    /// SHA-256 hex digest of a backup code, the stored form.
    pub fn hash_backup_code(code: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(code.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Returned once from setup; the plaintext backup codes are not stored.
#[derive(Debug, Serialize)]
pub struct MfaSetup {
    pub secret_base32: String,
    pub provisioning_uri: String,
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MfaVerification {
    pub success: bool,
    pub backup_code_used: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MfaStatus {
    pub totp_enabled: bool,
    pub backup_codes_remaining: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions() {
        let now = Utc::now();
        let mut method = MfaMethod::pending(Uuid::new_v4(), "SECRET".to_string(), vec![], now);
        assert_eq!(method.state(), MfaState::Pending);

        method.is_enabled = true;
        method.is_verified = true;
        assert_eq!(method.state(), MfaState::Enabled);

        method.is_enabled = false;
        method.secret_base32 = None;
        assert_eq!(method.state(), MfaState::NotSetup);
    }
}
