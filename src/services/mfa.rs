//! TOTP enrollment and challenge. Enrollment is two-step: `setup`
//! generates a secret and backup codes but the method only becomes
//! enforced after `verify_and_enable` proves the authenticator works.
//! Backup codes are single-use and stored hashed.

use rand::RngCore;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::MfaConfig;
use crate::error::AuthError;
use crate::models::{
    AuditEvent, AuditEventType, AuditSeverity, MfaMethod, MfaSetup, MfaState, MfaStatus,
    MfaVerification, User,
};
use crate::services::audit::AuditSink;
use crate::services::credentials::CredentialStore;
use crate::store::MfaStore;
use crate::utils::password::Password;
use crate::utils::validation::{is_backup_code_format, validate_mfa_code, validate_totp_code};

const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;

#[derive(Clone)]
pub struct MfaEngine {
    mfa: Arc<dyn MfaStore>,
    credentials: Arc<dyn CredentialStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: MfaConfig,
}

impl MfaEngine {
    pub fn new(
        mfa: Arc<dyn MfaStore>,
        credentials: Arc<dyn CredentialStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: MfaConfig,
    ) -> Self {
        Self {
            mfa,
            credentials,
            audit,
            clock,
            config,
        }
    }

    /// Starts (or restarts) TOTP enrollment. A pending, unverified setup
    /// is replaced wholesale; an enabled method must be disabled first.
    /// The plaintext backup codes are returned exactly once.
    pub async fn setup(&self, user: &User) -> Result<MfaSetup, AuthError> {
        if let Some(existing) = self.mfa.find_mfa_method(user.user_id).await? {
            if existing.state() == MfaState::Enabled {
                return Err(AuthError::Conflict(
                    "mfa is already enabled for this account".to_string(),
                ));
            }
        }

        let secret = Secret::generate_secret();
        let totp = self.build_totp(&secret, &user.email)?;
        let secret_base32 = totp.get_secret_base32();
        let provisioning_uri = totp.get_url();

        let backup_codes = generate_backup_codes(self.config.backup_code_count);
        let hashes = backup_codes
            .iter()
            .map(|code| MfaMethod::hash_backup_code(code))
            .collect();

        let method = MfaMethod::pending(user.user_id, secret_base32.clone(), hashes, self.clock.now());
        self.mfa.upsert_mfa_method(&method).await?;

        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::MfaSetupStarted,
                    AuditSeverity::Info,
                    true,
                    self.clock.now(),
                )
                .with_user(user.user_id),
            )
            .await;

        Ok(MfaSetup {
            secret_base32,
            provisioning_uri,
            backup_codes,
        })
    }

    /// Completes enrollment by checking a code from the authenticator
    /// against the pending secret. Only after this does MFA gate logins.
    pub async fn verify_and_enable(&self, user: &User, code: &str) -> Result<(), AuthError> {
        validate_totp_code(code)?;

        let mut method = self
            .mfa
            .find_mfa_method(user.user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("mfa setup".to_string()))?;
        if method.state() == MfaState::Enabled {
            return Err(AuthError::Conflict(
                "mfa is already enabled for this account".to_string(),
            ));
        }

        if !self.check_totp(&method, &user.email, code)? {
            self.record_verify_failure(user.user_id).await;
            return Err(AuthError::Unauthorized("invalid mfa code".to_string()));
        }

        method.is_enabled = true;
        method.is_verified = true;
        method.updated_utc = self.clock.now();
        self.mfa.upsert_mfa_method(&method).await?;

        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::MfaEnabled,
                    AuditSeverity::Info,
                    true,
                    self.clock.now(),
                )
                .with_user(user.user_id),
            )
            .await;
        Ok(())
    }

    /// Checks a login challenge: either a current TOTP code or one of the
    /// unconsumed backup codes. Backup codes are consumed atomically, so
    /// a code accepted here can never be accepted again.
    pub async fn verify_for_login(
        &self,
        user: &User,
        code: &str,
    ) -> Result<MfaVerification, AuthError> {
        validate_mfa_code(code)?;

        let method = self
            .mfa
            .find_mfa_method(user.user_id)
            .await?
            .filter(|m| m.state() == MfaState::Enabled)
            .ok_or_else(|| AuthError::Unauthorized("mfa is not enabled".to_string()))?;

        if code.len() == TOTP_DIGITS && self.check_totp(&method, &user.email, code)? {
            self.audit
                .record(
                    AuditEvent::new(
                        AuditEventType::MfaChallengePassed,
                        AuditSeverity::Info,
                        true,
                        self.clock.now(),
                    )
                    .with_user(user.user_id),
                )
                .await;
            return Ok(MfaVerification {
                success: true,
                backup_code_used: false,
            });
        }

        if is_backup_code_format(code) {
            let hash = MfaMethod::hash_backup_code(code);
            if self
                .mfa
                .consume_backup_code(user.user_id, &hash, self.clock.now())
                .await?
            {
                self.audit
                    .record(
                        AuditEvent::new(
                            AuditEventType::BackupCodeConsumed,
                            AuditSeverity::Warning,
                            true,
                            self.clock.now(),
                        )
                        .with_user(user.user_id),
                    )
                    .await;
                return Ok(MfaVerification {
                    success: true,
                    backup_code_used: true,
                });
            }
        }

        self.record_verify_failure(user.user_id).await;
        Ok(MfaVerification {
            success: false,
            backup_code_used: false,
        })
    }

    /// Turns MFA off. Requires the account password again; a stolen
    /// session alone must not be able to strip the second factor.
    pub async fn disable(&self, user: &User, password: &Password) -> Result<(), AuthError> {
        if !self.credentials.verify_password(user, password) {
            return Err(AuthError::invalid_credentials());
        }
        if !self.mfa.delete_mfa_method(user.user_id).await? {
            return Err(AuthError::NotFound("mfa setup".to_string()));
        }
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::MfaDisabled,
                    AuditSeverity::Warning,
                    true,
                    self.clock.now(),
                )
                .with_user(user.user_id),
            )
            .await;
        Ok(())
    }

    /// Replaces all backup codes, invalidating any unconsumed ones.
    /// Password re-auth required, as for disable.
    pub async fn regenerate_backup_codes(
        &self,
        user: &User,
        password: &Password,
    ) -> Result<Vec<String>, AuthError> {
        if !self.credentials.verify_password(user, password) {
            return Err(AuthError::invalid_credentials());
        }
        self.mfa
            .find_mfa_method(user.user_id)
            .await?
            .filter(|m| m.state() == MfaState::Enabled)
            .ok_or_else(|| AuthError::NotFound("mfa setup".to_string()))?;

        let codes = generate_backup_codes(self.config.backup_code_count);
        let hashes: Vec<String> = codes
            .iter()
            .map(|code| MfaMethod::hash_backup_code(code))
            .collect();
        self.mfa
            .replace_backup_codes(user.user_id, &hashes, self.clock.now())
            .await?;

        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::BackupCodesRegenerated,
                    AuditSeverity::Warning,
                    true,
                    self.clock.now(),
                )
                .with_user(user.user_id),
            )
            .await;
        Ok(codes)
    }

    pub async fn status(&self, user_id: Uuid) -> Result<MfaStatus, AuthError> {
        let method = self.mfa.find_mfa_method(user_id).await?;
        Ok(match method {
            Some(m) if m.state() == MfaState::Enabled => MfaStatus {
                totp_enabled: true,
                backup_codes_remaining: m.backup_code_hashes.len(),
            },
            _ => MfaStatus {
                totp_enabled: false,
                backup_codes_remaining: 0,
            },
        })
    }

    /// Whether logins for this user must pass an MFA challenge.
    pub async fn is_enabled(&self, user_id: Uuid) -> Result<bool, AuthError> {
        let method = self.mfa.find_mfa_method(user_id).await?;
        Ok(method.is_some_and(|m| m.state() == MfaState::Enabled))
    }

    fn check_totp(&self, method: &MfaMethod, email: &str, code: &str) -> Result<bool, AuthError> {
        let secret_base32 = method
            .secret_base32
            .as_deref()
            .ok_or_else(|| AuthError::Internal(anyhow::anyhow!("mfa method has no secret")))?;
        let totp = self.build_totp(&Secret::Encoded(secret_base32.to_string()), email)?;
        Ok(totp.check(code, self.clock.unix() as u64))
    }

    fn build_totp(&self, secret: &Secret, account_name: &str) -> Result<TOTP, AuthError> {
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("invalid totp secret: {e:?}")))?;
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            self.config.totp_tolerance_steps,
            TOTP_STEP_SECONDS,
            secret_bytes,
            Some(self.config.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("invalid totp parameters: {e:?}")))
    }

    async fn record_verify_failure(&self, user_id: Uuid) {
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::MfaVerifyFailed,
                    AuditSeverity::Warning,
                    false,
                    self.clock.now(),
                )
                .with_user(user_id),
            )
            .await;
    }
}

/// Backup codes are 8 lowercase hex characters, 32 bits of entropy each.
fn generate_backup_codes(count: usize) -> Vec<String> {
    (0..count)
        .map(|_| {
            let mut bytes = [0u8; 4];
            rand::thread_rng().fill_bytes(&mut bytes);
            hex::encode(bytes)
        })
        .collect()
}
