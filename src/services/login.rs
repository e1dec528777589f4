//! Login orchestration. Ties credential checks, risk scoring, device
//! tracking, MFA challenges, and token issuance into one flow. All
//! credential failures surface as the same error so callers cannot probe
//! which emails exist.

use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AuthError;
use crate::models::{
    AuditEvent, AuditEventType, AuditSeverity, DeviceContext, TokenPair, User,
};
use crate::services::audit::AuditSink;
use crate::services::credentials::CredentialStore;
use crate::services::device::DeviceRegistry;
use crate::services::mfa::MfaEngine;
use crate::services::risk::{RiskAssessment, RiskLevel, RiskScorer};
use crate::services::token::TokenService;
use crate::utils::password::Password;
use crate::utils::validation::{normalize_email, validate_email};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug)]
pub enum LoginOutcome {
    /// Credentials accepted and no challenge outstanding.
    Success {
        tokens: TokenPair,
        device_id: String,
        risk: RiskAssessment,
    },
    /// Credentials accepted but an MFA challenge must be answered via
    /// `login_mfa` before any tokens are issued.
    MfaRequired {
        device_id: String,
        risk: RiskAssessment,
    },
}

#[derive(Clone)]
pub struct LoginFlow {
    credentials: Arc<dyn CredentialStore>,
    tokens: TokenService,
    mfa: MfaEngine,
    risk: RiskScorer,
    devices: DeviceRegistry,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl LoginFlow {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        tokens: TokenService,
        mfa: MfaEngine,
        risk: RiskScorer,
        devices: DeviceRegistry,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            tokens,
            mfa,
            risk,
            devices,
            audit,
            clock,
        }
    }

    /// First phase of login. Scores the attempt, verifies credentials,
    /// and either issues tokens or asks for an MFA challenge. A critical
    /// risk assessment blocks before credentials are even considered.
    pub async fn login(
        &self,
        email: &str,
        password: &Password,
        context: &DeviceContext,
    ) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        let fingerprint = DeviceRegistry::fingerprint(context);

        let user = self.credentials.find_active_user_by_email(&email).await?;
        let risk = self
            .risk
            .analyze(&email, context.ip, &fingerprint, user.as_ref().map(|u| u.user_id))
            .await;

        if risk.block {
            return Err(self
                .reject_blocked(&risk, user.as_ref(), context, &fingerprint)
                .await);
        }

        let Some(user) = user else {
            return Err(self.reject_credentials(&risk, None, context, &fingerprint).await);
        };
        if !self.credentials.verify_password(&user, password) {
            return Err(self
                .reject_credentials(&risk, Some(&user), context, &fingerprint)
                .await);
        }

        if self.mfa.is_enabled(user.user_id).await? {
            let trusted = self.devices.is_trusted(user.user_id, &fingerprint).await?;
            // Trust only waives the challenge below high risk.
            if !trusted || risk.level >= RiskLevel::High {
                self.risk
                    .record_outcome(risk.attempt_id, false, Some("mfa_required"))
                    .await;
                return Ok(LoginOutcome::MfaRequired {
                    device_id: fingerprint,
                    risk,
                });
            }
        }

        self.complete(user, fingerprint, context, risk).await
    }

    /// Second phase: same checks as `login`, plus a TOTP or backup code.
    pub async fn login_mfa(
        &self,
        email: &str,
        password: &Password,
        code: &str,
        context: &DeviceContext,
    ) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        let fingerprint = DeviceRegistry::fingerprint(context);

        let user = self.credentials.find_active_user_by_email(&email).await?;
        let risk = self
            .risk
            .analyze(&email, context.ip, &fingerprint, user.as_ref().map(|u| u.user_id))
            .await;

        if risk.block {
            return Err(self
                .reject_blocked(&risk, user.as_ref(), context, &fingerprint)
                .await);
        }

        let Some(user) = user else {
            return Err(self.reject_credentials(&risk, None, context, &fingerprint).await);
        };
        if !self.credentials.verify_password(&user, password) {
            return Err(self
                .reject_credentials(&risk, Some(&user), context, &fingerprint)
                .await);
        }

        let verification = self.mfa.verify_for_login(&user, code).await?;
        if !verification.success {
            self.risk
                .record_outcome(risk.attempt_id, false, Some("invalid_mfa_code"))
                .await;
            return Err(AuthError::Unauthorized("invalid mfa code".to_string()));
        }

        self.complete(user, fingerprint, context, risk).await
    }

    /// Revokes the presented refresh token. Idempotent: logging out with
    /// an unknown or already-revoked token succeeds quietly.
    pub async fn logout(&self, refresh_secret: &str) -> Result<(), AuthError> {
        self.tokens.revoke(refresh_secret).await?;
        Ok(())
    }

    /// Revokes every session for the user across all devices.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        self.tokens.revoke_all(user_id).await
    }

    /// Changes the password after re-verifying the current one, then
    /// revokes every outstanding session.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current: &Password,
        new: &Password,
    ) -> Result<(), AuthError> {
        let user = self
            .credentials
            .find_active_user_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("user".to_string()))?;

        if !self.credentials.verify_password(&user, current) {
            return Err(AuthError::invalid_credentials());
        }
        if new.as_str().len() < MIN_PASSWORD_LEN {
            return Err(AuthError::validation(
                "password",
                format!("password must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }

        self.credentials.set_password(user_id, new).await?;
        let revoked = self.tokens.revoke_all(user_id).await?;

        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::PasswordChanged,
                    AuditSeverity::Warning,
                    true,
                    self.clock.now(),
                )
                .with_user(user_id)
                .with_data(serde_json::json!({ "revoked_sessions": revoked })),
            )
            .await;
        Ok(())
    }

    async fn complete(
        &self,
        user: User,
        fingerprint: String,
        context: &DeviceContext,
        risk: RiskAssessment,
    ) -> Result<LoginOutcome, AuthError> {
        self.devices.register(user.user_id, context).await?;
        let tokens = self.tokens.issue(&user, Some(fingerprint.clone())).await?;

        self.risk.record_outcome(risk.attempt_id, true, None).await;
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::LoginSuccess,
                    AuditSeverity::Info,
                    true,
                    self.clock.now(),
                )
                .with_user(user.user_id)
                .with_ip(context.ip.to_string())
                .with_device(fingerprint.clone()),
            )
            .await;

        Ok(LoginOutcome::Success {
            tokens,
            device_id: fingerprint,
            risk,
        })
    }

    async fn reject_blocked(
        &self,
        risk: &RiskAssessment,
        user: Option<&User>,
        context: &DeviceContext,
        fingerprint: &str,
    ) -> AuthError {
        self.risk
            .record_outcome(risk.attempt_id, false, Some("blocked"))
            .await;
        let mut event = AuditEvent::new(
            AuditEventType::LoginBlocked,
            AuditSeverity::Critical,
            false,
            self.clock.now(),
        )
        .with_ip(context.ip.to_string())
        .with_device(fingerprint.to_string())
        .with_data(serde_json::json!({ "score": risk.score, "flags": risk.flags }));
        if let Some(user) = user {
            event = event.with_user(user.user_id);
        }
        self.audit.record(event).await;
        // Same message as a credential failure; a blocked caller learns
        // nothing about why they were refused.
        AuthError::invalid_credentials()
    }

    async fn reject_credentials(
        &self,
        risk: &RiskAssessment,
        user: Option<&User>,
        context: &DeviceContext,
        fingerprint: &str,
    ) -> AuthError {
        self.risk
            .record_outcome(risk.attempt_id, false, Some("invalid_credentials"))
            .await;
        let mut event = AuditEvent::new(
            AuditEventType::LoginFailed,
            AuditSeverity::Warning,
            false,
            self.clock.now(),
        )
        .with_ip(context.ip.to_string())
        .with_device(fingerprint.to_string());
        if let Some(user) = user {
            event = event.with_user(user.user_id);
        }
        self.audit.record(event).await;
        AuthError::invalid_credentials()
    }
}
