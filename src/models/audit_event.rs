//! Security audit events. Append-only; never mutated or deleted by this
//! core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    LoginSuccess,
    LoginFailed,
    LoginBlocked,
    RiskAssessed,
    MfaSetupStarted,
    MfaEnabled,
    MfaVerifyFailed,
    MfaChallengePassed,
    MfaDisabled,
    BackupCodeConsumed,
    BackupCodesRegenerated,
    TokenRefreshed,
    TokenRevoked,
    RefreshTokenReplayed,
    NewDeviceRegistered,
    DeviceTrusted,
    DeviceUntrusted,
    DeviceRemoved,
    PasswordChanged,
    LogoutAll,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::LoginSuccess => "login_success",
            AuditEventType::LoginFailed => "login_failed",
            AuditEventType::LoginBlocked => "login_blocked",
            AuditEventType::RiskAssessed => "risk_assessed",
            AuditEventType::MfaSetupStarted => "mfa_setup_started",
            AuditEventType::MfaEnabled => "mfa_enabled",
            AuditEventType::MfaVerifyFailed => "mfa_verify_failed",
            AuditEventType::MfaChallengePassed => "mfa_challenge_passed",
            AuditEventType::MfaDisabled => "mfa_disabled",
            AuditEventType::BackupCodeConsumed => "backup_code_consumed",
            AuditEventType::BackupCodesRegenerated => "backup_codes_regenerated",
            AuditEventType::TokenRefreshed => "token_refreshed",
            AuditEventType::TokenRevoked => "token_revoked",
            AuditEventType::RefreshTokenReplayed => "refresh_token_replayed",
            AuditEventType::NewDeviceRegistered => "new_device_registered",
            AuditEventType::DeviceTrusted => "device_trusted",
            AuditEventType::DeviceUntrusted => "device_untrusted",
            AuditEventType::DeviceRemoved => "device_removed",
            AuditEventType::PasswordChanged => "password_changed",
            AuditEventType::LogoutAll => "logout_all",
        }
    }

    pub fn category(&self) -> AuditCategory {
        match self {
            AuditEventType::LoginSuccess
            | AuditEventType::LoginFailed
            | AuditEventType::LoginBlocked => AuditCategory::Authentication,
            AuditEventType::RiskAssessed => AuditCategory::Risk,
            AuditEventType::MfaSetupStarted
            | AuditEventType::MfaEnabled
            | AuditEventType::MfaVerifyFailed
            | AuditEventType::MfaChallengePassed
            | AuditEventType::MfaDisabled
            | AuditEventType::BackupCodeConsumed
            | AuditEventType::BackupCodesRegenerated => AuditCategory::Mfa,
            AuditEventType::TokenRefreshed
            | AuditEventType::TokenRevoked
            | AuditEventType::RefreshTokenReplayed
            | AuditEventType::PasswordChanged
            | AuditEventType::LogoutAll => AuditCategory::Token,
            AuditEventType::NewDeviceRegistered
            | AuditEventType::DeviceTrusted
            | AuditEventType::DeviceUntrusted
            | AuditEventType::DeviceRemoved => AuditCategory::Device,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Authentication,
    Mfa,
    Token,
    Device,
    Risk,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Authentication => "authentication",
            AuditCategory::Mfa => "mfa",
            AuditCategory::Token => "token",
            AuditCategory::Device => "device",
            AuditCategory::Risk => "risk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Info => "info",
            AuditSeverity::Warning => "warning",
            AuditSeverity::Error => "error",
            AuditSeverity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub event_type_code: String,
    pub category_code: String,
    pub severity_code: String,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub device_id: Option<String>,
    pub event_data: Option<serde_json::Value>,
    pub success: bool,
    pub created_utc: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        severity: AuditSeverity,
        success: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type_code: event_type.as_str().to_string(),
            category_code: event_type.category().as_str().to_string(),
            severity_code: severity.as_str().to_string(),
            user_id: None,
            ip_address: None,
            device_id: None,
            event_data: None,
            success,
            created_utc: now,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.event_data = Some(data);
        self
    }
}

/// Filter for the admin-only audit query surface.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub user_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub category: Option<String>,
    pub from_utc: Option<DateTime<Utc>>,
    pub to_utc: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditQuery {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            limit: 50,
            ..Self::default()
        }
    }
}
