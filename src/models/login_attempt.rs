//! Login attempt history. Append-only; the success flag may be patched
//! once, shortly after the attempt, to reflect the final outcome.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct LoginAttempt {
    pub attempt_id: Uuid,
    pub email: String,
    pub ip_address: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub device_fingerprint: Option<String>,
    pub location_label: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_utc: DateTime<Utc>,
}

impl LoginAttempt {
    pub fn new(
        email: String,
        ip_address: String,
        device_fingerprint: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            email,
            ip_address,
            success: false,
            failure_reason: None,
            device_fingerprint,
            location_label: None,
            latitude: None,
            longitude: None,
            created_utc: now,
        }
    }

    pub fn with_location(mut self, label: String, latitude: f64, longitude: f64) -> Self {
        self.location_label = Some(label);
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Whether this attempt counts toward failure-rate signals. An
    /// attempt parked at an outstanding MFA challenge is pending, not
    /// failed.
    pub fn is_failure(&self) -> bool {
        !self.success && self.failure_reason.as_deref() != Some("mfa_required")
    }
}
