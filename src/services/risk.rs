//! Risk scoring for login attempts. Seven additive signals, clamped to
//! 100, mapped to a level by configured thresholds. Scoring is
//! best-effort: a storage failure during analysis degrades to a
//! conservative medium-risk default instead of failing the login.

use chrono::{Duration, Timelike};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::RiskConfig;
use crate::error::AuthError;
use crate::models::{AuditEvent, AuditEventType, AuditSeverity, LoginAttempt};
use crate::services::audit::AuditSink;
use crate::store::{DeviceStore, LoginAttemptStore};
use crate::utils::geo::{haversine_km, is_suspicious_ip, GeoLocation, GeoLookup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub score: u32,
    pub level: RiskLevel,
    pub flags: Vec<String>,
    pub require_mfa: bool,
    /// Additional out-of-band verification (handled by the embedding
    /// application) is warranted at high risk and above.
    pub require_verification: bool,
    pub block: bool,
    /// Attempt row created during analysis; its outcome is patched once
    /// the login resolves.
    pub attempt_id: Uuid,
}

#[derive(Clone)]
pub struct RiskScorer {
    attempts: Arc<dyn LoginAttemptStore>,
    devices: Arc<dyn DeviceStore>,
    geo: Arc<dyn GeoLookup>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: RiskConfig,
}

impl RiskScorer {
    pub fn new(
        attempts: Arc<dyn LoginAttemptStore>,
        devices: Arc<dyn DeviceStore>,
        geo: Arc<dyn GeoLookup>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: RiskConfig,
    ) -> Self {
        Self {
            attempts,
            devices,
            geo,
            audit,
            clock,
            config,
        }
    }

    /// Scores a login attempt and records it. Never fails: storage errors
    /// during scoring yield a conservative medium-risk assessment that
    /// still requires MFA but does not block.
    pub async fn analyze(
        &self,
        email: &str,
        ip: IpAddr,
        fingerprint: &str,
        user_id: Option<Uuid>,
    ) -> RiskAssessment {
        let location = self.geo.lookup(ip);

        let mut attempt = LoginAttempt::new(
            email.to_string(),
            ip.to_string(),
            Some(fingerprint.to_string()),
            self.clock.now(),
        );
        if let Some(loc) = &location {
            attempt = attempt.with_location(loc.label.clone(), loc.latitude, loc.longitude);
        }

        let assessment = match self
            .score(email, ip, fingerprint, user_id, location.as_ref())
            .await
        {
            Ok((score, flags)) => self.assess(score, flags, attempt.attempt_id),
            Err(error) => {
                tracing::warn!(%error, "risk analysis degraded to default");
                RiskAssessment {
                    score: 50,
                    level: RiskLevel::Medium,
                    flags: vec!["analysis_error".to_string()],
                    require_mfa: true,
                    require_verification: false,
                    block: false,
                    attempt_id: attempt.attempt_id,
                }
            }
        };

        if let Err(error) = self.attempts.record_attempt(&attempt).await {
            tracing::warn!(%error, "failed to record login attempt");
        }

        let severity = match assessment.level {
            RiskLevel::Critical => AuditSeverity::Critical,
            RiskLevel::High => AuditSeverity::Error,
            _ => AuditSeverity::Info,
        };
        let mut event = AuditEvent::new(
            AuditEventType::RiskAssessed,
            severity,
            !assessment.block,
            self.clock.now(),
        )
        .with_ip(ip.to_string())
        .with_device(fingerprint.to_string())
        .with_data(serde_json::json!({
            "score": assessment.score,
            "level": assessment.level.as_str(),
            "flags": assessment.flags,
        }));
        if let Some(user_id) = user_id {
            event = event.with_user(user_id);
        }
        self.audit.record(event).await;

        assessment
    }

    /// Patches the recorded attempt once the login resolves. Best-effort;
    /// a failure here must not fail the login itself.
    pub async fn record_outcome(
        &self,
        attempt_id: Uuid,
        success: bool,
        failure_reason: Option<&str>,
    ) {
        if let Err(error) = self
            .attempts
            .mark_attempt_outcome(attempt_id, success, failure_reason)
            .await
        {
            tracing::warn!(%error, "failed to record login outcome");
        }
    }

    async fn score(
        &self,
        email: &str,
        ip: IpAddr,
        fingerprint: &str,
        user_id: Option<Uuid>,
        location: Option<&GeoLocation>,
    ) -> Result<(u32, Vec<String>), AuthError> {
        let now = self.clock.now();
        let ip_text = ip.to_string();
        let mut score: u32 = 0;
        let mut flags = Vec::new();

        // Repeated failures from this address.
        let ip_failures = self
            .attempts
            .count_failures_by_ip(&ip_text, now - Duration::minutes(self.config.ip_failure_window_minutes))
            .await?;
        if ip_failures >= self.config.ip_failure_threshold {
            score += self.config.weight_ip_failures;
            flags.push("multiple_failed_attempts_from_ip".to_string());
        }

        // Failures against this account from anywhere.
        let email_failures = self
            .attempts
            .count_failures_by_email(
                email,
                now - Duration::minutes(self.config.email_failure_window_minutes),
            )
            .await?;
        if email_failures >= self.config.email_failure_threshold {
            score += self.config.weight_brute_force;
            flags.push("account_brute_force_attempt".to_string());
        }

        // Fingerprint not seen for this account before.
        if let Some(user_id) = user_id {
            if self.devices.find_device(user_id, fingerprint).await?.is_none() {
                score += self.config.weight_new_device;
                flags.push("new_device".to_string());
            }
        }

        // Distance from every recent successful login location; weight
        // scales with how far past the velocity threshold the jump is.
        if let Some(current) = location {
            let history = self
                .attempts
                .successful_locations_by_email(
                    email,
                    now - Duration::days(self.config.geo_window_days),
                )
                .await?;
            let min_distance = history
                .iter()
                .map(|past| {
                    haversine_km(
                        current.latitude,
                        current.longitude,
                        past.latitude,
                        past.longitude,
                    )
                })
                .fold(f64::INFINITY, f64::min);
            if min_distance.is_finite() && min_distance > self.config.geo_velocity_km {
                let weight = ((min_distance / self.config.geo_velocity_km) * 10.0).round() as u32;
                score += weight.min(self.config.weight_geo_max);
                flags.push("suspicious_location_change".to_string());
            }
        }

        // Many successful logins in a short burst.
        let recent_successes = self
            .attempts
            .count_successes_by_email(
                email,
                now - Duration::minutes(self.config.rapid_login_window_minutes),
            )
            .await?;
        if recent_successes >= self.config.rapid_login_threshold {
            score += self.config.weight_rapid_logins;
            flags.push("rapid_successive_logins".to_string());
        }

        // Reserved or suspicious source ranges, or an address with a
        // heavy failure history over a longer horizon.
        if is_suspicious_ip(ip) {
            score += self.config.weight_malicious_ip_max;
            flags.push("malicious_ip".to_string());
        } else {
            let long_failures = self
                .attempts
                .count_failures_by_ip(
                    &ip_text,
                    now - Duration::hours(self.config.malicious_ip_failure_window_hours),
                )
                .await?;
            if long_failures >= self.config.malicious_ip_failure_threshold {
                score += (long_failures as u32).min(self.config.weight_malicious_ip_max);
                flags.push("malicious_ip".to_string());
            }
        }

        // Dead-of-night logins, UTC.
        let hour = now.hour();
        if hour >= self.config.unusual_hour_start && hour < self.config.unusual_hour_end {
            score += self.config.weight_unusual_time;
            flags.push("unusual_time_pattern".to_string());
        }

        Ok((score.min(100), flags))
    }

    fn assess(&self, score: u32, flags: Vec<String>, attempt_id: Uuid) -> RiskAssessment {
        let mut level = if score >= self.config.threshold_critical {
            RiskLevel::Critical
        } else if score >= self.config.threshold_high {
            RiskLevel::High
        } else if score >= self.config.threshold_medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        // Some signals set a floor regardless of the raw score.
        if flags.iter().any(|f| f == "account_brute_force_attempt") {
            level = RiskLevel::Critical;
        } else if flags.iter().any(|f| f == "malicious_ip") {
            level = level.max(RiskLevel::High);
        } else if flags
            .iter()
            .any(|f| f == "new_device" || f == "rapid_successive_logins")
        {
            level = level.max(RiskLevel::Medium);
        }

        RiskAssessment {
            score,
            level,
            require_mfa: level >= RiskLevel::Medium,
            require_verification: level >= RiskLevel::High,
            block: level == RiskLevel::Critical,
            flags,
            attempt_id,
        }
    }
}
