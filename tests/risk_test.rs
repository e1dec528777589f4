mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{context, Harness, CHROME_UA};
use std::sync::Arc;
use uuid::Uuid;

use vigil_auth::models::LoginAttempt;
use vigil_auth::services::{LoginOutcome, RiskLevel, RiskScorer, StoreAuditSink};
use vigil_auth::store::{LoginAttemptStore, MemoryStore};
use vigil_auth::utils::geo::{GeoLocation, StaticGeoLookup};
use vigil_auth::utils::password::Password;
use vigil_auth::AuthError;
use vigil_auth::config::RiskConfig;

const IP: &str = "81.2.69.142";

fn success_flags(outcome: &LoginOutcome) -> &[String] {
    match outcome {
        LoginOutcome::Success { risk, .. } => &risk.flags,
        LoginOutcome::MfaRequired { risk, .. } => &risk.flags,
    }
}

#[tokio::test]
async fn first_login_is_flagged_as_a_new_device() {
    let h = Harness::new();
    h.seed_user("alice@example.com", "correct horse battery");

    let outcome = h
        .login
        .login("alice@example.com", &Password::new("correct horse battery"), &context(CHROME_UA, IP))
        .await
        .unwrap();
    let LoginOutcome::Success { risk, .. } = &outcome else {
        panic!("expected success");
    };
    assert!(risk.flags.iter().any(|f| f == "new_device"));
    assert_eq!(risk.level, RiskLevel::Medium);
    assert!(!risk.block);

    // Second login from the same device is clean.
    let outcome = h
        .login
        .login("alice@example.com", &Password::new("correct horse battery"), &context(CHROME_UA, IP))
        .await
        .unwrap();
    assert!(!success_flags(&outcome).iter().any(|f| f == "new_device"));
}

#[tokio::test]
async fn repeated_failures_escalate_to_a_block() {
    let h = Harness::new();
    h.seed_user("alice@example.com", "correct horse battery");
    let ctx = context(CHROME_UA, IP);
    let wrong = Password::new("wrong password");

    for _ in 0..5 {
        let err = h.login.login("alice@example.com", &wrong, &ctx).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    // Five failures trip the brute-force signal; even the right password
    // is refused now, with the same message as a credential failure.
    let err = h
        .login
        .login("alice@example.com", &Password::new("correct horse battery"), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
    assert!(h.audit_types().iter().any(|t| t == "login_blocked"));
}

#[tokio::test]
async fn brute_force_flag_ignores_ip_diversity() {
    let h = Harness::new();
    let user = h.seed_user("alice@example.com", "correct horse battery");
    let wrong = Password::new("wrong password");

    // One failure each from five unrelated networks: no single IP gets
    // near its own threshold, only the per-email counter does.
    let sources = ["81.2.69.142", "66.249.64.10", "1.144.0.10", "8.8.4.4", "93.184.216.34"];
    for ip in sources {
        let err = h
            .login
            .login("alice@example.com", &wrong, &context(CHROME_UA, ip))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    let risk = h
        .risk
        .analyze(
            "alice@example.com",
            "151.101.1.140".parse().unwrap(),
            "unseen-device-fp",
            Some(user.user_id),
        )
        .await;
    assert!(risk.flags.iter().any(|f| f == "account_brute_force_attempt"));
    assert!(!risk.flags.iter().any(|f| f == "multiple_failed_attempts_from_ip"));
    assert_eq!(risk.level, RiskLevel::Critical);
    assert!(risk.block);
}

#[tokio::test]
async fn failures_age_out_of_the_window() {
    let h = Harness::new();
    h.seed_user("alice@example.com", "correct horse battery");
    let ctx = context(CHROME_UA, IP);

    for _ in 0..5 {
        let _ = h
            .login
            .login("alice@example.com", &Password::new("wrong password"), &ctx)
            .await;
    }
    h.clock.advance(Duration::hours(2));

    let outcome = h
        .login
        .login("alice@example.com", &Password::new("correct horse battery"), &ctx)
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Success { .. }));
}

#[tokio::test]
async fn rapid_successful_logins_are_flagged() {
    let h = Harness::new();
    h.seed_user("alice@example.com", "correct horse battery");
    let ctx = context(CHROME_UA, IP);
    let password = Password::new("correct horse battery");

    for _ in 0..3 {
        h.login.login("alice@example.com", &password, &ctx).await.unwrap();
        h.clock.advance(Duration::seconds(30));
    }

    let outcome = h.login.login("alice@example.com", &password, &ctx).await.unwrap();
    assert!(success_flags(&outcome).iter().any(|f| f == "rapid_successive_logins"));
    if let LoginOutcome::Success { risk, .. } = &outcome {
        assert!(risk.level >= RiskLevel::Medium);
    }
}

#[tokio::test]
async fn impossible_travel_is_flagged() {
    let london: std::net::IpAddr = "81.2.69.142".parse().unwrap();
    let sydney: std::net::IpAddr = "1.144.0.10".parse().unwrap();
    let geo = StaticGeoLookup::new()
        .with(london, "London", 51.5074, -0.1278)
        .with(sydney, "Sydney", -33.8688, 151.2093);
    let h = Harness::with_geo(geo);
    h.seed_user("alice@example.com", "correct horse battery");
    let password = Password::new("correct horse battery");

    h.login
        .login("alice@example.com", &password, &context(CHROME_UA, "81.2.69.142"))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(1));

    let outcome = h
        .login
        .login("alice@example.com", &password, &context(CHROME_UA, "1.144.0.10"))
        .await
        .unwrap();
    assert!(success_flags(&outcome).iter().any(|f| f == "suspicious_location_change"));
}

#[tokio::test]
async fn reserved_source_addresses_raise_the_floor() {
    let h = Harness::new();
    h.seed_user("alice@example.com", "correct horse battery");

    let outcome = h
        .login
        .login(
            "alice@example.com",
            &Password::new("correct horse battery"),
            &context(CHROME_UA, "10.0.0.7"),
        )
        .await
        .unwrap();
    let LoginOutcome::Success { risk, .. } = &outcome else {
        panic!("expected success");
    };
    assert!(risk.flags.iter().any(|f| f == "malicious_ip"));
    assert!(risk.level >= RiskLevel::High);
    assert!(risk.require_mfa);
    assert!(risk.require_verification);
}

#[tokio::test]
async fn dead_of_night_logins_are_flagged() {
    let h = Harness::new();
    h.seed_user("alice@example.com", "correct horse battery");
    h.clock.set(Utc.with_ymd_and_hms(2026, 3, 3, 3, 15, 0).unwrap());

    let outcome = h
        .login
        .login("alice@example.com", &Password::new("correct horse battery"), &context(CHROME_UA, IP))
        .await
        .unwrap();
    assert!(success_flags(&outcome).iter().any(|f| f == "unusual_time_pattern"));
}

/// Attempt store that fails every call, to exercise the degraded path.
struct BrokenAttempts;

#[async_trait]
impl LoginAttemptStore for BrokenAttempts {
    async fn record_attempt(&self, _attempt: &LoginAttempt) -> Result<(), AuthError> {
        Err(AuthError::Internal(anyhow::anyhow!("store down")))
    }
    async fn mark_attempt_outcome(
        &self,
        _attempt_id: Uuid,
        _success: bool,
        _failure_reason: Option<&str>,
    ) -> Result<(), AuthError> {
        Err(AuthError::Internal(anyhow::anyhow!("store down")))
    }
    async fn count_failures_by_ip(
        &self,
        _ip: &str,
        _since: DateTime<Utc>,
    ) -> Result<i64, AuthError> {
        Err(AuthError::Internal(anyhow::anyhow!("store down")))
    }
    async fn count_failures_by_email(
        &self,
        _email: &str,
        _since: DateTime<Utc>,
    ) -> Result<i64, AuthError> {
        Err(AuthError::Internal(anyhow::anyhow!("store down")))
    }
    async fn count_successes_by_email(
        &self,
        _email: &str,
        _since: DateTime<Utc>,
    ) -> Result<i64, AuthError> {
        Err(AuthError::Internal(anyhow::anyhow!("store down")))
    }
    async fn successful_locations_by_email(
        &self,
        _email: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<GeoLocation>, AuthError> {
        Err(AuthError::Internal(anyhow::anyhow!("store down")))
    }
}

#[tokio::test]
async fn a_broken_store_degrades_to_a_conservative_default() {
    let h = Harness::new();
    let scorer = RiskScorer::new(
        Arc::new(BrokenAttempts),
        h.store.clone(),
        Arc::new(StaticGeoLookup::new()),
        Arc::new(StoreAuditSink::new(h.store.clone())),
        h.clock.clone(),
        RiskConfig::default(),
    );

    let assessment = scorer
        .analyze("alice@example.com", IP.parse().unwrap(), "fp", None)
        .await;
    assert_eq!(assessment.score, 50);
    assert_eq!(assessment.level, RiskLevel::Medium);
    assert_eq!(assessment.flags, vec!["analysis_error".to_string()]);
    assert!(assessment.require_mfa);
    assert!(!assessment.require_verification);
    assert!(!assessment.block);
}
