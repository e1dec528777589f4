//! Shared fixture for integration tests: an in-memory store, a manually
//! driven clock, and the full service graph wired the way an embedding
//! binary would wire it.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use totp_rs::{Algorithm, Secret, TOTP};

use vigil_auth::clock::{Clock, ManualClock};
use vigil_auth::config::{MfaConfig, RiskConfig, TokenConfig};
use vigil_auth::models::{DeviceContext, User};
use vigil_auth::services::{
    ArgonCredentialStore, AuditService, DeviceRegistry, LoginFlow, MfaEngine, RiskScorer,
    StoreAuditSink, TokenService,
};
use vigil_auth::store::MemoryStore;
use vigil_auth::utils::geo::{GeoLookup, StaticGeoLookup};
use vigil_auth::utils::password::{hash_password, Password};

pub const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const FIREFOX_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub login: LoginFlow,
    pub tokens: TokenService,
    pub mfa: MfaEngine,
    pub risk: RiskScorer,
    pub devices: DeviceRegistry,
    pub audit: AuditService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_geo(StaticGeoLookup::new())
    }

    pub fn with_geo(geo: impl GeoLookup + 'static) -> Self {
        let store = Arc::new(MemoryStore::new());
        // Midday UTC, well clear of the unusual-hours window.
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
        ));
        let geo: Arc<dyn GeoLookup> = Arc::new(geo);

        let credentials = Arc::new(ArgonCredentialStore::new(store.clone()));
        let sink = Arc::new(StoreAuditSink::new(store.clone()));

        let tokens = TokenService::new(
            store.clone(),
            credentials.clone(),
            sink.clone(),
            clock.clone(),
            TokenConfig {
                jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
                issuer: "vigil-auth-test".to_string(),
                access_token_ttl_minutes: 15,
                refresh_token_ttl_days: 7,
            },
        );
        let mfa = MfaEngine::new(
            store.clone(),
            credentials.clone(),
            sink.clone(),
            clock.clone(),
            MfaConfig::default(),
        );
        let risk = RiskScorer::new(
            store.clone(),
            store.clone(),
            geo.clone(),
            sink.clone(),
            clock.clone(),
            RiskConfig::default(),
        );
        let devices = DeviceRegistry::new(store.clone(), geo, sink.clone(), clock.clone());
        let login = LoginFlow::new(
            credentials,
            tokens.clone(),
            mfa.clone(),
            risk.clone(),
            devices.clone(),
            sink,
            clock.clone(),
        );
        let audit = AuditService::new(store.clone());

        Self {
            store,
            clock,
            login,
            tokens,
            mfa,
            risk,
            devices,
            audit,
        }
    }

    pub fn seed_user(&self, email: &str, password: &str) -> User {
        let hash = hash_password(&Password::new(password)).expect("hash");
        let user = User::new(email.to_string(), hash.into_string(), vec!["user".to_string()]);
        self.store.insert_user(user.clone());
        user
    }

    /// Completes TOTP enrollment for the user and returns the secret plus
    /// the plaintext backup codes.
    pub async fn enroll_totp(&self, user: &User) -> (String, Vec<String>) {
        let setup = self.mfa.setup(user).await.expect("setup");
        let code = totp_code(&setup.secret_base32, self.clock.as_ref());
        self.mfa
            .verify_and_enable(user, &code)
            .await
            .expect("enable");
        (setup.secret_base32, setup.backup_codes)
    }

    pub fn audit_types(&self) -> Vec<String> {
        self.store
            .audit_snapshot()
            .into_iter()
            .map(|e| e.event_type_code)
            .collect()
    }
}

pub fn context(user_agent: &str, ip: &str) -> DeviceContext {
    DeviceContext {
        user_agent: user_agent.to_string(),
        ip: ip.parse().expect("ip"),
        explicit_id: None,
    }
}

/// Current TOTP code for a secret at the harness clock's time.
pub fn totp_code(secret_base32: &str, clock: &dyn Clock) -> String {
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        2,
        30,
        Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .expect("secret"),
        Some("vigil".to_string()),
        "test@example.com".to_string(),
    )
    .expect("totp");
    totp.generate(clock.unix() as u64)
}
