//! Token issuance and rotation. Access tokens are short-lived HS256 JWTs;
//! refresh tokens are opaque 256-bit secrets stored only as SHA-256
//! digests. Refresh is single-use: rotation revokes the presented token
//! and issues a replacement atomically, and a second presentation of a
//! rotated token is treated as replay.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::TokenConfig;
use crate::error::AuthError;
use crate::models::{AuditEvent, AuditEventType, AuditSeverity, RefreshToken, TokenPair, User};
use crate::services::audit::AuditSink;
use crate::services::credentials::CredentialStore;
use crate::store::RefreshTokenStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Clone)]
pub struct TokenService {
    tokens: Arc<dyn RefreshTokenStore>,
    credentials: Arc<dyn CredentialStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenService {
    pub fn new(
        tokens: Arc<dyn RefreshTokenStore>,
        credentials: Arc<dyn CredentialStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: TokenConfig,
    ) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        Self {
            tokens,
            credentials,
            audit,
            clock,
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Issues an access/refresh pair for an authenticated user. The
    /// refresh token is bound to the presenting device when one is known.
    pub async fn issue(
        &self,
        user: &User,
        device_id: Option<String>,
    ) -> Result<TokenPair, AuthError> {
        let access_token = self.encode_access(user)?;
        let secret = generate_refresh_secret();
        let refresh = RefreshToken::new(
            user.user_id,
            &secret,
            device_id,
            self.config.refresh_token_ttl_days,
            self.clock.now(),
        );
        self.tokens.insert_token(&refresh).await?;
        Ok(TokenPair::new(
            access_token,
            secret,
            self.config.access_token_ttl_minutes * 60,
        ))
    }

    /// Rotates a refresh token. The presented token is revoked and a
    /// replacement issued in one step; losing the rotation race, or
    /// presenting an already-rotated token, is reported as replay.
    pub async fn refresh(&self, refresh_secret: &str) -> Result<TokenPair, AuthError> {
        let hash = RefreshToken::hash_secret(refresh_secret);
        let token = self
            .tokens
            .find_token_by_hash(&hash)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("invalid refresh token".to_string()))?;

        if token.is_revoked() {
            self.record_replay(&token).await;
            return Err(AuthError::Unauthorized("invalid refresh token".to_string()));
        }
        if token.is_expired(self.clock.now()) {
            return Err(AuthError::Unauthorized("refresh token expired".to_string()));
        }

        let user = self
            .credentials
            .find_active_user_by_id(token.user_id)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("invalid refresh token".to_string()))?;

        let access_token = self.encode_access(&user)?;
        let secret = generate_refresh_secret();
        let replacement = RefreshToken::new(
            user.user_id,
            &secret,
            token.device_id.clone(),
            self.config.refresh_token_ttl_days,
            self.clock.now(),
        );

        if !self.tokens.rotate_token(token.token_id, &replacement).await? {
            self.record_replay(&token).await;
            return Err(AuthError::Unauthorized("invalid refresh token".to_string()));
        }

        let mut event = AuditEvent::new(
            AuditEventType::TokenRefreshed,
            AuditSeverity::Info,
            true,
            self.clock.now(),
        )
        .with_user(user.user_id);
        if let Some(device_id) = &token.device_id {
            event = event.with_device(device_id.clone());
        }
        self.audit.record(event).await;

        Ok(TokenPair::new(
            access_token,
            secret,
            self.config.access_token_ttl_minutes * 60,
        ))
    }

    /// Decodes and validates an access token, then re-checks that the
    /// subject is still an active account. Revoking a user takes effect
    /// here even before the JWT expires. A deleted subject is NotFound;
    /// a suspended or deactivated one is Unauthorized.
    pub async fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let claims = self.decode_access(token)?;
        let user = self
            .credentials
            .find_user_by_id(claims.sub)
            .await?
            .ok_or_else(|| AuthError::NotFound("user not found".to_string()))?;
        if !user.is_active() {
            return Err(AuthError::Unauthorized("account is not active".to_string()));
        }
        Ok(claims)
    }

    /// Revokes a single refresh token. Returns false when the token was
    /// unknown or already revoked, which callers treat as idempotent
    /// success.
    pub async fn revoke(&self, refresh_secret: &str) -> Result<bool, AuthError> {
        let hash = RefreshToken::hash_secret(refresh_secret);
        let Some(token) = self.tokens.find_token_by_hash(&hash).await? else {
            return Ok(false);
        };
        let revoked = self
            .tokens
            .revoke_token(token.token_id, self.clock.now())
            .await?;
        if revoked {
            let mut event = AuditEvent::new(
                AuditEventType::TokenRevoked,
                AuditSeverity::Info,
                true,
                self.clock.now(),
            )
            .with_user(token.user_id);
            if let Some(device_id) = &token.device_id {
                event = event.with_device(device_id.clone());
            }
            self.audit.record(event).await;
        }
        Ok(revoked)
    }

    /// Revokes every live refresh token for the user. Used by logout-all
    /// and password change.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self
            .tokens
            .revoke_all_for_user(user_id, self.clock.now())
            .await?;
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::LogoutAll,
                    AuditSeverity::Info,
                    true,
                    self.clock.now(),
                )
                .with_user(user_id)
                .with_data(serde_json::json!({ "revoked_sessions": revoked })),
            )
            .await;
        Ok(revoked)
    }

    /// Revokes every live refresh token bound to one device. Device
    /// removal uses the store-level cascade instead; this surface covers
    /// a targeted revocation that keeps the device registered.
    pub async fn revoke_device(&self, user_id: Uuid, device_id: &str) -> Result<u64, AuthError> {
        let revoked = self
            .tokens
            .revoke_for_device(user_id, device_id, self.clock.now())
            .await?;
        if revoked > 0 {
            self.audit
                .record(
                    AuditEvent::new(
                        AuditEventType::TokenRevoked,
                        AuditSeverity::Info,
                        true,
                        self.clock.now(),
                    )
                    .with_user(user_id)
                    .with_device(device_id.to_string())
                    .with_data(serde_json::json!({ "revoked_sessions": revoked })),
                )
                .await;
        }
        Ok(revoked)
    }

    fn encode_access(&self, user: &User) -> Result<String, AuthError> {
        let iat = self.clock.unix();
        let claims = AccessClaims {
            sub: user.user_id,
            email: user.email.clone(),
            roles: user.roles.clone(),
            permissions: user.permissions.clone(),
            iss: self.config.issuer.clone(),
            iat,
            exp: iat + self.config.access_token_ttl_minutes * 60,
            jti: Uuid::new_v4().to_string(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// Signature and issuer are checked by the JWT library; expiry is
    /// checked against the injected clock.
    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.validate_exp = false;

        let data = decode::<AccessClaims>(token, &self.decoding_key, &validation)?;
        if data.claims.exp <= self.clock.unix() {
            return Err(AuthError::Unauthorized("access token expired".to_string()));
        }
        Ok(data.claims)
    }

    async fn record_replay(&self, token: &RefreshToken) {
        tracing::warn!(
            user_id = %token.user_id,
            "revoked refresh token presented again"
        );
        let mut event = AuditEvent::new(
            AuditEventType::RefreshTokenReplayed,
            AuditSeverity::Error,
            false,
            self.clock.now(),
        )
        .with_user(token.user_id);
        if let Some(device_id) = &token.device_id {
            event = event.with_device(device_id.clone());
        }
        self.audit.record(event).await;
    }
}

/// 256-bit random secret, hex-encoded. Only its SHA-256 digest is stored.
fn generate_refresh_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TokenConfig;
    use crate::services::credentials::ArgonCredentialStore;
    use crate::store::MemoryStore;
    use crate::utils::password::{hash_password, Password};
    use chrono::{Duration, TimeZone, Utc};

    fn test_config() -> TokenConfig {
        TokenConfig {
            jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
            issuer: "vigil-auth-test".to_string(),
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 7,
        }
    }

    fn service_with(store: Arc<MemoryStore>, clock: Arc<ManualClock>) -> TokenService {
        let credentials = Arc::new(ArgonCredentialStore::new(store.clone()));
        let audit = Arc::new(crate::services::audit::StoreAuditSink::new(store.clone()));
        TokenService::new(store, credentials, audit, clock, test_config())
    }

    fn seed_user(store: &MemoryStore) -> User {
        let hash = hash_password(&Password::new("hunter2hunter2")).unwrap();
        let user = User::new(
            "alice@example.com".to_string(),
            hash.into_string(),
            vec!["user".to_string()],
        );
        store.insert_user(user.clone());
        user
    }

    #[tokio::test]
    async fn issued_access_token_round_trips() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let service = service_with(store.clone(), clock.clone());
        let user = seed_user(&store);

        let pair = service.issue(&user, None).await.unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 15 * 60);

        let claims = service.verify_access(&pair.access_token).await.unwrap();
        assert_eq!(claims.sub, user.user_id);
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[tokio::test]
    async fn expired_access_token_is_rejected_by_clock() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let service = service_with(store.clone(), clock.clone());
        let user = seed_user(&store);

        let pair = service.issue(&user, None).await.unwrap();
        clock.advance(Duration::minutes(16));
        let err = service.verify_access(&pair.access_token).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn tampered_token_fails_signature_check() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let service = service_with(store.clone(), clock);
        let user = seed_user(&store);

        let pair = service.issue(&user, None).await.unwrap();
        let mut tampered = pair.access_token.clone();
        tampered.pop();
        assert!(service.decode_access(&tampered).is_err());
    }

    #[tokio::test]
    async fn refresh_rotates_and_old_token_replays() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let service = service_with(store.clone(), clock);
        let user = seed_user(&store);

        let first = service.issue(&user, None).await.unwrap();
        let second = service.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        // The rotated-out token must be dead, and the reuse audited.
        let err = service.refresh(&first.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
        let events = store.audit_snapshot();
        assert!(events
            .iter()
            .any(|e| e.event_type_code == "refresh_token_replayed"));

        // The replacement still works.
        service.refresh(&second.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn expired_refresh_token_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let service = service_with(store.clone(), clock.clone());
        let user = seed_user(&store);

        let pair = service.issue(&user, None).await.unwrap();
        clock.advance(Duration::days(8));
        let err = service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn suspended_user_cannot_refresh_or_verify() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let service = service_with(store.clone(), clock);
        let user = seed_user(&store);

        let pair = service.issue(&user, None).await.unwrap();
        store.set_user_state(user.user_id, "suspended");

        assert!(service.refresh(&pair.refresh_token).await.is_err());
        let err = service.verify_access(&pair.access_token).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn deleted_subject_is_not_found_on_verify() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let service = service_with(store.clone(), clock);
        let user = seed_user(&store);

        let pair = service.issue(&user, None).await.unwrap();
        store.remove_user(user.user_id);

        let err = service.verify_access(&pair.access_token).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn revoke_device_leaves_other_sessions_alone() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let service = service_with(store.clone(), clock);
        let user = seed_user(&store);

        let phone = service
            .issue(&user, Some("phone-fp".to_string()))
            .await
            .unwrap();
        let laptop = service
            .issue(&user, Some("laptop-fp".to_string()))
            .await
            .unwrap();

        assert_eq!(service.revoke_device(user.user_id, "phone-fp").await.unwrap(), 1);
        assert!(service.refresh(&phone.refresh_token).await.is_err());
        service.refresh(&laptop.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn revocation_timestamp_follows_the_injected_clock() {
        let store = Arc::new(MemoryStore::new());
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let service = service_with(store.clone(), clock.clone());
        let user = seed_user(&store);

        let pair = service.issue(&user, None).await.unwrap();
        clock.advance(Duration::minutes(42));
        assert!(service.revoke(&pair.refresh_token).await.unwrap());

        let hash = RefreshToken::hash_secret(&pair.refresh_token);
        let stored = store.find_token_by_hash(&hash).await.unwrap().unwrap();
        assert_eq!(stored.revoked_utc, Some(start + Duration::minutes(42)));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let service = service_with(store.clone(), clock);
        let user = seed_user(&store);

        let pair = service.issue(&user, None).await.unwrap();
        assert!(service.revoke(&pair.refresh_token).await.unwrap());
        assert!(!service.revoke(&pair.refresh_token).await.unwrap());
        assert!(!service.revoke("no-such-secret").await.unwrap());
    }
}
