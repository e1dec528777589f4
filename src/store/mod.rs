//! Persistence seam. Services depend on these traits, not on a concrete
//! backend: `PgStore` is the Postgres implementation, `MemoryStore` the
//! deterministic one used by tests and local development.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::{AuditEvent, AuditQuery, Device, LoginAttempt, MfaMethod, RefreshToken, User};
use crate::utils::geo::GeoLocation;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;
    async fn update_password_hash(&self, user_id: Uuid, hash: &str) -> Result<(), AuthError>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert_token(&self, token: &RefreshToken) -> Result<(), AuthError>;

    /// Lookup by secret hash, including revoked rows so replay of a dead
    /// token can be distinguished from an unknown one.
    async fn find_token_by_hash(&self, hash: &str) -> Result<Option<RefreshToken>, AuthError>;

    /// Atomic rotation: revoke `old_token_id` if and only if it is still
    /// unrevoked, and insert the replacement in the same unit. Returns
    /// false when the old token was already revoked (lost race or replay);
    /// nothing is inserted in that case.
    async fn rotate_token(
        &self,
        old_token_id: Uuid,
        replacement: &RefreshToken,
    ) -> Result<bool, AuthError>;

    async fn revoke_token(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<bool, AuthError>;
    async fn revoke_all_for_user(&self, user_id: Uuid, now: DateTime<Utc>)
        -> Result<u64, AuthError>;
    async fn revoke_for_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError>;
}

#[async_trait]
pub trait MfaStore: Send + Sync {
    async fn find_mfa_method(&self, user_id: Uuid) -> Result<Option<MfaMethod>, AuthError>;
    async fn upsert_mfa_method(&self, method: &MfaMethod) -> Result<(), AuthError>;

    /// Clears secret and backup codes; the user returns to NotSetup.
    async fn delete_mfa_method(&self, user_id: Uuid) -> Result<bool, AuthError>;

    /// Atomic check-and-remove of one backup code hash. Returns true when
    /// the hash was present and has been consumed; a second call with the
    /// same hash returns false.
    async fn consume_backup_code(
        &self,
        user_id: Uuid,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    async fn replace_backup_codes(
        &self,
        user_id: Uuid,
        code_hashes: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), AuthError>;
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn find_device(&self, user_id: Uuid, device_id: &str)
        -> Result<Option<Device>, AuthError>;
    async fn list_devices(&self, user_id: Uuid) -> Result<Vec<Device>, AuthError>;

    /// Upsert by (user_id, device_id). Returns true when a new row was
    /// inserted, false when an existing one was refreshed.
    async fn upsert_device(&self, device: &Device) -> Result<bool, AuthError>;

    async fn set_device_trusted(
        &self,
        user_id: Uuid,
        device_id: &str,
        trusted: bool,
    ) -> Result<bool, AuthError>;

    /// Deletes the device row and revokes every refresh token bound to it
    /// as one atomic unit. Returns the revoked-token count, or None when
    /// the device did not exist.
    async fn remove_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, AuthError>;
}

#[async_trait]
pub trait LoginAttemptStore: Send + Sync {
    async fn record_attempt(&self, attempt: &LoginAttempt) -> Result<(), AuthError>;

    /// One-time patch of the success flag after the outcome is known.
    async fn mark_attempt_outcome(
        &self,
        attempt_id: Uuid,
        success: bool,
        failure_reason: Option<&str>,
    ) -> Result<(), AuthError>;

    async fn count_failures_by_ip(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AuthError>;
    async fn count_failures_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AuthError>;
    async fn count_successes_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AuthError>;

    /// Coordinates of successful logins for geo-velocity comparison.
    async fn successful_locations_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<GeoLocation>, AuthError>;
}

#[async_trait]
pub trait AuditEventStore: Send + Sync {
    async fn append_event(&self, event: &AuditEvent) -> Result<(), AuthError>;
    async fn query_events(&self, query: &AuditQuery)
        -> Result<(Vec<AuditEvent>, i64), AuthError>;
}
