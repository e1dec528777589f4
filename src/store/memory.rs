//! In-memory store backing tests and local development. Implements every
//! store trait over Mutex-guarded maps; the cross-entity atomic units
//! (rotation, device-removal cascade, backup-code consumption) run inside
//! a single critical section.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::{AuditEvent, AuditQuery, Device, LoginAttempt, MfaMethod, RefreshToken, User};
use crate::store::{
    AuditEventStore, DeviceStore, LoginAttemptStore, MfaStore, RefreshTokenStore, UserStore,
};
use crate::utils::geo::GeoLocation;

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, User>>,
    tokens: Mutex<HashMap<Uuid, RefreshToken>>,
    mfa_methods: Mutex<HashMap<Uuid, MfaMethod>>,
    devices: Mutex<HashMap<(Uuid, String), Device>>,
    attempts: Mutex<Vec<LoginAttempt>>,
    audit_events: Mutex<Vec<AuditEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test fixture: seed a user account.
    pub fn insert_user(&self, user: User) {
        self.lock_users().insert(user.user_id, user);
    }

    /// Test fixture: flip the account state for deactivation scenarios.
    pub fn set_user_state(&self, user_id: Uuid, state_code: &str) {
        if let Some(user) = self.lock_users().get_mut(&user_id) {
            user.user_state_code = state_code.to_string();
        }
    }

    /// Test fixture: drop the account entirely, as if hard-deleted.
    pub fn remove_user(&self, user_id: Uuid) {
        self.lock_users().remove(&user_id);
    }

    /// Test observability: snapshot of audit events written so far.
    pub fn audit_snapshot(&self) -> Vec<AuditEvent> {
        self.audit_events
            .lock()
            .expect("audit mutex poisoned")
            .clone()
    }

    fn lock_users(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, User>> {
        self.users.lock().expect("users mutex poisoned")
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, RefreshToken>> {
        self.tokens.lock().expect("tokens mutex poisoned")
    }

    fn lock_mfa(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, MfaMethod>> {
        self.mfa_methods.lock().expect("mfa mutex poisoned")
    }

    fn lock_devices(&self) -> std::sync::MutexGuard<'_, HashMap<(Uuid, String), Device>> {
        self.devices.lock().expect("devices mutex poisoned")
    }

    fn lock_attempts(&self) -> std::sync::MutexGuard<'_, Vec<LoginAttempt>> {
        self.attempts.lock().expect("attempts mutex poisoned")
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        Ok(self.lock_users().get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        Ok(self
            .lock_users()
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_password_hash(&self, user_id: Uuid, hash: &str) -> Result<(), AuthError> {
        match self.lock_users().get_mut(&user_id) {
            Some(user) => {
                user.password_hash = hash.to_string();
                Ok(())
            }
            None => Err(AuthError::NotFound("user".to_string())),
        }
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn insert_token(&self, token: &RefreshToken) -> Result<(), AuthError> {
        self.lock_tokens().insert(token.token_id, token.clone());
        Ok(())
    }

    async fn find_token_by_hash(&self, hash: &str) -> Result<Option<RefreshToken>, AuthError> {
        Ok(self
            .lock_tokens()
            .values()
            .find(|t| t.token_hash_text == hash)
            .cloned())
    }

    async fn rotate_token(
        &self,
        old_token_id: Uuid,
        replacement: &RefreshToken,
    ) -> Result<bool, AuthError> {
        let mut tokens = self.lock_tokens();
        match tokens.get_mut(&old_token_id) {
            Some(old) if !old.is_revoked() => {
                old.revoked_utc = Some(replacement.created_utc);
                tokens.insert(replacement.token_id, replacement.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_token(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<bool, AuthError> {
        let mut tokens = self.lock_tokens();
        match tokens.get_mut(&token_id) {
            Some(token) if !token.is_revoked() => {
                token.revoked_utc = Some(now);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let mut revoked = 0;
        for token in self.lock_tokens().values_mut() {
            if token.user_id == user_id && !token.is_revoked() {
                token.revoked_utc = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_for_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let mut revoked = 0;
        for token in self.lock_tokens().values_mut() {
            if token.user_id == user_id
                && token.device_id.as_deref() == Some(device_id)
                && !token.is_revoked()
            {
                token.revoked_utc = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[async_trait]
impl MfaStore for MemoryStore {
    async fn find_mfa_method(&self, user_id: Uuid) -> Result<Option<MfaMethod>, AuthError> {
        Ok(self.lock_mfa().get(&user_id).cloned())
    }

    async fn upsert_mfa_method(&self, method: &MfaMethod) -> Result<(), AuthError> {
        self.lock_mfa().insert(method.user_id, method.clone());
        Ok(())
    }

    async fn delete_mfa_method(&self, user_id: Uuid) -> Result<bool, AuthError> {
        Ok(self.lock_mfa().remove(&user_id).is_some())
    }

    async fn consume_backup_code(
        &self,
        user_id: Uuid,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let mut methods = self.lock_mfa();
        let Some(method) = methods.get_mut(&user_id) else {
            return Ok(false);
        };
        let position = method
            .backup_code_hashes
            .iter()
            .position(|h| h.as_bytes().ct_eq(code_hash.as_bytes()).into());
        match position {
            Some(idx) => {
                method.backup_code_hashes.remove(idx);
                method.updated_utc = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn replace_backup_codes(
        &self,
        user_id: Uuid,
        code_hashes: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut methods = self.lock_mfa();
        match methods.get_mut(&user_id) {
            Some(method) => {
                method.backup_code_hashes = code_hashes.to_vec();
                method.updated_utc = now;
                Ok(())
            }
            None => Err(AuthError::NotFound("mfa method".to_string())),
        }
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn find_device(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<Option<Device>, AuthError> {
        Ok(self
            .lock_devices()
            .get(&(user_id, device_id.to_string()))
            .cloned())
    }

    async fn list_devices(&self, user_id: Uuid) -> Result<Vec<Device>, AuthError> {
        let mut devices: Vec<Device> = self
            .lock_devices()
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.last_used_utc.cmp(&a.last_used_utc));
        Ok(devices)
    }

    async fn upsert_device(&self, device: &Device) -> Result<bool, AuthError> {
        let mut devices = self.lock_devices();
        let key = (device.user_id, device.device_id.clone());
        match devices.get_mut(&key) {
            Some(existing) => {
                existing.ip_address = device.ip_address.clone();
                existing.location = device.location.clone();
                existing.last_used_utc = device.last_used_utc;
                Ok(false)
            }
            None => {
                devices.insert(key, device.clone());
                Ok(true)
            }
        }
    }

    async fn set_device_trusted(
        &self,
        user_id: Uuid,
        device_id: &str,
        trusted: bool,
    ) -> Result<bool, AuthError> {
        match self
            .lock_devices()
            .get_mut(&(user_id, device_id.to_string()))
        {
            Some(device) => {
                device.is_trusted = trusted;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, AuthError> {
        // Single critical section over both maps so a removed device can
        // never leave live tokens behind.
        let mut devices = self.lock_devices();
        let mut tokens = self.lock_tokens();

        if devices.remove(&(user_id, device_id.to_string())).is_none() {
            return Ok(None);
        }

        let mut revoked = 0;
        for token in tokens.values_mut() {
            if token.user_id == user_id
                && token.device_id.as_deref() == Some(device_id)
                && !token.is_revoked()
            {
                token.revoked_utc = Some(now);
                revoked += 1;
            }
        }
        Ok(Some(revoked))
    }
}

#[async_trait]
impl LoginAttemptStore for MemoryStore {
    async fn record_attempt(&self, attempt: &LoginAttempt) -> Result<(), AuthError> {
        self.lock_attempts().push(attempt.clone());
        Ok(())
    }

    async fn mark_attempt_outcome(
        &self,
        attempt_id: Uuid,
        success: bool,
        failure_reason: Option<&str>,
    ) -> Result<(), AuthError> {
        let mut attempts = self.lock_attempts();
        if let Some(attempt) = attempts.iter_mut().find(|a| a.attempt_id == attempt_id) {
            attempt.success = success;
            attempt.failure_reason = failure_reason.map(str::to_string);
        }
        Ok(())
    }

    async fn count_failures_by_ip(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AuthError> {
        Ok(self
            .lock_attempts()
            .iter()
            .filter(|a| a.ip_address == ip && a.is_failure() && a.created_utc >= since)
            .count() as i64)
    }

    async fn count_failures_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AuthError> {
        Ok(self
            .lock_attempts()
            .iter()
            .filter(|a| {
                a.email.eq_ignore_ascii_case(email) && a.is_failure() && a.created_utc >= since
            })
            .count() as i64)
    }

    async fn count_successes_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AuthError> {
        Ok(self
            .lock_attempts()
            .iter()
            .filter(|a| a.email.eq_ignore_ascii_case(email) && a.success && a.created_utc >= since)
            .count() as i64)
    }

    async fn successful_locations_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<GeoLocation>, AuthError> {
        Ok(self
            .lock_attempts()
            .iter()
            .filter(|a| a.email.eq_ignore_ascii_case(email) && a.success && a.created_utc >= since)
            .filter_map(|a| {
                Some(GeoLocation {
                    label: a.location_label.clone().unwrap_or_default(),
                    latitude: a.latitude?,
                    longitude: a.longitude?,
                })
            })
            .collect())
    }
}

#[async_trait]
impl AuditEventStore for MemoryStore {
    async fn append_event(&self, event: &AuditEvent) -> Result<(), AuthError> {
        self.audit_events
            .lock()
            .expect("audit mutex poisoned")
            .push(event.clone());
        Ok(())
    }

    async fn query_events(
        &self,
        query: &AuditQuery,
    ) -> Result<(Vec<AuditEvent>, i64), AuthError> {
        let events = self.audit_events.lock().expect("audit mutex poisoned");
        let mut matched: Vec<AuditEvent> = events
            .iter()
            .filter(|e| query.user_id.map_or(true, |id| e.user_id == Some(id)))
            .filter(|e| {
                query
                    .event_type
                    .as_ref()
                    .map_or(true, |t| &e.event_type_code == t)
            })
            .filter(|e| query.category.as_ref().map_or(true, |c| &e.category_code == c))
            .filter(|e| query.from_utc.map_or(true, |from| e.created_utc >= from))
            .filter(|e| query.to_utc.map_or(true, |to| e.created_utc <= to))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));

        let total = matched.len() as i64;
        let limit = if query.limit > 0 { query.limit } else { 50 } as usize;
        let page = matched
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(limit)
            .collect();
        Ok((page, total))
    }
}
