//! PostgreSQL store implementation over sqlx. Schema ownership
//! (migrations) lives outside this crate; queries here are
//! runtime-checked.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::AuthError;
use crate::models::{AuditEvent, AuditQuery, Device, LoginAttempt, MfaMethod, RefreshToken, User};
use crate::store::{
    AuditEventStore, DeviceStore, LoginAttemptStore, MfaStore, RefreshTokenStore, UserStore,
};
use crate::utils::geo::GeoLocation;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AuthError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        tracing::info!(max_connections = config.max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), AuthError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn update_password_hash(&self, user_id: Uuid, hash: &str) -> Result<(), AuthError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE user_id = $2")
            .bind(hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("user".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn insert_token(&self, token: &RefreshToken) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (token_id, user_id, token_hash_text, device_id, expiry_utc, revoked_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(token.token_id)
        .bind(token.user_id)
        .bind(&token.token_hash_text)
        .bind(&token.device_id)
        .bind(token.expiry_utc)
        .bind(token.revoked_utc)
        .bind(token.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_token_by_hash(&self, hash: &str) -> Result<Option<RefreshToken>, AuthError> {
        let token = sqlx::query_as::<_, RefreshToken>(
            "SELECT * FROM refresh_tokens WHERE token_hash_text = $1",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn rotate_token(
        &self,
        old_token_id: Uuid,
        replacement: &RefreshToken,
    ) -> Result<bool, AuthError> {
        let mut tx = self.pool.begin().await?;

        // Compare-and-swap on the revocation state; two racing refreshes
        // can't both pass this guard.
        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked_utc = $1 WHERE token_id = $2 AND revoked_utc IS NULL",
        )
        .bind(replacement.created_utc)
        .bind(old_token_id)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (token_id, user_id, token_hash_text, device_id, expiry_utc, revoked_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(replacement.token_id)
        .bind(replacement.user_id)
        .bind(&replacement.token_hash_text)
        .bind(&replacement.device_id)
        .bind(replacement.expiry_utc)
        .bind(replacement.revoked_utc)
        .bind(replacement.created_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_token(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_utc = $2 WHERE token_id = $1 AND revoked_utc IS NULL",
        )
        .bind(token_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_utc = $2 WHERE user_id = $1 AND revoked_utc IS NULL",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn revoke_for_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked_utc = $3
            WHERE user_id = $1 AND device_id = $2 AND revoked_utc IS NULL
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MfaStore for PgStore {
    async fn find_mfa_method(&self, user_id: Uuid) -> Result<Option<MfaMethod>, AuthError> {
        let method =
            sqlx::query_as::<_, MfaMethod>("SELECT * FROM mfa_methods WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(method)
    }

    async fn upsert_mfa_method(&self, method: &MfaMethod) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO mfa_methods
                (user_id, method_code, secret_base32, backup_code_hashes,
                 is_enabled, is_verified, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                secret_base32 = EXCLUDED.secret_base32,
                backup_code_hashes = EXCLUDED.backup_code_hashes,
                is_enabled = EXCLUDED.is_enabled,
                is_verified = EXCLUDED.is_verified,
                updated_utc = EXCLUDED.updated_utc
            "#,
        )
        .bind(method.user_id)
        .bind(&method.method_code)
        .bind(&method.secret_base32)
        .bind(&method.backup_code_hashes)
        .bind(method.is_enabled)
        .bind(method.is_verified)
        .bind(method.created_utc)
        .bind(method.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_mfa_method(&self, user_id: Uuid) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM mfa_methods WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn consume_backup_code(
        &self,
        user_id: Uuid,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        // Single-statement check-and-remove; the WHERE clause guards
        // one-time use under concurrent attempts with the same code.
        let result = sqlx::query(
            r#"
            UPDATE mfa_methods
            SET backup_code_hashes = array_remove(backup_code_hashes, $2),
                updated_utc = $3
            WHERE user_id = $1 AND $2 = ANY(backup_code_hashes)
            "#,
        )
        .bind(user_id)
        .bind(code_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_backup_codes(
        &self,
        user_id: Uuid,
        code_hashes: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let result = sqlx::query(
            "UPDATE mfa_methods SET backup_code_hashes = $2, updated_utc = $3 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(code_hashes)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("mfa method".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceStore for PgStore {
    async fn find_device(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<Option<Device>, AuthError> {
        let device = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE user_id = $1 AND device_id = $2",
        )
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(device)
    }

    async fn list_devices(&self, user_id: Uuid) -> Result<Vec<Device>, AuthError> {
        let devices = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE user_id = $1 ORDER BY last_used_utc DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(devices)
    }

    async fn upsert_device(&self, device: &Device) -> Result<bool, AuthError> {
        // xmax = 0 distinguishes a fresh insert from a conflict update.
        let row: (bool,) = sqlx::query_as(
            r#"
            INSERT INTO devices
                (user_id, device_id, device_type, browser, os, ip_address,
                 location, is_trusted, last_used_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (user_id, device_id) DO UPDATE SET
                ip_address = EXCLUDED.ip_address,
                location = EXCLUDED.location,
                last_used_utc = EXCLUDED.last_used_utc
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(device.user_id)
        .bind(&device.device_id)
        .bind(&device.device_type)
        .bind(&device.browser)
        .bind(&device.os)
        .bind(&device.ip_address)
        .bind(&device.location)
        .bind(device.is_trusted)
        .bind(device.last_used_utc)
        .bind(device.created_utc)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn set_device_trusted(
        &self,
        user_id: Uuid,
        device_id: &str,
        trusted: bool,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE devices SET is_trusted = $3 WHERE user_id = $1 AND device_id = $2",
        )
        .bind(user_id)
        .bind(device_id)
        .bind(trusted)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, AuthError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM devices WHERE user_id = $1 AND device_id = $2")
            .bind(user_id)
            .bind(device_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked_utc = $3
            WHERE user_id = $1 AND device_id = $2 AND revoked_utc IS NULL
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(revoked.rows_affected()))
    }
}

#[async_trait]
impl LoginAttemptStore for PgStore {
    async fn record_attempt(&self, attempt: &LoginAttempt) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts
                (attempt_id, email, ip_address, success, failure_reason,
                 device_fingerprint, location_label, latitude, longitude, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(attempt.attempt_id)
        .bind(&attempt.email)
        .bind(&attempt.ip_address)
        .bind(attempt.success)
        .bind(&attempt.failure_reason)
        .bind(&attempt.device_fingerprint)
        .bind(&attempt.location_label)
        .bind(attempt.latitude)
        .bind(attempt.longitude)
        .bind(attempt.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_attempt_outcome(
        &self,
        attempt_id: Uuid,
        success: bool,
        failure_reason: Option<&str>,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE login_attempts SET success = $2, failure_reason = $3 WHERE attempt_id = $1",
        )
        .bind(attempt_id)
        .bind(success)
        .bind(failure_reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_failures_by_ip(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AuthError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM login_attempts
            WHERE ip_address = $1 AND success = false AND created_utc >= $2
              AND COALESCE(failure_reason, '') <> 'mfa_required'
            "#,
        )
        .bind(ip)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn count_failures_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AuthError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM login_attempts
            WHERE LOWER(email) = LOWER($1) AND success = false AND created_utc >= $2
              AND COALESCE(failure_reason, '') <> 'mfa_required'
            "#,
        )
        .bind(email)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn count_successes_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AuthError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM login_attempts
            WHERE LOWER(email) = LOWER($1) AND success = true AND created_utc >= $2
            "#,
        )
        .bind(email)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn successful_locations_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<GeoLocation>, AuthError> {
        let rows: Vec<(Option<String>, f64, f64)> = sqlx::query_as(
            r#"
            SELECT location_label, latitude, longitude FROM login_attempts
            WHERE LOWER(email) = LOWER($1) AND success = true AND created_utc >= $2
              AND latitude IS NOT NULL AND longitude IS NOT NULL
            "#,
        )
        .bind(email)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(label, latitude, longitude)| GeoLocation {
                label: label.unwrap_or_default(),
                latitude,
                longitude,
            })
            .collect())
    }
}

#[async_trait]
impl AuditEventStore for PgStore {
    async fn append_event(&self, event: &AuditEvent) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO audit_events
                (event_id, event_type_code, category_code, severity_code,
                 user_id, ip_address, device_id, event_data, success, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.event_id)
        .bind(&event.event_type_code)
        .bind(&event.category_code)
        .bind(&event.severity_code)
        .bind(event.user_id)
        .bind(&event.ip_address)
        .bind(&event.device_id)
        .bind(&event.event_data)
        .bind(event.success)
        .bind(event.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_events(
        &self,
        query: &AuditQuery,
    ) -> Result<(Vec<AuditEvent>, i64), AuthError> {
        let mut conditions = vec!["TRUE".to_string()];
        let mut param_idx = 1;

        if query.user_id.is_some() {
            conditions.push(format!("user_id = ${param_idx}"));
            param_idx += 1;
        }
        if query.event_type.is_some() {
            conditions.push(format!("event_type_code = ${param_idx}"));
            param_idx += 1;
        }
        if query.category.is_some() {
            conditions.push(format!("category_code = ${param_idx}"));
            param_idx += 1;
        }
        if query.from_utc.is_some() {
            conditions.push(format!("created_utc >= ${param_idx}"));
            param_idx += 1;
        }
        if query.to_utc.is_some() {
            conditions.push(format!("created_utc <= ${param_idx}"));
            param_idx += 1;
        }

        let where_clause = conditions.join(" AND ");
        let count_sql = format!("SELECT COUNT(*) FROM audit_events WHERE {where_clause}");
        let data_sql = format!(
            "SELECT * FROM audit_events WHERE {where_clause} ORDER BY created_utc DESC LIMIT ${param_idx} OFFSET ${}",
            param_idx + 1
        );

        let mut count_q = sqlx::query_as::<_, (i64,)>(&count_sql);
        let mut data_q = sqlx::query_as::<_, AuditEvent>(&data_sql);
        if let Some(user_id) = query.user_id {
            count_q = count_q.bind(user_id);
            data_q = data_q.bind(user_id);
        }
        if let Some(event_type) = &query.event_type {
            count_q = count_q.bind(event_type);
            data_q = data_q.bind(event_type);
        }
        if let Some(category) = &query.category {
            count_q = count_q.bind(category);
            data_q = data_q.bind(category);
        }
        if let Some(from) = query.from_utc {
            count_q = count_q.bind(from);
            data_q = data_q.bind(from);
        }
        if let Some(to) = query.to_utc {
            count_q = count_q.bind(to);
            data_q = data_q.bind(to);
        }

        let limit = if query.limit > 0 { query.limit } else { 50 };
        data_q = data_q.bind(limit).bind(query.offset.max(0));

        let (total,) = count_q.fetch_one(&self.pool).await?;
        let events = data_q.fetch_all(&self.pool).await?;
        Ok((events, total))
    }
}
