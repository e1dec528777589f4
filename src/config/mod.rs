use serde::Deserialize;
use std::env;

use crate::error::AuthError;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub token: TokenConfig,
    pub mfa: MfaConfig,
    pub risk: RiskConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// HS256 signing secret for access tokens.
    pub jwt_secret: String,
    pub issuer: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MfaConfig {
    /// Issuer shown in authenticator apps via the provisioning URI.
    pub issuer: String,
    pub backup_code_count: usize,
    /// Accepted drift around the current TOTP step, in steps (30s each).
    pub totp_tolerance_steps: u8,
}

/// Weights and thresholds for the login risk signals. Additive scoring,
/// clamped to 100.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    pub ip_failure_window_minutes: i64,
    pub ip_failure_threshold: i64,
    pub weight_ip_failures: u32,

    pub email_failure_window_minutes: i64,
    pub email_failure_threshold: i64,
    pub weight_brute_force: u32,

    pub weight_new_device: u32,

    pub geo_window_days: i64,
    pub geo_velocity_km: f64,
    pub weight_geo_max: u32,

    pub rapid_login_window_minutes: i64,
    pub rapid_login_threshold: i64,
    pub weight_rapid_logins: u32,

    pub malicious_ip_failure_window_hours: i64,
    pub malicious_ip_failure_threshold: i64,
    pub weight_malicious_ip_max: u32,

    pub unusual_hour_start: u32,
    pub unusual_hour_end: u32,
    pub weight_unusual_time: u32,

    pub threshold_medium: u32,
    pub threshold_high: u32,
    pub threshold_critical: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            ip_failure_window_minutes: 60,
            ip_failure_threshold: 3,
            weight_ip_failures: 30,
            email_failure_window_minutes: 60,
            email_failure_threshold: 5,
            weight_brute_force: 40,
            weight_new_device: 15,
            geo_window_days: 30,
            geo_velocity_km: 1000.0,
            weight_geo_max: 30,
            rapid_login_window_minutes: 5,
            rapid_login_threshold: 3,
            weight_rapid_logins: 20,
            malicious_ip_failure_window_hours: 24,
            malicious_ip_failure_threshold: 10,
            weight_malicious_ip_max: 25,
            unusual_hour_start: 2,
            unusual_hour_end: 6,
            weight_unusual_time: 10,
            threshold_medium: 30,
            threshold_high: 60,
            threshold_critical: 80,
        }
    }
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            issuer: "vigil".to_string(),
            backup_code_count: 10,
            totp_tolerance_steps: 2,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AuthError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AuthError::Internal(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("vigil-auth"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
            },
            token: TokenConfig {
                jwt_secret: get_env("JWT_SECRET", None, is_prod)?,
                issuer: get_env("JWT_ISSUER", Some("vigil-auth"), is_prod)?,
                access_token_ttl_minutes: parse_env("ACCESS_TOKEN_TTL_MINUTES", "1440", is_prod)?,
                refresh_token_ttl_days: parse_env("REFRESH_TOKEN_TTL_DAYS", "7", is_prod)?,
            },
            mfa: MfaConfig {
                issuer: get_env("MFA_ISSUER", Some("vigil"), is_prod)?,
                backup_code_count: parse_env("MFA_BACKUP_CODE_COUNT", "10", is_prod)?,
                totp_tolerance_steps: parse_env("MFA_TOTP_TOLERANCE_STEPS", "2", is_prod)?,
            },
            risk: RiskConfig {
                threshold_medium: parse_env("RISK_THRESHOLD_MEDIUM", "30", is_prod)?,
                threshold_high: parse_env("RISK_THRESHOLD_HIGH", "60", is_prod)?,
                threshold_critical: parse_env("RISK_THRESHOLD_CRITICAL", "80", is_prod)?,
                ..RiskConfig::default()
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AuthError> {
        if self.token.access_token_ttl_minutes <= 0 {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "ACCESS_TOKEN_TTL_MINUTES must be positive"
            )));
        }
        if self.token.refresh_token_ttl_days <= 0 {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "REFRESH_TOKEN_TTL_DAYS must be positive"
            )));
        }
        if self.mfa.backup_code_count == 0 {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "MFA_BACKUP_CODE_COUNT must be positive"
            )));
        }
        if self.risk.threshold_medium >= self.risk.threshold_high
            || self.risk.threshold_high >= self.risk.threshold_critical
        {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "risk thresholds must be strictly increasing"
            )));
        }
        if self.environment == Environment::Prod && self.token.jwt_secret.len() < 32 {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 bytes in production"
            )));
        }
        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AuthError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AuthError::Internal(anyhow::anyhow!(
                    "{key} is required in production but not set"
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AuthError::Internal(anyhow::anyhow!(
                    "{key} is required but not set"
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AuthError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AuthError::Internal(anyhow::anyhow!("invalid {key}: {e}")))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("invalid environment: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_defaults_match_documented_weights() {
        let risk = RiskConfig::default();
        assert_eq!(risk.weight_ip_failures, 30);
        assert_eq!(risk.weight_brute_force, 40);
        assert_eq!(risk.weight_new_device, 15);
        assert_eq!(risk.threshold_critical, 80);
    }

    #[test]
    fn thresholds_must_increase() {
        let config = AuthConfig {
            environment: Environment::Dev,
            service_name: "test".to_string(),
            log_level: "info".to_string(),
            database: DatabaseConfig {
                url: "postgres://localhost/test".to_string(),
                max_connections: 2,
            },
            token: TokenConfig {
                jwt_secret: "secret".to_string(),
                issuer: "test".to_string(),
                access_token_ttl_minutes: 15,
                refresh_token_ttl_days: 7,
            },
            mfa: MfaConfig::default(),
            risk: RiskConfig {
                threshold_medium: 90,
                ..RiskConfig::default()
            },
        };
        assert!(config.validate().is_err());
    }
}
