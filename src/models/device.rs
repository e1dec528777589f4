//! Device model: per-user tracked devices identified by a deterministic
//! fingerprint. (user_id, device_id) is unique.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::net::IpAddr;
use uuid::Uuid;

/// Client attributes parsed from the User-Agent header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub browser: String,
    pub browser_version: String,
    pub os: String,
    pub os_version: String,
    pub device_type: String,
}

/// Raw device context accompanying a login or device operation.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    pub user_agent: String,
    pub ip: IpAddr,
    /// Client-supplied stable identifier, when available.
    pub explicit_id: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Device {
    pub user_id: Uuid,
    pub device_id: String,
    pub device_type: String,
    pub browser: String,
    pub os: String,
    pub ip_address: String,
    pub location: Option<String>,
    pub is_trusted: bool,
    pub last_used_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl Device {
    pub fn new(
        user_id: Uuid,
        device_id: String,
        client: &ClientInfo,
        ip: IpAddr,
        location: Option<String>,
        trusted: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            device_id,
            device_type: client.device_type.clone(),
            browser: client.browser.clone(),
            os: client.os.clone(),
            ip_address: ip.to_string(),
            location,
            is_trusted: trusted,
            last_used_utc: now,
            created_utc: now,
        }
    }
}
