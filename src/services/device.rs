//! Per-user device tracking. Devices are identified by a deterministic
//! fingerprint of the parsed User-Agent, a truncated source address, and
//! any client-supplied identifier, so the same browser on the same
//! network maps to the same device across logins.

use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AuthError;
use crate::models::{AuditEvent, AuditEventType, AuditSeverity, Device, DeviceContext};
use crate::services::audit::AuditSink;
use crate::store::DeviceStore;
use crate::utils::geo::GeoLookup;
use crate::utils::user_agent::parse_user_agent;

#[derive(Clone)]
pub struct DeviceRegistry {
    devices: Arc<dyn DeviceStore>,
    geo: Arc<dyn GeoLookup>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl DeviceRegistry {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        geo: Arc<dyn GeoLookup>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            devices,
            geo,
            audit,
            clock,
        }
    }

    /// Deterministic device identifier. The IP is truncated (v4 to /24,
    /// v6 to the first four segments) so DHCP churn within one network
    /// does not mint new devices.
    pub fn fingerprint(context: &DeviceContext) -> String {
        let client = parse_user_agent(&context.user_agent);
        let ip_prefix = truncate_ip(context.ip);
        let explicit = context.explicit_id.as_deref().unwrap_or("");

        let mut hasher = Sha256::new();
        hasher.update(client.browser.as_bytes());
        hasher.update(b"|");
        hasher.update(client.browser_version.as_bytes());
        hasher.update(b"|");
        hasher.update(client.os.as_bytes());
        hasher.update(b"|");
        hasher.update(client.os_version.as_bytes());
        hasher.update(b"|");
        hasher.update(client.device_type.as_bytes());
        hasher.update(b"|");
        hasher.update(ip_prefix.as_bytes());
        hasher.update(b"|");
        hasher.update(explicit.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Records a sighting of this device, creating it untrusted on first
    /// sight. Returns the stored device and whether it was newly created.
    /// Trust and first-seen time survive repeat sightings.
    pub async fn register(
        &self,
        user_id: Uuid,
        context: &DeviceContext,
    ) -> Result<(Device, bool), AuthError> {
        let device_id = Self::fingerprint(context);
        let client = parse_user_agent(&context.user_agent);
        let location = self.geo.lookup(context.ip).map(|loc| loc.label);

        let candidate = Device::new(
            user_id,
            device_id.clone(),
            &client,
            context.ip,
            location,
            false,
            self.clock.now(),
        );
        let inserted = self.devices.upsert_device(&candidate).await?;

        if inserted {
            self.audit
                .record(
                    AuditEvent::new(
                        AuditEventType::NewDeviceRegistered,
                        AuditSeverity::Info,
                        true,
                        self.clock.now(),
                    )
                    .with_user(user_id)
                    .with_device(device_id.clone())
                    .with_ip(context.ip.to_string()),
                )
                .await;
        }

        let stored = self
            .devices
            .find_device(user_id, &device_id)
            .await?
            .unwrap_or(candidate);
        Ok((stored, inserted))
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Device>, AuthError> {
        self.devices.list_devices(user_id).await
    }

    pub async fn is_trusted(&self, user_id: Uuid, device_id: &str) -> Result<bool, AuthError> {
        let device = self.devices.find_device(user_id, device_id).await?;
        Ok(device.is_some_and(|d| d.is_trusted))
    }

    pub async fn trust(&self, user_id: Uuid, device_id: &str) -> Result<(), AuthError> {
        self.set_trusted(user_id, device_id, true).await
    }

    pub async fn untrust(&self, user_id: Uuid, device_id: &str) -> Result<(), AuthError> {
        self.set_trusted(user_id, device_id, false).await
    }

    /// Removes a device and revokes every refresh token bound to it, in
    /// one atomic step. Returns how many sessions were revoked.
    pub async fn remove(&self, user_id: Uuid, device_id: &str) -> Result<u64, AuthError> {
        let revoked = self
            .devices
            .remove_device(user_id, device_id, self.clock.now())
            .await?
            .ok_or_else(|| AuthError::NotFound("device".to_string()))?;

        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::DeviceRemoved,
                    AuditSeverity::Warning,
                    true,
                    self.clock.now(),
                )
                .with_user(user_id)
                .with_device(device_id.to_string())
                .with_data(serde_json::json!({ "revoked_sessions": revoked })),
            )
            .await;
        Ok(revoked)
    }

    async fn set_trusted(
        &self,
        user_id: Uuid,
        device_id: &str,
        trusted: bool,
    ) -> Result<(), AuthError> {
        if !self.devices.set_device_trusted(user_id, device_id, trusted).await? {
            return Err(AuthError::NotFound("device".to_string()));
        }
        let event_type = if trusted {
            AuditEventType::DeviceTrusted
        } else {
            AuditEventType::DeviceUntrusted
        };
        self.audit
            .record(
                AuditEvent::new(event_type, AuditSeverity::Info, true, self.clock.now())
                    .with_user(user_id)
                    .with_device(device_id.to_string()),
            )
            .await;
        Ok(())
    }
}

fn truncate_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            format!("{}.{}.{}.0", octets[0], octets[1], octets[2])
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            format!(
                "{:x}:{:x}:{:x}:{:x}::",
                segments[0], segments[1], segments[2], segments[3]
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(user_agent: &str, ip: &str, explicit_id: Option<&str>) -> DeviceContext {
        DeviceContext {
            user_agent: user_agent.to_string(),
            ip: ip.parse().unwrap(),
            explicit_id: explicit_id.map(str::to_string),
        }
    }

    const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    #[test]
    fn fingerprint_is_stable_within_a_subnet() {
        let a = DeviceRegistry::fingerprint(&context(CHROME, "203.0.113.10", None));
        let b = DeviceRegistry::fingerprint(&context(CHROME, "203.0.113.200", None));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_across_subnets_and_clients() {
        let base = DeviceRegistry::fingerprint(&context(CHROME, "203.0.113.10", None));
        let other_net = DeviceRegistry::fingerprint(&context(CHROME, "198.51.100.10", None));
        assert_ne!(base, other_net);

        let firefox = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
        let other_client = DeviceRegistry::fingerprint(&context(firefox, "203.0.113.10", None));
        assert_ne!(base, other_client);
    }

    #[test]
    fn fingerprint_covers_browser_and_os_versions() {
        let base = DeviceRegistry::fingerprint(&context(CHROME, "203.0.113.10", None));

        let newer_chrome = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
            (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";
        assert_ne!(
            base,
            DeviceRegistry::fingerprint(&context(newer_chrome, "203.0.113.10", None))
        );

        let older_windows = "Mozilla/5.0 (Windows NT 6.1; Win64; x64) AppleWebKit/537.36 \
            (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
        assert_ne!(
            base,
            DeviceRegistry::fingerprint(&context(older_windows, "203.0.113.10", None))
        );
    }

    #[test]
    fn explicit_id_separates_identical_clients() {
        let a = DeviceRegistry::fingerprint(&context(CHROME, "203.0.113.10", Some("install-a")));
        let b = DeviceRegistry::fingerprint(&context(CHROME, "203.0.113.10", Some("install-b")));
        assert_ne!(a, b);
    }
}
