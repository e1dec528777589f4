//! Geo lookup collaborator and distance math. GeoIP resolution itself is
//! external; the scorer consumes a pure lookup trait.

use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Debug, Clone, PartialEq)]
pub struct GeoLocation {
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
}

pub trait GeoLookup: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Option<GeoLocation>;
}

/// Fixed-table lookup used in tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoLookup {
    table: HashMap<IpAddr, GeoLocation>,
}

impl StaticGeoLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ip: IpAddr, label: &str, latitude: f64, longitude: f64) -> Self {
        self.table.insert(
            ip,
            GeoLocation {
                label: label.to_string(),
                latitude,
                longitude,
            },
        );
        self
    }
}

impl GeoLookup for StaticGeoLookup {
    fn lookup(&self, ip: IpAddr) -> Option<GeoLocation> {
        self.table.get(&ip).cloned()
    }
}

/// Great-circle distance between two coordinates in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Reserved or otherwise suspicious source ranges: loopback, link-local,
/// RFC1918 private space, CGNAT, unspecified, and documentation blocks.
/// Traffic from these should not reach a public login endpoint.
pub fn is_suspicious_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                // CGNAT 100.64.0.0/10
                || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
                // Documentation: 192.0.2.0/24, 198.51.100.0/24, 203.0.113.0/24
                || (octets[0] == 192 && octets[1] == 0 && octets[2] == 2)
                || (octets[0] == 198 && octets[1] == 51 && octets[2] == 100)
                || (octets[0] == 203 && octets[1] == 0 && octets[2] == 113)
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                // Unique local fc00::/7
                || (segments[0] & 0xfe00) == 0xfc00
                // Link-local fe80::/10
                || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}
