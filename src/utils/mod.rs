pub mod geo;
pub mod password;
pub mod user_agent;
pub mod validation;

pub use geo::{haversine_km, is_suspicious_ip, GeoLocation, GeoLookup, StaticGeoLookup};
pub use password::{hash_password, verify_password, Password, PasswordHash};
pub use user_agent::parse_user_agent;
