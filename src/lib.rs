//! vigil-auth: account-security and credential core.
//!
//! Provides token issuance/rotation, TOTP multi-factor enrollment and
//! challenge, risk-based scoring of login attempts, and per-user device
//! trust tracking. The HTTP layer, OAuth exchange, and schema migrations
//! live elsewhere; this crate exposes service instances constructed with
//! injected store handles, clock, and config.

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use error::AuthError;

use tracing_subscriber::EnvFilter;

/// Initialize structured logging for binaries and examples embedding this
/// crate. Tests rely on the default subscriber instead.
pub fn init_logging(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_file(true)
        .with_line_number(true)
        .json()
        .flatten_event(true)
        .init();
}
