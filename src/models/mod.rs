pub mod audit_event;
pub mod capability;
pub mod device;
pub mod login_attempt;
pub mod mfa;
pub mod refresh_token;
pub mod user;

pub use audit_event::{AuditCategory, AuditEvent, AuditEventType, AuditQuery, AuditSeverity};
pub use capability::CapabilitySet;
pub use device::{ClientInfo, Device, DeviceContext};
pub use login_attempt::LoginAttempt;
pub use mfa::{MfaMethod, MfaSetup, MfaState, MfaStatus, MfaVerification};
pub use refresh_token::{RefreshToken, TokenPair};
pub use user::{User, UserState};
