pub mod audit;
pub mod credentials;
pub mod device;
pub mod login;
pub mod mfa;
pub mod risk;
pub mod token;

pub use audit::{AuditService, AuditSink, StoreAuditSink};
pub use credentials::{ArgonCredentialStore, CredentialStore};
pub use device::DeviceRegistry;
pub use login::{LoginFlow, LoginOutcome};
pub use mfa::MfaEngine;
pub use risk::{RiskAssessment, RiskLevel, RiskScorer};
pub use token::{AccessClaims, TokenService};
