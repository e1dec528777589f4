//! Capability-set authorization. Role and permission membership is checked
//! here, at one boundary, instead of ad-hoc string comparisons per call
//! site.

use std::collections::HashSet;

use crate::error::AuthError;
use crate::models::User;
use crate::services::token::AccessClaims;

#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    roles: HashSet<String>,
    permissions: HashSet<String>,
}

impl CapabilitySet {
    pub fn new(roles: impl IntoIterator<Item = String>, permissions: impl IntoIterator<Item = String>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
            permissions: permissions.into_iter().collect(),
        }
    }

    pub fn from_user(user: &User) -> Self {
        Self::new(user.roles.iter().cloned(), user.permissions.iter().cloned())
    }

    pub fn from_claims(claims: &AccessClaims) -> Self {
        Self::new(claims.roles.iter().cloned(), claims.permissions.iter().cloned())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn can(&self, permission: &str) -> bool {
        self.permissions.contains(permission) || self.has_role("admin")
    }

    /// Authorization boundary: Forbidden unless the capability is held.
    pub fn require(&self, permission: &str) -> Result<(), AuthError> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!(
                "missing capability: {permission}"
            )))
        }
    }
}
