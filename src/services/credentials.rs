//! Credential lookup and verification seam. Token, MFA, and login
//! services depend on this trait rather than on the user store directly,
//! so tests can substitute fixtures and the argon2 cost stays in one
//! place.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::User;
use crate::store::UserStore;
use crate::utils::password::{hash_password, verify_password, Password, PasswordHash};
use crate::utils::validation::normalize_email;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolves an active user by email. Suspended and deactivated
    /// accounts resolve to None so callers cannot tell them apart from
    /// unknown emails.
    async fn find_active_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    async fn find_active_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError>;

    /// Resolves a user by id in any state, so callers that need to tell
    /// "gone" apart from "deactivated" can.
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError>;

    /// Constant-cost argon2 verification; false on any mismatch or
    /// malformed stored hash.
    fn verify_password(&self, user: &User, password: &Password) -> bool;

    /// Hashes and persists a new password.
    async fn set_password(&self, user_id: Uuid, password: &Password) -> Result<(), AuthError>;
}

#[derive(Clone)]
pub struct ArgonCredentialStore {
    users: Arc<dyn UserStore>,
}

impl ArgonCredentialStore {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl CredentialStore for ArgonCredentialStore {
    async fn find_active_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let user = self.users.find_user_by_email(&normalize_email(email)).await?;
        Ok(user.filter(User::is_active))
    }

    async fn find_active_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        let user = self.users.find_user_by_id(user_id).await?;
        Ok(user.filter(User::is_active))
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        self.users.find_user_by_id(user_id).await
    }

    fn verify_password(&self, user: &User, password: &Password) -> bool {
        verify_password(password, &PasswordHash::new(user.password_hash.clone()))
    }

    async fn set_password(&self, user_id: Uuid, password: &Password) -> Result<(), AuthError> {
        let hash = hash_password(password)?;
        self.users.update_password_hash(user_id, hash.as_str()).await
    }
}
