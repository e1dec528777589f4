use thiserror::Error;

/// Uniform message for credential failures on the login path. Unknown email
/// and wrong password must be indistinguishable to the caller.
pub const INVALID_CREDENTIALS: &str = "invalid email or password";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation error on {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn invalid_credentials() -> Self {
        AuthError::Unauthorized(INVALID_CREDENTIALS.to_string())
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AuthError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Message safe to return to callers. Internal errors keep their detail
    /// in dev builds only; callers in prod get a generic message while the
    /// full context stays in the server-side logs.
    pub fn client_message(&self, prod: bool) -> String {
        match self {
            AuthError::Internal(e) if prod => {
                tracing::error!(error = %e, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Internal(anyhow::Error::new(err))
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => {
                AuthError::Unauthorized("access token expired".to_string())
            }
            ErrorKind::InvalidSignature | ErrorKind::InvalidToken => {
                AuthError::Unauthorized("invalid access token".to_string())
            }
            _ => AuthError::Internal(anyhow::Error::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_masked_in_prod() {
        let err = AuthError::Internal(anyhow::anyhow!("pool exhausted"));
        assert_eq!(err.client_message(true), "internal server error");
        assert!(err.client_message(false).contains("pool exhausted"));
    }

    #[test]
    fn credential_failures_share_one_message() {
        assert_eq!(
            AuthError::invalid_credentials().client_message(true),
            INVALID_CREDENTIALS
        );
    }
}
