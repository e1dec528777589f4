use validator::ValidateEmail;

use crate::error::AuthError;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.validate_email() {
        Ok(())
    } else {
        Err(AuthError::validation("email", "not a valid email address"))
    }
}

/// TOTP codes are exactly six digits.
pub fn validate_totp_code(code: &str) -> Result<(), AuthError> {
    if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AuthError::validation("code", "must be a 6-digit code"))
    }
}

/// Backup codes are eight lowercase hex characters.
pub fn is_backup_code_format(code: &str) -> bool {
    code.len() == 8 && code.bytes().all(|b| b.is_ascii_hexdigit())
}

/// An MFA challenge accepts either form.
pub fn validate_mfa_code(code: &str) -> Result<(), AuthError> {
    if validate_totp_code(code).is_ok() || is_backup_code_format(code) {
        Ok(())
    } else {
        Err(AuthError::validation(
            "code",
            "must be a 6-digit TOTP code or an 8-character backup code",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totp_code_format() {
        assert!(validate_totp_code("123456").is_ok());
        assert!(validate_totp_code("12345").is_err());
        assert!(validate_totp_code("12345a").is_err());
        assert!(validate_totp_code("1234567").is_err());
    }

    #[test]
    fn backup_code_format() {
        assert!(is_backup_code_format("a1b2c3d4"));
        assert!(!is_backup_code_format("a1b2c3"));
        assert!(!is_backup_code_format("zzzzzzzz"));
    }

    #[test]
    fn email_validation() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
    }

    #[test]
    fn normalization_lowercases_and_trims() {
        assert_eq!(normalize_email("  User@Example.COM "), "user@example.com");
    }
}
