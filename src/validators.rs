/// Input validators for the auth endpoints
///
/// Request bodies are checked here before they reach the service layer:
/// 1. Length limits on every field
/// 2. Email format (RFC 5322 simplified)
/// 3. Minimum password length
/// 4. Roles a user may pick for themselves

use lazy_static::lazy_static;
use regex::Regex;

use crate::domain::{normalize_email, Role};
use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_NAME_LENGTH: usize = 256;
pub const MIN_PASSWORD_LENGTH: usize = 8;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();
}

/// Validates an email address and returns it normalized (trimmed, lowercase)
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(normalize_email(trimmed))
}

/// Validates a display name
/// - Non-empty after trimming
/// - No control characters
pub fn is_valid_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("name".to_string()));
    }

    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong("name".to_string(), MAX_NAME_LENGTH));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat("name".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Minimum length only. The 72 byte upper bound belongs to the hasher,
/// which reports it as `PasswordTooLong`.
pub fn is_valid_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()));
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password".to_string(), MIN_PASSWORD_LENGTH));
    }

    Ok(())
}

/// Parses a role chosen at registration. Missing means buyer; admin can
/// never be self-assigned.
pub fn parse_self_service_role(role: Option<&str>) -> Result<Role, ValidationError> {
    let role = match role.map(str::trim).filter(|r| !r.is_empty()) {
        None => return Ok(Role::default()),
        Some(raw) => raw.to_lowercase().parse::<Role>()?,
    };

    if !role.is_self_assignable() {
        return Err(ValidationError::InvalidFormat("role".to_string()));
    }

    Ok(role)
}
