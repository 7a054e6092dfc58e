/// Password Hashing and Verification
///
/// Salted bcrypt hashing with a tunable work factor. bcrypt only reads the
/// first 72 bytes of its input, so longer passwords are refused rather than
/// silently truncated.

use bcrypt::{hash, verify};

use crate::error::{AppError, AuthError, ConfigError};

/// Input limit of the bcrypt algorithm, in bytes
pub const MAX_PASSWORD_BYTES: usize = 72;

const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

/// Hash a password with an explicit work factor
///
/// # Errors
/// - `PasswordTooLong` if the password exceeds 72 bytes
/// - `Internal` if bcrypt fails
pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, AppError> {
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AuthError::PasswordTooLong(MAX_PASSWORD_BYTES).into());
    }
    validate_cost(cost)?;

    hash(password, cost)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// Never fails: a mismatch, an over-long password, or an unparsable hash
/// all yield `false`. The comparison itself is constant-time.
pub fn verify_password(password: &str, hash: &str) -> bool {
    if hash.is_empty() {
        return false;
    }

    match verify(password, hash) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::warn!("Stored password hash could not be checked: {}", e);
            false
        }
    }
}

pub fn validate_cost(cost: u32) -> Result<(), AppError> {
    if !(MIN_COST..=MAX_COST).contains(&cost) {
        return Err(ConfigError::InvalidValue(format!(
            "bcrypt cost must be between {} and {}, got {}",
            MIN_COST, MAX_COST, cost
        ))
        .into());
    }
    Ok(())
}
