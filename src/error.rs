/// Application Error Handling
///
/// Every failure in the service is one of a closed set of variants.
/// Lower layers return these typed outcomes; the HTTP boundary maps each
/// to exactly one status code and a generic message via [`AppError::kind`].
/// Message text is never inspected to decide how an error is handled.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
        }
    }
}

impl StdError for ValidationError {}

/// Credential and token lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    EmailExists,
    ProviderAccountExists,
    EmailNotFound,
    InvalidPassword,
    /// Password exceeds the hashing algorithm's byte limit
    PasswordTooLong(usize),
    /// The signing half of the keypair was never loaded
    KeyNotLoaded,
    InvalidToken,
    TokenExpired,
    TokenNotFound,
    /// A used or revoked refresh token was presented again
    TokenReused,
    UserNotFound,
    MissingToken,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::EmailExists => write!(f, "email already exists"),
            AuthError::ProviderAccountExists => write!(f, "provider account already exists"),
            AuthError::EmailNotFound => write!(f, "email does not exist"),
            AuthError::InvalidPassword => write!(f, "invalid password"),
            AuthError::PasswordTooLong(max) => {
                write!(f, "password is too long (maximum {} bytes)", max)
            }
            AuthError::KeyNotLoaded => write!(f, "signing key is not loaded"),
            AuthError::InvalidToken => write!(f, "invalid token"),
            AuthError::TokenExpired => write!(f, "token has expired"),
            AuthError::TokenNotFound => write!(f, "refresh token not found"),
            AuthError::TokenReused => write!(f, "refresh token already used or revoked"),
            AuthError::UserNotFound => write!(f, "user not found"),
            AuthError::MissingToken => write!(f, "missing authentication token"),
        }
    }
}

impl StdError for AuthError {}

/// Database operation errors
#[derive(Debug)]
pub enum DatabaseError {
    UniqueConstraintViolation(String),
    QueryExecution(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Auth(AuthError),
    Database(DatabaseError),
    Config(ConfigError),
    /// The request-scoped deadline elapsed before a store call finished
    Timeout,
    Internal(String),
}

/// Coarse classification used by the HTTP boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Unauthorized,
    NotFound,
    Timeout,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Auth(e) => match e {
                AuthError::EmailExists | AuthError::ProviderAccountExists => ErrorKind::Conflict,
                AuthError::PasswordTooLong(_) => ErrorKind::Validation,
                AuthError::UserNotFound => ErrorKind::NotFound,
                AuthError::KeyNotLoaded => ErrorKind::Internal,
                AuthError::EmailNotFound
                | AuthError::InvalidPassword
                | AuthError::InvalidToken
                | AuthError::TokenExpired
                | AuthError::TokenNotFound
                | AuthError::TokenReused
                | AuthError::MissingToken => ErrorKind::Unauthorized,
            },
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => ErrorKind::Conflict,
            AppError::Database(_) => ErrorKind::Internal,
            AppError::Config(_) => ErrorKind::Internal,
            AppError::Timeout => ErrorKind::Timeout,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The auth variant, if any. Convenient for matching in tests and callers.
    pub fn auth(&self) -> Option<&AuthError> {
        match self {
            AppError::Auth(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Timeout => write!(f, "request deadline exceeded"),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                AppError::Database(DatabaseError::UniqueConstraintViolation(
                    db_err.constraint().unwrap_or("unknown").to_string(),
                ))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            sqlx::Error::Database(_) | sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                AppError::Database(DatabaseError::QueryExecution(err.to_string()))
            }
            _ => AppError::Database(DatabaseError::UnexpectedError(err.to_string())),
        }
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (code, message) = match self.kind() {
            ErrorKind::Validation => ("VALIDATION_ERROR", self.to_string()),
            ErrorKind::Conflict => ("CONFLICT", self.to_string()),
            ErrorKind::Unauthorized | ErrorKind::NotFound => match self.auth() {
                // Unknown email and wrong password must be indistinguishable
                Some(AuthError::EmailNotFound) | Some(AuthError::InvalidPassword) => {
                    ("INVALID_CREDENTIALS", "Invalid email or password".to_string())
                }
                Some(AuthError::MissingToken) => {
                    ("MISSING_TOKEN", "Missing authentication token".to_string())
                }
                _ => ("TOKEN_INVALID", "Invalid or expired token".to_string()),
            },
            ErrorKind::Timeout => ("TIMEOUT", "Request timed out".to_string()),
            ErrorKind::Internal => ("INTERNAL_ERROR", "Internal server error".to_string()),
        };

        let status = status_for(self.kind());
        let error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Auth(AuthError::TokenReused) => {
                tracing::error!(
                    request_id = request_id,
                    error = %self,
                    "Refresh token replay rejected"
                );
            }
            AppError::Auth(AuthError::UserNotFound) => {
                tracing::error!(
                    request_id = request_id,
                    error = %self,
                    "Token owner could not be resolved"
                );
            }
            AppError::Auth(AuthError::EmailNotFound) | AppError::Auth(AuthError::InvalidPassword) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %self,
                    "Invalid credentials attempt"
                );
            }
            AppError::Auth(AuthError::KeyNotLoaded) => {
                tracing::error!(
                    request_id = request_id,
                    error = %self,
                    "Signing key unavailable"
                );
            }
            AppError::Validation(_) | AppError::Auth(_) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %self,
                    "Request rejected"
                );
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %self,
                    "Duplicate entry attempt"
                );
            }
            AppError::Database(e) => {
                tracing::error!(request_id = request_id, error = %e, "Database error");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
            AppError::Timeout => {
                tracing::error!(request_id = request_id, "Request deadline exceeded");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthorized | ErrorKind::NotFound => StatusCode::UNAUTHORIZED,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = crate::logger::current_request_id()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        status_for(self.kind())
    }
}
