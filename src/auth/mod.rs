/// Authentication module
///
/// Password hashing, RS256 access tokens, refresh token rotation,
/// and the use cases built on top of them.

mod claims;
mod jwt;
pub(crate) mod keys;
mod password;
mod refresh_token;
mod service;

pub use claims::Claims;
pub use jwt::{AccessTokenCodec, ACCESS_TOKEN_LIFETIME_SECS};
pub use keys::KeyPair;
pub use password::{hash_password_with_cost, verify_password, MAX_PASSWORD_BYTES};
pub use refresh_token::{generate_refresh_token, hash_token, TokenRotation, REFRESH_TOKEN_LIFETIME_SECS};
pub use service::{AuthService, Registration, Session};
