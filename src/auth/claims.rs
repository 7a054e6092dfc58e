/// Access token claim set
///
/// `{id, email, role, iat, exp}`. Expiry is a claim value; the codec does
/// not enforce it, callers check [`Claims::is_expired`].

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Role;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// User id
    pub id: String,
    pub email: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        lifetime: Duration,
    ) -> Self {
        let now = Utc::now().timestamp();
        Self {
            id: user_id.into(),
            email: email.into(),
            role,
            iat: now,
            exp: now + lifetime.num_seconds(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.exp
    }
}
