use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persisted refresh-token record.
///
/// Only the SHA-256 digest of the secret is kept. Once `is_used` or
/// `is_revoked` is set the record is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: String,
    pub token_hash: String,
    pub family_id: String,
    pub expires_on: DateTime<Utc>,
    pub is_used: bool,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Active,
    Used,
    Revoked,
    Expired,
}

impl RefreshToken {
    pub fn new(
        user_id: impl Into<String>,
        token_hash: impl Into<String>,
        family_id: impl Into<String>,
        expires_on: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            token_hash: token_hash.into(),
            family_id: family_id.into(),
            expires_on,
            is_used: false,
            is_revoked: false,
            created_at: Utc::now(),
        }
    }

    /// Terminal records can never authorize another rotation
    pub fn is_terminal(&self) -> bool {
        self.is_used || self.is_revoked
    }

    pub fn state(&self, now: DateTime<Utc>) -> TokenState {
        if self.is_revoked {
            TokenState::Revoked
        } else if self.is_used {
            TokenState::Used
        } else if now > self.expires_on {
            TokenState::Expired
        } else {
            TokenState::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_state_transitions() {
        let now = Utc::now();
        let mut token = RefreshToken::new("user", "hash", "family", now + Duration::days(7));
        assert_eq!(token.state(now), TokenState::Active);
        assert_eq!(token.state(now + Duration::days(8)), TokenState::Expired);

        token.is_used = true;
        assert_eq!(token.state(now), TokenState::Used);
        assert!(token.is_terminal());

        token.is_revoked = true;
        assert_eq!(token.state(now), TokenState::Revoked);
    }
}
