/// Refresh Token Rotation
///
/// Refresh tokens are:
/// - Cryptographically secure random 64-character strings
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Single-use: every refresh retires the presented token and issues a
///   successor in the same family
/// - Grouped into families, one per login. Presenting a used or revoked
///   token revokes the whole family.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

use crate::deadline::Deadline;
use crate::domain::{generate_id, RefreshToken, User};
use crate::error::{AppError, AuthError};
use crate::repository::{TokenRepository, UserRepository};

/// Lifetime of every refresh token record, also the cookie max-age
pub const REFRESH_TOKEN_LIFETIME_SECS: i64 = 7 * 24 * 60 * 60;

const REFRESH_TOKEN_LENGTH: usize = 64;

/// Generate a new cryptographically secure refresh token secret
///
/// This is what the client holds; the server only keeps its hash.
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash a refresh token secret using SHA-256 (lowercase hex)
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The refresh-token state machine.
///
/// Per record: ACTIVE -> USED (normal rotation) or ACTIVE -> REVOKED
/// (family compromised or logout). Expiry is evaluated at use time only.
#[derive(Clone)]
pub struct TokenRotation {
    tokens: Arc<dyn TokenRepository>,
    users: Arc<dyn UserRepository>,
}

impl TokenRotation {
    pub fn new(tokens: Arc<dyn TokenRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { tokens, users }
    }

    /// Start a new family for a freshly authenticated user.
    ///
    /// Returns the raw secret (handed to the client once) and the stored record.
    pub async fn issue_initial(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<(String, RefreshToken), AppError> {
        let family_id = generate_id();
        let (secret, record) = new_record(user_id, &family_id);
        deadline.bound(self.tokens.create(&record)).await?;

        tracing::info!(user_id = %user_id, family_id = %family_id, "Refresh token family started");
        Ok((secret, record))
    }

    /// Exchange a presented secret for its successor.
    ///
    /// # Errors
    /// - `TokenNotFound`: no record for this secret (no side effects)
    /// - `TokenReused`: the record was already used or revoked; the whole
    ///   family is revoked before returning
    /// - `TokenExpired`: past `expires_on` (family left untouched)
    /// - `UserNotFound`: the owner no longer exists
    pub async fn rotate(
        &self,
        deadline: Deadline,
        presented: &str,
    ) -> Result<(String, User), AppError> {
        let token_hash = hash_token(presented);

        let record = deadline
            .bound(self.tokens.find_by_hash(&token_hash))
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        // Reuse is checked before expiry: replaying an expired-but-used
        // token is still a theft signal.
        if record.is_terminal() {
            return Err(self.reject_reuse(deadline, &record).await);
        }

        if Utc::now() > record.expires_on {
            tracing::info!(user_id = %record.user_id, "Refresh token expired");
            return Err(AuthError::TokenExpired.into());
        }

        // Lost the compare-and-set: someone else consumed this secret
        // between our read and this write.
        let consumed = deadline.bound(self.tokens.mark_used(&token_hash)).await?;
        if !consumed {
            return Err(self.reject_reuse(deadline, &record).await);
        }

        // A replay detected between our mark_used and this insert has
        // already revoked the family; the successor must not outlive it.
        let (secret, successor) = new_record(&record.user_id, &record.family_id);
        if !deadline.bound(self.tokens.create_successor(&successor)).await? {
            tracing::error!(
                user_id = %record.user_id,
                family_id = %record.family_id,
                "Family revoked mid-rotation, successor discarded"
            );
            return Err(AuthError::TokenReused.into());
        }

        let user = match deadline.bound(self.users.find_by_id(&record.user_id)).await? {
            Some(user) => user,
            None => {
                tracing::error!(
                    user_id = %record.user_id,
                    family_id = %record.family_id,
                    "Refresh token belongs to a user that no longer exists"
                );
                return Err(AuthError::UserNotFound.into());
            }
        };

        tracing::debug!(user_id = %user.id, family_id = %record.family_id, "Refresh token rotated");
        Ok((secret, user))
    }

    /// Revoke every record in a family. Idempotent.
    pub async fn revoke_family(&self, deadline: Deadline, family_id: &str) -> Result<u64, AppError> {
        deadline.bound(self.tokens.revoke_family(family_id)).await
    }

    /// Revoke every record the user owns, across all families. Idempotent.
    pub async fn revoke_all_for_user(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<u64, AppError> {
        let revoked = deadline.bound(self.tokens.revoke_all_for_user(user_id)).await?;
        tracing::info!(user_id = %user_id, revoked, "All refresh tokens revoked for user");
        Ok(revoked)
    }

    /// Revoke the family of a presented secret. Unknown secrets are ignored.
    pub async fn revoke_presented(&self, deadline: Deadline, presented: &str) -> Result<(), AppError> {
        let token_hash = hash_token(presented);
        match deadline.bound(self.tokens.find_by_hash(&token_hash)).await? {
            Some(record) => {
                self.revoke_family(deadline, &record.family_id).await?;
                tracing::info!(user_id = %record.user_id, family_id = %record.family_id, "Refresh token family revoked on logout");
            }
            None => tracing::debug!("Logout with unknown refresh token"),
        }
        Ok(())
    }

    /// Poison the family of a replayed token and build the error to return.
    async fn reject_reuse(&self, deadline: Deadline, record: &RefreshToken) -> AppError {
        tracing::error!(
            user_id = %record.user_id,
            family_id = %record.family_id,
            "Refresh token reuse detected, revoking family"
        );

        match self.revoke_family(deadline, &record.family_id).await {
            Ok(_) => AuthError::TokenReused.into(),
            Err(e) => e,
        }
    }
}

fn new_record(user_id: &str, family_id: &str) -> (String, RefreshToken) {
    let secret = generate_refresh_token();
    let record = RefreshToken::new(
        user_id,
        hash_token(&secret),
        family_id,
        Utc::now() + Duration::seconds(REFRESH_TOKEN_LIFETIME_SECS),
    );
    (secret, record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewUser, Provider, Role, TokenState};
    use crate::repository::{InMemoryTokenRepository, InMemoryUserRepository};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    /// Delays chosen store calls so concurrent rotations interleave at
    /// the points where races happen. Counts lost compare-and-sets.
    struct StallingTokenRepository {
        inner: Arc<InMemoryTokenRepository>,
        mark_used_delay: Option<StdDuration>,
        successor_delay: Option<StdDuration>,
        lost_cas: AtomicUsize,
    }

    impl StallingTokenRepository {
        fn new(inner: Arc<InMemoryTokenRepository>) -> Self {
            Self {
                inner,
                mark_used_delay: None,
                successor_delay: None,
                lost_cas: AtomicUsize::new(0),
            }
        }
    }

    async fn stall(delay: Option<StdDuration>) {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    #[async_trait]
    impl TokenRepository for StallingTokenRepository {
        async fn create(&self, token: &RefreshToken) -> Result<(), AppError> {
            self.inner.create(token).await
        }

        async fn create_successor(&self, token: &RefreshToken) -> Result<bool, AppError> {
            stall(self.successor_delay).await;
            self.inner.create_successor(token).await
        }

        async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, AppError> {
            self.inner.find_by_hash(token_hash).await
        }

        async fn mark_used(&self, token_hash: &str) -> Result<bool, AppError> {
            stall(self.mark_used_delay).await;
            let consumed = self.inner.mark_used(token_hash).await?;
            if !consumed {
                self.lost_cas.fetch_add(1, Ordering::SeqCst);
            }
            Ok(consumed)
        }

        async fn revoke_family(&self, family_id: &str) -> Result<u64, AppError> {
            self.inner.revoke_family(family_id).await
        }

        async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64, AppError> {
            self.inner.revoke_all_for_user(user_id).await
        }
    }

    struct Fixture {
        rotation: TokenRotation,
        tokens: Arc<InMemoryTokenRepository>,
        users: Arc<InMemoryUserRepository>,
        user: User,
    }

    async fn fixture() -> Fixture {
        let tokens = Arc::new(InMemoryTokenRepository::new());
        let users = Arc::new(InMemoryUserRepository::new());
        let user = User::new(NewUser {
            name: "Alice".to_string(),
            email: "a@x.com".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            role: Role::Buyer,
            provider: Provider::Email,
            provider_id: None,
        })
        .unwrap();
        users.create(&user).await.unwrap();

        Fixture {
            rotation: TokenRotation::new(tokens.clone(), users.clone()),
            tokens,
            users,
            user,
        }
    }

    fn deadline() -> Deadline {
        Deadline::after(StdDuration::from_secs(5))
    }

    fn reason(err: AppError) -> AuthError {
        err.auth().cloned().expect("expected an auth error")
    }

    #[test]
    fn test_generate_refresh_token() {
        let token = generate_refresh_token();

        assert_eq!(token.len(), REFRESH_TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_refresh_token());
    }

    #[test]
    fn test_token_hashing() {
        let token = generate_refresh_token();
        let hash = hash_token(&token);

        assert_eq!(hash, hash_token(&token));
        assert_ne!(token, hash);
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_issue_initial_stores_only_the_hash() {
        let f = fixture().await;
        let (secret, record) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();

        assert_eq!(record.token_hash, hash_token(&secret));
        assert_ne!(record.token_hash, secret);
        assert_eq!(record.user_id, f.user.id);
        assert_eq!(record.state(Utc::now()), TokenState::Active);

        let stored = f.tokens.find_by_hash(&record.token_hash).await.unwrap().unwrap();
        assert_eq!(stored, record);
        assert!(f.tokens.find_by_hash(&secret).await.unwrap().is_none());

        let lifetime = record.expires_on - record.created_at;
        assert!((lifetime - Duration::days(7)).num_seconds().abs() <= 1);
    }

    #[tokio::test]
    async fn test_each_login_starts_a_new_family() {
        let f = fixture().await;
        let (_, first) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();
        let (_, second) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();

        assert_ne!(first.family_id, second.family_id);
    }

    #[tokio::test]
    async fn test_rotate_issues_successor_in_same_family() {
        let f = fixture().await;
        let (s1, r1) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();

        let (s2, user) = f.rotation.rotate(deadline(), &s1).await.unwrap();
        assert_eq!(user.id, f.user.id);
        assert_ne!(s1, s2);

        let family = f.tokens.family(&r1.family_id).unwrap();
        assert_eq!(family.len(), 2);
        assert_eq!(family[0].state(Utc::now()), TokenState::Used);
        assert_eq!(family[1].token_hash, hash_token(&s2));
        assert_eq!(family[1].state(Utc::now()), TokenState::Active);
    }

    #[tokio::test]
    async fn test_rotation_is_single_use_and_reuse_revokes_family() {
        let f = fixture().await;
        let (s1, r1) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();

        let (s2, _) = f.rotation.rotate(deadline(), &s1).await.unwrap();

        let replay = f.rotation.rotate(deadline(), &s1).await.unwrap_err();
        assert_eq!(reason(replay), AuthError::TokenReused);

        // The legitimate successor is dead too
        let successor = f.rotation.rotate(deadline(), &s2).await.unwrap_err();
        assert_eq!(reason(successor), AuthError::TokenReused);

        let family = f.tokens.family(&r1.family_id).unwrap();
        assert!(family.iter().all(|t| t.is_revoked));
    }

    #[tokio::test]
    async fn test_reuse_leaves_other_families_alone() {
        let f = fixture().await;
        let (s1, _) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();
        let (other, _) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();

        f.rotation.rotate(deadline(), &s1).await.unwrap();
        assert!(f.rotation.rotate(deadline(), &s1).await.is_err());

        assert!(f.rotation.rotate(deadline(), &other).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_token_does_not_revoke_family() {
        let f = fixture().await;
        let secret = generate_refresh_token();
        let mut record = RefreshToken::new(
            f.user.id.clone(),
            hash_token(&secret),
            "expired-family",
            Utc::now() - Duration::minutes(1),
        );
        record.created_at = Utc::now() - Duration::days(8);
        f.tokens.create(&record).await.unwrap();

        let err = f.rotation.rotate(deadline(), &secret).await.unwrap_err();
        assert_eq!(reason(err), AuthError::TokenExpired);

        let stored = f.tokens.find_by_hash(&record.token_hash).await.unwrap().unwrap();
        assert!(!stored.is_revoked);
        assert!(!stored.is_used);
    }

    #[tokio::test]
    async fn test_reuse_is_checked_before_expiry() {
        let f = fixture().await;
        let secret = generate_refresh_token();
        let mut record = RefreshToken::new(
            f.user.id.clone(),
            hash_token(&secret),
            "old-family",
            Utc::now() - Duration::minutes(1),
        );
        record.is_used = true;
        f.tokens.create(&record).await.unwrap();

        let err = f.rotation.rotate(deadline(), &secret).await.unwrap_err();
        assert_eq!(reason(err), AuthError::TokenReused);
        assert!(f.tokens.family("old-family").unwrap()[0].is_revoked);
    }

    #[tokio::test]
    async fn test_unknown_secret_has_no_side_effects() {
        let f = fixture().await;
        let (_, r1) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();

        let err = f.rotation.rotate(deadline(), "garbage").await.unwrap_err();
        assert_eq!(reason(err), AuthError::TokenNotFound);

        let family = f.tokens.family(&r1.family_id).unwrap();
        assert_eq!(family.len(), 1);
        assert_eq!(family[0].state(Utc::now()), TokenState::Active);
    }

    #[tokio::test]
    async fn test_vanished_user_is_rejected() {
        let f = fixture().await;
        let (s1, _) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();
        f.users.soft_delete(&f.user.id).await.unwrap();

        let err = f.rotation.rotate(deadline(), &s1).await.unwrap_err();
        assert_eq!(reason(err), AuthError::UserNotFound);
    }

    #[tokio::test]
    async fn test_replay_during_rotation_kills_the_successor() {
        let f = fixture().await;
        let (s1, r1) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();

        let mut store = StallingTokenRepository::new(f.tokens.clone());
        store.successor_delay = Some(StdDuration::from_millis(50));
        let rotation = TokenRotation::new(Arc::new(store), f.users.clone());

        // The replay lands after mark_used but before the successor insert
        let (first, replay) = tokio::join!(rotation.rotate(deadline(), &s1), async {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            rotation.rotate(deadline(), &s1).await
        });

        assert_eq!(reason(replay.unwrap_err()), AuthError::TokenReused);
        assert_eq!(reason(first.unwrap_err()), AuthError::TokenReused);

        let family = f.tokens.family(&r1.family_id).unwrap();
        assert_eq!(family.len(), 1, "no successor may be stored");
        assert!(family.iter().all(|t| t.is_revoked));
    }

    #[tokio::test]
    async fn test_lost_compare_and_set_revokes_family() {
        let f = fixture().await;
        let (s1, r1) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();

        // Both callers read the record as active before either marks it used
        let mut store = StallingTokenRepository::new(f.tokens.clone());
        store.mark_used_delay = Some(StdDuration::from_millis(20));
        let store = Arc::new(store);
        let rotation = TokenRotation::new(store.clone(), f.users.clone());

        let (a, b) = tokio::join!(rotation.rotate(deadline(), &s1), rotation.rotate(deadline(), &s1));

        assert_eq!(store.lost_cas.load(Ordering::SeqCst), 1);

        let (winner, loser) = match (a, b) {
            (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
            (a, b) => panic!("expected one winner, got {:?} and {:?}", a.is_ok(), b.is_ok()),
        };
        assert_eq!(reason(loser), AuthError::TokenReused);

        // The loser revoked everything, the winner's successor included
        let family = f.tokens.family(&r1.family_id).unwrap();
        assert_eq!(family.len(), 2);
        assert!(family.iter().all(|t| t.is_revoked));

        let (successor, _) = winner;
        let err = f.rotation.rotate(deadline(), &successor).await.unwrap_err();
        assert_eq!(reason(err), AuthError::TokenReused);
    }

    #[tokio::test]
    async fn test_repeated_presentations_have_one_winner() {
        let f = fixture().await;
        let (s1, r1) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let rotation = f.rotation.clone();
                let secret = s1.clone();
                tokio::spawn(async move { rotation.rotate(deadline(), &secret).await })
            })
            .collect();

        let mut successes = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert_eq!(reason(e), AuthError::TokenReused),
            }
        }
        assert_eq!(successes, 1);

        // Losing a race counts as replay: the whole family ends revoked
        let family = f.tokens.family(&r1.family_id).unwrap();
        assert!(family.iter().all(|t| t.is_revoked));
    }

    #[tokio::test]
    async fn test_revoke_presented_and_revoke_all() {
        let f = fixture().await;
        let (s1, _) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();
        let (s2, _) = f.rotation.issue_initial(deadline(), &f.user.id).await.unwrap();

        f.rotation.revoke_presented(deadline(), &s1).await.unwrap();
        f.rotation.revoke_presented(deadline(), "unknown").await.unwrap();
        assert!(f.rotation.rotate(deadline(), &s1).await.is_err());

        assert_eq!(f.rotation.revoke_all_for_user(deadline(), &f.user.id).await.unwrap(), 1);
        assert_eq!(f.rotation.revoke_all_for_user(deadline(), &f.user.id).await.unwrap(), 0);
        assert!(f.rotation.rotate(deadline(), &s2).await.is_err());
    }
}
