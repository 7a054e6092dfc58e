/// Record store contracts
///
/// The rotation engine and the auth service only talk to storage through
/// these traits. "Not found" is an `Ok(None)`, never an error.

use async_trait::async_trait;

use crate::domain::{Provider, RefreshToken, User};
use crate::error::AppError;

mod memory;
mod postgres;

pub use memory::{InMemoryTokenRepository, InMemoryUserRepository};
pub use postgres::{PgTokenRepository, PgUserRepository};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persists a new user. Fails with a unique-violation when the email
    /// (or provider account) is already taken.
    async fn create(&self, user: &User) -> Result<(), AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;
    async fn find_by_provider_id(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError>;
    async fn mark_verified(&self, id: &str) -> Result<(), AppError>;
    async fn soft_delete(&self, id: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn create(&self, token: &RefreshToken) -> Result<(), AppError>;
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, AppError>;
    /// Atomically flips `is_used` on a record that is neither used nor revoked.
    ///
    /// Returns `false` when no such record exists, i.e. a concurrent caller
    /// consumed it first or the family was revoked in between.
    async fn mark_used(&self, token_hash: &str) -> Result<bool, AppError>;
    /// Inserts a rotation successor unless some record of its family is
    /// already revoked. Returns `false` when the insert was refused.
    ///
    /// The check and the insert are atomic with respect to `revoke_family`
    /// and `revoke_all_for_user`: a revocation either sees the successor or
    /// the successor is never stored.
    async fn create_successor(&self, token: &RefreshToken) -> Result<bool, AppError>;
    /// Revokes every record in the family. Returns the number newly revoked.
    async fn revoke_family(&self, family_id: &str) -> Result<u64, AppError>;
    /// Revokes every record owned by the user. Returns the number newly revoked.
    async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64, AppError>;
}
