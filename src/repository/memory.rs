use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{Provider, RefreshToken, User};
use crate::error::{AppError, DatabaseError};
use crate::repository::{TokenRepository, UserRepository};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("in-memory store lock poisoned".to_string()))
}

/// Users keyed by id, for tests and Postgres-free runs
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> Result<(), AppError> {
        let mut users = lock(&self.users)?;

        let clash = users.values().find(|existing| {
            existing.email == user.email
                || (user.provider_id.is_some()
                    && existing.provider == user.provider
                    && existing.provider_id == user.provider_id)
        });
        if let Some(existing) = clash {
            let constraint = if existing.email == user.email {
                "users_email_key"
            } else {
                "users_provider_id_idx"
            };
            return Err(DatabaseError::UniqueConstraintViolation(constraint.to_string()).into());
        }

        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = lock(&self.users)?;
        Ok(users
            .values()
            .find(|u| u.email == email && !u.is_deleted())
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let users = lock(&self.users)?;
        Ok(users.get(id).filter(|u| !u.is_deleted()).cloned())
    }

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        let users = lock(&self.users)?;
        Ok(users
            .values()
            .find(|u| {
                u.provider == provider
                    && u.provider_id.as_deref() == Some(provider_id)
                    && !u.is_deleted()
            })
            .cloned())
    }

    async fn mark_verified(&self, id: &str) -> Result<(), AppError> {
        let mut users = lock(&self.users)?;
        if let Some(user) = users.get_mut(id) {
            user.is_verified = true;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn soft_delete(&self, id: &str) -> Result<(), AppError> {
        let mut users = lock(&self.users)?;
        if let Some(user) = users.get_mut(id) {
            let now = Utc::now();
            user.deleted_at.get_or_insert(now);
            user.updated_at = now;
        }
        Ok(())
    }
}

/// Refresh tokens keyed by hash. A single lock covers every operation,
/// which is what makes `mark_used` a compare-and-set.
#[derive(Default)]
pub struct InMemoryTokenRepository {
    tokens: Mutex<HashMap<String, RefreshToken>>,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records of a family, oldest first
    pub fn family(&self, family_id: &str) -> Result<Vec<RefreshToken>, AppError> {
        let tokens = lock(&self.tokens)?;
        let mut family: Vec<RefreshToken> = tokens
            .values()
            .filter(|t| t.family_id == family_id)
            .cloned()
            .collect();
        family.sort_by_key(|t| t.created_at);
        Ok(family)
    }
}

#[async_trait]
impl TokenRepository for InMemoryTokenRepository {
    async fn create(&self, token: &RefreshToken) -> Result<(), AppError> {
        let mut tokens = lock(&self.tokens)?;
        if tokens.contains_key(&token.token_hash) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "refresh_tokens_token_hash_key".to_string(),
            )
            .into());
        }
        tokens.insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn create_successor(&self, token: &RefreshToken) -> Result<bool, AppError> {
        let mut tokens = lock(&self.tokens)?;
        let family_revoked = tokens
            .values()
            .any(|t| t.family_id == token.family_id && t.is_revoked);
        if family_revoked {
            return Ok(false);
        }
        if tokens.contains_key(&token.token_hash) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "refresh_tokens_token_hash_key".to_string(),
            )
            .into());
        }
        tokens.insert(token.token_hash.clone(), token.clone());
        Ok(true)
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, AppError> {
        let tokens = lock(&self.tokens)?;
        Ok(tokens.get(token_hash).cloned())
    }

    async fn mark_used(&self, token_hash: &str) -> Result<bool, AppError> {
        let mut tokens = lock(&self.tokens)?;
        match tokens.get_mut(token_hash) {
            Some(token) if !token.is_terminal() => {
                token.is_used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_family(&self, family_id: &str) -> Result<u64, AppError> {
        let mut tokens = lock(&self.tokens)?;
        let mut revoked = 0;
        for token in tokens.values_mut().filter(|t| t.family_id == family_id) {
            if !token.is_revoked {
                token.is_revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64, AppError> {
        let mut tokens = lock(&self.tokens)?;
        let mut revoked = 0;
        for token in tokens.values_mut().filter(|t| t.user_id == user_id) {
            if !token.is_revoked {
                token.is_revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}
