use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::domain::{Provider, RefreshToken, Role, User};
use crate::error::{AppError, DatabaseError};
use crate::repository::{TokenRepository, UserRepository};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, provider, provider_id, \
     is_verified, created_at, updated_at, deleted_at";

const TOKEN_COLUMNS: &str =
    "id, user_id, token_hash, family_id, expires_on, is_used, is_revoked, created_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    provider: String,
    provider_id: Option<String>,
    is_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str| {
            AppError::Database(DatabaseError::UnexpectedError(format!(
                "users.{} holds an unknown value for user {}",
                field, row.id
            )))
        };
        let role: Role = row.role.parse().map_err(|_| corrupt("role"))?;
        let provider: Provider = row.provider.parse().map_err(|_| corrupt("provider"))?;

        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role,
            provider,
            provider_id: row.provider_id,
            is_verified: row.is_verified,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    user_id: String,
    token_hash: String,
    family_id: String,
    expires_on: DateTime<Utc>,
    is_used: bool,
    is_revoked: bool,
    created_at: DateTime<Utc>,
}

impl From<TokenRow> for RefreshToken {
    fn from(row: TokenRow) -> Self {
        RefreshToken {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            family_id: row.family_id,
            expires_on: row.expires_on,
            is_used: row.is_used,
            is_revoked: row.is_revoked,
            created_at: row.created_at,
        }
    }
}

/// Postgres-backed user store
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(
        &self,
        predicate: &str,
        args: &[&str],
    ) -> Result<Option<User>, AppError> {
        let sql = format!(
            "SELECT {} FROM users WHERE {} AND deleted_at IS NULL",
            USER_COLUMNS, predicate
        );
        let mut query = sqlx::query_as::<_, UserRow>(&sql);
        for arg in args {
            query = query.bind(*arg);
        }

        query
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, provider, provider_id,
                               is_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.provider.as_str())
        .bind(&user.provider_id)
        .bind(user.is_verified)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.find_one("email = $1", &[email]).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        self.find_one("id = $1", &[id]).await
    }

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        self.find_one("provider = $1 AND provider_id = $2", &[provider.as_str(), provider_id])
            .await
    }

    async fn mark_verified(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET is_verified = true, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn soft_delete(&self, id: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET deleted_at = $1, updated_at = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Postgres-backed refresh token store
#[derive(Clone)]
pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn create(&self, token: &RefreshToken) -> Result<(), AppError> {
        insert_token(&self.pool, token).await?;
        Ok(())
    }

    async fn create_successor(&self, token: &RefreshToken) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        // Holding the family's row locks orders this insert against
        // revoke_family and revoke_all_for_user, which take the same locks.
        let revoked: Vec<bool> = sqlx::query_scalar(
            "SELECT is_revoked FROM refresh_tokens WHERE family_id = $1 ORDER BY id FOR UPDATE",
        )
        .bind(&token.family_id)
        .fetch_all(&mut tx)
        .await?;

        if revoked.into_iter().any(|is_revoked| is_revoked) {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_token(&mut tx, token).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, AppError> {
        let sql = format!("SELECT {} FROM refresh_tokens WHERE token_hash = $1", TOKEN_COLUMNS);
        let row = sqlx::query_as::<_, TokenRow>(&sql)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(RefreshToken::from))
    }

    async fn mark_used(&self, token_hash: &str) -> Result<bool, AppError> {
        // The predicate makes this a compare-and-set: of two racing
        // rotations only one sees a row affected.
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_used = true
            WHERE token_hash = $1 AND is_used = false AND is_revoked = false
            "#,
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_family(&self, family_id: &str) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        // Wait out any in-flight successor insert; the UPDATE below then
        // runs on a fresh snapshot that includes it.
        sqlx::query("SELECT id FROM refresh_tokens WHERE family_id = $1 ORDER BY id FOR UPDATE")
            .bind(family_id)
            .execute(&mut tx)
            .await?;

        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = true WHERE family_id = $1 AND is_revoked = false",
        )
        .bind(family_id)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM refresh_tokens WHERE user_id = $1 ORDER BY id FOR UPDATE")
            .bind(user_id)
            .execute(&mut tx)
            .await?;

        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = true WHERE user_id = $1 AND is_revoked = false",
        )
        .bind(user_id)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

async fn insert_token<'e, E>(executor: E, token: &RefreshToken) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, family_id, expires_on,
                                    is_used, is_revoked, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(token.id)
    .bind(&token.user_id)
    .bind(&token.token_hash)
    .bind(&token.family_id)
    .bind(token.expires_on)
    .bind(token.is_used)
    .bind(token.is_revoked)
    .bind(token.created_at)
    .execute(executor)
    .await?;

    Ok(())
}
