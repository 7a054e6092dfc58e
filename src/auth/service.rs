/// Authentication use cases
///
/// Register, Login, Refresh and Logout composed from the password hasher,
/// the access token codec and the rotation engine. Every store call runs
/// under the caller's [`Deadline`].

use std::sync::Arc;

use crate::auth::jwt::AccessTokenCodec;
use crate::auth::password::{hash_password_with_cost, validate_cost, verify_password};
use crate::auth::refresh_token::TokenRotation;
use crate::deadline::Deadline;
use crate::domain::{normalize_email, NewUser, Provider, Role, User};
use crate::error::{AppError, AuthError, DatabaseError, ValidationError};
use crate::repository::{TokenRepository, UserRepository};

/// Unique index over (provider, provider_id)
const PROVIDER_ACCOUNT_CONSTRAINT: &str = "users_provider_id_idx";

/// Input to [`AuthService::register`]
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub provider: Provider,
    pub provider_id: Option<String>,
}

/// Credentials handed back to the client after login or refresh
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    rotation: TokenRotation,
    codec: AccessTokenCodec,
    password_cost: u32,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenRepository>,
        codec: AccessTokenCodec,
        password_cost: u32,
    ) -> Result<Self, AppError> {
        validate_cost(password_cost)?;

        Ok(Self {
            rotation: TokenRotation::new(tokens, users.clone()),
            users,
            codec,
            password_cost,
        })
    }

    pub fn codec(&self) -> &AccessTokenCodec {
        &self.codec
    }

    /// Create an account.
    ///
    /// # Errors
    /// - `EmailExists` / `ProviderAccountExists` on duplicates
    /// - `PasswordTooLong` if the password exceeds the hasher's limit
    pub async fn register(
        &self,
        deadline: Deadline,
        registration: Registration,
    ) -> Result<User, AppError> {
        let email = normalize_email(&registration.email);

        if deadline.bound(self.users.find_by_email(&email)).await?.is_some() {
            return Err(AuthError::EmailExists.into());
        }

        let password_hash = match registration.provider {
            Provider::Email => hash_password_with_cost(&registration.password, self.password_cost)?,
            Provider::OAuth => {
                let provider_id = registration
                    .provider_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| ValidationError::EmptyField("provider_id".to_string()))?;

                let existing = deadline
                    .bound(self.users.find_by_provider_id(registration.provider, provider_id))
                    .await?;
                if existing.is_some() {
                    return Err(AuthError::ProviderAccountExists.into());
                }
                String::new()
            }
        };

        let user = User::new(NewUser {
            name: registration.name,
            email,
            password_hash,
            role: registration.role,
            provider: registration.provider,
            provider_id: registration.provider_id,
        })?;

        // A concurrent registration can still win the unique index
        match deadline.bound(self.users.create(&user)).await {
            Ok(()) => {}
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(constraint))) => {
                tracing::warn!(constraint = %constraint, "Registration lost a uniqueness race");
                return Err(if constraint == PROVIDER_ACCOUNT_CONSTRAINT {
                    AuthError::ProviderAccountExists.into()
                } else {
                    AuthError::EmailExists.into()
                });
            }
            Err(e) => return Err(e),
        }

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user)
    }

    /// Check credentials.
    ///
    /// `EmailNotFound` and `InvalidPassword` stay distinct here; the HTTP
    /// layer renders both identically.
    pub async fn login(
        &self,
        deadline: Deadline,
        email: &str,
        password: &str,
    ) -> Result<User, AppError> {
        let email = normalize_email(email);

        let user = deadline
            .bound(self.users.find_by_email(&email))
            .await?
            .ok_or(AuthError::EmailNotFound)?;

        if user.provider != Provider::Email || !verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidPassword.into());
        }

        Ok(user)
    }

    /// Mint an access token and open a new refresh token family.
    pub async fn start_session(&self, deadline: Deadline, user: &User) -> Result<Session, AppError> {
        let access_token = self.access_token_for(user)?;
        let (refresh_token, _) = self.rotation.issue_initial(deadline, &user.id).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(Session {
            access_token,
            refresh_token,
        })
    }

    /// Rotate the presented refresh secret and mint a fresh access token.
    pub async fn refresh(&self, deadline: Deadline, presented: &str) -> Result<Session, AppError> {
        let (refresh_token, user) = self.rotation.rotate(deadline, presented).await?;
        let access_token = self.access_token_for(&user)?;

        Ok(Session {
            access_token,
            refresh_token,
        })
    }

    /// Revoke the family of the presented secret. A missing or unknown
    /// secret is treated as already logged out.
    pub async fn logout(&self, deadline: Deadline, presented: Option<&str>) -> Result<(), AppError> {
        match presented.filter(|secret| !secret.is_empty()) {
            Some(secret) => self.rotation.revoke_presented(deadline, secret).await,
            None => Ok(()),
        }
    }

    /// Revoke every refresh token the user holds, on every device.
    ///
    /// Access tokens already issued stay valid until they expire.
    pub async fn logout_everywhere(&self, deadline: Deadline, user_id: &str) -> Result<u64, AppError> {
        self.rotation.revoke_all_for_user(deadline, user_id).await
    }

    pub async fn mark_verified(&self, deadline: Deadline, user_id: &str) -> Result<(), AppError> {
        deadline.bound(self.users.mark_verified(user_id)).await?;
        tracing::info!(user_id = %user_id, "User verified");
        Ok(())
    }

    pub fn access_token_for(&self, user: &User) -> Result<String, AppError> {
        self.codec.issue(&user.id, &user.email, user.role)
    }
}
