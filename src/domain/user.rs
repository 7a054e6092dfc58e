use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::generate_id;
use crate::error::{AppError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
    Logistic,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Logistic => "logistic",
            Role::Admin => "admin",
        }
    }

    /// Roles a caller may pick for themselves at registration
    pub fn is_self_assignable(&self) -> bool {
        !matches!(self, Role::Admin)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Buyer
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Role::Buyer),
            "seller" => Ok(Role::Seller),
            "logistic" => Ok(Role::Logistic),
            "admin" => Ok(Role::Admin),
            _ => Err(ValidationError::InvalidFormat("role".to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Email,
    #[serde(rename = "oauth")]
    OAuth,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Email => "email",
            Provider::OAuth => "oauth",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Provider::Email),
            "oauth" => Ok(Provider::OAuth),
            _ => Err(ValidationError::InvalidFormat("provider".to_string())),
        }
    }
}

/// Input to [`User::new`]
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub provider: Provider,
    pub provider_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub provider: Provider,
    pub provider_id: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Builds a new, unverified user with a freshly generated id.
    ///
    /// The email is trimmed and lowercased. Email-provider accounts must
    /// carry a password hash.
    pub fn new(new_user: NewUser) -> Result<Self, AppError> {
        let email = normalize_email(&new_user.email);
        if email.is_empty() {
            return Err(ValidationError::EmptyField("email".to_string()).into());
        }
        if new_user.provider == Provider::Email && new_user.password_hash.is_empty() {
            return Err(ValidationError::EmptyField("password".to_string()).into());
        }

        let now = Utc::now();
        Ok(Self {
            id: generate_id(),
            name: new_user.name,
            email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            provider: new_user.provider,
            provider_id: new_user.provider_id.filter(|id| !id.is_empty()),
            is_verified: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
