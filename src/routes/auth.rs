/// Authentication Routes
///
/// Registration, login, refresh token rotation, logout, and the current
/// user's claims. The refresh secret only ever travels in the HTTP-only
/// `refreshToken` cookie; the access token goes in the JSON body.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, Claims, Registration, Session, ACCESS_TOKEN_LIFETIME_SECS, REFRESH_TOKEN_LIFETIME_SECS};
use crate::configuration::ApplicationSettings;
use crate::deadline::Deadline;
use crate::domain::{Provider, User};
use crate::error::{AppError, ValidationError};
use crate::validators::{is_valid_email, is_valid_name, is_valid_password, parse_self_service_role};

pub const REFRESH_COOKIE: &str = "refreshToken";

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<String>,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl TokenResponse {
    fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer",
            expires_in: ACCESS_TOKEN_LIFETIME_SECS,
        }
    }
}

#[derive(Serialize)]
pub struct RegisterResponse {
    #[serde(flatten)]
    pub token: TokenResponse,
    pub user: UserResponse,
}

/// Public view of a user; never includes the password hash
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub provider: String,
    pub is_verified: bool,
    pub created_at: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.to_string(),
            provider: user.provider.to_string(),
            is_verified: user.is_verified,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub msg: &'static str,
}

/// POST /api/v1/auth/register
///
/// # Errors
/// - 400: invalid email, name, password, or role
/// - 409: email (or OAuth account) already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    service: web::Data<AuthService>,
    deadline: Deadline,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();

    let email = is_valid_email(&form.email)?;
    let name = is_valid_name(&form.name)?;
    let role = parse_self_service_role(form.role.as_deref())?;
    let provider = match form.provider.as_deref() {
        None | Some("") => Provider::Email,
        Some(raw) => raw.parse::<Provider>()?,
    };
    if provider == Provider::Email {
        is_valid_password(&form.password)?;
    }

    let user = service
        .register(
            deadline,
            Registration {
                name,
                email,
                password: form.password,
                role,
                provider,
                provider_id: form.provider_id,
            },
        )
        .await?;
    let access_token = service.access_token_for(&user)?;

    Ok(HttpResponse::Created().json(RegisterResponse {
        token: TokenResponse::bearer(access_token),
        user: UserResponse::from(&user),
    }))
}

/// POST /api/v1/auth/login
///
/// Unknown email and wrong password produce the same 401 body.
pub async fn login(
    form: web::Json<LoginRequest>,
    service: web::Data<AuthService>,
    settings: web::Data<ApplicationSettings>,
    deadline: Deadline,
) -> Result<HttpResponse, AppError> {
    if form.email.trim().is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()).into());
    }
    if form.password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()).into());
    }

    let user = service.login(deadline, &form.email, &form.password).await?;
    let session = service.start_session(deadline, &user).await?;

    Ok(session_response(session, &settings))
}

/// POST /api/v1/auth/refresh
///
/// Rotates the cookie's refresh secret. A replayed secret revokes its whole
/// family; the client only ever sees a generic 401.
pub async fn refresh(
    req: HttpRequest,
    service: web::Data<AuthService>,
    settings: web::Data<ApplicationSettings>,
    deadline: Deadline,
) -> Result<HttpResponse, AppError> {
    let presented = req
        .cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ValidationError::EmptyField(REFRESH_COOKIE.to_string()))?;

    let session = service.refresh(deadline, &presented).await?;

    Ok(session_response(session, &settings))
}

/// POST /api/v1/auth/logout
///
/// Always succeeds and clears the cookie, even without one.
pub async fn logout(
    req: HttpRequest,
    service: web::Data<AuthService>,
    settings: web::Data<ApplicationSettings>,
    deadline: Deadline,
) -> Result<HttpResponse, AppError> {
    let presented = req.cookie(REFRESH_COOKIE).map(|c| c.value().to_string());
    service.logout(deadline, presented.as_deref()).await?;

    let mut removal = refresh_cookie(String::new(), &settings);
    removal.make_removal();

    Ok(HttpResponse::Ok()
        .cookie(removal)
        .json(MessageResponse { msg: "logged out" }))
}

/// POST /api/v1/auth/logout-all
///
/// **Requires a valid access token.** Revokes every refresh token of the caller.
pub async fn logout_all(
    claims: web::ReqData<Claims>,
    service: web::Data<AuthService>,
    settings: web::Data<ApplicationSettings>,
    deadline: Deadline,
) -> Result<HttpResponse, AppError> {
    let revoked = service.logout_everywhere(deadline, &claims.id).await?;
    tracing::info!(user_id = %claims.id, revoked, "Logged out everywhere");

    let mut removal = refresh_cookie(String::new(), &settings);
    removal.make_removal();

    Ok(HttpResponse::Ok()
        .cookie(removal)
        .json(MessageResponse { msg: "logged out everywhere" }))
}

/// GET /api/v1/auth/me
///
/// **Requires a valid access token.** Answers from the claims alone.
pub async fn me(claims: web::ReqData<Claims>) -> HttpResponse {
    let claims = claims.into_inner();
    HttpResponse::Ok().json(serde_json::json!({
        "id": claims.id,
        "email": claims.email,
        "role": claims.role,
    }))
}

fn session_response(session: Session, settings: &ApplicationSettings) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(refresh_cookie(session.refresh_token, settings))
        .json(TokenResponse::bearer(session.access_token))
}

fn refresh_cookie(value: String, settings: &ApplicationSettings) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, value)
        .path("/")
        .http_only(true)
        .secure(settings.secure_cookie)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(REFRESH_TOKEN_LIFETIME_SECS))
        .finish()
}
