/// JWT Authentication Middleware
///
/// Validates the bearer access token from the Authorization header and
/// injects its claims into request extensions for use by route handlers.
/// Expiry is checked here, since the codec only checks the signature.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::AccessTokenCodec;
use crate::error::{AppError, AuthError};

/// JWT middleware for protecting routes
pub struct JwtMiddleware {
    codec: AccessTokenCodec,
}

impl JwtMiddleware {
    pub fn new(codec: AccessTokenCodec) -> Self {
        Self { codec }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            codec: self.codec.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    codec: AccessTokenCodec,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let token = match token {
            Some(token) => token,
            None => {
                tracing::warn!(path = %req.path(), "Missing or malformed Authorization header");
                return reject(AuthError::MissingToken);
            }
        };

        let claims = match self.codec.verify(&token) {
            Ok(claims) => claims,
            Err(_) => return reject(AuthError::InvalidToken),
        };

        if claims.is_expired() {
            tracing::info!(user_id = %claims.id, "Expired access token presented");
            return reject(AuthError::TokenExpired);
        }

        tracing::debug!(
            user_id = %claims.id,
            role = %claims.role,
            "JWT validated successfully"
        );
        req.extensions_mut().insert(claims);

        let service = self.service.clone();
        Box::pin(async move { service.call(req).await })
    }
}

fn reject<R: 'static>(reason: AuthError) -> LocalBoxFuture<'static, Result<R, Error>> {
    Box::pin(async move { Err(AppError::from(reason).into()) })
}
