/// Request-scoped deadlines
///
/// A [`Deadline`] is fixed when a request arrives and bounds every store
/// call made on its behalf. An elapsed deadline fails with
/// [`AppError::Timeout`]; nothing here retries.

use std::future::{ready, Future, Ready};
use std::time::Duration;

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use tokio::time::Instant;

use crate::error::AppError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-request budget registered as app data
#[derive(Debug, Clone, Copy)]
pub struct RequestTimeout(pub Duration);

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    /// Runs `fut` until it completes or the deadline passes.
    pub async fn bound<F, T>(self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Store call abandoned at request deadline");
                Err(AppError::Timeout)
            }
        }
    }
}

impl FromRequest for Deadline {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let timeout = req
            .app_data::<web::Data<RequestTimeout>>()
            .map(|t| t.0)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        ready(Ok(Deadline::after(timeout)))
    }
}
