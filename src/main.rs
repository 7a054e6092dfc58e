use std::net::TcpListener;
use std::sync::Arc;

use auth_service::auth::{AccessTokenCodec, AuthService, KeyPair};
use auth_service::configuration::get_configuration;
use auth_service::repository::{PgTokenRepository, PgUserRepository};
use auth_service::startup::run;
use auth_service::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

fn fatal(message: &'static str, detail: impl std::fmt::Display) -> std::io::Error {
    tracing::error!(error = %detail, "{}", message);
    std::io::Error::new(std::io::ErrorKind::Other, message)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    init_telemetry(configuration.application.environment);
    tracing::info!("Starting application");

    // The service cannot run without its keypair
    let keys = KeyPair::load(&configuration.jwt)
        .map_err(|e| fatal("Failed to load JWT keypair", e))?;
    tracing::info!(can_sign = keys.can_sign(), "JWT keypair loaded");
    let codec = AccessTokenCodec::new(Arc::new(keys));

    tracing::info!("Attempting to connect to database");
    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .min_connections(configuration.database.min_connections)
        .max_lifetime(configuration.database.max_lifetime())
        .acquire_timeout(configuration.application.request_timeout())
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| fatal("Database connection error", e))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| fatal("Database migration failed", e))?;
    tracing::info!("Database ready");

    let service = AuthService::new(
        Arc::new(PgUserRepository::new(pool.clone())),
        Arc::new(PgTokenRepository::new(pool)),
        codec,
        configuration.password.bcrypt_cost,
    )
    .map_err(|e| fatal("Invalid password settings", e))?;

    let address = configuration.application.address();
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, service, configuration.application)?.await
}
