use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::configuration::Environment;

/// Initializes structured logging.
///
/// Production emits one JSON object per line; development uses the
/// human-readable formatter. `RUST_LOG` overrides the default `info` level.
pub fn init_telemetry(environment: Environment) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match environment {
        Environment::Production => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stdout)
                    .json(),
            )
            .init(),
        Environment::Development => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stdout)
                    .pretty(),
            )
            .init(),
    }
}
