//! Logging and tracing utilities

use crate::config::{LogFormat, Settings};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber with default configuration
pub fn init_tracing() {
    init_tracing_with(&Settings::default());
}

/// Initialize tracing subscriber from settings
///
/// `RUST_LOG` takes precedence over `Settings::default_log_filter`. Calling
/// this more than once is a no-op.
pub fn init_tracing_with(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.default_log_filter));

    let result = match settings.log_format {
        LogFormat::Plain => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };

    if result.is_ok() {
        tracing::debug!(
            app = %settings.app_name,
            environment = %settings.environment,
            "tracing initialized"
        );
    }
}
