use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogFormat;

/// Initialize structured logging for the application.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. Must be called once
/// at startup.
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Compact => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
        LogFormat::Json => fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .init(),
    }

    info!("Logging initialized ({:?})", format);
}
