use thiserror::Error;

use crate::config::ConfigError;
use crate::monitor::ProviderError;
use crate::services::ds18b20::SensorError;

/// Unified startup error.
///
/// Anything that stops the process before the loops are running ends up
/// here and is logged once by `main`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Adafruit IO error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("no DS18B20 probes found under {0}")]
    NoProbes(String),
}
