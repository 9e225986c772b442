//! In-memory sources and probes for tests and dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::monitor::{
    error::ProviderError,
    probe_adapter::TemperatureProbe,
    source::{ProviderResult, ReadingSource},
    types::Reading,
};
use crate::services::ds18b20::{SensorError, Temperature};

/// A ReadingSource that returns whatever it was last given.
#[derive(Debug, Default)]
pub struct MockSource {
    readings: Mutex<Vec<Reading>>,
    error: Mutex<Option<String>>,
    fetches: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_readings(&self, readings: Vec<Reading>) {
        if let Ok(mut slot) = self.readings.lock() {
            *slot = readings;
        }
    }

    /// While set, every fetch fails with a network error carrying `message`.
    pub fn set_error(&self, message: Option<String>) {
        if let Ok(mut slot) = self.error.lock() {
            *slot = message;
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadingSource for MockSource {
    async fn fetch(&self) -> ProviderResult<Vec<Reading>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let error = self.error.lock().ok().and_then(|e| e.clone());
        if let Some(message) = error {
            return Err(ProviderError::network(message));
        }

        Ok(self
            .readings
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    fn source_name(&self) -> &str {
        "mock"
    }
}

/// A probe with a fixed Celsius value, or one that always fails.
#[derive(Debug, Clone)]
pub struct MockProbe {
    id: String,
    celsius: Option<f64>,
}

impl MockProbe {
    pub fn new(id: impl Into<String>, celsius: f64) -> Self {
        Self {
            id: id.into(),
            celsius: Some(celsius),
        }
    }

    pub fn failing(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            celsius: None,
        }
    }
}

#[async_trait]
impl TemperatureProbe for MockProbe {
    fn id(&self) -> &str {
        &self.id
    }

    async fn sense(&self) -> Result<Temperature, SensorError> {
        self.celsius
            .map(Temperature::from_celsius)
            .ok_or(SensorError::Crc)
    }
}
