//! Local Probe Bank Adapter
//!
//! Presents a set of temperature probes as one ReadingSource. A probe that
//! cannot be read yields a failed reading for that probe; the bank as a
//! whole never fails.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::monitor::{
    source::{ProviderResult, ReadingSource},
    types::Reading,
};
use crate::services::ds18b20::{SensorError, Temperature};

/// A single physical probe that can be asked for a temperature.
#[async_trait]
pub trait TemperatureProbe: Send + Sync {
    fn id(&self) -> &str;

    async fn sense(&self) -> Result<Temperature, SensorError>;
}

pub struct ProbeBank {
    probes: Vec<Arc<dyn TemperatureProbe>>,
    names: HashMap<String, String>,
}

impl ProbeBank {
    pub fn new(probes: Vec<Arc<dyn TemperatureProbe>>) -> Self {
        Self {
            probes,
            names: HashMap::new(),
        }
    }

    /// Display names by probe id. Probes without an entry use their id.
    pub fn with_names(mut self, names: HashMap<String, String>) -> Self {
        self.names = names;
        self
    }

    pub fn name_for<'a>(&'a self, id: &'a str) -> &'a str {
        self.names.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Sense one probe and convert the result to a Reading in Fahrenheit.
    async fn read(&self, probe: &dyn TemperatureProbe) -> Reading {
        let id = probe.id();
        let name = self.name_for(id);
        match probe.sense().await {
            Ok(temperature) => Reading::measured(id, name, temperature.fahrenheit(), Utc::now()),
            Err(err) => {
                tracing::warn!("Failed to sense temperature for probe {}: {}", id, err);
                Reading::failed(id, name, err.to_string())
            }
        }
    }
}

#[async_trait]
impl ReadingSource for ProbeBank {
    async fn fetch(&self) -> ProviderResult<Vec<Reading>> {
        let mut readings = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            readings.push(self.read(probe.as_ref()).await);
        }
        Ok(readings)
    }

    fn source_name(&self) -> &str {
        "ds18b20"
    }
}
