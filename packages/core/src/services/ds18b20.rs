//! DS18B20 temperature probes on the Linux 1-Wire bus.
//!
//! The kernel `w1-therm` driver exposes each probe as a `28-*` symlink
//! under the devices directory. Reading its `w1_slave` file triggers a
//! conversion and returns two lines:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::monitor::probe_adapter::TemperatureProbe;

pub const DEFAULT_DEVICES_PATH: &str = "/sys/bus/w1/devices";

const MODPROBE: &str = "/sbin/modprobe";
const KERNEL_MODULES: [&str; 2] = ["w1-gpio", "w1-therm"];
const MASTER_BUS_PREFIX: &str = "w1_bus_master";
const SENSOR_PREFIX: &str = "28-";
const SLAVE_FILE: &str = "w1_slave";

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not load kernel module {module}: {detail}")]
    ModuleLoad { module: String, detail: String },

    #[error("1-Wire master bus not present")]
    NoBus,

    #[error("CRC check failed")]
    Crc,

    #[error("could not parse sensor output: {0}")]
    InvalidOutput(String),
}

/// A temperature as reported by the probe, stored in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(f64);

impl Temperature {
    pub fn from_celsius(celsius: f64) -> Self {
        Self(celsius)
    }

    pub fn from_millidegrees(milli: i64) -> Self {
        Self(milli as f64 / 1000.0)
    }

    pub fn celsius(self) -> f64 {
        self.0
    }

    pub fn fahrenheit(self) -> f64 {
        self.0 * 1.8 + 32.0
    }
}

/// Parse the two-line `w1_slave` output.
pub fn parse_output(raw: &str) -> Result<Temperature, SensorError> {
    let lines: Vec<&str> = raw.trim().lines().collect();
    let [status, data] = lines.as_slice() else {
        return Err(SensorError::InvalidOutput(format!(
            "expected 2 lines, got {}",
            lines.len()
        )));
    };

    if !status.trim_end().ends_with("YES") {
        return Err(SensorError::Crc);
    }

    let idx = data
        .find("t=")
        .ok_or_else(|| SensorError::InvalidOutput("missing t= field".into()))?;
    let milli = data[idx + 2..]
        .trim()
        .parse::<i64>()
        .map_err(|err| SensorError::InvalidOutput(format!("bad temperature value: {}", err)))?;

    Ok(Temperature::from_millidegrees(milli))
}

/// The 1-Wire devices directory.
#[derive(Debug, Clone)]
pub struct W1Bus {
    devices_path: PathBuf,
}

impl W1Bus {
    pub fn new(devices_path: impl Into<PathBuf>) -> Self {
        Self {
            devices_path: devices_path.into(),
        }
    }

    pub fn devices_path(&self) -> &Path {
        &self.devices_path
    }

    /// Load the GPIO and thermometer kernel modules. Needs root.
    pub async fn load_modules(&self) -> Result<(), SensorError> {
        for module in KERNEL_MODULES {
            let output = Command::new(MODPROBE)
                .arg(module)
                .output()
                .await
                .map_err(|err| SensorError::ModuleLoad {
                    module: module.to_string(),
                    detail: err.to_string(),
                })?;
            if !output.status.success() {
                return Err(SensorError::ModuleLoad {
                    module: module.to_string(),
                    detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            tracing::debug!("Loaded kernel module {}", module);
        }
        Ok(())
    }

    /// Check that a 1-Wire master bus is registered.
    pub async fn ensure(&self) -> Result<(), SensorError> {
        let names = self.entry_names().await?;
        if names.iter().any(|(name, _)| name.starts_with(MASTER_BUS_PREFIX)) {
            Ok(())
        } else {
            Err(SensorError::NoBus)
        }
    }

    /// Ids of all attached probes, sorted.
    pub async fn discover(&self) -> Result<Vec<String>, SensorError> {
        let mut ids: Vec<String> = self
            .entry_names()
            .await?
            .into_iter()
            .filter(|(name, is_symlink)| *is_symlink && name.starts_with(SENSOR_PREFIX))
            .map(|(name, _)| name)
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn probe(&self, id: impl Into<String>) -> Ds18b20Probe {
        let id = id.into();
        let path = self.devices_path.join(&id).join(SLAVE_FILE);
        Ds18b20Probe { id, path }
    }

    async fn entry_names(&self) -> Result<Vec<(String, bool)>, SensorError> {
        let io_err = |source| SensorError::Io {
            path: self.devices_path.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.devices_path).await.map_err(io_err)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let is_symlink = entry.file_type().await.map_err(io_err)?.is_symlink();
            names.push((entry.file_name().to_string_lossy().into_owned(), is_symlink));
        }
        Ok(names)
    }
}

/// One DS18B20 probe, read through its `w1_slave` file.
#[derive(Debug, Clone)]
pub struct Ds18b20Probe {
    id: String,
    path: PathBuf,
}

#[async_trait]
impl TemperatureProbe for Ds18b20Probe {
    fn id(&self) -> &str {
        &self.id
    }

    async fn sense(&self) -> Result<Temperature, SensorError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SensorError::Io {
                path: self.path.clone(),
                source,
            })?;
        parse_output(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::symlink;

    const GOOD_OUTPUT: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";

    /// Build a fake devices directory with a bus master and the given probes.
    fn fake_bus(probes: &[(&str, &str)]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let devices = root.path().join("devices");
        let store = root.path().join("store");
        fs::create_dir_all(devices.join("w1_bus_master1")).unwrap();

        for (id, output) in probes {
            let real = store.join(id);
            fs::create_dir_all(&real).unwrap();
            fs::write(real.join(SLAVE_FILE), output).unwrap();
            symlink(&real, devices.join(id)).unwrap();
        }
        root
    }

    // ---- parsing ----

    #[test]
    fn parse_output_reads_millidegrees() {
        let temp = parse_output(GOOD_OUTPUT).unwrap();
        assert!((temp.celsius() - 23.125).abs() < 1e-9);
        assert!((temp.fahrenheit() - 73.625).abs() < 1e-9);
    }

    #[test]
    fn parse_output_handles_negative_temperatures() {
        let raw = "00 00 : crc=00 YES\n00 00 t=-1250";
        assert!((parse_output(raw).unwrap().celsius() + 1.25).abs() < 1e-9);
    }

    #[test]
    fn parse_output_rejects_crc_failure() {
        let raw = "72 01 : crc=57 NO\n72 01 t=23125";
        assert!(matches!(parse_output(raw), Err(SensorError::Crc)));
    }

    #[test]
    fn parse_output_rejects_wrong_line_count() {
        assert!(matches!(
            parse_output("72 01 : crc=57 YES"),
            Err(SensorError::InvalidOutput(_))
        ));
    }

    #[test]
    fn parse_output_rejects_missing_value() {
        assert!(matches!(
            parse_output("a : crc=57 YES\nno value here"),
            Err(SensorError::InvalidOutput(_))
        ));
    }

    #[test]
    fn freezing_point_converts_to_32f() {
        assert!((Temperature::from_celsius(0.0).fahrenheit() - 32.0).abs() < 1e-9);
    }

    // ---- bus ----

    #[tokio::test]
    async fn discover_lists_probe_symlinks_sorted() {
        let root = fake_bus(&[("28-bbb", GOOD_OUTPUT), ("28-aaa", GOOD_OUTPUT)]);
        let bus = W1Bus::new(root.path().join("devices"));

        bus.ensure().await.unwrap();
        assert_eq!(bus.discover().await.unwrap(), vec!["28-aaa", "28-bbb"]);
    }

    #[tokio::test]
    async fn ensure_fails_without_master_bus() {
        let root = tempfile::tempdir().unwrap();
        let bus = W1Bus::new(root.path());
        assert!(matches!(bus.ensure().await, Err(SensorError::NoBus)));
    }

    #[tokio::test]
    async fn missing_devices_directory_is_io_error() {
        let bus = W1Bus::new("/nonexistent/w1/devices");
        assert!(matches!(bus.discover().await, Err(SensorError::Io { .. })));
    }

    #[tokio::test]
    async fn probe_senses_through_slave_file() {
        let root = fake_bus(&[("28-aaa", GOOD_OUTPUT)]);
        let bus = W1Bus::new(root.path().join("devices"));

        let probe = bus.probe("28-aaa");
        let temp = probe.sense().await.unwrap();

        assert_eq!(probe.id(), "28-aaa");
        assert!((temp.celsius() - 23.125).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unplugged_probe_fails_to_sense() {
        let root = fake_bus(&[]);
        let bus = W1Bus::new(root.path().join("devices"));
        assert!(bus.probe("28-gone").sense().await.is_err());
    }
}
