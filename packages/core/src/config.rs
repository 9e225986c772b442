use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::alerts::DEFAULT_QUEUE_CAPACITY;
use crate::cli::{Cli, SourceKind};
use crate::monitor::{ThresholdError, Thresholds};
use crate::services::{adafruit::DEFAULT_BASE_URL, ds18b20::DEFAULT_DEVICES_PATH};

pub const DEFAULT_GROUP: &str = "fish";
pub const DEFAULT_MIN_TEMP: f64 = 65.0;
pub const DEFAULT_MAX_TEMP: f64 = 83.0;
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 3;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 5 * 60 * 60;
pub const DEFAULT_ALERT_COOLDOWN_SECONDS: u64 = 300;
pub const DEFAULT_STALE_AFTER_SECONDS: u64 = 600;
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Startup configuration errors. All of them are fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("{0}")]
    Validation(String),

    #[error("invalid thresholds: {0}")]
    Thresholds(#[from] ThresholdError),

    #[error("could not read probe config {path}: {source}")]
    ProbeFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse probe config {path}: {source}")]
    ProbeFileParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Adafruit IO key. Never printed.
#[derive(Clone, PartialEq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceKind,
    pub aio_username: Option<String>,
    pub aio_key: Option<ApiKey>,
    pub aio_base_url: String,
    pub group: String,
    pub expected_source_count: usize,
    pub thresholds: Thresholds,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub alert_cooldown: Duration,
    pub http_timeout: Duration,
    pub queue_capacity: usize,
    pub webhook_url: Option<String>,
    pub probe_config: Option<PathBuf>,
    pub devices_path: PathBuf,
    pub load_modules: bool,
    pub upload: bool,
    pub status_addr: Option<SocketAddr>,
}

impl Config {
    /// Build the configuration from CLI flags, falling back to environment
    /// variables and then to defaults.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        Self::from_sources(cli, |name| env::var(name).ok())
    }

    /// Same as [`Config::load`] with an injectable variable lookup.
    pub fn from_sources<F>(cli: &Cli, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = match cli.source {
            Some(kind) => kind,
            None => match lookup("FISHMON_SOURCE").as_deref() {
                None | Some("feed") => SourceKind::Feed,
                Some("sensors") => SourceKind::Sensors,
                Some(other) => {
                    return Err(ConfigError::Invalid {
                        name: "FISHMON_SOURCE",
                        value: other.to_string(),
                    })
                }
            },
        };

        let expected_source_count = setting(cli.num_feeds, "EXPECTED_SOURCE_COUNT", &lookup)?
            .ok_or(ConfigError::Missing("EXPECTED_SOURCE_COUNT"))?;

        let min_temp = setting(cli.min_temp, "MIN_TEMP", &lookup)?.unwrap_or(DEFAULT_MIN_TEMP);
        let max_temp = setting(cli.max_temp, "MAX_TEMP", &lookup)?.unwrap_or(DEFAULT_MAX_TEMP);
        let stale_after = seconds(
            cli.stale_after,
            "STALE_AFTER_SECONDS",
            DEFAULT_STALE_AFTER_SECONDS,
            &lookup,
        )?;

        let config = Self {
            source,
            aio_username: setting(cli.aio_username.clone(), "AIO_USERNAME", &lookup)?,
            aio_key: setting(cli.aio_key.clone(), "AIO_KEY", &lookup)?.map(ApiKey),
            aio_base_url: setting(cli.aio_url.clone(), "AIO_BASE_URL", &lookup)?
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            group: setting(cli.group.clone(), "FISHMON_GROUP", &lookup)?
                .unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            expected_source_count,
            thresholds: Thresholds::new(min_temp, max_temp, stale_after)?,
            poll_interval: seconds(
                cli.poll_interval,
                "POLL_INTERVAL_SECONDS",
                DEFAULT_POLL_INTERVAL_SECONDS,
                &lookup,
            )?,
            heartbeat_interval: seconds(
                cli.heartbeat_interval,
                "HEARTBEAT_INTERVAL_SECONDS",
                DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
                &lookup,
            )?,
            alert_cooldown: seconds(
                cli.alert_cooldown,
                "ALERT_COOLDOWN_SECONDS",
                DEFAULT_ALERT_COOLDOWN_SECONDS,
                &lookup,
            )?,
            http_timeout: seconds(
                cli.http_timeout,
                "HTTP_TIMEOUT_SECONDS",
                DEFAULT_HTTP_TIMEOUT_SECONDS,
                &lookup,
            )?,
            queue_capacity: setting(cli.queue_capacity, "ALERT_QUEUE_CAPACITY", &lookup)?
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            webhook_url: setting(cli.webhook_url.clone(), "WEBHOOK_URL", &lookup)?,
            probe_config: setting(cli.config.clone(), "FISHMON_PROBE_CONFIG", &lookup)?,
            devices_path: setting(cli.devices_path.clone(), "W1_DEVICES_PATH", &lookup)?
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DEVICES_PATH)),
            load_modules: cli.load_modules,
            upload: cli.upload || flag("FISHMON_UPLOAD", &lookup)?,
            status_addr: setting(cli.status_addr, "STATUS_ADDR", &lookup)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks. Thresholds are already validated on construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expected_source_count == 0 {
            return Err(ConfigError::Validation(
                "EXPECTED_SOURCE_COUNT must be greater than zero".into(),
            ));
        }

        for (name, interval) in [
            ("POLL_INTERVAL_SECONDS", self.poll_interval),
            ("HEARTBEAT_INTERVAL_SECONDS", self.heartbeat_interval),
            ("ALERT_COOLDOWN_SECONDS", self.alert_cooldown),
            ("HTTP_TIMEOUT_SECONDS", self.http_timeout),
        ] {
            if interval.is_zero() {
                return Err(ConfigError::Validation(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "ALERT_QUEUE_CAPACITY must be greater than zero".into(),
            ));
        }

        // The key is optional here: public groups are readable without one.
        if self.source == SourceKind::Feed && self.aio_username.is_none() {
            return Err(ConfigError::Missing("AIO_USERNAME"));
        }

        if self.upload {
            if self.source != SourceKind::Sensors {
                return Err(ConfigError::Validation(
                    "uploading requires the sensors source".into(),
                ));
            }
            if self.aio_username.is_none() {
                return Err(ConfigError::Missing("AIO_USERNAME"));
            }
            if self.aio_key.is_none() {
                return Err(ConfigError::Missing("AIO_KEY"));
            }
            if self.probe_config.is_none() {
                return Err(ConfigError::Missing("FISHMON_PROBE_CONFIG"));
            }
        }

        Ok(())
    }
}

fn setting<T, F>(cli: Option<T>, name: &'static str, lookup: &F) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if cli.is_some() {
        return Ok(cli);
    }
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn seconds<F>(cli: Option<u64>, name: &'static str, default: u64, lookup: &F) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(Duration::from_secs(setting(cli, name, lookup)?.unwrap_or(default)))
}

fn flag<F>(name: &'static str, lookup: &F) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).map(|raw| raw.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(ConfigError::Invalid {
            name,
            value: other.to_string(),
        }),
    }
}

/// Probe configuration file mapping DS18B20 ids to display names and
/// Adafruit IO feed keys.
///
/// ```json
/// { "version": "1", "probes": { "28-0316a2797bff": { "name": "Tank 1", "feed": "fish.tank1" } } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeFile {
    #[serde(default, alias = "Version")]
    pub version: String,
    #[serde(default, alias = "Probes")]
    pub probes: HashMap<String, ProbeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeEntry {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, rename = "feed", alias = "Feed")]
    pub feed_key: Option<String>,
}

impl ProbeFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ProbeFileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigError::ProbeFileParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Display names keyed by probe id.
    pub fn names(&self) -> HashMap<String, String> {
        self.probes
            .iter()
            .map(|(id, entry)| (id.clone(), entry.name.clone()))
            .collect()
    }

    /// Feed keys keyed by probe id, for probes that have one.
    pub fn feeds(&self) -> HashMap<String, String> {
        self.probes
            .iter()
            .filter_map(|(id, entry)| entry.feed_key.clone().map(|feed| (id.clone(), feed)))
            .collect()
    }
}
