use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Where readings come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Feeds of an Adafruit IO group
    Feed,
    /// DS18B20 probes on the local 1-Wire bus
    Sensors,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// fishmon CLI arguments. Every flag overrides its environment variable.
#[derive(Debug, Default, Parser)]
#[command(
    name = "fishmon",
    version,
    about = "Fish tank temperature monitoring with rate-limited chat alerts"
)]
pub struct Cli {
    /// Reading source (env: FISHMON_SOURCE)
    #[arg(long, value_enum)]
    pub source: Option<SourceKind>,

    /// Adafruit IO username (env: AIO_USERNAME)
    #[arg(long)]
    pub aio_username: Option<String>,

    /// Adafruit IO key (env: AIO_KEY)
    #[arg(long)]
    pub aio_key: Option<String>,

    /// Adafruit IO API base URL (env: AIO_BASE_URL)
    #[arg(long)]
    pub aio_url: Option<String>,

    /// Group name of feeds to monitor (env: FISHMON_GROUP)
    #[arg(long)]
    pub group: Option<String>,

    /// Expected number of online sources (env: EXPECTED_SOURCE_COUNT)
    #[arg(long)]
    pub num_feeds: Option<usize>,

    /// Lowest temperature allowed before alerting, in degrees Fahrenheit (env: MIN_TEMP)
    #[arg(long, allow_negative_numbers = true)]
    pub min_temp: Option<f64>,

    /// Highest temperature allowed before alerting, in degrees Fahrenheit (env: MAX_TEMP)
    #[arg(long, allow_negative_numbers = true)]
    pub max_temp: Option<f64>,

    /// Poll interval in seconds (env: POLL_INTERVAL_SECONDS)
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Heartbeat report interval in seconds (env: HEARTBEAT_INTERVAL_SECONDS)
    #[arg(long)]
    pub heartbeat_interval: Option<u64>,

    /// Minimum seconds between two alert deliveries (env: ALERT_COOLDOWN_SECONDS)
    #[arg(long)]
    pub alert_cooldown: Option<u64>,

    /// Seconds before an Adafruit IO or webhook request is abandoned (env: HTTP_TIMEOUT_SECONDS)
    #[arg(long)]
    pub http_timeout: Option<u64>,

    /// Seconds without an update before a source is stale (env: STALE_AFTER_SECONDS)
    #[arg(long)]
    pub stale_after: Option<u64>,

    /// Pending alerts that force an early flush (env: ALERT_QUEUE_CAPACITY)
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Chat webhook URL (env: WEBHOOK_URL)
    #[arg(long)]
    pub webhook_url: Option<String>,

    /// JSON file mapping probe ids to names and feed keys (env: FISHMON_PROBE_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 1-Wire devices directory (env: W1_DEVICES_PATH)
    #[arg(long)]
    pub devices_path: Option<PathBuf>,

    /// Load the w1-gpio and w1-therm kernel modules at startup
    #[arg(long)]
    pub load_modules: bool,

    /// Upload probe readings to their Adafruit IO feeds (env: FISHMON_UPLOAD)
    #[arg(long)]
    pub upload: bool,

    /// Address for the status/metrics HTTP server (env: STATUS_ADDR)
    #[arg(long)]
    pub status_addr: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feed_mode_flags() {
        let cli = Cli::try_parse_from([
            "fishmon",
            "--aio-username",
            "alice",
            "--group",
            "fish",
            "--num-feeds",
            "3",
            "--min-temp",
            "65",
            "--max-temp",
            "83",
            "--webhook-url",
            "https://hooks.example.com/x",
        ])
        .unwrap();

        assert_eq!(cli.aio_username.as_deref(), Some("alice"));
        assert_eq!(cli.num_feeds, Some(3));
        assert_eq!(cli.min_temp, Some(65.0));
        assert_eq!(cli.source, None);
        assert_eq!(cli.log_format, LogFormat::Compact);
    }

    #[test]
    fn parses_sensor_mode_flags() {
        let cli = Cli::try_parse_from([
            "fishmon",
            "--source",
            "sensors",
            "--upload",
            "--min-temp",
            "-5",
            "--status-addr",
            "127.0.0.1:9100",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.source, Some(SourceKind::Sensors));
        assert!(cli.upload);
        assert_eq!(cli.min_temp, Some(-5.0));
        assert_eq!(cli.status_addr, Some("127.0.0.1:9100".parse().unwrap()));
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_unknown_source() {
        assert!(Cli::try_parse_from(["fishmon", "--source", "carrier-pigeon"]).is_err());
    }
}
