//! Forward local probe readings to their Adafruit IO feeds.
//!
//! Only probes with a feed key in the probe config are uploaded. The
//! upload interval is stretched with the number of feeds so the account
//! never exceeds [`RATE_LIMIT_PER_MINUTE`] data points.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use crate::metrics::AppMetrics;
use crate::monitor::{ProbeBank, ReadingSource, ReadingValue};
use crate::services::adafruit::{AdafruitClient, RATE_LIMIT_PER_MINUTE};

const MIN_UPLOAD_INTERVAL: Duration = Duration::from_secs(2);

/// Shortest interval at which `feed_count` feeds can each receive one point
/// per cycle without going over the per-minute limit.
pub fn upload_interval(feed_count: usize) -> Duration {
    let per_cycle = Duration::from_secs(60) * feed_count as u32 / RATE_LIMIT_PER_MINUTE;
    per_cycle.max(MIN_UPLOAD_INTERVAL)
}

pub struct Uploader {
    bank: Arc<ProbeBank>,
    client: AdafruitClient,
    feeds: HashMap<String, String>,
    metrics: Arc<AppMetrics>,
}

impl Uploader {
    /// `feeds` maps probe ids to feed keys.
    pub fn new(
        bank: Arc<ProbeBank>,
        client: AdafruitClient,
        feeds: HashMap<String, String>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            bank,
            client,
            feeds,
            metrics,
        }
    }

    pub fn interval(&self) -> Duration {
        upload_interval(self.feeds.len())
    }

    /// Upload forever at [`Uploader::interval`].
    pub async fn run(self) {
        let mut interval = time::interval(self.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Uploading {} probe(s) every {}s",
            self.feeds.len(),
            self.interval().as_secs()
        );

        loop {
            interval.tick().await;
            self.upload_once().await;
        }
    }

    /// Read every probe once and record the measured ones. Returns the
    /// number of points accepted.
    pub async fn upload_once(&self) -> usize {
        let readings = match self.bank.fetch().await {
            Ok(readings) => readings,
            Err(err) => {
                tracing::error!("Reading probes for upload failed: {}", err);
                return 0;
            }
        };

        let mut uploaded = 0;
        for reading in readings {
            let Some(feed) = self.feeds.get(&reading.id) else {
                continue;
            };
            let (ReadingValue::Measured { value }, Some(at)) = (&reading.value, reading.last_updated)
            else {
                tracing::debug!("Skipping upload for {}: {}", reading.id, reading.display_value());
                continue;
            };

            match self.client.record(feed, &format!("{:.3}", value), at).await {
                Ok(()) => {
                    uploaded += 1;
                    self.metrics.uploads_total.inc();
                    tracing::debug!("Uploaded {:.3} to feed {}", value, feed);
                }
                Err(err) => tracing::warn!("Upload to feed {} failed: {}", feed, err),
            }
        }
        uploaded
    }
}
