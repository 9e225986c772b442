//! Poll and heartbeat scheduling.
//!
//! Two independent loops drive the pipeline. The poll loop fetches
//! readings every few seconds, raises one alert line per condition into
//! every notification channel's batcher and then ticks the batchers so a
//! due window gets delivered. The heartbeat loop runs every few hours and
//! force-flushes a full status report regardless of alarm state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::signal;
use tokio::sync::RwLock;
use tokio::time::{self, MissedTickBehavior};

use crate::alerts::BatcherHandle;
use crate::metrics::AppMetrics;
use crate::monitor::{render, Evaluator, ReadingSource, Sample};

/// The latest rendered report, as served by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub ok: bool,
    pub body: String,
    pub generated_at: DateTime<Utc>,
}

/// Shared slot holding the latest [`StatusReport`].
pub type StatusBoard = Arc<RwLock<Option<StatusReport>>>;

pub struct Scheduler {
    source: Arc<dyn ReadingSource + Send + Sync>,
    evaluator: Evaluator,
    batchers: Vec<BatcherHandle>,
    metrics: Arc<AppMetrics>,
    status: StatusBoard,
    poll_interval: Duration,
    heartbeat_interval: Duration,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn ReadingSource + Send + Sync>,
        evaluator: Evaluator,
        batchers: Vec<BatcherHandle>,
        metrics: Arc<AppMetrics>,
        status: StatusBoard,
    ) -> Self {
        Self {
            source,
            evaluator,
            batchers,
            metrics,
            status,
            poll_interval: Duration::from_secs(crate::config::DEFAULT_POLL_INTERVAL_SECONDS),
            heartbeat_interval: Duration::from_secs(
                crate::config::DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
            ),
        }
    }

    pub fn with_intervals(mut self, poll: Duration, heartbeat: Duration) -> Self {
        self.poll_interval = poll;
        self.heartbeat_interval = heartbeat;
        self
    }

    /// Run both loops until `Ctrl+C` (SIGINT) is received.
    ///
    /// Both loops fire once right away, so a status report goes out at
    /// startup. Alerts still pending at shutdown are dropped.
    pub async fn run(self) {
        let scheduler = Arc::new(self);

        tracing::info!(
            "Monitoring '{}' (poll: {}s, heartbeat: {}s, channels: {})",
            scheduler.source.source_name(),
            scheduler.poll_interval.as_secs(),
            scheduler.heartbeat_interval.as_secs(),
            scheduler.batchers.len()
        );

        let poll = tokio::spawn(scheduler.clone().poll_loop());
        let heartbeat = tokio::spawn(scheduler.clone().heartbeat_loop());

        match signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received. Stopping loops."),
            Err(err) => tracing::error!("Could not listen for shutdown signal: {}", err),
        }

        poll.abort();
        heartbeat.abort();
        tracing::info!("Monitoring stopped");
    }

    async fn poll_loop(self: Arc<Self>) {
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.poll_once().await;
        }
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut interval = time::interval(self.heartbeat_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.heartbeat_once().await;
        }
    }

    /// One poll cycle: fetch, evaluate, raise every condition, then tick.
    pub async fn poll_once(&self) {
        self.metrics.polls_total.inc();

        let sample = match self.source.fetch().await {
            Ok(readings) => {
                let sample = self.evaluator.evaluate(&readings, Utc::now());
                self.metrics.sources_reporting.set(sample.actual_count as f64);
                sample
            }
            Err(err) => {
                self.metrics.poll_errors_total.inc();
                self.metrics.sources_reporting.set(0.0);
                tracing::error!("Poll of '{}' failed: {}", self.source.source_name(), err);
                Sample::fetch_failed(self.evaluator.expected_count(), err)
            }
        };

        for condition in sample.conditions() {
            self.metrics
                .conditions_total
                .with_label_values(&[condition.kind.label()])
                .inc();
            let line = condition.render();
            tracing::warn!("{}", line);
            for batcher in &self.batchers {
                if let Err(err) = batcher.raise(line.clone()).await {
                    tracing::error!("{}", err);
                }
            }
        }

        if sample.is_ok() {
            tracing::debug!("{} sources within limits", sample.actual_count);
        }
        self.publish(&sample).await;

        for batcher in &self.batchers {
            if let Err(err) = batcher.tick().await {
                tracing::error!("{}", err);
            }
        }
    }

    /// One heartbeat: render a full report and force it out on every channel.
    pub async fn heartbeat_once(&self) {
        let sample = match self.source.fetch().await {
            Ok(readings) => self.evaluator.evaluate(&readings, Utc::now()),
            Err(err) => {
                tracing::error!("Heartbeat fetch of '{}' failed: {}", self.source.source_name(), err);
                Sample::fetch_failed(self.evaluator.expected_count(), err)
            }
        };

        let report = self.publish(&sample).await;
        for batcher in &self.batchers {
            if let Err(err) = batcher.force_flush(report.clone()).await {
                tracing::error!("{}", err);
            }
        }

        self.metrics.heartbeats_total.inc();
        tracing::info!("Heartbeat sent ({})", if sample.is_ok() { "ok" } else { "alert" });
    }

    async fn publish(&self, sample: &Sample) -> String {
        let body = render(sample);
        *self.status.write().await = Some(StatusReport {
            ok: sample.is_ok(),
            body: body.clone(),
            generated_at: Utc::now(),
        });
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    use crate::alerts::{spawn_batcher, AlertBatcher, RecordingNotifier};
    use crate::monitor::{Reading, Thresholds};
    use crate::services::mock::MockSource;

    const COOLDOWN: Duration = Duration::from_secs(300);

    struct Harness {
        scheduler: Scheduler,
        source: Arc<MockSource>,
        handle: BatcherHandle,
        notifier: Arc<RecordingNotifier>,
        metrics: Arc<AppMetrics>,
        status: StatusBoard,
    }

    impl Harness {
        /// Messages delivered so far, once in-flight deliveries finish.
        async fn delivered(&self) -> Vec<String> {
            self.handle.settled().await.unwrap();
            self.notifier.messages()
        }
    }

    fn harness(expected: usize, capacity: usize) -> Harness {
        let source = Arc::new(MockSource::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let status: StatusBoard = Arc::new(RwLock::new(None));
        let (handle, _join) = spawn_batcher(
            AlertBatcher::new(capacity, COOLDOWN),
            notifier.clone(),
            metrics.clone(),
        );
        let thresholds = Thresholds::new(65.0, 83.0, Duration::from_secs(600)).unwrap();
        let scheduler = Scheduler::new(
            source.clone(),
            Evaluator::new(expected, thresholds),
            vec![handle.clone()],
            metrics.clone(),
            status.clone(),
        );
        Harness {
            scheduler,
            source,
            handle,
            notifier,
            metrics,
            status,
        }
    }

    fn fresh(id: &str, value: f64) -> Reading {
        Reading::measured(id, id, value, Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn three_cold_polls_deliver_one_batch() {
        let h = harness(1, 20);
        h.source.set_readings(vec![fresh("tank1", 60.0)]);

        for _ in 0..3 {
            h.scheduler.poll_once().await;
            advance(Duration::from_secs(3)).await;
        }
        assert!(h.delivered().await.is_empty());

        advance(COOLDOWN).await;
        h.scheduler.poll_once().await;

        let messages = h.delivered().await;
        assert_eq!(messages.len(), 1);
        // Three queued before the window closed, plus the one raised on the
        // flushing poll itself.
        assert_eq!(messages[0].lines().count(), 4);
        assert!(messages[0].lines().all(|l| l.contains("temperature too low")));
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_polls_send_nothing() {
        let h = harness(2, 20);
        h.source
            .set_readings(vec![fresh("tank1", 75.0), fresh("tank2", 76.5)]);

        h.scheduler.poll_once().await;
        advance(COOLDOWN * 2).await;
        h.scheduler.poll_once().await;

        assert!(h.delivered().await.is_empty());
        assert!((h.metrics.polls_total.get() - 2.0).abs() < f64::EPSILON);
        assert!((h.metrics.sources_reporting.get() - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_raises_one_group_retrieval_error() {
        let h = harness(3, 20);
        h.source.set_error(Some("connection refused".into()));

        h.scheduler.poll_once().await;
        advance(COOLDOWN).await;
        h.source.set_error(None);
        h.source.set_readings(vec![
            fresh("a", 70.0),
            fresh("b", 70.0),
            fresh("c", 70.0),
        ]);
        h.scheduler.poll_once().await;

        let messages = h.delivered().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].lines().count(), 1);
        assert!(messages[0].contains("[retrieval-error]"));
        assert!(messages[0].contains("connection refused"));
        assert!((h.metrics.poll_errors_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn conditions_are_counted_by_kind() {
        let h = harness(2, 20);
        h.source.set_readings(vec![fresh("tank1", 90.0)]);

        h.scheduler.poll_once().await;

        let counted = |kind: &str| h.metrics.conditions_total.with_label_values(&[kind]).get();
        assert!((counted("count-mismatch") - 1.0).abs() < f64::EPSILON);
        assert!((counted("above-max") - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_on_idle_batcher_still_notifies() {
        let h = harness(1, 20);
        h.source.set_readings(vec![fresh("tank1", 74.0)]);

        h.scheduler.heartbeat_once().await;

        let messages = h.delivered().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("OK: 1/1 sources online"));
        assert!(messages[0].contains("tank1 :thermometer: 74.0F"));
        assert!((h.metrics.heartbeats_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_carries_pending_alerts_and_resets_window() {
        let h = harness(1, 20);
        h.source.set_readings(vec![fresh("tank1", 60.0)]);
        h.scheduler.poll_once().await;

        h.source.set_readings(vec![fresh("tank1", 70.0)]);
        h.scheduler.heartbeat_once().await;

        let messages = h.delivered().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("OK: 1/1 sources online"));
        assert!(messages[0].ends_with("temperature too low - 60.0F (min 65.0F)"));

        // Nothing left to flush once the cooldown would have passed.
        advance(COOLDOWN).await;
        h.scheduler.poll_once().await;
        assert_eq!(h.delivered().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_reports_fetch_failure() {
        let h = harness(2, 20);
        h.source.set_error(Some("timeout".into()));

        h.scheduler.heartbeat_once().await;

        let messages = h.delivered().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("ALERT: 1 condition(s), 0/2 sources reporting"));
        assert!(messages[0].contains("could not fetch readings"));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_publish_latest_status() {
        let h = harness(1, 20);
        assert!(h.status.read().await.is_none());

        h.source.set_readings(vec![fresh("tank1", 90.0)]);
        h.scheduler.poll_once().await;

        let report = h.status.read().await.clone().unwrap();
        assert!(!report.ok);
        assert!(report.body.starts_with("ALERT"));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_zeroes_sources_reporting() {
        let h = harness(2, 20);
        h.source
            .set_readings(vec![fresh("tank1", 75.0), fresh("tank2", 76.0)]);
        h.scheduler.poll_once().await;
        assert_eq!(h.metrics.sources_reporting.get(), 2.0);

        h.source.set_error(Some("connection refused".into()));
        h.scheduler.poll_once().await;

        assert_eq!(h.metrics.sources_reporting.get(), 0.0);
    }

    #[tokio::test]
    async fn hanging_webhook_does_not_stall_polling() {
        use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

        use crate::alerts::WebhookNotifier;

        let hook = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&hook)
            .await;

        let cooldown = Duration::from_millis(1);
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let recording = Arc::new(RecordingNotifier::new());
        let (webhook, _) = spawn_batcher(
            AlertBatcher::new(20, cooldown),
            Arc::new(WebhookNotifier::new(hook.uri())),
            metrics.clone(),
        );
        let (log, _) = spawn_batcher(AlertBatcher::new(20, cooldown), recording.clone(), metrics.clone());

        let source = Arc::new(MockSource::new());
        source.set_readings(vec![fresh("tank1", 60.0)]);
        let thresholds = Thresholds::new(65.0, 83.0, Duration::from_secs(600)).unwrap();
        let scheduler = Scheduler::new(
            source.clone(),
            Evaluator::new(1, thresholds),
            vec![webhook, log.clone()],
            metrics,
            Arc::new(RwLock::new(None)),
        );

        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(3), scheduler.poll_once())
                .await
                .expect("poll cycle should not wait on a hanging webhook");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::timeout(Duration::from_secs(3), scheduler.heartbeat_once())
            .await
            .expect("heartbeat should not wait on a hanging webhook");

        assert_eq!(source.fetch_count(), 4);
        log.settled().await.unwrap();
        let messages = recording.messages();
        assert!(messages.len() >= 2);
        assert!(messages.last().unwrap().starts_with("ALERT: 1 condition(s), 1/1 sources reporting"));
    }
}
