//! Prometheus metrics registry for fishmon.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it
//! to the scheduler, the alert batchers and the status server.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`) when the status server is enabled.

use prometheus::{Counter, CounterVec, Gauge, GaugeVec, Opts, Registry};

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Total number of poll cycles (success + failure).
    pub polls_total: Counter,
    /// Poll cycles whose fetch failed as a whole.
    pub poll_errors_total: Counter,
    /// Heartbeat reports produced.
    pub heartbeats_total: Counter,
    /// Conditions raised by the evaluator, labelled by kind.
    pub conditions_total: CounterVec,
    /// Sources that answered in the latest poll.
    pub sources_reporting: Gauge,
    /// Alert lines waiting for the next flush, labelled by channel.
    pub alerts_pending: GaugeVec,
    /// Messages delivered, labelled by channel.
    pub notifications_total: CounterVec,
    /// Messages that failed to deliver, labelled by channel.
    pub notification_failures_total: CounterVec,
    /// Data points uploaded to remote feeds.
    pub uploads_total: Counter,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated (should not happen in practice).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let polls_total = Counter::with_opts(Opts::new(
            "fishmon_polls_total",
            "Total poll cycles",
        ))?;

        let poll_errors_total = Counter::with_opts(Opts::new(
            "fishmon_poll_errors_total",
            "Poll cycles whose fetch failed",
        ))?;

        let heartbeats_total = Counter::with_opts(Opts::new(
            "fishmon_heartbeats_total",
            "Heartbeat status reports produced",
        ))?;

        let conditions_total = CounterVec::new(
            Opts::new("fishmon_conditions_total", "Conditions raised by kind"),
            &["kind"],
        )?;

        let sources_reporting = Gauge::with_opts(Opts::new(
            "fishmon_sources_reporting",
            "Sources present in the latest poll",
        ))?;

        let alerts_pending = GaugeVec::new(
            Opts::new("fishmon_alerts_pending", "Alert lines awaiting flush"),
            &["channel"],
        )?;

        let notifications_total = CounterVec::new(
            Opts::new("fishmon_notifications_total", "Messages delivered by channel"),
            &["channel"],
        )?;

        let notification_failures_total = CounterVec::new(
            Opts::new(
                "fishmon_notification_failures_total",
                "Failed message deliveries by channel",
            ),
            &["channel"],
        )?;

        let uploads_total = Counter::with_opts(Opts::new(
            "fishmon_uploads_total",
            "Probe data points uploaded to remote feeds",
        ))?;

        registry.register(Box::new(polls_total.clone()))?;
        registry.register(Box::new(poll_errors_total.clone()))?;
        registry.register(Box::new(heartbeats_total.clone()))?;
        registry.register(Box::new(conditions_total.clone()))?;
        registry.register(Box::new(sources_reporting.clone()))?;
        registry.register(Box::new(alerts_pending.clone()))?;
        registry.register(Box::new(notifications_total.clone()))?;
        registry.register(Box::new(notification_failures_total.clone()))?;
        registry.register(Box::new(uploads_total.clone()))?;

        Ok(Self {
            polls_total,
            poll_errors_total,
            heartbeats_total,
            conditions_total,
            sources_reporting,
            alerts_pending,
            notifications_total,
            notification_failures_total,
            uploads_total,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
