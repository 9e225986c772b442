use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tokio::sync::RwLock;

use fishmon::alerts::{spawn_batcher, AlertBatcher, BatcherHandle, LogNotifier, Notifier, WebhookNotifier};
use fishmon::api;
use fishmon::cli::{Cli, SourceKind};
use fishmon::config::{Config, ProbeFile};
use fishmon::error::AppError;
use fishmon::logging::init_logging;
use fishmon::metrics::AppMetrics;
use fishmon::monitor::{Evaluator, FeedGroupSource, ProbeBank, ReadingSource, TemperatureProbe};
use fishmon::scheduler::{Scheduler, StatusBoard};
use fishmon::services::adafruit::AdafruitClient;
use fishmon::services::ds18b20::W1Bus;
use fishmon::upload::Uploader;

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.log_format);

    if let Err(err) = run(cli).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::load(&cli)?;
    tracing::info!("Service started with config: {:?}", config);

    let metrics = Arc::new(AppMetrics::new()?);
    let status: StatusBoard = Arc::new(RwLock::new(None));

    let source: Arc<dyn ReadingSource + Send + Sync> = match config.source {
        SourceKind::Feed => {
            let client = adafruit_client(&config).connect().await?;
            Arc::new(FeedGroupSource::new(client, &config.group))
        }
        SourceKind::Sensors => {
            let probe_file = match &config.probe_config {
                Some(path) => ProbeFile::load(path)?,
                None => ProbeFile::default(),
            };
            let bank = Arc::new(probe_bank(&config, &probe_file).await?);

            if config.upload {
                let client = adafruit_client(&config).connect().await?;
                let uploader = Uploader::new(bank.clone(), client, probe_file.feeds(), metrics.clone());
                tokio::spawn(uploader.run());
            }

            bank as Arc<dyn ReadingSource + Send + Sync>
        }
    };

    let batchers = spawn_channels(&config, &metrics);

    if let Some(addr) = config.status_addr {
        let router = api::create_router(metrics.clone(), status.clone());
        tokio::spawn(async move {
            if let Err(err) = api::serve(addr, router).await {
                tracing::error!("Status server stopped: {}", err);
            }
        });
    }

    let evaluator = Evaluator::new(config.expected_source_count, config.thresholds);
    Scheduler::new(source, evaluator, batchers, metrics, status)
        .with_intervals(config.poll_interval, config.heartbeat_interval)
        .run()
        .await;

    Ok(())
}

fn adafruit_client(config: &Config) -> AdafruitClient {
    AdafruitClient::new(
        &config.aio_base_url,
        config.aio_username.clone().unwrap_or_default(),
        config.aio_key.as_ref().map(|key| key.expose().to_string()),
    )
    .with_timeout(config.http_timeout)
}

/// Discover the attached DS18B20 probes and name them from the probe file.
async fn probe_bank(config: &Config, probe_file: &ProbeFile) -> Result<ProbeBank, AppError> {
    let bus = W1Bus::new(&config.devices_path);
    if config.load_modules {
        bus.load_modules().await?;
    }
    bus.ensure().await?;

    let ids = bus.discover().await?;
    if ids.is_empty() {
        return Err(AppError::NoProbes(bus.devices_path().display().to_string()));
    }
    tracing::info!("Found {} DS18B20 probe(s): {}", ids.len(), ids.join(", "));

    let probes: Vec<Arc<dyn TemperatureProbe>> = ids
        .into_iter()
        .map(|id| Arc::new(bus.probe(id)) as Arc<dyn TemperatureProbe>)
        .collect();
    Ok(ProbeBank::new(probes).with_names(probe_file.names()))
}

/// One batcher per notification channel. The log channel is always on.
fn spawn_channels(config: &Config, metrics: &Arc<AppMetrics>) -> Vec<BatcherHandle> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    if let Some(url) = &config.webhook_url {
        notifiers.push(Arc::new(WebhookNotifier::new(url).with_timeout(config.http_timeout)));
    }

    notifiers
        .into_iter()
        .map(|notifier| {
            let batcher = AlertBatcher::new(config.queue_capacity, config.alert_cooldown);
            let (handle, _join) = spawn_batcher(batcher, notifier, metrics.clone());
            handle
        })
        .collect()
}
