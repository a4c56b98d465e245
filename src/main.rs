//! netpulse - network health monitor
//!
//! Measures reachability, latency, jitter, and loss to a set of sites plus
//! DNS resolution latency, optionally runs bandwidth speed tests, persists
//! the latest results to a pluggable datastore, and exposes a derived health
//! score through a Prometheus endpoint.

mod config;
mod datastore;
mod presentation;
mod probe;
mod records;
mod score;
mod store;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{AppConfig, DatastoreSettings};
use presentation::Server;
use probe::{NetworkCollector, SpeedTestCollector};
use store::ResultStore;

/// Upper bound on one speed-test run.
const SPEEDTEST_TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("netpulse=info".parse()?),
        )
        .init();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);
    tracing::info!("Starting netpulse as device '{}'", config.probe.device_id);
    for ns in &config.probe.nameservers {
        tracing::info!("Nameserver: {} ({}) {:?}", ns.name, ns.ip, ns.kind);
    }

    let settings = Arc::new(config.datastore.clone());
    let (stop_tx, _) = broadcast::channel(1);

    // Translate SIGINT/SIGTERM into the stop channel so in-progress sleeps
    // end promptly.
    {
        let stop_tx = stop_tx.clone();
        tokio::spawn(async move {
            wait_for_shutdown().await;
            tracing::warn!("Shutdown signal received");
            let _ = stop_tx.send(());
        });
    }

    if config.probe.enabled {
        let config = config.clone();
        let settings = settings.clone();
        let stop = stop_tx.subscribe();
        tokio::spawn(async move { run_probe_worker(config, settings, stop).await });
    }

    if config.speedtest.enabled {
        let config = config.clone();
        let settings = settings.clone();
        let stop = stop_tx.subscribe();
        tokio::spawn(async move { run_speedtest_worker(config, settings, stop).await });
    }

    // The presentation server runs in the foreground until shutdown.
    let topics = config.datastore.topics();
    let probe_store = Arc::new(ResultStore::new(
        config.datastore.probe.kind,
        settings.clone(),
        topics.clone(),
    ));
    let speedtest_store = Arc::new(ResultStore::new(
        config.datastore.speedtest.kind,
        settings,
        topics,
    ));

    let server = Server::new(&config, probe_store, speedtest_store);
    server.start(stop_tx.subscribe()).await?;

    tracing::info!("netpulse stopped");
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Collect network measurements on the configured interval.
///
/// A failed cycle or a failed write never stops the loop; the next cycle
/// starts regardless.
async fn run_probe_worker(
    config: Arc<AppConfig>,
    settings: Arc<DatastoreSettings>,
    mut stop: broadcast::Receiver<()>,
) {
    let collector = NetworkCollector::new(
        config.probe.sites.clone(),
        config.probe.count,
        config.probe.dns_test_site.clone(),
        config.probe.nameservers.clone(),
    );
    let store = ResultStore::new(
        config.datastore.probe.kind,
        settings,
        config.datastore.topics(),
    );
    let interval = Duration::from_secs(config.probe.interval_secs);

    tracing::info!(
        "Probe worker started: {} sites, {} nameservers, every {}s",
        config.probe.sites.len(),
        config.probe.nameservers.len(),
        config.probe.interval_secs
    );

    loop {
        let result = collector.collect().await;
        tracing::info!(
            "Collected {} site stats, {} DNS stats",
            result.stats.len(),
            result.dns_stats.len()
        );

        store
            .persist(
                &config.datastore.probe.topic,
                &result,
                config.probe.interval_secs,
            )
            .await;

        tokio::select! {
            _ = stop.recv() => {
                tracing::info!("Probe worker stopping");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Run speed tests on the configured interval.
async fn run_speedtest_worker(
    config: Arc<AppConfig>,
    settings: Arc<DatastoreSettings>,
    mut stop: broadcast::Receiver<()>,
) {
    let collector = SpeedTestCollector::new(config.speedtest.command.clone(), SPEEDTEST_TIMEOUT);
    let store = ResultStore::new(
        config.datastore.speedtest.kind,
        settings,
        config.datastore.topics(),
    );
    let interval = Duration::from_secs(config.speedtest.interval_secs);

    tracing::info!(
        "Speed test worker started: every {}s via {}",
        config.speedtest.interval_secs,
        config.speedtest.command
    );

    loop {
        match collector.collect().await {
            Ok(result) => {
                tracing::info!(
                    "Speed test: download {:?} Mbps, upload {:?} Mbps",
                    result.download,
                    result.upload
                );
                store
                    .persist(
                        &config.datastore.speedtest.topic,
                        &result,
                        config.speedtest.interval_secs,
                    )
                    .await;
            }
            Err(e) => {
                tracing::error!("Speed test failed: {}", e);
            }
        }

        tokio::select! {
            _ = stop.recv() => {
                tracing::info!("Speed test worker stopping");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
