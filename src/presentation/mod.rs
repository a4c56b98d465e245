//! Metrics presentation server.
//!
//! One pull-based endpoint: each scrape reads the latest stored results,
//! scores them, and renders the gauge families. Data problems never turn
//! into a 5xx; the scrape answers with whatever could be gathered.

mod metrics;

pub use metrics::*;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::records::{ProbeResult, SpeedTestResult};
use crate::score::{self, ScoreConfig};
use crate::store::ResultStore;

/// State shared across scrape handlers.
#[derive(Clone)]
pub struct AppState {
    pub device_id: String,
    pub score_config: ScoreConfig,
    pub probe_topic: String,
    pub speedtest_topic: String,
    pub probe_store: Arc<ResultStore>,
    pub speedtest_store: Arc<ResultStore>,
}

pub struct Server {
    state: AppState,
    interface: String,
    port: u16,
}

impl Server {
    pub fn new(
        config: &AppConfig,
        probe_store: Arc<ResultStore>,
        speedtest_store: Arc<ResultStore>,
    ) -> Self {
        Self {
            state: AppState {
                device_id: config.probe.device_id.clone(),
                score_config: config.score_config(),
                probe_topic: config.datastore.probe.topic.clone(),
                speedtest_topic: config.datastore.speedtest.topic.clone(),
                probe_store,
                speedtest_store,
            },
            interface: config.presentation.interface.clone(),
            port: config.presentation.port,
        }
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/metrics", get(handle_metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until the stop channel fires.
    pub async fn start(
        &self,
        mut stop: broadcast::Receiver<()>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = format!("{}:{}", self.interface, self.port).parse()?;
        let router = self.routes();

        tracing::info!("Metrics endpoint listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        Ok(())
    }
}

async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let probe: Option<ProbeResult> = state.probe_store.fetch(&state.probe_topic).await;
    let speedtest: Option<SpeedTestResult> =
        state.speedtest_store.fetch(&state.speedtest_topic).await;

    let report = score::compute(probe.as_ref(), speedtest.as_ref(), &state.score_config);

    if let Some(report) = &report {
        tracing::debug!(
            "Health score {:.3} (avg loss {:.2}%, latency {:.2}ms, jitter {:.2}ms, dns {:.2}/{:.2}ms)",
            report.overall_score,
            report.averages.loss,
            report.averages.latency,
            report.averages.jitter,
            report.averages.internal_dns_latency,
            report.averages.external_dns_latency,
        );
    }

    let registry = match metrics::render(
        &state.device_id,
        probe.as_ref(),
        speedtest.as_ref(),
        report.as_ref(),
    ) {
        Ok(registry) => registry,
        Err(e) => {
            // Best effort: a broken render still answers 200 with no series.
            tracing::error!("Failed to render metric families: {}", e);
            prometheus::Registry::new()
        }
    };

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        buffer.clear();
    }

    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer)
}
