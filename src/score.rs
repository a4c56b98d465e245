//! Health scoring.
//!
//! Each dimension's average is normalized against its configured threshold
//! into a 0..1 "badness" coefficient, and the overall score subtracts every
//! weighted coefficient from 1. Throughput dimensions invert the direction:
//! more bandwidth means a smaller coefficient.

use crate::records::{NameserverKind, ProbeResult, SpeedTestResult};

/// One value per scored dimension. Used for weights, thresholds,
/// coefficients, and per-dimension scores alike.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Dimensions {
    pub loss: f64,
    pub latency: f64,
    pub jitter: f64,
    pub internal_dns_latency: f64,
    pub external_dns_latency: f64,
    pub speedtest_download: f64,
    pub speedtest_upload: f64,
}

impl Dimensions {
    /// The dimension values paired with their metric label.
    pub fn labeled(&self) -> [(&'static str, f64); 7] {
        [
            ("loss", self.loss),
            ("latency", self.latency),
            ("jitter", self.jitter),
            ("internal_dns_latency", self.internal_dns_latency),
            ("external_dns_latency", self.external_dns_latency),
            ("speedtest_download", self.speedtest_download),
            ("speedtest_upload", self.speedtest_upload),
        ]
    }
}

/// Weights and thresholds in effect, composed once at startup
/// (see `ScoreSettings::compose` in the config module).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreConfig {
    pub weights: Dimensions,
    pub thresholds: Dimensions,
}

/// Per-dimension averages over one probe result.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Averages {
    pub latency: f64,
    pub loss: f64,
    pub jitter: f64,
    pub internal_dns_latency: f64,
    pub external_dns_latency: f64,
}

impl Averages {
    pub fn from_probe(probe: &ProbeResult) -> Self {
        let latency = mean(probe.stats.iter().map(|s| s.latency));
        let loss = mean(probe.stats.iter().map(|s| s.loss));
        let jitter = mean(probe.stats.iter().map(|s| s.jitter));

        let internal_dns_latency = mean(
            probe
                .dns_stats
                .iter()
                .filter(|d| d.kind == NameserverKind::Internal)
                .map(|d| d.latency),
        );
        let external_dns_latency = mean(
            probe
                .dns_stats
                .iter()
                .filter(|d| d.kind == NameserverKind::External)
                .map(|d| d.latency),
        );

        Self {
            latency,
            loss,
            jitter,
            internal_dns_latency,
            external_dns_latency,
        }
    }
}

/// Everything the exporter needs for one scrape: raw averages, the config in
/// effect, the coefficients, and the scores. The shape is stable regardless
/// of how much input data was available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthReport {
    pub averages: Averages,
    pub weights: Dimensions,
    pub thresholds: Dimensions,
    pub coefficients: Dimensions,
    pub scores: Dimensions,
    pub speedtest_overall_score: f64,
    pub overall_score: f64,
}

/// Compute the health report for the latest stored results.
///
/// Without a probe result there is nothing to score; that is the normal
/// startup race, not an error.
pub fn compute(
    probe: Option<&ProbeResult>,
    speedtest: Option<&SpeedTestResult>,
    config: &ScoreConfig,
) -> Option<HealthReport> {
    let probe = match probe {
        Some(probe) => probe,
        None => {
            tracing::debug!("No probe result available yet, skipping health score");
            return None;
        }
    };

    let averages = Averages::from_probe(probe);
    let weights = config.weights;
    let thresholds = config.thresholds;

    let coefficients = Dimensions {
        loss: coefficient(averages.loss, thresholds.loss),
        latency: coefficient(averages.latency, thresholds.latency),
        jitter: coefficient(averages.jitter, thresholds.jitter),
        internal_dns_latency: coefficient(
            averages.internal_dns_latency,
            thresholds.internal_dns_latency,
        ),
        external_dns_latency: coefficient(
            averages.external_dns_latency,
            thresholds.external_dns_latency,
        ),
        speedtest_download: throughput_coefficient(
            speedtest.and_then(|s| s.download),
            thresholds.speedtest_download,
        ),
        speedtest_upload: throughput_coefficient(
            speedtest.and_then(|s| s.upload),
            thresholds.speedtest_upload,
        ),
    };

    let scores = Dimensions {
        loss: 1.0 - weights.loss * coefficients.loss,
        latency: 1.0 - weights.latency * coefficients.latency,
        jitter: 1.0 - weights.jitter * coefficients.jitter,
        internal_dns_latency: 1.0 - weights.internal_dns_latency * coefficients.internal_dns_latency,
        external_dns_latency: 1.0 - weights.external_dns_latency * coefficients.external_dns_latency,
        speedtest_download: 1.0 - weights.speedtest_download * coefficients.speedtest_download,
        speedtest_upload: 1.0 - weights.speedtest_upload * coefficients.speedtest_upload,
    };

    let speedtest_overall_score = (scores.speedtest_download + scores.speedtest_upload) / 2.0;

    // A single penalty accumulator, not an average of the per-dimension
    // scores: every weighted coefficient is subtracted from 1 exactly once.
    // Not clamped at 0.
    let overall_score = 1.0
        - weights.loss * coefficients.loss
        - weights.jitter * coefficients.jitter
        - weights.latency * coefficients.latency
        - weights.internal_dns_latency * coefficients.internal_dns_latency
        - weights.external_dns_latency * coefficients.external_dns_latency
        - weights.speedtest_download * coefficients.speedtest_download
        - weights.speedtest_upload * coefficients.speedtest_upload;

    Some(HealthReport {
        averages,
        weights,
        thresholds,
        coefficients,
        scores,
        speedtest_overall_score,
        overall_score,
    })
}

/// Arithmetic mean; an empty sequence contributes 0.
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values {
        sum += value;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Badness ratio of an average against its threshold, clamped to [0, 1].
/// A zero threshold disables the dimension entirely.
fn coefficient(average: f64, threshold: f64) -> f64 {
    if threshold == 0.0 {
        return 0.0;
    }
    let ratio = average / threshold;
    if ratio >= 1.0 {
        1.0
    } else {
        ratio
    }
}

/// Inverted ratio for throughput: hitting the threshold is perfect (0),
/// no throughput at all is worst (1). Missing data and a zero threshold
/// both contribute nothing.
fn throughput_coefficient(value: Option<f64>, threshold: f64) -> f64 {
    let Some(value) = value else {
        return 0.0;
    };
    if threshold == 0.0 {
        return 0.0;
    }
    1.0 - coefficient(value, threshold)
}
