//! Configuration loading.
//!
//! Compiled-in defaults, overlaid by an optional YAML file, overlaid by
//! environment variables for the operational knobs. The result is composed
//! once at startup and handed by value into each component.

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::datastore::DatastoreKind;
use crate::records::NameserverKind;
use crate::score::{Dimensions, ScoreConfig};

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// A nameserver to measure resolution latency against.
#[derive(Debug, Clone, Deserialize)]
pub struct Nameserver {
    pub name: String,
    pub ip: String,
    #[serde(rename = "type")]
    pub kind: NameserverKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Echo requests per ping burst.
    pub count: u32,
    pub sites: Vec<String>,
    pub dns_test_site: String,
    pub device_id: String,
    pub nameservers: Vec<Nameserver>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 120,
            count: 50,
            sites: vec![
                "google.com".to_string(),
                "facebook.com".to_string(),
                "twitter.com".to_string(),
                "youtube.com".to_string(),
            ],
            dns_test_site: "google.com".to_string(),
            device_id: "netpulse".to_string(),
            nameservers: vec![
                Nameserver {
                    name: "Google".to_string(),
                    ip: "8.8.8.8".to_string(),
                    kind: NameserverKind::External,
                },
                Nameserver {
                    name: "Cloudflare".to_string(),
                    ip: "1.1.1.1".to_string(),
                    kind: NameserverKind::External,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeedTestSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    /// The external CLI invoked with `--json`.
    pub command: String,
    /// Fold unused speed-test weight into the loss weight when disabled.
    pub weight_rebalance: bool,
    /// Score with the speed-test weights even while the test is disabled.
    pub enforce_weight: bool,
    pub download_weight: f64,
    pub upload_weight: f64,
    pub download_threshold: f64,
    pub upload_threshold: f64,
}

impl Default for SpeedTestSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 937,
            command: "speedtest-cli".to_string(),
            weight_rebalance: true,
            enforce_weight: false,
            download_weight: 0.1,
            upload_weight: 0.1,
            download_threshold: 200.0,
            upload_threshold: 200.0,
        }
    }
}

impl SpeedTestSettings {
    pub fn enforce_or_enabled(&self) -> bool {
        self.enforce_weight || self.enabled
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub root: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            root: "/data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: u32,
    pub password: Option<String>,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MongoDbSettings {
    pub url: String,
    pub database: String,
    pub collection: String,
}

impl Default for MongoDbSettings {
    fn default() -> Self {
        Self {
            url: "mongodb://localhost:27017/admin".to_string(),
            database: "netpulse".to_string(),
            collection: "netpulse".to_string(),
        }
    }
}

/// One endpoint of the HTTP bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpEndpointSettings {
    pub url: String,
    /// Overrides the default (GET for read, POST for write).
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub cookies: HashMap<String, String>,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_http_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    pub read: HttpEndpointSettings,
    pub write: HttpEndpointSettings,
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_verify_tls() -> bool {
    true
}

/// Which backend serves a record family, and under what topic.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicBinding {
    pub kind: DatastoreKind,
    pub topic: String,
}

impl Default for TopicBinding {
    fn default() -> Self {
        Self {
            kind: DatastoreKind::File,
            topic: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatastoreSettings {
    pub probe: TopicBinding,
    pub speedtest: TopicBinding,
    pub file: FileSettings,
    pub redis: RedisSettings,
    pub mqtt: MqttSettings,
    pub mongodb: MongoDbSettings,
    pub http: Option<HttpSettings>,
}

impl DatastoreSettings {
    /// Every topic a reader of this configuration may ask for.
    pub fn topics(&self) -> Vec<String> {
        vec![self.probe.topic.clone(), self.speedtest.topic.clone()]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PresentationSettings {
    pub interface: String,
    pub port: u16,
    pub weight_loss: f64,
    pub weight_latency: f64,
    pub weight_jitter: f64,
    pub weight_internal_dns_latency: f64,
    pub weight_external_dns_latency: f64,
    pub threshold_loss: f64,
    pub threshold_latency: f64,
    pub threshold_jitter: f64,
    pub threshold_internal_dns_latency: f64,
    pub threshold_external_dns_latency: f64,
}

impl Default for PresentationSettings {
    fn default() -> Self {
        Self {
            interface: "0.0.0.0".to_string(),
            port: 5000,
            weight_loss: 0.4,
            weight_latency: 0.15,
            weight_jitter: 0.2,
            weight_internal_dns_latency: 0.025,
            weight_external_dns_latency: 0.025,
            threshold_loss: 5.0,
            threshold_latency: 100.0,
            threshold_jitter: 30.0,
            threshold_internal_dns_latency: 30.0,
            threshold_external_dns_latency: 70.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub probe: ProbeSettings,
    pub speedtest: SpeedTestSettings,
    pub datastore: DatastoreSettings,
    pub presentation: PresentationSettings,
}

impl AppConfig {
    /// Load configuration: defaults, then the YAML file named by
    /// `NETPULSE_CONFIG` (or `netpulse.yaml` when present), then
    /// environment-variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("NETPULSE_CONFIG").unwrap_or_else(|_| "netpulse.yaml".to_string());

        let mut cfg = if Path::new(&path).exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            Self::from_yaml(&raw)?
        } else {
            Self::default()
        };

        cfg.apply_env()?;
        cfg.fill_topic_defaults();
        Ok(cfg)
    }

    /// Parse a YAML document into a configuration.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let mut cfg: AppConfig = serde_yaml::from_str(raw)?;
        cfg.fill_topic_defaults();
        Ok(cfg)
    }

    fn fill_topic_defaults(&mut self) {
        if self.datastore.probe.topic.is_empty() {
            self.datastore.probe.topic = "netprobe/probe".to_string();
        }
        if self.datastore.speedtest.topic.is_empty() {
            self.datastore.speedtest.topic = "netprobe/speedtest".to_string();
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(device_id) = env::var("NETPULSE_DEVICE_ID") {
            self.probe.device_id = device_id;
        }
        if let Ok(sites) = env::var("NETPULSE_SITES") {
            self.probe.sites = sites
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(interval) = env_parse("NETPULSE_PROBE_INTERVAL") {
            self.probe.interval_secs = interval;
        }
        if let Some(count) = env_parse("NETPULSE_PROBE_COUNT") {
            self.probe.count = count;
        }
        if let Ok(site) = env::var("NETPULSE_DNS_TEST_SITE") {
            self.probe.dns_test_site = site;
        }

        if let Some(enabled) = env_bool("NETPULSE_SPEEDTEST_ENABLED") {
            self.speedtest.enabled = enabled;
        }
        if let Some(interval) = env_parse("NETPULSE_SPEEDTEST_INTERVAL") {
            self.speedtest.interval_secs = interval;
        }

        if let Ok(kind) = env::var("NETPULSE_DATASTORE_PROBE_TYPE") {
            self.datastore.probe.kind = parse_kind("NETPULSE_DATASTORE_PROBE_TYPE", &kind)?;
        }
        if let Ok(topic) = env::var("NETPULSE_DATASTORE_PROBE_TOPIC") {
            self.datastore.probe.topic = topic;
        }
        if let Ok(kind) = env::var("NETPULSE_DATASTORE_SPEEDTEST_TYPE") {
            self.datastore.speedtest.kind = parse_kind("NETPULSE_DATASTORE_SPEEDTEST_TYPE", &kind)?;
        }
        if let Ok(topic) = env::var("NETPULSE_DATASTORE_SPEEDTEST_TOPIC") {
            self.datastore.speedtest.topic = topic;
        }
        if let Ok(root) = env::var("NETPULSE_FILE_DATASTORE_PATH") {
            self.datastore.file.root = root;
        }

        if let Ok(interface) = env::var("NETPULSE_PRESENTATION_INTERFACE") {
            self.presentation.interface = interface;
        }
        if let Some(port) = env_parse("NETPULSE_PRESENTATION_PORT") {
            self.presentation.port = port;
        }

        Ok(())
    }

    /// Compose the score configuration in effect.
    ///
    /// This is where the speed-test weight rebalance happens, exactly once:
    /// when the speed test is neither enforced nor enabled, rebalancing is
    /// on, the base weight sum is below 1, and folding in the speed-test
    /// weights would still stay at or below 1, their entire mass moves into
    /// the loss weight.
    pub fn score_config(&self) -> ScoreConfig {
        let p = &self.presentation;
        let st = &self.speedtest;

        let mut weights = Dimensions {
            loss: p.weight_loss,
            latency: p.weight_latency,
            jitter: p.weight_jitter,
            internal_dns_latency: p.weight_internal_dns_latency,
            external_dns_latency: p.weight_external_dns_latency,
            speedtest_download: 0.0,
            speedtest_upload: 0.0,
        };
        let mut thresholds = Dimensions {
            loss: p.threshold_loss,
            latency: p.threshold_latency,
            jitter: p.threshold_jitter,
            internal_dns_latency: p.threshold_internal_dns_latency,
            external_dns_latency: p.threshold_external_dns_latency,
            speedtest_download: 0.0,
            speedtest_upload: 0.0,
        };

        if st.enforce_or_enabled() {
            weights.speedtest_download = st.download_weight;
            weights.speedtest_upload = st.upload_weight;
            thresholds.speedtest_download = st.download_threshold;
            thresholds.speedtest_upload = st.upload_threshold;
        } else {
            let base = weights.loss
                + weights.latency
                + weights.jitter
                + weights.internal_dns_latency
                + weights.external_dns_latency;
            let folded = st.download_weight + st.upload_weight;
            if st.weight_rebalance && base < 1.0 && base + folded <= 1.0 {
                weights.loss += folded;
            }
        }

        ScoreConfig {
            weights,
            thresholds,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|raw| raw.parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|raw| matches!(raw.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
}

fn parse_kind(name: &'static str, raw: &str) -> Result<DatastoreKind, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert!(cfg.probe.enabled);
        assert_eq!(cfg.probe.interval_secs, 120);
        assert_eq!(cfg.probe.count, 50);
        assert_eq!(cfg.probe.sites.len(), 4);
        assert!(!cfg.speedtest.enabled);
        assert_eq!(cfg.presentation.port, 5000);
        assert_eq!(cfg.presentation.weight_loss, 0.4);
    }

    #[test]
    fn test_yaml_overlay() {
        let cfg = AppConfig::from_yaml(
            r#"
probe:
  device_id: lab-probe
  interval_secs: 30
  sites: [one.example, two.example]
  nameservers:
    - name: Router
      ip: 192.168.1.1
      type: internal
datastore:
  probe:
    kind: redis
  redis:
    host: cache.local
presentation:
  port: 9200
"#,
        )
        .unwrap();

        assert_eq!(cfg.probe.device_id, "lab-probe");
        assert_eq!(cfg.probe.interval_secs, 30);
        assert_eq!(cfg.probe.sites, vec!["one.example", "two.example"]);
        assert_eq!(cfg.probe.nameservers.len(), 1);
        assert_eq!(cfg.probe.nameservers[0].kind, NameserverKind::Internal);
        assert_eq!(cfg.datastore.probe.kind, DatastoreKind::Redis);
        assert_eq!(cfg.datastore.redis.host, "cache.local");
        // Unset fields keep their defaults.
        assert_eq!(cfg.datastore.probe.topic, "netprobe/probe");
        assert_eq!(cfg.datastore.speedtest.topic, "netprobe/speedtest");
        assert_eq!(cfg.presentation.port, 9200);
        assert_eq!(cfg.presentation.threshold_latency, 100.0);
    }

    #[test]
    fn test_yaml_unknown_datastore_kind_is_fatal() {
        let err = AppConfig::from_yaml("datastore:\n  probe:\n    kind: cassandra\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_rebalance_folds_speedtest_weight_into_loss() {
        let cfg = AppConfig::default();
        // Disabled + not enforced + rebalance on; base sum 0.8, folding 0.2
        // stays at 1.0.
        let score = cfg.score_config();
        assert!((score.weights.loss - 0.6).abs() < 1e-12);
        assert_eq!(score.weights.speedtest_download, 0.0);
        assert_eq!(score.weights.speedtest_upload, 0.0);
        assert_eq!(score.thresholds.speedtest_download, 0.0);
    }

    #[test]
    fn test_no_rebalance_when_disabled() {
        let mut cfg = AppConfig::default();
        cfg.speedtest.weight_rebalance = false;
        let score = cfg.score_config();
        assert!((score.weights.loss - 0.4).abs() < 1e-12);
        assert_eq!(score.weights.speedtest_download, 0.0);
    }

    #[test]
    fn test_no_rebalance_when_it_would_overflow() {
        let mut cfg = AppConfig::default();
        cfg.speedtest.download_weight = 0.15;
        cfg.speedtest.upload_weight = 0.15;
        // 0.8 + 0.3 > 1: the fold is skipped.
        let score = cfg.score_config();
        assert!((score.weights.loss - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_enabled_speedtest_keeps_its_own_weights() {
        let mut cfg = AppConfig::default();
        cfg.speedtest.enabled = true;
        let score = cfg.score_config();
        assert!((score.weights.loss - 0.4).abs() < 1e-12);
        assert_eq!(score.weights.speedtest_download, 0.1);
        assert_eq!(score.weights.speedtest_upload, 0.1);
        assert_eq!(score.thresholds.speedtest_download, 200.0);
        assert_eq!(score.thresholds.speedtest_upload, 200.0);
    }

    #[test]
    fn test_enforced_weights_apply_without_enabling() {
        let mut cfg = AppConfig::default();
        cfg.speedtest.enforce_weight = true;
        let score = cfg.score_config();
        assert_eq!(score.weights.speedtest_download, 0.1);
        assert_eq!(score.thresholds.speedtest_upload, 200.0);
    }

    #[test]
    fn test_topics_lists_both_bindings() {
        let cfg = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(
            cfg.datastore.topics(),
            vec!["netprobe/probe".to_string(), "netprobe/speedtest".to_string()]
        );
    }
}
