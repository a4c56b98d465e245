//! ResultStore: the boundary between collectors/presentation and the
//! datastore backends.
//!
//! Persistence is best-effort. Backend failures are logged here and become
//! a `false`/`None` for the caller; they never propagate further, so a
//! failed write in one cycle cannot take down the next.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::config::DatastoreSettings;
use crate::datastore::{factory, Datastore, DatastoreKind};

/// Stored records outlive the collection interval by this much, so one
/// missed or slow cycle does not serve stale-absent reads.
pub const TTL_MARGIN_SECS: u64 = 15;

/// Upper bound on a single backend read or write. A wedged backend must not
/// stall a collection cycle or a shutdown.
const BACKEND_OP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ResultStore {
    kind: DatastoreKind,
    settings: Arc<DatastoreSettings>,
    subscribe_topics: Vec<String>,
    cached: OnceCell<Arc<dyn Datastore>>,
}

impl ResultStore {
    /// `subscribe_topics` lists every topic this store will be asked to
    /// serve; only the MQTT backend uses it (at construction).
    pub fn new(
        kind: DatastoreKind,
        settings: Arc<DatastoreSettings>,
        subscribe_topics: Vec<String>,
    ) -> Self {
        Self {
            kind,
            settings,
            subscribe_topics,
            cached: OnceCell::new(),
        }
    }

    /// Resolve a backend per the sharing policy: most kinds reconnect per
    /// access; a persistent-subscription backend is constructed once and
    /// reused (a failed construction is retried on the next access).
    async fn backend(&self) -> Option<Arc<dyn Datastore>> {
        let created = if self.kind.persistent_subscription() {
            self.cached
                .get_or_try_init(|| {
                    factory::create(self.kind, &self.settings, &self.subscribe_topics)
                })
                .await
                .cloned()
        } else {
            factory::create(self.kind, &self.settings, &self.subscribe_topics).await
        };

        match created {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::error!("Could not connect to {:?} datastore: {}", self.kind, e);
                None
            }
        }
    }

    /// Write `record` under `topic` with a TTL slightly longer than the
    /// collection interval. Returns whether the write took.
    pub async fn persist<T: Serialize>(
        &self,
        topic: &str,
        record: &T,
        interval_secs: u64,
    ) -> bool {
        let Some(backend) = self.backend().await else {
            return false;
        };

        let value = match serde_json::to_value(record) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Could not serialize record for {}: {}", topic, e);
                return false;
            }
        };

        let ttl = interval_secs + TTL_MARGIN_SECS;
        match tokio::time::timeout(BACKEND_OP_TIMEOUT, backend.write(topic, &value, ttl)).await {
            Ok(Ok(())) => {
                tracing::debug!("Stored {} (ttl {}s)", topic, ttl);
                true
            }
            Ok(Err(e)) => {
                tracing::error!("Failed to store {}: {}", topic, e);
                false
            }
            Err(_) => {
                tracing::error!("Write of {} timed out after {:?}", topic, BACKEND_OP_TIMEOUT);
                false
            }
        }
    }

    /// Read the latest record under `topic`.
    ///
    /// `None` means absent: nothing stored, expired, unreachable backend, or
    /// an undecodable payload. Callers must treat it as "skip this input",
    /// not as a zero-valued record.
    pub async fn fetch<T: DeserializeOwned>(&self, topic: &str) -> Option<T> {
        let backend = self.backend().await?;

        let value = match tokio::time::timeout(BACKEND_OP_TIMEOUT, backend.read(topic)).await {
            Ok(Ok(value)) => value?,
            Ok(Err(e)) => {
                tracing::error!("Failed to read {}: {}", topic, e);
                return None;
            }
            Err(_) => {
                tracing::error!("Read of {} timed out after {:?}", topic, BACKEND_OP_TIMEOUT);
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::error!("Stored record under {} has the wrong shape: {}", topic, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ProbeResult, SiteStat};
    use tempfile::TempDir;

    fn file_store(tmp: &TempDir) -> ResultStore {
        let mut settings = DatastoreSettings::default();
        settings.file.root = tmp.path().to_string_lossy().into_owned();
        ResultStore::new(DatastoreKind::File, Arc::new(settings), vec![])
    }

    #[tokio::test]
    async fn test_persist_applies_ttl_margin() {
        let tmp = TempDir::new().unwrap();
        let store = file_store(&tmp);

        let record = ProbeResult::default();
        assert!(store.persist("netprobe/probe", &record, 120).await);

        let ttl = std::fs::read_to_string(tmp.path().join("netprobe/probe.ttl")).unwrap();
        assert_eq!(ttl, "135");
    }

    #[tokio::test]
    async fn test_round_trip_typed() {
        let tmp = TempDir::new().unwrap();
        let store = file_store(&tmp);

        let record = ProbeResult {
            stats: vec![SiteStat {
                site: "a.com".to_string(),
                latency: 20.0,
                loss: 0.0,
                jitter: 2.0,
            }],
            dns_stats: vec![],
        };
        assert!(store.persist("netprobe/probe", &record, 60).await);

        let back: ProbeResult = store.fetch("netprobe/probe").await.unwrap();
        assert_eq!(back, record);
    }

    #[tokio::test]
    async fn test_fetch_absent_topic() {
        let tmp = TempDir::new().unwrap();
        let store = file_store(&tmp);
        assert!(store.fetch::<ProbeResult>("netprobe/probe").await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_wrong_shape_is_absent() {
        let tmp = TempDir::new().unwrap();
        let store = file_store(&tmp);

        // A valid JSON value that is not a ProbeResult.
        std::fs::write(tmp.path().join("probe"), r#"{"stats": "nope"}"#).unwrap();
        std::fs::write(tmp.path().join("probe.ttl"), "3600").unwrap();
        assert!(store.fetch::<ProbeResult>("probe").await.is_none());
    }
}
