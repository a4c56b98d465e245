//! Backend construction, dispatched over the closed kind enum.

use std::sync::Arc;

use super::{
    Datastore, DatastoreError, DatastoreKind, FileDatastore, HttpBridgeDatastore,
    MongoDbDatastore, MqttDatastore, NullDatastore, RedisDatastore,
};
use crate::config::DatastoreSettings;

/// Construct a fresh backend of the given kind.
///
/// No pooling or caching happens here; callers that need the connection to
/// outlive a single read+write cycle hold the returned handle. `topics` is
/// only meaningful for the MQTT backend, which subscribes to them at
/// construction time.
///
/// A missing required sub-configuration is a configuration error (fatal to
/// the caller's component); a refused connection is a connection error the
/// caller degrades on.
pub async fn create(
    kind: DatastoreKind,
    cfg: &DatastoreSettings,
    topics: &[String],
) -> Result<Arc<dyn Datastore>, DatastoreError> {
    let store: Arc<dyn Datastore> = match kind {
        DatastoreKind::File => {
            tracing::debug!("Creating file datastore");
            Arc::new(FileDatastore::new(&cfg.file.root))
        }
        DatastoreKind::Redis => {
            tracing::debug!("Creating Redis datastore");
            Arc::new(RedisDatastore::connect(&cfg.redis)?)
        }
        DatastoreKind::Mqtt => {
            tracing::debug!("Creating MQTT datastore");
            Arc::new(MqttDatastore::connect(&cfg.mqtt, topics).await?)
        }
        DatastoreKind::MongoDb => {
            tracing::debug!("Creating MongoDB datastore");
            Arc::new(MongoDbDatastore::connect(&cfg.mongodb).await?)
        }
        DatastoreKind::Http => {
            tracing::debug!("Creating HTTP bridge datastore");
            let http = cfg.http.as_ref().ok_or(DatastoreError::Config("http"))?;
            Arc::new(HttpBridgeDatastore::connect(http)?)
        }
        DatastoreKind::None => {
            tracing::debug!("Creating null datastore");
            Arc::new(NullDatastore)
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatastoreSettings;

    #[tokio::test]
    async fn test_create_null() {
        let cfg = DatastoreSettings::default();
        let store = create(DatastoreKind::None, &cfg, &[]).await.unwrap();
        assert_eq!(store.read("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_http_without_config_is_a_config_error() {
        let cfg = DatastoreSettings::default();
        let err = match create(DatastoreKind::Http, &cfg, &[]).await {
            Ok(_) => panic!("expected a config error"),
            Err(e) => e,
        };
        assert!(matches!(err, DatastoreError::Config("http")));
    }

    #[tokio::test]
    async fn test_create_file_uses_configured_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut cfg = DatastoreSettings::default();
        cfg.file.root = tmp.path().to_string_lossy().into_owned();

        let store = create(DatastoreKind::File, &cfg, &[]).await.unwrap();
        store
            .write("probe", &serde_json::json!({"ok": true}), 60)
            .await
            .unwrap();
        assert!(tmp.path().join("probe").exists());
    }
}
