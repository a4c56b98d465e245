//! No-op datastore: writes succeed, reads find nothing.

use async_trait::async_trait;
use serde_json::Value;

use super::{Datastore, DatastoreError};

pub struct NullDatastore;

#[async_trait]
impl Datastore for NullDatastore {
    async fn read(&self, _topic: &str) -> Result<Option<Value>, DatastoreError> {
        Ok(None)
    }

    async fn write(&self, _topic: &str, _data: &Value, _ttl: u64) -> Result<(), DatastoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_null_contract() {
        let store = NullDatastore;
        assert!(store.write("topic", &json!({"x": 1}), 60).await.is_ok());
        assert_eq!(store.read("topic").await.unwrap(), None);
    }
}
