//! MongoDB-backed datastore: one document per topic, upserted in place.
//!
//! The TTL is stored as metadata next to the data but not enforced here;
//! there is no native per-document expiry in this layout, so expiry is a
//! best-effort hint for external cleanup.

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{Client, Collection};
use serde_json::Value;

use super::{Datastore, DatastoreError};
use crate::config::MongoDbSettings;

pub struct MongoDbDatastore {
    collection: Collection<Document>,
}

impl MongoDbDatastore {
    pub async fn connect(cfg: &MongoDbSettings) -> Result<Self, DatastoreError> {
        tracing::debug!("Connecting to MongoDB database {}", cfg.database);
        let client = Client::with_uri_str(&cfg.url)
            .await
            .map_err(|e| DatastoreError::Connection(e.to_string()))?;
        let collection = client
            .database(&cfg.database)
            .collection::<Document>(&cfg.collection);
        Ok(Self { collection })
    }
}

#[async_trait]
impl Datastore for MongoDbDatastore {
    async fn read(&self, topic: &str) -> Result<Option<Value>, DatastoreError> {
        let found = self
            .collection
            .find_one(doc! { "id": topic })
            .await
            .map_err(|e| DatastoreError::Read(e.to_string()))?;

        let Some(document) = found else {
            return Ok(None);
        };

        match document.get("data") {
            None => Ok(None),
            Some(data) => match mongodb::bson::from_bson::<Value>(data.clone()) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::error!("Undecodable document under {}: {}", topic, e);
                    Ok(None)
                }
            },
        }
    }

    async fn write(&self, topic: &str, data: &Value, ttl: u64) -> Result<(), DatastoreError> {
        let data_bson: Bson =
            mongodb::bson::to_bson(data).map_err(|e| DatastoreError::Write(e.to_string()))?;

        tracing::debug!("Upserting {} with ttl {}s", topic, ttl);
        self.collection
            .update_one(
                doc! { "id": topic },
                doc! { "$set": { "data": data_bson, "ttl": ttl as i64 } },
            )
            .upsert(true)
            .await
            .map_err(|e| DatastoreError::Write(e.to_string()))?;
        Ok(())
    }
}
