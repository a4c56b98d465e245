//! Redis-backed datastore. TTLs are native (`SET ... EX`).

use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value;

use super::{Datastore, DatastoreError};
use crate::config::RedisSettings;

pub struct RedisDatastore {
    client: redis::Client,
}

impl RedisDatastore {
    /// Open a client for the configured server. The password is optional;
    /// when unset the connection is made without auth.
    pub fn connect(cfg: &RedisSettings) -> Result<Self, DatastoreError> {
        let url = match &cfg.password {
            Some(password) if !password.is_empty() => {
                format!("redis://:{}@{}:{}/{}", password, cfg.host, cfg.port, cfg.db)
            }
            _ => format!("redis://{}:{}/{}", cfg.host, cfg.port, cfg.db),
        };

        tracing::debug!("Opening Redis client for {}:{}", cfg.host, cfg.port);
        let client =
            redis::Client::open(url).map_err(|e| DatastoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Datastore for RedisDatastore {
    async fn read(&self, topic: &str) -> Result<Option<Value>, DatastoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| DatastoreError::Connection(e.to_string()))?;

        let raw: Option<String> = conn
            .get(topic)
            .await
            .map_err(|e| DatastoreError::Read(e.to_string()))?;

        match raw {
            None => Ok(None),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::error!("Undecodable payload under {}: {}", topic, e);
                    Ok(None)
                }
            },
        }
    }

    async fn write(&self, topic: &str, data: &Value, ttl: u64) -> Result<(), DatastoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| DatastoreError::Connection(e.to_string()))?;

        tracing::debug!("Writing {} with ttl {}s", topic, ttl);
        let payload = serde_json::to_string(data)?;
        conn.set_ex::<_, _, ()>(topic, payload, ttl)
            .await
            .map_err(|e| DatastoreError::Write(e.to_string()))?;
        Ok(())
    }
}
