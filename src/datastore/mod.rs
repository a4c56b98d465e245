//! Pluggable storage for measurement records.
//!
//! Every backend stores opaque JSON values under string topics with a TTL.
//! "Not found" is `Ok(None)`, never an error; a stored payload that fails to
//! decode is logged and also treated as absent. Transient backend failures
//! surface as `Err` and are absorbed one layer up, in [`crate::store`].

pub mod factory;
mod file;
mod http;
mod mongodb;
mod mqtt;
mod null;
mod redis;

pub use file::*;
pub use http::*;
pub use mongodb::*;
pub use mqtt::*;
pub use null::*;
pub use redis::*;

use async_trait::async_trait;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

/// Datastore error types.
#[derive(Error, Debug)]
pub enum DatastoreError {
    #[error("missing {0} datastore configuration")]
    Config(&'static str),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("write rejected by remote endpoint")]
    WriteRejected,
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Uniform read/write access to one storage backend.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Read the latest value stored under `topic`.
    async fn read(&self, topic: &str) -> Result<Option<Value>, DatastoreError>;

    /// Store `data` under `topic` with a `ttl` in seconds.
    ///
    /// TTL enforcement is backend-specific; backends without native expiry
    /// treat it as advisory metadata.
    async fn write(&self, topic: &str, data: &Value, ttl: u64) -> Result<(), DatastoreError>;
}

/// The closed set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatastoreKind {
    File,
    Redis,
    Mqtt,
    MongoDb,
    Http,
    None,
}

impl DatastoreKind {
    /// Mqtt holds a live subscription and message buffer, so its instances
    /// are constructed once per reader instead of once per access.
    pub fn persistent_subscription(&self) -> bool {
        matches!(self, DatastoreKind::Mqtt)
    }
}

impl FromStr for DatastoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(DatastoreKind::File),
            "redis" => Ok(DatastoreKind::Redis),
            "mqtt" => Ok(DatastoreKind::Mqtt),
            "mongodb" => Ok(DatastoreKind::MongoDb),
            "http" => Ok(DatastoreKind::Http),
            "none" => Ok(DatastoreKind::None),
            other => Err(format!("unsupported datastore kind: {}", other)),
        }
    }
}

impl<'de> serde::Deserialize<'de> for DatastoreKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = <String as serde::Deserialize>::deserialize(deserializer)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}
