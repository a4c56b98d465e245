//! File-backed datastore with TTL sidecar files.
//!
//! A topic maps to a path: relative topics resolve under the configured data
//! root, absolute topics are used verbatim. The record's TTL lives next to
//! the data in `<path>.ttl` as plain-text seconds; expiry is checked against
//! the data file's creation time on every read, and an expired pair is
//! deleted before any parsing happens.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::Value;

use super::{Datastore, DatastoreError};

/// Fallback when the sidecar is missing or unreadable: 24 hours.
const DEFAULT_TTL_SECS: u64 = 60 * 60 * 24;

pub struct FileDatastore {
    root: PathBuf,
}

impl FileDatastore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn topic_path(&self, topic: &str) -> PathBuf {
        let candidate = Path::new(topic);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(topic)
        }
    }

    /// Delete the data/sidecar pair if the stored TTL has elapsed.
    /// Returns true when the topic was expired (and is now gone).
    async fn expire_if_stale(&self, path: &Path) -> bool {
        let ttl_path = sidecar_path(path);

        let ttl = match tokio::fs::read_to_string(&ttl_path).await {
            Ok(text) => text.trim().parse::<u64>().unwrap_or(DEFAULT_TTL_SECS),
            Err(_) => DEFAULT_TTL_SECS,
        };

        let created = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.created().or_else(|_| meta.modified()).ok(),
            Err(_) => None,
        };

        let elapsed = created
            .and_then(|c| SystemTime::now().duration_since(c).ok())
            .map(|d| d.as_secs());

        let expired = matches!(elapsed, Some(secs) if is_expired(secs, ttl));
        if expired {
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::warn!("Failed to remove expired file {}: {}", path.display(), e);
            }
            if let Err(e) = tokio::fs::remove_file(&ttl_path).await {
                tracing::warn!("Failed to remove ttl sidecar {}: {}", ttl_path.display(), e);
            }
        }
        expired
    }
}

#[async_trait]
impl Datastore for FileDatastore {
    async fn read(&self, topic: &str) -> Result<Option<Value>, DatastoreError> {
        let path = self.topic_path(topic);

        if self.expire_if_stale(&path).await {
            tracing::debug!("Topic {} expired", topic);
            return Ok(None);
        }

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DatastoreError::Read(e.to_string())),
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::error!("Undecodable payload in {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    async fn write(&self, topic: &str, data: &Value, ttl: u64) -> Result<(), DatastoreError> {
        let path = self.topic_path(topic);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DatastoreError::Write(e.to_string()))?;
        }

        tracing::debug!("Writing {}", path.display());
        let payload = serde_json::to_string(data)?;
        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| DatastoreError::Write(e.to_string()))?;

        tokio::fs::write(sidecar_path(&path), ttl.to_string())
            .await
            .map_err(|e| DatastoreError::Write(e.to_string()))?;

        Ok(())
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".ttl");
    PathBuf::from(os)
}

fn is_expired(elapsed_secs: u64, ttl_secs: u64) -> bool {
    elapsed_secs > ttl_secs
}
