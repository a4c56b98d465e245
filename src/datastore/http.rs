//! HTTP bridge datastore: delegates storage to a remote read/write API.
//!
//! The write body carries an MD5 checksum of the serialized record so the
//! remote side can verify integrity. The literal substring `:topic` in
//! either endpoint URL is replaced with the topic value.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Datastore, DatastoreError};
use crate::config::{HttpEndpointSettings, HttpSettings};

#[derive(Debug, Deserialize)]
struct WriteResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    data: Option<Value>,
}

pub struct HttpBridgeDatastore {
    client: reqwest::Client,
    read: HttpEndpointSettings,
    write: HttpEndpointSettings,
}

impl HttpBridgeDatastore {
    pub fn connect(cfg: &HttpSettings) -> Result<Self, DatastoreError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!cfg.verify_tls)
            .build()
            .map_err(|e| DatastoreError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            read: cfg.read.clone(),
            write: cfg.write.clone(),
        })
    }

    fn request(
        &self,
        endpoint: &HttpEndpointSettings,
        default_method: Method,
        topic: &str,
    ) -> Result<reqwest::RequestBuilder, DatastoreError> {
        let method = match &endpoint.method {
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|e| DatastoreError::Connection(e.to_string()))?,
            None => default_method,
        };

        let mut builder = self
            .client
            .request(method, build_url(&endpoint.url, topic))
            .headers(header_map(&endpoint.headers, &endpoint.cookies)?)
            .timeout(Duration::from_secs(endpoint.timeout_secs));

        if let Some(username) = &endpoint.username {
            builder = builder.basic_auth(username, endpoint.password.as_deref());
        }

        Ok(builder)
    }
}

#[async_trait]
impl Datastore for HttpBridgeDatastore {
    async fn read(&self, topic: &str) -> Result<Option<Value>, DatastoreError> {
        let response = self
            .request(&self.read, Method::GET, topic)?
            .query(&[("topic", topic)])
            .send()
            .await
            .map_err(|e| DatastoreError::Read(e.to_string()))?;

        match response.json::<ReadResponse>().await {
            Ok(body) => Ok(body.data),
            Err(e) => {
                tracing::error!("Undecodable bridge response for {}: {}", topic, e);
                Ok(None)
            }
        }
    }

    async fn write(&self, topic: &str, data: &Value, ttl: u64) -> Result<(), DatastoreError> {
        let payload = json!({
            "topic": topic,
            "data": data,
            "ttl": ttl,
            "checksum": checksum(data)?,
        });

        let response = self
            .request(&self.write, Method::POST, topic)?
            .json(&payload)
            .send()
            .await
            .map_err(|e| DatastoreError::Write(e.to_string()))?;

        let body: WriteResponse = response
            .json()
            .await
            .map_err(|e| DatastoreError::Write(e.to_string()))?;

        if body.success {
            Ok(())
        } else {
            Err(DatastoreError::WriteRejected)
        }
    }
}

/// MD5 hex digest of the serialized record.
fn checksum(data: &Value) -> Result<String, DatastoreError> {
    let serialized = serde_json::to_string(data)?;
    Ok(format!("{:x}", md5::compute(serialized.as_bytes())))
}

/// Replace the `:topic` placeholder in an endpoint URL.
fn build_url(url: &str, topic: &str) -> String {
    url.replace(":topic", topic)
}

fn header_map(
    headers: &HashMap<String, String>,
    cookies: &HashMap<String, String>,
) -> Result<HeaderMap, DatastoreError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| DatastoreError::Connection(e.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| DatastoreError::Connection(e.to_string()))?;
        map.insert(name, value);
    }

    if !cookies.is_empty() {
        let jar = cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        map.insert(
            COOKIE,
            HeaderValue::from_str(&jar).map_err(|e| DatastoreError::Connection(e.to_string()))?,
        );
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_templating() {
        assert_eq!(
            build_url("https://bridge.local/store/:topic", "netprobe/probe"),
            "https://bridge.local/store/netprobe/probe"
        );
        // URLs without the placeholder pass through untouched.
        assert_eq!(build_url("https://bridge.local/store", "x"), "https://bridge.local/store");
    }

    #[test]
    fn test_checksum_is_md5_hex_of_serialized_data() {
        let digest = checksum(&json!({"a": 1})).unwrap();
        // md5(r#"{"a":1}"#)
        assert_eq!(digest, format!("{:x}", md5::compute(r#"{"a":1}"#)));
        assert_eq!(digest.len(), 32);
    }

    #[test]
    fn test_header_map_with_cookies() {
        let headers = HashMap::from([("X-Api-Key".to_string(), "secret".to_string())]);
        let cookies = HashMap::from([("session".to_string(), "abc".to_string())]);
        let map = header_map(&headers, &cookies).unwrap();
        assert_eq!(map.get("x-api-key").unwrap(), "secret");
        assert_eq!(map.get(COOKIE).unwrap(), "session=abc");
    }
}
