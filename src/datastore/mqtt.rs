//! MQTT-backed datastore using retained messages as the cache.
//!
//! Construction subscribes to every topic this instance will serve and
//! buffers the latest retained message per topic. Reads are pure lookups in
//! that buffer; the live subscription keeps it current. Writes publish with
//! the retain flag so late subscribers get the last value immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::Value;

use super::{Datastore, DatastoreError};
use crate::config::MqttSettings;

/// How long construction waits for the expected retained messages.
const SUBSCRIBE_WAIT: Duration = Duration::from_secs(3);

pub struct MqttDatastore {
    client: AsyncClient,
    messages: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    stopped: Arc<AtomicBool>,
}

impl MqttDatastore {
    /// Connect, subscribe to `topics`, and wait briefly for their retained
    /// messages to arrive.
    pub async fn connect(cfg: &MqttSettings, topics: &[String]) -> Result<Self, DatastoreError> {
        let client_id = format!("netpulse-{:08x}", rand::random::<u32>());
        let mut options = MqttOptions::new(client_id, cfg.host.as_str(), cfg.port);
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
            options.set_credentials(username.as_str(), password.as_str());
        }

        tracing::debug!("Connecting to MQTT broker {}:{}", cfg.host, cfg.port);
        let (client, mut eventloop) = AsyncClient::new(options, 16);

        let messages: Arc<Mutex<HashMap<String, Vec<u8>>>> = Arc::default();
        let stopped = Arc::new(AtomicBool::new(false));

        let buffer = messages.clone();
        let stop_flag = stopped.clone();
        tokio::spawn(async move {
            loop {
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        tracing::debug!("Message received on topic '{}'", publish.topic);
                        buffer
                            .lock()
                            .unwrap()
                            .insert(publish.topic.clone(), publish.payload.to_vec());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if stop_flag.load(Ordering::Relaxed) {
                            break;
                        }
                        tracing::debug!("MQTT event loop error: {}", e);
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        });

        for topic in topics {
            tracing::debug!("Subscribing to topic '{}'", topic);
            client
                .subscribe(topic.as_str(), QoS::AtLeastOnce)
                .await
                .map_err(|e| DatastoreError::Connection(e.to_string()))?;
        }

        let store = Self {
            client,
            messages,
            stopped,
        };
        store.wait_for_topics(topics).await;
        Ok(store)
    }

    async fn wait_for_topics(&self, topics: &[String]) {
        let deadline = tokio::time::Instant::now() + SUBSCRIBE_WAIT;
        let mut found = 0;
        while tokio::time::Instant::now() < deadline {
            {
                let buffer = self.messages.lock().unwrap();
                found = topics.iter().filter(|t| buffer.contains_key(*t)).count();
            }
            if found == topics.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        tracing::debug!("Received {} of {} expected topics", found, topics.len());
        if found < topics.len() {
            let buffered: Vec<String> = self.messages.lock().unwrap().keys().cloned().collect();
            tracing::warn!(
                "Failed to retrieve all expected topics: {} of {} (have: {:?}, expected: {:?})",
                found,
                topics.len(),
                buffered,
                topics
            );
        }
    }
}

impl Drop for MqttDatastore {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Relaxed);
        let _ = self.client.try_disconnect();
    }
}

#[async_trait]
impl Datastore for MqttDatastore {
    async fn read(&self, topic: &str) -> Result<Option<Value>, DatastoreError> {
        let payload = self.messages.lock().unwrap().get(topic).cloned();
        match payload {
            None => {
                tracing::debug!("Topic '{}' not buffered", topic);
                Ok(None)
            }
            Some(payload) => match serde_json::from_slice(&payload) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::error!("Undecodable payload on '{}': {}", topic, e);
                    Ok(None)
                }
            },
        }
    }

    async fn write(&self, topic: &str, data: &Value, _ttl: u64) -> Result<(), DatastoreError> {
        tracing::debug!("Publishing to topic '{}'", topic);
        let payload = serde_json::to_vec(data)?;
        self.client
            .publish(topic, QoS::AtLeastOnce, true, payload)
            .await
            .map_err(|e| DatastoreError::Write(e.to_string()))?;
        Ok(())
    }
}
