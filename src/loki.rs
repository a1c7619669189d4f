use crate::backoff::BackoffPolicy;
use crate::env::{env_or, LOG_SHIPPER_LOKI_CONTAINER_ENV, LOG_SHIPPER_LOKI_URL_ENV};
use crate::error::DeliveryError;
use crate::last_resort;
use crate::record::{
    Record, ERROR_KEY, LATENCY_KEY, LEVEL_KEY, MESSAGE_KEY, METHOD_KEY, PATH_KEY,
    REMOTE_ADDRESS_KEY, REQUEST_ID_KEY, RESPONSE_ERROR_KEY, RESPONSE_KEY, STATUS_CODE_KEY,
    TIME_KEY,
};
use crate::shipper::{OverflowPolicy, Shipper, ShipperConfig, ShipperStats, Transport};
use crate::sink::LogSink;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Queue size of the Loki sink.
pub const LOKI_QUEUE_CAPACITY: usize = 100;

pub const CONTAINER_NAME_LABEL: &str = "container_name";

/// Configuration for [`LokiSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LokiConfig {
    /// Push endpoint, e.g. "http://127.0.0.1:3100/loki/api/v1/push"
    pub url: String,
    pub container_name: String,
    pub timeout_secs: u64,
    pub overflow: OverflowPolicy,
    pub backoff: BackoffPolicy,
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3100/loki/api/v1/push".to_string(),
            container_name: "backend".to_string(),
            timeout_secs: 10,
            overflow: OverflowPolicy::default(),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl LokiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: env_or(LOG_SHIPPER_LOKI_URL_ENV, &defaults.url),
            container_name: env_or(LOG_SHIPPER_LOKI_CONTAINER_ENV, &defaults.container_name),
            ..defaults
        }
    }

    fn client(&self) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs.max(1)))
            .build()
    }
}

/// Body of a Loki push request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub streams: Vec<Stream>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub stream: BTreeMap<String, String>,
    /// `[unix nanos, log line]` pairs.
    pub values: Vec<[String; 2]>,
}

/// Labels copied verbatim (after quote replacement) from string fields.
const PLAIN_LABELS: [&str; 8] = [
    MESSAGE_KEY,
    METHOD_KEY,
    PATH_KEY,
    STATUS_CODE_KEY,
    REQUEST_ID_KEY,
    ERROR_KEY,
    REMOTE_ADDRESS_KEY,
    TIME_KEY,
];

impl PushRequest {
    /// One stream labelled from the well-known fields, carrying the whole
    /// field set as its only log line.
    pub fn from_record(record: &Record, container_name: &str) -> Result<Self, serde_json::Error> {
        let mut labels: BTreeMap<String, String> = [
            CONTAINER_NAME_LABEL,
            LEVEL_KEY,
            MESSAGE_KEY,
            METHOD_KEY,
            PATH_KEY,
            STATUS_CODE_KEY,
            RESPONSE_KEY,
            LATENCY_KEY,
            REQUEST_ID_KEY,
            ERROR_KEY,
            RESPONSE_ERROR_KEY,
            REMOTE_ADDRESS_KEY,
            TIME_KEY,
        ]
        .into_iter()
        .map(|name| (name.to_string(), String::new()))
        .collect();
        labels.insert(CONTAINER_NAME_LABEL.to_string(), container_name.to_string());

        for field in &record.fields {
            let name = field.name.as_str();
            match name {
                LEVEL_KEY => {
                    labels.insert(name.to_string(), label_value(&field.value).to_lowercase());
                }
                RESPONSE_KEY => {
                    if let Value::Object(response) = &field.value {
                        if let Some(status) = response.get("status") {
                            labels.insert(RESPONSE_KEY.to_string(), label_value(status));
                        }
                        if let Some(code) = response.get("error_code") {
                            labels.insert(RESPONSE_ERROR_KEY.to_string(), label_value(code));
                        }
                    }
                }
                LATENCY_KEY => {
                    labels.insert(name.to_string(), label_value(&field.value));
                }
                _ if PLAIN_LABELS.contains(&name) => {
                    labels.insert(name.to_string(), label_value(&field.value));
                }
                _ => {}
            }
        }

        let line = record.fields.to_json()?;
        let nanos = record.timestamp.timestamp_nanos_opt().unwrap_or_default();

        Ok(PushRequest {
            streams: vec![Stream {
                stream: labels,
                values: vec![[nanos.to_string(), line]],
            }],
        })
    }
}

/// Scalar rendering of a field for use as a label. Double quotes become
/// single quotes so the label set stays well-formed.
fn label_value(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        // Shortest representation that round-trips, e.g. 0.25 or 12.
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => f.to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    };
    text.replace('"', "'")
}

/// Loki push API over HTTP. A fresh client is built after every failure
/// so pooled connections are discarded along with the failed attempt.
pub struct LokiTransport {
    config: LokiConfig,
}

#[async_trait]
impl Transport for LokiTransport {
    type Connection = Client;

    fn name(&self) -> &str {
        "loki"
    }

    async fn connect(&mut self) -> Result<Client, DeliveryError> {
        Ok(self.config.client()?)
    }

    async fn send(&mut self, client: &mut Client, record: &Record) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(&PushRequest::from_record(
            record,
            &self.config.container_name,
        )?)?;

        let resp = client
            .post(&self.config.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if resp.status() == StatusCode::NO_CONTENT {
            Ok(())
        } else {
            Err(DeliveryError::Status(resp.status().as_u16()))
        }
    }
}

/// Sink shipping records to Loki.
pub struct LokiSink {
    shipper: Shipper,
}

impl LokiSink {
    /// Build the HTTP client and spawn the worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: LokiConfig) -> (Self, JoinHandle<()>) {
        let connection = match config.client() {
            Ok(client) => Some(client),
            Err(e) => {
                last_resort::report("error during building loki client", &e);
                None
            }
        };
        let shipper_config = ShipperConfig {
            capacity: LOKI_QUEUE_CAPACITY,
            overflow: config.overflow,
            backoff: config.backoff,
        };
        let (shipper, handle) =
            Shipper::spawn(LokiTransport { config }, connection, shipper_config);
        (Self { shipper }, handle)
    }

    pub fn stats(&self) -> &ShipperStats {
        self.shipper.stats()
    }
}

impl LogSink for LokiSink {
    fn print(&self, _formatted: &str, record: &Arc<Record>) {
        self.shipper.enqueue(Arc::clone(record));
    }
}
