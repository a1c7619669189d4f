use std::sync::Arc;

use serde_json::json;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

use log_shipper::init::{init_tracing_with_config, LayerConfig};
use log_shipper::loki::{LokiConfig, LokiSink};
use log_shipper::{Level, Logger, ResponseDescriptor};

/// Ships records to Loki, including events emitted through `tracing`.
///
/// Set `LOG_SHIPPER_LOKI_URL` to point at a Loki push endpoint.
#[tokio::main]
async fn main() {
    let (loki, _loki_task) = LokiSink::new(LokiConfig::from_env());
    let loki = Arc::new(loki);
    let logger = Logger::builder().level(Level::Debug).sink(loki.clone()).build();

    init_tracing_with_config(logger.clone(), LayerConfig { enable_stdout: true })
        .expect("global subscriber already set");

    let response = ResponseDescriptor {
        status: "OK".to_string(),
        error_code: String::new(),
        description: "order created".to_string(),
        payload: json!({ "id": 7 }),
    };
    // `with_fields` keeps non-string values under their reserved names so
    // they become Loki labels.
    logger
        .with_fields([
            ("method", json!("POST")),
            ("path", json!("/orders")),
            ("status_code", json!(201)),
            ("latency", json!(0.042)),
            ("response", response.into()),
        ])
        .info("request served");

    info!(user = "bob", "signed in");
    error!(error = "connection reset", "upstream call failed");

    sleep(Duration::from_secs(2)).await;
    println!(
        "delivered={} retries={} dropped={}",
        loki.stats().delivered(),
        loki.stats().retries(),
        loki.stats().dropped()
    );
}
