use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, Duration};

use log_shipper::{
    DeliveryError, Level, LogSink, Logger, Record, Shipper, ShipperConfig, Transport,
};

/// Example of plugging a custom destination into the shipper machinery by
/// implementing `Transport`. Records are appended as JSON lines to a file;
/// a failed open or write is retried with backoff like any network sink.
struct JsonFileTransport {
    path: PathBuf,
}

#[async_trait]
impl Transport for JsonFileTransport {
    type Connection = File;

    fn name(&self) -> &str {
        "json-file"
    }

    async fn connect(&mut self) -> Result<File, DeliveryError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(DeliveryError::Connect)
    }

    async fn send(&mut self, conn: &mut File, record: &Record) -> Result<(), DeliveryError> {
        let mut line = serde_json::to_vec(&record.fields.to_map())?;
        line.push(b'\n');
        conn.write_all(&line).await?;
        conn.flush().await?;
        Ok(())
    }
}

/// The sink only hands records to the shipper queue.
struct JsonFileSink(Shipper);

impl LogSink for JsonFileSink {
    fn print(&self, _formatted: &str, record: &Arc<Record>) {
        self.0.enqueue(Arc::clone(record));
    }
}

#[tokio::main]
async fn main() {
    let path = std::env::temp_dir().join("log-shipper-example.jsonl");
    let (shipper, _worker) = Shipper::spawn(
        JsonFileTransport { path: path.clone() },
        None,
        ShipperConfig::default(),
    );

    let logger = Logger::builder()
        .level(Level::Debug)
        .sink(Arc::new(JsonFileSink(shipper)))
        .build();

    logger.info("custom backend example started");
    logger.with_field("db", "my-custom-db").warn("simulated warning via custom backend");

    sleep(Duration::from_millis(500)).await;
    println!("records appended to {}", path.display());
}
