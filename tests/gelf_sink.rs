#![cfg(feature = "gelf")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log_shipper::gelf::{GelfConfig, GelfMessage, GelfSink};
use log_shipper::{Level, LogSink, Logger, Record};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::timeout;

#[derive(Default)]
struct CaptureSink(Mutex<Vec<Arc<Record>>>);

impl CaptureSink {
    fn warnings(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.level == Level::Warning)
            .map(|r| r.message.clone())
            .collect()
    }
}

impl LogSink for CaptureSink {
    fn print(&self, _formatted: &str, record: &Arc<Record>) {
        self.0.lock().unwrap().push(record.clone());
    }
}

fn config(port: u16) -> GelfConfig {
    GelfConfig {
        address: "127.0.0.1".to_string(),
        port,
        timeout_secs: 1,
        host_name: "api-1".to_string(),
        ..GelfConfig::default()
    }
}

/// Read NUL-terminated GELF frames from the first accepted connection.
async fn read_frames(listener: TcpListener, count: usize) -> Vec<GelfMessage> {
    let (stream, _) = listener.accept().await.unwrap();
    let mut reader = BufReader::new(stream);
    let mut frames = Vec::new();
    for _ in 0..count {
        let mut buf = Vec::new();
        reader.read_until(0, &mut buf).await.unwrap();
        assert_eq!(buf.pop(), Some(0));
        frames.push(serde_json::from_slice(&buf).unwrap());
    }
    frames
}

#[tokio::test]
async fn plain_tcp_fallback_warns_once_and_ships_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let reader = tokio::spawn(read_frames(listener, 2));

    let capture = Arc::new(CaptureSink::default());
    let setup_logger = Logger::builder().level(Level::Debug).sink(capture.clone()).build();
    let (sink, _handle) = GelfSink::new(config(port), &setup_logger).await;

    let warnings = capture.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("tls certificates"));

    let logger = Logger::builder()
        .level(Level::Debug)
        .sink(Arc::new(sink))
        .build()
        .with_field("request_id", "r-9");
    logger.info("first");
    logger.info("");

    let frames = timeout(Duration::from_secs(5), reader).await.unwrap().unwrap();
    assert_eq!(frames[0].short_message, "first");
    assert_eq!(frames[0].host, "api-1");
    assert_eq!(frames[0].version, "1.1");
    assert_eq!(frames[1].short_message, "empty message");

    let full: serde_json::Value = serde_json::from_str(&frames[0].full_message).unwrap();
    assert_eq!(full["request_id"], "r-9");
    assert_eq!(full["container_name"], "backend");
    assert_eq!(full["level"], "INFO");
}

#[tokio::test]
async fn failed_first_connection_is_retried_lazily() {
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let capture = Arc::new(CaptureSink::default());
    let setup_logger = Logger::builder().level(Level::Debug).sink(capture.clone()).build();
    let (sink, _handle) = GelfSink::new(config(port), &setup_logger).await;
    assert_eq!(capture.warnings().len(), 2);

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let reader = tokio::spawn(read_frames(listener, 1));

    let sink = Arc::new(sink);
    let logger = Logger::builder().level(Level::Debug).sink(sink.clone()).build();
    logger.warn("after outage");

    let frames = timeout(Duration::from_secs(10), reader).await.unwrap().unwrap();
    assert_eq!(frames[0].short_message, "after outage");
}
