use std::sync::Arc;
use std::time::Duration;

use log_shipper::noop_sink::NoopSink;
use log_shipper::{log_warn, ConsoleSink, KindedError, Level, LogSink, Logger, LoggerConfig, OutputFormat};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::timeout;

#[tokio::test]
async fn records_fan_out_to_every_sink() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (console, _writer) = ConsoleSink::with_writer(client);
    let noop = Arc::new(NoopSink::default());

    let config = LoggerConfig {
        min_level: "debug".to_string(),
        env_name: "test".to_string(),
        ..LoggerConfig::default()
    };
    let sinks: Vec<Arc<dyn LogSink>> = vec![Arc::new(console), noop.clone()];
    let logger = Logger::new(&config, sinks).unwrap();

    let request = logger.with_field("request_id", "r-1");
    request.info("hello");
    log_warn!(request, "slow call: {}ms", 1200);
    request.error(&KindedError::does_not_exist("no such order"));

    let mut lines = BufReader::new(server).lines();
    let mut records = Vec::new();
    for _ in 0..3 {
        let line = timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        records.push(serde_json::from_str::<serde_json::Value>(&line).unwrap());
    }

    assert_eq!(noop.seen(), 3);
    assert_eq!(records[0]["message"], "hello");
    assert_eq!(records[0]["level"], "INFO");
    assert_eq!(records[1]["message"], "slow call: 1200ms");
    assert_eq!(records[2]["level"], "ERROR");
    assert!(records.iter().all(|r| r["request_id"] == "r-1"));
}

#[tokio::test]
async fn sinks_added_later_reach_derived_loggers() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let logger = Logger::builder()
        .level(Level::Info)
        .format(OutputFormat::Debug)
        .build();
    let derived = logger.with_field("user", "bob");

    let (console, _writer) = ConsoleSink::with_writer(client);
    logger.add_sink(Arc::new(console));
    derived.info("after add");

    let mut lines = BufReader::new(server).lines();
    let line = timeout(Duration::from_secs(5), lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let parts: Vec<&str> = line.splitn(4, '\t').collect();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[2], "after add");
    assert!(parts[1].contains("INFO"));
    let fields: serde_json::Value = serde_json::from_str(parts[3]).unwrap();
    assert_eq!(fields["user"], "bob");
}
