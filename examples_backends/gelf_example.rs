use std::sync::Arc;

use tokio::time::{sleep, Duration};

use log_shipper::gelf::{GelfConfig, GelfSink};
use log_shipper::{ConsoleSink, KindedError, Level, Logger};

/// Ships records to a Graylog GELF TCP input.
///
/// Reads `LOG_SHIPPER_GELF_*` from the environment; with no certificates
/// configured the sink warns once and uses plain TCP.
#[tokio::main]
async fn main() {
    let (console, _console_task) = ConsoleSink::new();
    let console = Arc::new(console);
    let setup = Logger::builder().level(Level::Debug).sink(console.clone()).build();

    let (gelf, _gelf_task) = GelfSink::new(GelfConfig::from_env(), &setup).await;

    let logger = Logger::builder()
        .level(Level::Debug)
        .field("env", "local")
        .sink(console)
        .sink(Arc::new(gelf))
        .error_hook(|msg, err, request_id| {
            println!("hook: {} {} (request_id={})", msg, err, request_id);
        })
        .build();

    let request = logger.with_fields([("request_id", "req-1"), ("method", "GET"), ("path", "/orders")]);
    request.info("gelf example started");
    request.error(&KindedError::general("simulated failure"));

    sleep(Duration::from_secs(2)).await;
}
