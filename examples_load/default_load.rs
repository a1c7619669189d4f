use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::error;

use log_shipper::init::init_tracing;
use log_shipper::noop_sink::NoopSink;
use log_shipper::{Level, Logger};

#[tokio::main]
async fn main() {
    let sink = Arc::new(NoopSink::default());
    let logger = Logger::builder().level(Level::Debug).sink(sink.clone()).build();
    init_tracing(logger).expect("global subscriber already set");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: sent {} events in {:?} (~{:.0} ev/s), sink saw {}",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        sink.seen()
    );

    sleep(Duration::from_millis(100)).await;
}
