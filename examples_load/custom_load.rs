use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};

use log_shipper::{log_info, ConsoleSink, Level, Logger, OutputFormat};

/// Push records through the console sink into a discarding writer, once
/// per output format, to compare the cost of JSON and debug rendering.
#[tokio::main]
async fn main() {
    for format in [OutputFormat::Json, OutputFormat::Debug] {
        let (console, writer) = ConsoleSink::with_writer(tokio::io::sink());
        let logger = Logger::builder()
            .level(Level::Info)
            .format(format)
            .field("service", "load")
            .sink(Arc::new(console))
            .build()
            .with_field("request_id", "load-1");

        let n: u64 = 100_000;
        let start = Instant::now();

        for i in 0..n {
            log_info!(logger, "custom load test record {}", i);
            // Filtered out: never formatted.
            logger.debug("skipped");
        }

        let elapsed = start.elapsed();
        println!("{:?}: sent {} records in {:?} (~{:.0} rec/s)",
            format,
            n,
            elapsed,
            n as f64 / elapsed.as_secs_f64()
        );

        drop(logger);
        let _ = tokio::time::timeout(Duration::from_secs(5), writer).await;
    }

    sleep(Duration::from_millis(100)).await;
}
