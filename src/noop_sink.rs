use crate::record::Record;
use crate::sink::LogSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A sink that drops every record after counting it.
///
/// Useful for measuring the overhead of the logger itself without any
/// I/O, and for tests that only care how many records were emitted.
#[derive(Default)]
pub struct NoopSink {
    seen: AtomicU64,
}

impl NoopSink {
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

impl LogSink for NoopSink {
    fn print(&self, _formatted: &str, _record: &Arc<Record>) {
        self.seen.fetch_add(1, Ordering::Relaxed);
    }
}
