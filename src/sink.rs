use crate::record::Record;
use std::sync::Arc;

/// Destination for records produced by the [`Logger`](crate::logger::Logger).
///
/// Implementations transport records to a concrete backend (stdout,
/// Graylog, Loki, etc). The logger calls `print` on the caller's thread, so
/// it must return after at most an in-memory enqueue: all I/O belongs to a
/// background worker owned by the sink.
pub trait LogSink: Send + Sync {
    /// Hand one record to the sink.
    ///
    /// **Parameters**
    /// - `formatted`: the line produced by the logger's output format
    ///   (JSON or the human-readable debug form).
    /// - `record`: the structured record the line was built from. Sinks
    ///   share it and never modify it.
    ///
    /// Failures are never returned to the caller; a sink that cannot
    /// accept the record reports it on its own side channel.
    fn print(&self, formatted: &str, record: &Arc<Record>);
}
