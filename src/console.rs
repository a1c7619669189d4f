use crate::last_resort;
use crate::record::Record;
use crate::sink::LogSink;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Sink that writes each formatted line to stdout.
///
/// Lines go through one unbounded queue drained by a single background
/// task, so output order matches the order of `print` calls no matter how
/// many threads log at once.
pub struct ConsoleSink {
    sender: mpsc::UnboundedSender<String>,
}

impl ConsoleSink {
    /// Create a sink writing to stdout and spawn its writer task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> (Self, JoinHandle<()>) {
        Self::with_writer(tokio::io::stdout())
    }

    /// Same as [`ConsoleSink::new`] with an arbitrary writer.
    pub fn with_writer<W>(mut writer: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let handle = tokio::spawn(async move {
            while let Some(mut line) = rx.recv().await {
                line.push('\n');
                let written = async {
                    writer.write_all(line.as_bytes()).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    last_resort::report("error writing log line to console", &e);
                }
            }
        });

        (Self { sender: tx }, handle)
    }
}

impl LogSink for ConsoleSink {
    fn print(&self, formatted: &str, _record: &Arc<Record>) {
        // Only fails once the writer task is gone.
        let _ = self.sender.send(formatted.to_string());
    }
}
