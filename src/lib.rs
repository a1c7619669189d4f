//! Leveled structured logging with pluggable delivery sinks.
//!
//! A [`Logger`] composes records from its baseline fields and the call,
//! filters them by level, formats them as JSON or human-readable lines and
//! hands them to every registered [`LogSink`]. Sinks never block the
//! caller: the console sink and the remote shippers (Graylog over TCP/TLS,
//! Loki over HTTP) each drain their own queue on a background Tokio task,
//! retrying failed deliveries with exponential backoff.

pub mod backend;
pub mod backoff;
pub mod classify;
pub mod config;
pub mod console;
pub mod env;
pub mod error;
pub mod format;
pub mod init;
pub mod last_resort;
pub mod layer;
pub mod level;
pub mod logger;
pub mod macros;
pub mod noop_sink;
pub mod record;
pub mod shipper;
pub mod sink;

#[cfg(feature = "gelf")]
pub mod gelf;

#[cfg(feature = "loki")]
pub mod loki;

pub use classify::{Classify, ErrorKind, KindedError};
pub use config::LoggerConfig;
pub use console::ConsoleSink;
pub use error::{DeliveryError, LoggerError};
pub use format::OutputFormat;
pub use level::Level;
pub use logger::{Logger, LoggerBuilder};
pub use record::{Field, Fields, Record, ResponseDescriptor};
pub use shipper::{OverflowPolicy, Shipper, ShipperConfig, Transport};
pub use sink::LogSink;
