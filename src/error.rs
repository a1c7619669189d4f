use crate::level::ParseLevelError;

/// Failure while constructing a logger or one of its sinks.
#[derive(thiserror::Error, Debug)]
pub enum LoggerError {
    #[error(transparent)]
    InvalidLevel(#[from] ParseLevelError),

    #[error("tls configuration error: {0}")]
    Tls(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure of a single delivery attempt inside a shipper worker.
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("tls handshake failed: {0}")]
    Tls(String),

    #[cfg(feature = "loki")]
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response status {0}")]
    Status(u16),

    #[error("failed to encode log payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DeliveryError {
    /// Whether retrying the same item can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeliveryError::Encode(_))
    }
}
