use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::console::ConsoleSink;
use crate::logger::Logger;
use crate::sink::LogSink;

/// Supported sink kinds that can be selected via DSN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Console,
    Gelf,
    Loki,
}

/// Sink configuration parsed from a DSN.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// Selected sink implementation.
    pub kind: BackendKind,
    /// Raw DSN that was used to construct this config.
    pub dsn: String,
    /// Host (and for Loki, scheme and path) taken from the DSN.
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    /// Percent-decoded query parameters.
    pub params: Vec<(String, String)>,
    /// `gelfs://` and `lokis://` ask for TLS.
    pub secure: bool,
}

impl BackendConfig {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[cfg(feature = "gelf")]
    pub fn gelf_config(&self) -> Result<crate::gelf::GelfConfig, DsnError> {
        use crate::gelf::{GelfConfig, TlsConfig};

        let mut config = GelfConfig {
            address: self.host.clone(),
            ..GelfConfig::default()
        };
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host_name) = self.param("host_name") {
            config.host_name = host_name.to_string();
        }
        if let Some(timeout) = self.param("timeout") {
            config.timeout_secs = timeout
                .parse()
                .map_err(|_| DsnError::InvalidParam("timeout".to_string()))?;
        }
        if self.secure {
            match (self.param("cert"), self.param("key")) {
                (Some(cert), Some(key)) => config.tls = Some(TlsConfig::new(cert, key)),
                _ => return Err(DsnError::InvalidParam("cert/key".to_string())),
            }
        }
        Ok(config)
    }

    #[cfg(feature = "loki")]
    pub fn loki_config(&self) -> crate::loki::LokiConfig {
        use crate::loki::LokiConfig;

        let scheme = if self.secure { "https" } else { "http" };
        let authority = match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        };
        let path = if self.path.is_empty() {
            "/loki/api/v1/push"
        } else {
            self.path.as_str()
        };
        let defaults = LokiConfig::default();
        LokiConfig {
            url: format!("{}://{}{}", scheme, authority, path),
            container_name: self
                .param("container")
                .map(str::to_string)
                .unwrap_or(defaults.container_name.clone()),
            ..defaults
        }
    }
}

/// Parse a DSN string and infer the sink kind from its scheme.
///
/// Examples:
/// - "console://"
/// - "gelf://graylog.local:12201?host_name=api-1"
/// - "gelfs://graylog.local:12201?cert=/etc/tls/client.pem&key=/etc/tls/client.key"
/// - "loki://127.0.0.1:3100/loki/api/v1/push?container=backend"
/// - "lokis://logs.example.com/loki/api/v1/push"
pub fn parse_dsn(dsn: &str) -> Result<BackendConfig, DsnError> {
    let (scheme, rest) = dsn.split_once("://").ok_or(DsnError::UnknownScheme)?;
    let (kind, secure) = match scheme.to_ascii_lowercase().as_str() {
        "console" => (BackendKind::Console, false),
        "gelf" => (BackendKind::Gelf, false),
        "gelfs" => (BackendKind::Gelf, true),
        "loki" => (BackendKind::Loki, false),
        "lokis" => (BackendKind::Loki, true),
        _ => return Err(DsnError::UnknownScheme),
    };

    let (location, query) = rest.split_once('?').unwrap_or((rest, ""));
    let (authority, path) = match location.find('/') {
        Some(idx) => location.split_at(idx),
        None => (location, ""),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (
            host,
            Some(
                port.parse::<u16>()
                    .map_err(|_| DsnError::InvalidPort(port.to_string()))?,
            ),
        ),
        None => (authority, None),
    };
    if host.is_empty() && kind != BackendKind::Console {
        return Err(DsnError::MissingHost);
    }

    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let v = urlencoding::decode(v).map_err(|_| DsnError::InvalidParam(k.to_string()))?;
            Ok((k.to_string(), v.into_owned()))
        })
        .collect::<Result<Vec<_>, DsnError>>()?;

    Ok(BackendConfig {
        kind,
        dsn: dsn.to_string(),
        host: host.to_string(),
        port,
        path: path.to_string(),
        params,
        secure,
    })
}

/// Error type returned when parsing a DSN.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DsnError {
    #[error("unknown or unsupported DSN scheme")]
    UnknownScheme,

    #[error("DSN has no host")]
    MissingHost,

    #[error("invalid port in DSN: {0}")]
    InvalidPort(String),

    #[error("invalid DSN parameter: {0}")]
    InvalidParam(String),
}

/// Error type returned when building a sink from configuration.
#[derive(thiserror::Error, Debug)]
pub enum BackendBuildError {
    #[error("{0:?} support is not enabled in this build")]
    FeatureDisabled(BackendKind),

    #[error(transparent)]
    Dsn(#[from] DsnError),
}

/// Create a sink from a [`BackendConfig`] and spawn its worker.
///
/// `logger` receives the warnings the Graylog sink reports while it is set
/// up. Must be called from within a Tokio runtime.
pub async fn make_sink_from_config(
    cfg: &BackendConfig,
    logger: &Logger,
) -> Result<(Arc<dyn LogSink>, JoinHandle<()>), BackendBuildError> {
    match cfg.kind {
        BackendKind::Console => {
            let (sink, handle) = ConsoleSink::new();
            Ok((Arc::new(sink) as Arc<dyn LogSink>, handle))
        }
        BackendKind::Gelf => {
            #[cfg(feature = "gelf")]
            {
                let (sink, handle) = crate::gelf::GelfSink::new(cfg.gelf_config()?, logger).await;
                Ok((Arc::new(sink) as Arc<dyn LogSink>, handle))
            }

            #[cfg(not(feature = "gelf"))]
            {
                let _ = logger;
                Err(BackendBuildError::FeatureDisabled(BackendKind::Gelf))
            }
        }
        BackendKind::Loki => {
            #[cfg(feature = "loki")]
            {
                let (sink, handle) = crate::loki::LokiSink::new(cfg.loki_config());
                Ok((Arc::new(sink) as Arc<dyn LogSink>, handle))
            }

            #[cfg(not(feature = "loki"))]
            {
                Err(BackendBuildError::FeatureDisabled(BackendKind::Loki))
            }
        }
    }
}

/// Parse `dsn` and build the matching sink.
pub async fn make_sink_from_dsn(
    dsn: &str,
    logger: &Logger,
) -> Result<(Arc<dyn LogSink>, JoinHandle<()>), BackendBuildError> {
    let cfg = parse_dsn(dsn)?;
    make_sink_from_config(&cfg, logger).await
}
