use crate::backoff::{BackoffPolicy, DEFAULT_BACKOFF_MAX};
use crate::env::{
    env_or, LOG_SHIPPER_GELF_ADDRESS_ENV, LOG_SHIPPER_GELF_CERT_ENV, LOG_SHIPPER_GELF_HOST_ENV,
    LOG_SHIPPER_GELF_KEY_ENV, LOG_SHIPPER_GELF_PORT_ENV,
};
use crate::error::{DeliveryError, LoggerError};
use crate::logger::Logger;
use crate::record::{Record, MESSAGE_KEY};
use crate::shipper::{OverflowPolicy, Shipper, ShipperConfig, ShipperStats, Transport};
use crate::sink::LogSink;
use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Queue size of the Graylog sink.
pub const GELF_QUEUE_CAPACITY: usize = 1000;

/// Field added to every full message to identify the emitting service.
pub const SERVICE_TAG_KEY: &str = "container_name";

const EMPTY_MESSAGE: &str = "empty message";

/// Configuration for [`GelfSink`].
///
/// `timeout_secs` bounds connect and write operations and also seeds the
/// first retry delay. Without `tls` the sink falls back to plain TCP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GelfConfig {
    pub address: String,
    pub port: u16,
    pub timeout_secs: u64,
    /// GELF protocol version written into every message.
    pub version: String,
    /// Host identity written into every message.
    pub host_name: String,
    pub service_tag: String,
    pub tls: Option<TlsConfig>,
    pub overflow: OverflowPolicy,
}

impl Default for GelfConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 12201,
            timeout_secs: 1,
            version: "1.1".to_string(),
            host_name: "localhost".to_string(),
            service_tag: "backend".to_string(),
            tls: None,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl GelfConfig {
    /// Read address, port, host identity and optional client certificate
    /// from `LOG_SHIPPER_GELF_*` variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let cert = env_or(LOG_SHIPPER_GELF_CERT_ENV, "");
        let key = env_or(LOG_SHIPPER_GELF_KEY_ENV, "");
        Self {
            address: env_or(LOG_SHIPPER_GELF_ADDRESS_ENV, &defaults.address),
            port: env_or(LOG_SHIPPER_GELF_PORT_ENV, "")
                .parse()
                .unwrap_or(defaults.port),
            host_name: env_or(LOG_SHIPPER_GELF_HOST_ENV, &defaults.host_name),
            tls: (!cert.is_empty() && !key.is_empty()).then(|| TlsConfig::new(cert, key)),
            ..defaults
        }
    }

    fn shipper_config(&self) -> ShipperConfig {
        ShipperConfig {
            capacity: GELF_QUEUE_CAPACITY,
            overflow: self.overflow,
            backoff: BackoffPolicy {
                initial: Duration::from_secs(self.timeout_secs.max(1)),
                max: DEFAULT_BACKOFF_MAX,
            },
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Client certificate used for the TLS connection to Graylog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Roots used to verify the server when verification is enabled.
    #[serde(default)]
    pub ca_path: Option<PathBuf>,
    /// Name presented during the handshake; defaults to the address.
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default = "default_skip_verify")]
    pub insecure_skip_verify: bool,
}

fn default_skip_verify() -> bool {
    true
}

impl TlsConfig {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            ca_path: None,
            server_name: None,
            insecure_skip_verify: true,
        }
    }
}

/// Message as sent to Graylog, NUL-terminated on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GelfMessage {
    pub version: String,
    pub host: String,
    pub short_message: String,
    pub full_message: String,
    pub timestamp: f64,
}

impl GelfMessage {
    /// Map a record: the full message is the JSON field set plus the
    /// service tag, the short message is the record's message.
    pub fn from_record(
        record: &Record,
        version: &str,
        host: &str,
        service_tag: &str,
    ) -> Result<Self, serde_json::Error> {
        let mut entry = record.fields.to_map();
        entry.insert(SERVICE_TAG_KEY.to_string(), service_tag.into());
        let full_message = serde_json::to_string(&entry)?;

        let short_message = record
            .fields
            .get_str(MESSAGE_KEY)
            .filter(|m| !m.is_empty())
            .unwrap_or(EMPTY_MESSAGE)
            .to_string();

        Ok(Self {
            version: version.to_string(),
            host: host.to_string(),
            short_message,
            full_message,
            timestamp: record.timestamp.timestamp_micros() as f64 / 1_000_000.0,
        })
    }

    pub fn to_frame(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut frame = serde_json::to_vec(self)?;
        frame.push(0);
        Ok(frame)
    }
}

/// Open connection to Graylog.
pub enum GelfConnection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl GelfConnection {
    async fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        match self {
            GelfConnection::Plain(stream) => {
                stream.write_all(frame).await?;
                stream.flush().await
            }
            GelfConnection::Tls(stream) => {
                stream.write_all(frame).await?;
                stream.flush().await
            }
        }
    }
}

struct TlsSetup {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

/// GELF over TCP, optionally wrapped in TLS.
pub struct GelfTransport {
    address: String,
    port: u16,
    version: String,
    host_name: String,
    service_tag: String,
    timeout: Duration,
    tls: Option<TlsSetup>,
}

#[async_trait]
impl Transport for GelfTransport {
    type Connection = GelfConnection;

    fn name(&self) -> &str {
        "graylog"
    }

    async fn connect(&mut self) -> Result<GelfConnection, DeliveryError> {
        let stream = timeout(
            self.timeout,
            TcpStream::connect((self.address.as_str(), self.port)),
        )
        .await
        .map_err(|_| DeliveryError::Timeout(self.timeout))?
        .map_err(DeliveryError::Connect)?;
        stream.set_nodelay(true).map_err(DeliveryError::Connect)?;

        match &self.tls {
            None => Ok(GelfConnection::Plain(stream)),
            Some(tls) => {
                let stream = timeout(
                    self.timeout,
                    tls.connector.connect(tls.server_name.clone(), stream),
                )
                .await
                .map_err(|_| DeliveryError::Timeout(self.timeout))?
                .map_err(|e| DeliveryError::Tls(e.to_string()))?;
                Ok(GelfConnection::Tls(Box::new(stream)))
            }
        }
    }

    async fn send(
        &mut self,
        conn: &mut GelfConnection,
        record: &Record,
    ) -> Result<(), DeliveryError> {
        let message =
            GelfMessage::from_record(record, &self.version, &self.host_name, &self.service_tag)?;
        let frame = message.to_frame()?;
        timeout(self.timeout, conn.write_frame(&frame))
            .await
            .map_err(|_| DeliveryError::Timeout(self.timeout))??;
        Ok(())
    }
}

/// Sink shipping records to Graylog.
pub struct GelfSink {
    shipper: Shipper,
}

impl GelfSink {
    /// Prepare the transport, try a first connection and spawn the worker.
    ///
    /// Missing or unreadable TLS material and a failed first connection are
    /// reported as warnings through `logger`; the sink is usable either
    /// way and connects again on the first record.
    pub async fn new(config: GelfConfig, logger: &Logger) -> (Self, JoinHandle<()>) {
        let tls = match &config.tls {
            None => {
                logger.warn("Missing graylog tls certificates, using unsafe tcp connection");
                None
            }
            Some(tls) => match tls_setup(tls, &config.address) {
                Ok(setup) => Some(setup),
                Err(e) => {
                    logger.warn_fmt(format_args!(
                        "Unable to load graylog tls certificates, using unsafe tcp connection: {}",
                        e
                    ));
                    None
                }
            },
        };

        let mut transport = GelfTransport {
            address: config.address.clone(),
            port: config.port,
            version: config.version.clone(),
            host_name: config.host_name.clone(),
            service_tag: config.service_tag.clone(),
            timeout: config.timeout(),
            tls,
        };

        let connection = match transport.connect().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                logger.warn_fmt(format_args!(
                    "error during initialize connection to graylog host, will try to reconnect on next logs sending attempt: {}",
                    e
                ));
                None
            }
        };

        let (shipper, handle) = Shipper::spawn(transport, connection, config.shipper_config());
        (Self { shipper }, handle)
    }

    pub fn stats(&self) -> &ShipperStats {
        self.shipper.stats()
    }
}

impl LogSink for GelfSink {
    fn print(&self, _formatted: &str, record: &Arc<Record>) {
        self.shipper.enqueue(Arc::clone(record));
    }
}

fn tls_setup(config: &TlsConfig, address: &str) -> Result<TlsSetup, LoggerError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| LoggerError::Tls(e.to_string()))?;

    let builder = if config.insecure_skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification(provider)))
    } else {
        let mut roots = RootCertStore::empty();
        if let Some(ca_path) = &config.ca_path {
            for cert in load_certs(ca_path)? {
                roots
                    .add(cert)
                    .map_err(|e| LoggerError::Tls(e.to_string()))?;
            }
        }
        builder.with_root_certificates(roots)
    };

    let client = builder
        .with_client_auth_cert(load_certs(&config.cert_path)?, load_key(&config.key_path)?)
        .map_err(|e| LoggerError::Tls(e.to_string()))?;

    let name = config
        .server_name
        .clone()
        .unwrap_or_else(|| address.to_string());
    let server_name =
        ServerName::try_from(name).map_err(|e| LoggerError::Tls(e.to_string()))?;

    Ok(TlsSetup {
        connector: TlsConnector::from(Arc::new(client)),
        server_name,
    })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, LoggerError> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(LoggerError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, LoggerError> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| LoggerError::Tls(format!("no private key found in {}", path.display())))
}

/// Accepts any server certificate while still checking handshake
/// signatures.
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
