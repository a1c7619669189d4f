/// Environment variable names used by this crate for convenient
/// configuration of the logger and its sinks from services.
///
/// These are purely helpers; the logger and sink types remain decoupled
/// from environment access.

/// Render human-readable lines instead of JSON (`true`/`1`/`yes`).
pub const LOG_SHIPPER_DEBUG_ENV: &str = "LOG_SHIPPER_DEBUG";

/// Minimum emitted level, e.g. `INFO`.
pub const LOG_SHIPPER_LEVEL_ENV: &str = "LOG_SHIPPER_LEVEL";

/// Deployment environment name attached to every record.
pub const LOG_SHIPPER_ENV_NAME_ENV: &str = "LOG_SHIPPER_ENV_NAME";

/// Source branch attached to every record.
pub const LOG_SHIPPER_BRANCH_ENV: &str = "LOG_SHIPPER_BRANCH";

/// Source commit attached to every record.
pub const LOG_SHIPPER_COMMIT_ENV: &str = "LOG_SHIPPER_COMMIT";

/// Graylog host name or address.
pub const LOG_SHIPPER_GELF_ADDRESS_ENV: &str = "LOG_SHIPPER_GELF_ADDRESS";

/// Graylog GELF TCP port.
pub const LOG_SHIPPER_GELF_PORT_ENV: &str = "LOG_SHIPPER_GELF_PORT";

/// Host identity reported in GELF messages.
pub const LOG_SHIPPER_GELF_HOST_ENV: &str = "LOG_SHIPPER_GELF_HOST";

/// PEM client certificate for the Graylog TLS connection.
pub const LOG_SHIPPER_GELF_CERT_ENV: &str = "LOG_SHIPPER_GELF_CERT";

/// PEM private key for the Graylog TLS connection.
pub const LOG_SHIPPER_GELF_KEY_ENV: &str = "LOG_SHIPPER_GELF_KEY";

/// Loki push endpoint, e.g. `http://127.0.0.1:3100/loki/api/v1/push`.
pub const LOG_SHIPPER_LOKI_URL_ENV: &str = "LOG_SHIPPER_LOKI_URL";

/// Container name label attached to every Loki stream.
pub const LOG_SHIPPER_LOKI_CONTAINER_ENV: &str = "LOG_SHIPPER_LOKI_CONTAINER";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
